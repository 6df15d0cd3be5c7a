//! Data-driven record mapping
//!
//! Most sources are a straight copy of a few fields into one output class
//! plus a handful of shared entities. A [`RecordMapping`] describes that copy
//! as data (usually JSON) and [`MappingBuilder`] executes it.
//!
//! ```json
//! {
//!   "class": "PhenotypeAnnotation",
//!   "organism": {"column": 1},
//!   "attributes": [{"name": "phenotype", "from": {"column": 2}, "required": true}],
//!   "references": [{
//!     "name": "publication", "class": "Publication", "key_attribute": "pubMedId",
//!     "key": {"column": 3}, "transform": {"type": "strip_prefix", "prefix": "pmid:"}
//!   }]
//! }
//! ```

use crate::builder::{BuildOutcome, ItemBuilder};
use crate::context::{BuildContext, EntitySpec};
use crate::item::ItemId;
use crate::source::{FieldRef, Record};
use bioconv_common::{BioconvError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Where the record's organism comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrganismRule {
    /// Fixed taxon for the whole source
    Taxon { taxon: String },
    /// Taxon id read from the record
    Field(FieldRef),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transform {
    #[default]
    None,
    /// Remove a leading prefix when present
    StripPrefix { prefix: String },
    /// First capture group of a regex; absent when it does not match
    Capture { pattern: String },
    Lowercase,
    /// Value must parse as an integer, else it is absent
    Integer,
}

impl Transform {
    fn apply(&self, value: &str, patterns: &HashMap<String, Regex>) -> Option<String> {
        let out = match self {
            Transform::None => value.to_string(),
            Transform::StripPrefix { prefix } => {
                value.strip_prefix(prefix.as_str()).unwrap_or(value).to_string()
            },
            Transform::Capture { pattern } => patterns
                .get(pattern)?
                .captures(value)?
                .get(1)?
                .as_str()
                .to_string(),
            Transform::Lowercase => value.to_lowercase(),
            Transform::Integer => value.trim().parse::<i64>().ok()?.to_string(),
        };
        Some(out.trim().to_string()).filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Present(FieldRef),
    Absent(FieldRef),
}

impl Condition {
    fn holds(&self, record: &Record) -> bool {
        match self {
            Condition::Present(field) => record.field(field).is_some(),
            Condition::Absent(field) => record.field(field).is_none(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRule {
    pub name: String,
    pub from: FieldRef,
    #[serde(default)]
    pub transform: Transform,
    /// Skip the record when the value is absent
    #[serde(default)]
    pub required: bool,
    /// Only set the attribute when this holds
    #[serde(default)]
    pub when: Option<Condition>,
}

fn default_key_attribute() -> String {
    "primaryIdentifier".to_string()
}

/// Reference from the primary item to a shared entity keyed by a field value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRule {
    pub name: String,
    pub class: String,
    pub key: FieldRef,
    /// Attribute of the entity that holds the key
    #[serde(default = "default_key_attribute")]
    pub key_attribute: String,
    #[serde(default)]
    pub transform: Transform,
    /// Give the entity an `organism` reference
    #[serde(default)]
    pub organism: bool,
    /// Canonicalise the key through the identifier resolver
    #[serde(default)]
    pub resolve: bool,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMapping {
    pub class: String,
    /// Makes the primary item a shared entity keyed by this field
    #[serde(default)]
    pub key: Option<FieldRef>,
    #[serde(default)]
    pub organism: Option<OrganismRule>,
    /// Name of the primary item's reference to the organism, if any
    #[serde(default)]
    pub organism_reference: Option<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeRule>,
    #[serde(default)]
    pub references: Vec<ReferenceRule>,
    /// Fields that become Synonyms of the primary item
    #[serde(default)]
    pub synonyms: Vec<FieldRef>,
}

impl RecordMapping {
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_json_reader(std::io::BufReader::new(file))
    }

    fn transforms(&self) -> impl Iterator<Item = &Transform> {
        self.attributes
            .iter()
            .map(|a| &a.transform)
            .chain(self.references.iter().map(|r| &r.transform))
    }
}

/// Executes a [`RecordMapping`]
pub struct MappingBuilder {
    mapping: RecordMapping,
    patterns: HashMap<String, Regex>,
}

struct PendingReference<'a> {
    rule: &'a ReferenceRule,
    key: String,
}

impl MappingBuilder {
    pub fn new(mapping: RecordMapping) -> Result<Self> {
        if mapping.class.trim().is_empty() {
            return Err(BioconvError::Config("mapping class must not be empty".into()));
        }

        let mut patterns = HashMap::new();
        for transform in mapping.transforms() {
            if let Transform::Capture { pattern } = transform {
                let regex = Regex::new(pattern).map_err(|e| {
                    BioconvError::Config(format!("invalid capture pattern '{}': {}", pattern, e))
                })?;
                if regex.captures_len() < 2 {
                    return Err(BioconvError::Config(format!(
                        "capture pattern '{}' has no group",
                        pattern
                    )));
                }
                patterns.insert(pattern.clone(), regex);
            }
        }

        Ok(Self { mapping, patterns })
    }

    pub fn mapping(&self) -> &RecordMapping {
        &self.mapping
    }

    fn add_synonyms(&self, record: &Record, primary: ItemId, ctx: &mut BuildContext) {
        for field in &self.mapping.synonyms {
            if let Some(value) = record.field(field) {
                ctx.synonym(primary, value);
            }
        }
    }

    fn taxon(&self, record: &Record) -> Option<Option<String>> {
        match &self.mapping.organism {
            None => Some(None),
            Some(OrganismRule::Taxon { taxon }) => Some(Some(taxon.clone())),
            Some(OrganismRule::Field(field)) => record.field(field).map(|t| Some(t.to_string())),
        }
    }
}

impl ItemBuilder for MappingBuilder {
    fn name(&self) -> &str {
        &self.mapping.class
    }

    fn build(&mut self, record: &Record, ctx: &mut BuildContext) -> Result<BuildOutcome> {
        let mapping = &self.mapping;

        // Resolve everything first; nothing is created for a skipped record
        let Some(taxon) = self.taxon(record) else {
            ctx.unresolved("Organism", &format!("line {}", record.line));
            return Ok(BuildOutcome::Skipped);
        };

        let key = match &mapping.key {
            Some(field) => match record.field(field) {
                Some(key) => Some(key.to_string()),
                None => {
                    debug!(line = record.line, class = %mapping.class, "Record has no key");
                    return Ok(BuildOutcome::Skipped);
                },
            },
            None => None,
        };

        let mut attributes = Vec::new();
        for rule in &mapping.attributes {
            if rule.when.as_ref().is_some_and(|c| !c.holds(record)) {
                continue;
            }
            match record.field(&rule.from).and_then(|v| rule.transform.apply(v, &self.patterns)) {
                Some(value) => attributes.push((rule.name.as_str(), value)),
                None if rule.required => {
                    debug!(line = record.line, attribute = %rule.name, "Missing required attribute");
                    return Ok(BuildOutcome::Skipped);
                },
                None => {},
            }
        }

        let mut pending = Vec::new();
        for rule in &mapping.references {
            let field = record.field(&rule.key);
            let raw = field.and_then(|v| rule.transform.apply(v, &self.patterns));
            let transformed = raw.is_some();
            let resolved = match (raw, rule.resolve, taxon.as_deref()) {
                (Some(raw), true, Some(taxon)) => ctx.resolve_gene(taxon, &raw),
                (Some(raw), true, None) => {
                    debug!(line = record.line, reference = %rule.name, "No organism to resolve against");
                    ctx.unresolved(&rule.class, &raw);
                    None
                },
                (raw, false, _) => raw,
                (None, true, _) => None,
            };
            match resolved {
                Some(key) => pending.push(PendingReference { rule, key }),
                None if rule.required => {
                    // Resolver failures are reported where they happen
                    if !transformed {
                        let key = field.map_or_else(|| format!("line {}", record.line), str::to_string);
                        ctx.unresolved(&rule.class, &key);
                    }
                    return Ok(BuildOutcome::Skipped);
                },
                None => {},
            }
        }

        let mut spec = EntitySpec::new(&mapping.class);
        for (name, value) in attributes {
            spec = spec.attribute(name, value);
        }

        // A keyed item seen before only points at entities that already exist
        if let Some(key) = key.as_deref().filter(|k| ctx.lookup(&mapping.class, k).is_some()) {
            let mut unmatched = Vec::new();
            for PendingReference { rule, key } in &pending {
                match ctx.lookup(&rule.class, key) {
                    Some(id) => spec = spec.reference(&rule.name, id),
                    None => unmatched.push(rule.name.as_str()),
                }
            }
            if let (Some(name), Some(taxon)) = (&mapping.organism_reference, taxon.as_deref()) {
                match ctx.lookup("Organism", taxon) {
                    Some(organism) => spec = spec.reference(name, organism),
                    None => unmatched.push(name.as_str()),
                }
            }
            if let Some(primary_id) = ctx.existing(key, &spec, &unmatched) {
                self.add_synonyms(record, primary_id, ctx);
            }
            return Ok(BuildOutcome::Items(Vec::new()));
        }

        let organism = taxon.as_deref().map(|t| ctx.organism(t));

        for PendingReference { rule, key } in pending {
            let mut reference = EntitySpec::new(&rule.class).attribute(&rule.key_attribute, &key);
            if let (true, Some(organism)) = (rule.organism, organism) {
                reference = reference.reference("organism", organism);
            }
            spec = spec.reference(&rule.name, ctx.entity(&key, reference));
        }
        if let (Some(name), Some(organism)) = (&mapping.organism_reference, organism) {
            spec = spec.reference(name, organism);
        }

        let (primary_id, outcome) = match key {
            Some(key) => (ctx.entity(&key, spec), BuildOutcome::Items(Vec::new())),
            None => {
                let mut item = ctx.new_item(&mapping.class);
                item.attributes = spec.attributes;
                item.references = spec.references;
                (item.id, BuildOutcome::single(item))
            },
        };
        self.add_synonyms(record, primary_id, ctx);

        Ok(outcome)
    }
}

/// Mappings for sources that are a plain field copy
pub mod presets {
    use super::*;

    /// RNAi phenotype table: `gene, taxon, phenotype, pmid:NNN`
    pub fn rnai_phenotype() -> RecordMapping {
        RecordMapping {
            class: "PhenotypeAnnotation".into(),
            key: None,
            organism: Some(OrganismRule::Field(FieldRef::Column(1))),
            organism_reference: Some("organism".into()),
            attributes: vec![AttributeRule {
                name: "phenotype".into(),
                from: FieldRef::Column(2),
                transform: Transform::None,
                required: true,
                when: None,
            }],
            references: vec![
                ReferenceRule {
                    name: "gene".into(),
                    class: "Gene".into(),
                    key: FieldRef::Column(0),
                    key_attribute: default_key_attribute(),
                    transform: Transform::None,
                    organism: true,
                    resolve: true,
                    required: true,
                },
                ReferenceRule {
                    name: "publication".into(),
                    class: "Publication".into(),
                    key: FieldRef::Column(3),
                    key_attribute: "pubMedId".into(),
                    transform: Transform::StripPrefix {
                        prefix: "pmid:".into(),
                    },
                    organism: false,
                    resolve: false,
                    required: false,
                },
            ],
            synonyms: Vec::new(),
        }
    }

    /// Affymetrix probe annotation: `probe set, gene, taxon, array`
    pub fn affy_probe() -> RecordMapping {
        RecordMapping {
            class: "ProbeSet".into(),
            key: Some(FieldRef::Column(0)),
            organism: Some(OrganismRule::Field(FieldRef::Column(2))),
            organism_reference: Some("organism".into()),
            attributes: vec![AttributeRule {
                name: "primaryIdentifier".into(),
                from: FieldRef::Column(0),
                transform: Transform::None,
                required: true,
                when: None,
            }],
            references: vec![
                ReferenceRule {
                    name: "gene".into(),
                    class: "Gene".into(),
                    key: FieldRef::Column(1),
                    key_attribute: default_key_attribute(),
                    transform: Transform::None,
                    organism: true,
                    resolve: true,
                    required: true,
                },
                ReferenceRule {
                    name: "array".into(),
                    class: "Array".into(),
                    key: FieldRef::Column(3),
                    key_attribute: "name".into(),
                    transform: Transform::None,
                    organism: false,
                    resolve: false,
                    required: false,
                },
            ],
            synonyms: Vec::new(),
        }
    }
}
