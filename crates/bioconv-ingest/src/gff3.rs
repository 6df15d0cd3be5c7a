//! GFF3 feature builder
//!
//! Turns parsed GFF3 features into sequence feature items with a
//! `Chromosome` per seqid, an optional `Location`, synonyms and a `parent`
//! reference. What a source contributes beyond that is a [`Gff3Config`]:
//! which feature types to keep and as what class, which attributes to copy,
//! and where the organism comes from.

use crate::builder::{BuildOutcome, ItemBuilder};
use crate::context::{BuildContext, EntitySpec};
use crate::item::ItemId;
use crate::source::gff3::{END, SEQID, START, STRAND, TYPE};
use crate::source::Record;
use bioconv_common::{BioconvError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gff3Config {
    /// Fixed organism; when absent the organism is found from the feature
    /// ID prefix and features with an unknown prefix are skipped
    #[serde(default)]
    pub taxon_id: Option<String>,
    /// GFF type -> item class. Empty means every type, class named as the type.
    #[serde(default)]
    pub type_classes: BTreeMap<String, String>,
    /// GFF attribute -> item attribute
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub synonym_attributes: Vec<String>,
    #[serde(default = "default_true")]
    pub create_locations: bool,
    #[serde(default)]
    pub data_set: Option<String>,
}

impl Default for Gff3Config {
    fn default() -> Self {
        Self {
            taxon_id: None,
            type_classes: BTreeMap::new(),
            attributes: BTreeMap::new(),
            synonym_attributes: Vec::new(),
            create_locations: true,
            data_set: None,
        }
    }
}

fn pairs(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl Gff3Config {
    /// Long oligo probes designed against P. falciparum genes
    pub fn long_oligo() -> Self {
        Self {
            taxon_id: Some("36329".into()),
            type_classes: pairs(&[("oligo", "OligoProbe")]),
            attributes: pairs(&[("sequence", "sequence"), ("Tm", "tm")]),
            synonym_attributes: Vec::new(),
            create_locations: true,
            data_set: Some("Long oligo probes".into()),
        }
    }

    /// PlasmoDB gene models
    pub fn malaria() -> Self {
        Self {
            taxon_id: Some("36329".into()),
            type_classes: pairs(&[("gene", "Gene"), ("mRNA", "MRNA"), ("exon", "Exon")]),
            attributes: pairs(&[("Name", "symbol"), ("description", "description")]),
            synonym_attributes: vec!["Alias".into()],
            create_locations: true,
            data_set: Some("PlasmoDB".into()),
        }
    }

    /// FirstEF first exon and promoter predictions on the human genome
    pub fn first_ef() -> Self {
        Self {
            taxon_id: Some("9606".into()),
            type_classes: pairs(&[("promoter", "Promoter"), ("exon", "FirstExon")]),
            attributes: pairs(&[("Name", "name"), ("score", "score")]),
            synonym_attributes: Vec::new(),
            create_locations: true,
            data_set: Some("FirstEF".into()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(class) = self.type_classes.values().find(|c| c.trim().is_empty()) {
            return Err(BioconvError::Config(format!("empty class name '{}' in type_classes", class)));
        }
        if self.taxon_id.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(BioconvError::Config("taxon_id must not be empty".into()));
        }
        Ok(())
    }
}

pub struct Gff3Builder {
    config: Gff3Config,
    /// Features seen so far, by GFF ID
    features: HashMap<String, ItemId>,
}

impl Gff3Builder {
    pub fn new(config: Gff3Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            features: HashMap::new(),
        })
    }

    fn class_for<'a>(&'a self, gff_type: &'a str) -> Option<&'a str> {
        if self.config.type_classes.is_empty() {
            Some(gff_type)
        } else {
            self.config.type_classes.get(gff_type).map(String::as_str)
        }
    }

    fn taxon_for(&self, record: &Record, ctx: &BuildContext) -> Option<String> {
        if let Some(taxon) = &self.config.taxon_id {
            return Some(taxon.clone());
        }
        let id = record.attribute("ID")?;
        ctx.organisms()
            .by_identifier_prefix(id)
            .map(|o| o.taxon_id.clone())
    }

    fn location(
        ctx: &mut BuildContext,
        record: &Record,
        chromosome: ItemId,
        feature: ItemId,
    ) -> Result<()> {
        let mut location = ctx.new_item("Location");
        location.set_attribute("start", record.require_column(START)?);
        location.set_attribute("end", record.require_column(END)?);
        let strand = match record.column(STRAND) {
            Some("+") => "1",
            Some("-") => "-1",
            _ => "0",
        };
        location.set_attribute("strand", strand);
        location.set_reference("locatedOn", chromosome);
        location.set_reference("feature", feature);
        ctx.stage(location);
        Ok(())
    }
}

impl ItemBuilder for Gff3Builder {
    fn name(&self) -> &str {
        "gff3"
    }

    fn build(&mut self, record: &Record, ctx: &mut BuildContext) -> Result<BuildOutcome> {
        let gff_type = record.require_column(TYPE)?;
        let seqid = record.require_column(SEQID)?;
        let Some(class) = self.class_for(gff_type).map(str::to_string) else {
            debug!(line = record.line, gff_type, "Feature type not mapped");
            return Ok(BuildOutcome::Skipped);
        };

        let Some(taxon) = self.taxon_for(record, ctx) else {
            let key = record.attribute("ID").unwrap_or(seqid);
            ctx.unresolved("Organism", key);
            return Ok(BuildOutcome::Skipped);
        };

        let id = record.attribute("ID");
        let parent = match record.attribute("Parent") {
            Some(parent) => match self.features.get(parent) {
                Some(parent_id) => Some(*parent_id),
                None => {
                    ctx.unresolved("Parent", parent);
                    None
                },
            },
            None => None,
        };

        let organism = ctx.organism(&taxon);
        let chromosome = ctx.entity(
            &format!("{}:{}", taxon, seqid),
            EntitySpec::new("Chromosome")
                .attribute("primaryIdentifier", seqid)
                .reference("organism", organism),
        );

        // Further lines of a multi-line feature only add a location
        if let Some(existing) = id.and_then(|id| self.features.get(id)).copied() {
            if self.config.create_locations {
                Self::location(ctx, record, chromosome, existing)?;
            }
            return Ok(BuildOutcome::Items(Vec::new()));
        }

        let mut feature = ctx.new_item(&class);
        if let Some(id) = id {
            feature.set_attribute("primaryIdentifier", id);
        }
        for (gff_name, item_name) in &self.config.attributes {
            if let Some(value) = record.attribute(gff_name) {
                feature.set_attribute(item_name, value);
            }
        }
        feature.set_reference("organism", organism);
        feature.set_reference("chromosome", chromosome);
        if let Some(parent) = parent {
            feature.set_reference("parent", parent);
        }
        if let Some(name) = &self.config.data_set {
            let data_set = ctx.data_set(name);
            feature.add_to_collection("dataSets", data_set);
        }

        if self.config.create_locations {
            Self::location(ctx, record, chromosome, feature.id)?;
        }

        let synonyms = self
            .config
            .synonym_attributes
            .iter()
            .flat_map(|name| record.attribute_values(name))
            .map(String::as_str);
        for value in id.into_iter().chain(synonyms).filter(|v| !v.is_empty()) {
            ctx.synonym(feature.id, value);
        }

        if let Some(id) = id {
            self.features.insert(id.to_string(), feature.id);
        }
        Ok(BuildOutcome::single(feature))
    }
}
