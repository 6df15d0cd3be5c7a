//! Build context shared by all builders of one conversion run
//!
//! The context owns the item factory and the entity cache, stages the
//! shared entities created while building a record, and carries the
//! injected lookup collaborators. Builders follow one discipline: every
//! required reference is checked with pure lookups ([`BuildContext::lookup`],
//! [`BuildContext::resolve_gene`], the organism repository) before anything
//! is created, so a skipped record leaves no items behind.

use crate::cache::EntityCache;
use crate::item::{Item, ItemFactory, ItemId};
use crate::resolver::{IdResolver, OrganismRepository, Resolution};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::warn;

/// Shape of a shared entity, identified by class and natural key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitySpec {
    pub class: String,
    pub attributes: BTreeMap<String, String>,
    pub references: BTreeMap<String, ItemId>,
    pub collections: BTreeMap<String, BTreeSet<ItemId>>,
}

impl EntitySpec {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            ..Default::default()
        }
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.attributes.insert(name.into(), value);
        }
        self
    }

    pub fn reference(mut self, name: impl Into<String>, target: ItemId) -> Self {
        self.references.insert(name.into(), target);
        self
    }

    pub fn collection(mut self, name: impl Into<String>, targets: impl IntoIterator<Item = ItemId>) -> Self {
        let targets: BTreeSet<ItemId> = targets.into_iter().collect();
        if !targets.is_empty() {
            self.collections.insert(name.into(), targets);
        }
        self
    }

    /// Values set on both sides that disagree
    fn conflicts_with(&self, other: &EntitySpec) -> Vec<String> {
        let attributes = self
            .attributes
            .iter()
            .filter(|(name, value)| other.attributes.get(*name).is_some_and(|v| v != *value))
            .map(|(name, _)| name.clone());
        let references = self
            .references
            .iter()
            .filter(|(name, id)| other.references.get(*name).is_some_and(|o| o != *id))
            .map(|(name, _)| name.clone());
        attributes.chain(references).collect()
    }

    fn into_item(self, factory: &mut ItemFactory) -> Item {
        let mut item = factory.create(self.class);
        item.attributes = self.attributes;
        item.references = self.references;
        item.collections = self.collections;
        item
    }
}

/// Non-fatal conditions seen while building
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub unresolved_references: usize,
    pub key_conflicts: usize,
}

pub struct BuildContext {
    factory: ItemFactory,
    entities: EntityCache<ItemId>,
    first_specs: HashMap<String, EntitySpec>,
    resolutions: EntityCache<String>,
    staged: Vec<Item>,
    diagnostics: Diagnostics,
    organisms: Arc<OrganismRepository>,
    id_resolver: Option<Arc<dyn IdResolver>>,
}

impl BuildContext {
    pub fn new(organisms: Arc<OrganismRepository>) -> Self {
        Self {
            factory: ItemFactory::new(),
            entities: EntityCache::new(),
            first_specs: HashMap::new(),
            resolutions: EntityCache::new(),
            staged: Vec::new(),
            diagnostics: Diagnostics::default(),
            organisms,
            id_resolver: None,
        }
    }

    pub fn with_id_resolver(mut self, resolver: Arc<dyn IdResolver>) -> Self {
        self.id_resolver = Some(resolver);
        self
    }

    pub fn organisms(&self) -> &OrganismRepository {
        &self.organisms
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    /// Fresh, unshared item
    pub fn new_item(&mut self, class: impl Into<String>) -> Item {
        self.factory.create(class)
    }

    /// Stage an auxiliary item for commit with the current record
    pub fn stage(&mut self, item: Item) {
        self.staged.push(item);
    }

    pub(crate) fn take_staged(&mut self) -> Vec<Item> {
        std::mem::take(&mut self.staged)
    }

    /// Identifier of an existing entity, without creating it
    pub fn lookup(&self, class: &str, key: &str) -> Option<ItemId> {
        self.entities.get(&entity_key(class, key)).copied()
    }

    /// The entity for `key`, created and staged on first use.
    ///
    /// A later spec for the same key that disagrees with the first one is a
    /// duplicate key conflict: it is logged and counted, and the first
    /// entity stands.
    pub fn entity(&mut self, key: &str, spec: EntitySpec) -> ItemId {
        if let Some(existing) = self.existing(key, &spec, &[]) {
            return existing;
        }

        let cache_key = entity_key(&spec.class, key);
        let factory = &mut self.factory;
        let staged = &mut self.staged;
        let first_specs = &mut self.first_specs;
        self.entities.get_or_create(&cache_key, || {
            first_specs.insert(cache_key.clone(), spec.clone());
            let item = spec.into_item(factory);
            let id = item.id;
            staged.push(item);
            id
        })
    }

    /// The already created entity for `key`, checked against its first spec.
    ///
    /// `unmatched` names references the caller could not look up without
    /// creating their targets. Each one disagrees with a first spec that set it.
    pub fn existing(&mut self, key: &str, spec: &EntitySpec, unmatched: &[&str]) -> Option<ItemId> {
        let cache_key = entity_key(&spec.class, key);
        let existing = self.entities.get(&cache_key).copied()?;

        if let Some(first) = self.first_specs.get(&cache_key) {
            let mut fields = spec.conflicts_with(first);
            fields.extend(
                unmatched
                    .iter()
                    .filter(|name| first.references.contains_key(**name))
                    .map(|name| name.to_string()),
            );
            if !fields.is_empty() {
                warn!(
                    class = %spec.class,
                    key,
                    fields = ?fields,
                    "Duplicate key conflict, keeping first entity"
                );
                self.diagnostics.key_conflicts += 1;
            }
        }
        Some(existing)
    }

    pub fn organism(&mut self, taxon_id: &str) -> ItemId {
        self.entity(taxon_id, EntitySpec::new("Organism").attribute("taxonId", taxon_id))
    }

    /// Gene keyed by its primary identifier.
    ///
    /// A gene seen before never creates an organism for a taxon it was not
    /// first seen with.
    pub fn gene(&mut self, identifier: &str, taxon_id: &str, symbol: Option<&str>) -> ItemId {
        let mut spec = EntitySpec::new("Gene").attribute("primaryIdentifier", identifier);
        if let Some(symbol) = symbol {
            spec = spec.attribute("symbol", symbol);
        }

        if let Some(organism) = self.lookup("Organism", taxon_id) {
            return self.entity(identifier, spec.reference("organism", organism));
        }
        if let Some(existing) = self.existing(identifier, &spec, &["organism"]) {
            return existing;
        }
        let organism = self.organism(taxon_id);
        self.entity(identifier, spec.reference("organism", organism))
    }

    pub fn publication(&mut self, pubmed_id: &str) -> ItemId {
        self.entity(pubmed_id, EntitySpec::new("Publication").attribute("pubMedId", pubmed_id))
    }

    pub fn data_set(&mut self, name: &str) -> ItemId {
        self.entity(name, EntitySpec::new("DataSet").attribute("name", name))
    }

    /// One Synonym per distinct subject and value
    pub fn synonym(&mut self, subject: ItemId, value: &str) -> ItemId {
        let key = format!("{}:{}", subject, value);
        self.entity(
            &key,
            EntitySpec::new("Synonym")
                .attribute("value", value)
                .reference("subject", subject),
        )
    }

    /// Canonical gene identifier for `raw`, via the identifier resolver.
    ///
    /// Without a resolver the raw identifier is used as is. Ambiguous and
    /// unknown identifiers are reported once and stay absent.
    pub fn resolve_gene(&mut self, taxon_id: &str, raw: &str) -> Option<String> {
        let Some(resolver) = self.id_resolver.clone() else {
            return Some(raw.to_string());
        };

        let diagnostics = &mut self.diagnostics;
        self.resolutions
            .resolve(&format!("{}\t{}", taxon_id, raw), || {
                match resolver.resolve(taxon_id, raw) {
                    Resolution::Resolved(id) => Some(id),
                    Resolution::Ambiguous(candidates) => {
                        warn!(taxon_id, identifier = raw, candidates = ?candidates, "Ambiguous identifier");
                        diagnostics.unresolved_references += 1;
                        None
                    },
                    Resolution::NotFound => {
                        warn!(taxon_id, identifier = raw, "Identifier not found");
                        diagnostics.unresolved_references += 1;
                        None
                    },
                }
            })
    }

    /// Record a reference that could not be resolved
    pub fn unresolved(&mut self, kind: &str, key: &str) {
        warn!(kind, key, "Unresolved reference, dropping dependent item");
        self.diagnostics.unresolved_references += 1;
    }
}

fn entity_key(class: &str, key: &str) -> String {
    format!("{}\t{}", class, key)
}
