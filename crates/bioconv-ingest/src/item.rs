//! Items: the generic output records of every converter
//!
//! An [`Item`] is a class-tagged bag of attributes, single-valued references
//! and multi-valued collections. Items point at each other only through
//! [`ItemId`]s, so the output is a graph of identifiers rather than owned
//! objects.

use bioconv_common::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::io::BufRead;

/// Process-local item identifier, rendered as `0_<n>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0_{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub class: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub references: BTreeMap<String, ItemId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub collections: BTreeMap<String, BTreeSet<ItemId>>,
}

impl Item {
    pub fn new(id: ItemId, class: impl Into<String>) -> Self {
        Self {
            id,
            class: class.into(),
            attributes: BTreeMap::new(),
            references: BTreeMap::new(),
            collections: BTreeMap::new(),
        }
    }

    /// Set an attribute; empty values are ignored
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        if !value.is_empty() {
            self.attributes.insert(name.into(), value);
        }
    }

    pub fn set_reference(&mut self, name: impl Into<String>, target: ItemId) {
        self.references.insert(name.into(), target);
    }

    pub fn add_to_collection(&mut self, name: impl Into<String>, target: ItemId) {
        self.collections.entry(name.into()).or_default().insert(target);
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn reference(&self, name: &str) -> Option<ItemId> {
        self.references.get(name).copied()
    }

    pub fn collection(&self, name: &str) -> Option<&BTreeSet<ItemId>> {
        self.collections.get(name)
    }
}

/// Hands out item identifiers for one converter run
#[derive(Debug)]
pub struct ItemFactory {
    next: u64,
}

impl ItemFactory {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn create(&mut self, class: impl Into<String>) -> Item {
        let id = ItemId(self.next);
        self.next += 1;
        Item::new(id, class)
    }

    /// Number of identifiers handed out so far
    pub fn allocated(&self) -> u64 {
        self.next - 1
    }
}

impl Default for ItemFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Unordered set of items, used to compare a run against a golden fixture
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemSet {
    items: HashSet<Item>,
}

/// Result of comparing two item sets
#[derive(Debug, Clone, Default)]
pub struct ItemSetDiff {
    /// Present in the expected set only
    pub missing: Vec<Item>,
    /// Present in the actual set only
    pub unexpected: Vec<Item>,
}

impl ItemSetDiff {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }
}

impl ItemSet {
    pub fn from_items(items: impl IntoIterator<Item = Item>) -> Self {
        Self {
            items: items.into_iter().collect(),
        }
    }

    /// Read a JSON-lines item file (the format written by `JsonLinesSink`)
    pub fn from_json_lines<R: BufRead>(reader: R) -> Result<Self> {
        let mut items = HashSet::new();
        for item in serde_jsonlines::JsonLinesReader::new(reader).read_all::<Item>() {
            items.insert(item?);
        }
        Ok(Self { items })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, item: &Item) -> bool {
        self.items.contains(item)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.iter()
    }

    /// Items of one class, ordered by id
    pub fn of_class(&self, class: &str) -> Vec<&Item> {
        let mut items: Vec<&Item> = self.items.iter().filter(|i| i.class == class).collect();
        items.sort_by_key(|i| i.id);
        items
    }

    /// Compare `self` (actual) against `expected`
    pub fn diff(&self, expected: &ItemSet) -> ItemSetDiff {
        let mut missing: Vec<Item> = expected.items.difference(&self.items).cloned().collect();
        let mut unexpected: Vec<Item> = self.items.difference(&expected.items).cloned().collect();
        missing.sort_by_key(|i| i.id);
        unexpected.sort_by_key(|i| i.id);
        ItemSetDiff {
            missing,
            unexpected,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_ids_are_never_reused() {
        let mut factory = ItemFactory::new();
        let a = factory.create("Gene");
        let b = factory.create("Gene");
        assert_ne!(a.id, b.id);
        assert_eq!(factory.allocated(), 2);
        assert_eq!(a.id.to_string(), "0_1");
    }

    #[test]
    fn test_empty_attribute_is_ignored() {
        let mut item = Item::new(ItemId(1), "Gene");
        item.set_attribute("symbol", "");
        item.set_attribute("primaryIdentifier", "AC7.1");
        assert_eq!(item.attribute("symbol"), None);
        assert_eq!(item.attribute("primaryIdentifier"), Some("AC7.1"));
    }

    #[test]
    fn test_item_set_ignores_order() {
        let mut factory = ItemFactory::new();
        let mut gene = factory.create("Gene");
        gene.set_attribute("primaryIdentifier", "FBgn0000490");
        let organism = factory.create("Organism");

        let forward = ItemSet::from_items(vec![gene.clone(), organism.clone()]);
        let backward = ItemSet::from_items(vec![organism, gene]);
        assert_eq!(forward, backward);
        assert!(forward.diff(&backward).is_empty());
    }

    #[test]
    fn test_item_set_diff_reports_both_sides() {
        let mut expected_gene = Item::new(ItemId(1), "Gene");
        expected_gene.set_attribute("symbol", "dpp");
        let mut actual_gene = Item::new(ItemId(1), "Gene");
        actual_gene.set_attribute("symbol", "Dpp");

        let diff = ItemSet::from_items(vec![actual_gene])
            .diff(&ItemSet::from_items(vec![expected_gene]));
        assert_eq!(diff.missing.len(), 1);
        assert_eq!(diff.unexpected.len(), 1);
    }

    #[test]
    fn test_json_lines_round_trip_through_item_set() {
        let mut item = Item::new(ItemId(3), "Synonym");
        item.set_attribute("value", "CG9885");
        item.set_reference("subject", ItemId(1));
        item.add_to_collection("dataSets", ItemId(2));

        let line = serde_json::to_string(&item).unwrap();
        assert!(line.contains("\"id\":3"));
        let set = ItemSet::from_json_lines(format!("{}\n", line).as_bytes()).unwrap();
        assert!(set.contains(&item));
    }
}
