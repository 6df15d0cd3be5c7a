//! Item builder contract

use crate::context::BuildContext;
use crate::item::Item;
use crate::source::Record;
use bioconv_common::Result;

/// What a builder made of one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Primary items of the record. Shared entities created through the
    /// context are committed alongside them.
    Items(Vec<Item>),
    /// A required reference could not be resolved; nothing is emitted
    Skipped,
}

impl BuildOutcome {
    pub fn single(item: Item) -> Self {
        BuildOutcome::Items(vec![item])
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, BuildOutcome::Skipped)
    }
}

/// Turns records into items.
///
/// `build` must be deterministic for a given record and context state, and
/// must return `Skipped` (never an error) when a referenced entity cannot be
/// resolved. Errors are reserved for structurally invalid records.
pub trait ItemBuilder {
    fn name(&self) -> &str;

    fn build(&mut self, record: &Record, ctx: &mut BuildContext) -> Result<BuildOutcome>;

    /// Called once when the converter closes
    fn finish(&mut self, _ctx: &mut BuildContext) -> Result<Vec<Item>> {
        Ok(Vec::new())
    }
}
