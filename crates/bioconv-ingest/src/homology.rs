//! Homology table builder
//!
//! Input rows carry at least six columns:
//! `gene1, taxon1, gene2, taxon2, type, source`. A gene column may hold an
//! `identifier|symbol` pair. Each row yields a Homologue in both directions;
//! a pair that was already emitted (in either orientation) yields nothing new.
//! A row that pairs a gene with itself is skipped.

use crate::builder::{BuildOutcome, ItemBuilder};
use crate::context::BuildContext;
use crate::item::{Item, ItemId};
use crate::source::Record;
use bioconv_common::Result;
use std::collections::HashSet;
use tracing::debug;

pub const MIN_COLUMNS: usize = 6;

const GENE1: usize = 0;
const TAXON1: usize = 1;
const GENE2: usize = 2;
const TAXON2: usize = 3;
const TYPE: usize = 4;
const SOURCE: usize = 5;

#[derive(Debug, Default)]
pub struct HomologyBuilder {
    emitted: HashSet<(ItemId, ItemId)>,
}

impl HomologyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn homologue(
        ctx: &mut BuildContext,
        gene: ItemId,
        homologue: ItemId,
        kind: Option<&str>,
        data_set: Option<ItemId>,
    ) -> Item {
        let mut item = ctx.new_item("Homologue");
        item.set_reference("gene", gene);
        item.set_reference("homologue", homologue);
        if let Some(kind) = kind {
            item.set_attribute("type", kind);
        }
        if let Some(data_set) = data_set {
            item.add_to_collection("dataSets", data_set);
        }
        item
    }
}

/// Split `identifier|symbol` into its parts; the symbol is optional
pub fn split_gene_field(field: &str) -> (&str, Option<&str>) {
    match field.split_once('|') {
        Some((id, symbol)) => {
            let symbol = symbol.trim();
            (id.trim(), Some(symbol).filter(|s| !s.is_empty()))
        },
        None => (field.trim(), None),
    }
}

impl ItemBuilder for HomologyBuilder {
    fn name(&self) -> &str {
        "homology"
    }

    fn build(&mut self, record: &Record, ctx: &mut BuildContext) -> Result<BuildOutcome> {
        if record.columns.len() < MIN_COLUMNS {
            debug!(line = record.line, columns = record.columns.len(), "Short homology row");
            return Ok(BuildOutcome::Skipped);
        }

        let (Some(gene1), Some(taxon1), Some(gene2), Some(taxon2)) = (
            record.column(GENE1),
            record.column(TAXON1),
            record.column(GENE2),
            record.column(TAXON2),
        ) else {
            debug!(line = record.line, "Homology row without both genes");
            return Ok(BuildOutcome::Skipped);
        };

        let (raw1, symbol1) = split_gene_field(gene1);
        let (raw2, symbol2) = split_gene_field(gene2);
        let Some(id1) = ctx.resolve_gene(taxon1, raw1) else {
            return Ok(BuildOutcome::Skipped);
        };
        let Some(id2) = ctx.resolve_gene(taxon2, raw2) else {
            return Ok(BuildOutcome::Skipped);
        };

        if id1 == id2 {
            debug!(line = record.line, gene = %id1, "Homology row pairs a gene with itself");
            return Ok(BuildOutcome::Skipped);
        }

        let first = ctx.gene(&id1, taxon1, symbol1);
        let second = ctx.gene(&id2, taxon2, symbol2);
        if !self.emitted.insert((first, second)) || !self.emitted.insert((second, first)) {
            debug!(line = record.line, gene = %id1, homologue = %id2, "Homologue pair already seen");
            return Ok(BuildOutcome::Items(Vec::new()));
        }

        let kind = record.column(TYPE);
        let data_set = record.column(SOURCE).map(|name| ctx.data_set(name));

        Ok(BuildOutcome::Items(vec![
            Self::homologue(ctx, first, second, kind, data_set),
            Self::homologue(ctx, second, first, kind, data_set),
        ]))
    }
}
