//! Conversion run orchestration
//!
//! A [`Converter`] pulls records from a source, hands each to its builder,
//! and commits the resulting items to the sink, one record at a time.
//!
//! ```text
//! Created --process--> Processing --close--> Closed
//!                       ^      |
//!                       +------+ (more inputs)
//! ```
//!
//! Fatal errors (malformed input, I/O) propagate out of `process`
//! immediately. Items committed before the failure stay in the sink.

use crate::builder::{BuildOutcome, ItemBuilder};
use crate::context::BuildContext;
use crate::item::Item;
use crate::sink::ItemSink;
use crate::source::RecordSource;
use bioconv_common::{BioconvError, Result};
use serde::Serialize;
use tracing::{debug, info, info_span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConverterState {
    Created,
    Processing,
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConversionStats {
    /// Records handed to the builder
    pub records_read: usize,
    /// Records the builder skipped for unresolved references
    pub records_skipped: usize,
    /// Rows dropped by the source (too few columns)
    pub rows_skipped: usize,
    pub items_stored: usize,
    pub unresolved_references: usize,
    pub key_conflicts: usize,
}

pub struct Converter<S: ItemSink> {
    builder: Box<dyn ItemBuilder>,
    ctx: BuildContext,
    sink: S,
    state: ConverterState,
    stats: ConversionStats,
}

impl<S: ItemSink> Converter<S> {
    pub fn new(builder: Box<dyn ItemBuilder>, ctx: BuildContext, sink: S) -> Self {
        Self {
            builder,
            ctx,
            sink,
            state: ConverterState::Created,
            stats: ConversionStats::default(),
        }
    }

    pub fn state(&self) -> ConverterState {
        self.state
    }

    pub fn stats(&self) -> ConversionStats {
        let diagnostics = self.ctx.diagnostics();
        ConversionStats {
            unresolved_references: diagnostics.unresolved_references,
            key_conflicts: diagnostics.key_conflicts,
            ..self.stats
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Convert every record of `source`. May be called once per input
    /// until the converter is closed.
    pub fn process<R: RecordSource>(&mut self, mut source: R) -> Result<()> {
        if self.state == ConverterState::Closed {
            return Err(BioconvError::InvalidState(
                "process called on a closed converter".into(),
            ));
        }
        self.state = ConverterState::Processing;

        let span = info_span!("convert", converter = self.builder.name());
        let _enter = span.enter();

        for record in source.by_ref() {
            let record = record?;
            self.stats.records_read += 1;

            let outcome = self.builder.build(&record, &mut self.ctx)?;
            let primary = match outcome {
                BuildOutcome::Items(items) => items,
                BuildOutcome::Skipped => {
                    debug!(line = record.line, "Record skipped");
                    self.stats.records_skipped += 1;
                    Vec::new()
                },
            };
            self.commit(primary)?;
        }

        self.stats.rows_skipped += source.skipped();
        let stats = self.stats();
        info!(
            records = stats.records_read,
            skipped = stats.records_skipped,
            items = stats.items_stored,
            "Input processed"
        );
        Ok(())
    }

    /// Finish the builder, flush the sink and return the run's statistics
    pub fn close(&mut self) -> Result<ConversionStats> {
        if self.state == ConverterState::Closed {
            return Err(BioconvError::InvalidState("converter already closed".into()));
        }

        let span = info_span!("convert", converter = self.builder.name());
        let _enter = span.enter();

        let trailing = self.builder.finish(&mut self.ctx)?;
        self.commit(trailing)?;
        self.sink.close()?;
        self.state = ConverterState::Closed;

        let stats = self.stats();
        info!(
            records = stats.records_read,
            skipped = stats.records_skipped + stats.rows_skipped,
            items = stats.items_stored,
            unresolved = stats.unresolved_references,
            conflicts = stats.key_conflicts,
            "Conversion complete"
        );
        Ok(stats)
    }

    /// Commit shared entities staged by the builder, then its primary items
    fn commit(&mut self, primary: Vec<Item>) -> Result<()> {
        let staged = self.ctx.take_staged();
        for item in staged.into_iter().chain(primary) {
            self.sink.store(item)?;
            self.stats.items_stored += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mapping::{presets, MappingBuilder};
    use crate::resolver::OrganismRepository;
    use crate::sink::MemorySink;
    use crate::source::{Gff3Source, TabularOptions, TabularSource};
    use std::sync::Arc;

    fn phenotype_converter() -> Converter<MemorySink> {
        let builder = MappingBuilder::new(presets::rnai_phenotype()).unwrap();
        let ctx = BuildContext::new(Arc::new(OrganismRepository::default()));
        Converter::new(Box::new(builder), ctx, MemorySink::new())
    }

    fn rows(input: &str) -> TabularSource<&[u8]> {
        TabularSource::new(input.as_bytes(), TabularOptions::with_min_columns(3))
    }

    #[test]
    fn test_second_row_reuses_entities() {
        let mut converter = phenotype_converter();
        converter.process(rows("AC7.1\t6239\tSck\tpmid:12529635\n")).unwrap();
        assert_eq!(converter.sink().stored(), 4);

        converter.process(rows("AC7.1\t6239\tSck\tpmid:12529635\n")).unwrap();
        let stats = converter.close().unwrap();
        assert_eq!(stats.items_stored, 5);
        assert_eq!(stats.records_read, 2);

        let items = converter.sink().items();
        let annotations: Vec<&Item> = items.iter().filter(|i| i.class == "PhenotypeAnnotation").collect();
        assert_eq!(annotations.len(), 2);
        assert_ne!(annotations[0].id, annotations[1].id);
        assert_eq!(annotations[0].reference("gene"), annotations[1].reference("gene"));
        assert_eq!(annotations[0].reference("publication"), annotations[1].reference("publication"));

        let organism = items.iter().find(|i| i.class == "Organism").unwrap();
        assert!(annotations.iter().all(|a| a.reference("organism") == Some(organism.id)));
    }

    #[test]
    fn test_state_transitions() {
        let mut converter = phenotype_converter();
        assert_eq!(converter.state(), ConverterState::Created);
        converter.process(rows("")).unwrap();
        assert_eq!(converter.state(), ConverterState::Processing);
        converter.close().unwrap();
        assert_eq!(converter.state(), ConverterState::Closed);

        let err = converter.process(rows("AC7.1\t6239\tSck\n")).unwrap_err();
        assert!(matches!(err, BioconvError::InvalidState(_)));
        assert!(matches!(converter.close(), Err(BioconvError::InvalidState(_))));
        assert_eq!(converter.sink().stored(), 0);
    }

    #[test]
    fn test_short_rows_and_skips_are_counted() {
        let mut converter = phenotype_converter();
        converter
            .process(rows("AC7.1\t6239\nAC7.1\t6239\t\tpmid:1\nB0212.4\t6239\tEmb\n"))
            .unwrap();
        let stats = converter.close().unwrap();
        assert_eq!(stats.rows_skipped, 1);
        assert_eq!(stats.records_read, 2);
        assert_eq!(stats.records_skipped, 1);
        assert_eq!(stats.items_stored, 3);
    }

    #[test]
    fn test_malformed_input_aborts_with_partial_output() {
        let gff = "c1\ts\tgene\t1\t10\t.\t+\t.\tID=g1\n\
c1\ts\tgene\tten\t20\t.\t+\t.\tID=g2\n\
c1\ts\tgene\t30\t40\t.\t+\t.\tID=g3\n";
        let config = crate::gff3::Gff3Config {
            taxon_id: Some("7227".into()),
            ..Default::default()
        };
        let builder = crate::gff3::Gff3Builder::new(config).unwrap();
        let ctx = BuildContext::new(Arc::new(OrganismRepository::default()));
        let mut converter = Converter::new(Box::new(builder), ctx, MemorySink::new());

        let err = converter.process(Gff3Source::new(gff.as_bytes())).unwrap_err();
        assert!(matches!(err, BioconvError::MalformedInput { line: 2, .. }));

        let items = converter.sink().items();
        assert!(items.iter().any(|i| i.attribute("primaryIdentifier") == Some("g1")));
        assert!(!items.iter().any(|i| i.attribute("primaryIdentifier") == Some("g3")));
    }
}
