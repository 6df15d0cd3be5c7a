//! End-to-end conversion tests
//!
//! Each converter runs over a fixture file and the produced items are
//! compared as an unordered set against a golden JSON-lines file.

use bioconv_common::BioconvError;
use bioconv_ingest::context::BuildContext;
use bioconv_ingest::converter::{Converter, ConverterState};
use bioconv_ingest::gff3::{Gff3Builder, Gff3Config};
use bioconv_ingest::homology::{self, HomologyBuilder};
use bioconv_ingest::item::ItemSet;
use bioconv_ingest::mapping::{presets, MappingBuilder};
use bioconv_ingest::resolver::OrganismRepository;
use bioconv_ingest::sink::MemorySink;
use bioconv_ingest::source::{Gff3Source, TabularOptions, TabularSource};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn golden(name: &str) -> ItemSet {
    let file = File::open(fixture(name)).expect("Failed to open golden file");
    ItemSet::from_json_lines(BufReader::new(file)).expect("Failed to parse golden file")
}

fn context() -> BuildContext {
    BuildContext::new(Arc::new(OrganismRepository::default()))
}

fn assert_matches_golden(actual: &ItemSet, name: &str) {
    let diff = actual.diff(&golden(name));
    assert!(
        diff.is_empty(),
        "missing: {:?}\nunexpected: {:?}",
        diff.missing,
        diff.unexpected
    );
}

// ============================================================================
// Golden Files
// ============================================================================

#[test]
fn test_phenotype_matches_golden() {
    let builder = MappingBuilder::new(presets::rnai_phenotype()).unwrap();
    let mut converter = Converter::new(Box::new(builder), context(), MemorySink::new());

    let input = File::open(fixture("phenotype.tsv")).unwrap();
    converter
        .process(TabularSource::new(BufReader::new(input), TabularOptions::with_min_columns(3)))
        .unwrap();
    let stats = converter.close().unwrap();

    assert_eq!(stats.records_read, 3);
    assert_eq!(stats.rows_skipped, 1);
    assert_eq!(stats.items_stored, 7);
    assert_matches_golden(&converter.sink().item_set(), "phenotype.expected.jsonl");
}

#[test]
fn test_homology_matches_golden() {
    let mut converter = Converter::new(Box::new(HomologyBuilder::new()), context(), MemorySink::new());

    let input = File::open(fixture("homology.tsv")).unwrap();
    converter
        .process(TabularSource::new(
            BufReader::new(input),
            TabularOptions::with_min_columns(homology::MIN_COLUMNS),
        ))
        .unwrap();
    let stats = converter.close().unwrap();

    // The reversed pair on the third row contributes nothing
    assert_eq!(stats.records_read, 3);
    assert_eq!(stats.rows_skipped, 1);
    assert_eq!(stats.items_stored, 11);
    assert_matches_golden(&converter.sink().item_set(), "homology.expected.jsonl");
}

#[test]
fn test_comparison_ignores_emission_order() {
    let expected = golden("homology.expected.jsonl");
    let mut reversed: Vec<_> = expected.iter().cloned().collect();
    reversed.reverse();

    assert!(ItemSet::from_items(reversed).diff(&expected).is_empty());
}

#[test]
fn test_comparison_reports_changed_items() {
    let expected = golden("phenotype.expected.jsonl");
    let mut items: Vec<_> = expected.iter().cloned().collect();
    let annotation = items
        .iter_mut()
        .find(|item| item.attribute("phenotype") == Some("Sck"))
        .unwrap();
    annotation.set_attribute("phenotype", "Lva");

    let diff = ItemSet::from_items(items).diff(&expected);
    assert_eq!(diff.missing.len(), 1);
    assert_eq!(diff.unexpected.len(), 1);
    assert_eq!(diff.unexpected[0].attribute("phenotype"), Some("Lva"));
}

// ============================================================================
// Shared Entities
// ============================================================================

#[test]
fn test_entities_shared_across_inputs() {
    let builder = MappingBuilder::new(presets::rnai_phenotype()).unwrap();
    let mut converter = Converter::new(Box::new(builder), context(), MemorySink::new());

    let first = "AC7.1\t6239\tSck\tpmid:12529635\n";
    let second = "AC7.1\t6239\tEmb\tpmid:12529635\n";
    converter
        .process(TabularSource::new(first.as_bytes(), TabularOptions::with_min_columns(3)))
        .unwrap();
    converter
        .process(TabularSource::new(second.as_bytes(), TabularOptions::with_min_columns(3)))
        .unwrap();
    converter.close().unwrap();

    let items = converter.sink().item_set();
    assert_eq!(items.of_class("Organism").len(), 1);
    assert_eq!(items.of_class("Gene").len(), 1);
    assert_eq!(items.of_class("Publication").len(), 1);
    assert_eq!(items.of_class("PhenotypeAnnotation").len(), 2);
}

#[test]
fn test_conflicting_entity_keeps_first_values() {
    let mut converter = Converter::new(Box::new(HomologyBuilder::new()), context(), MemorySink::new());

    let rows = "FBgn0000490|dpp\t7227\tFBgn0003731|Egfr\t7227\tparalogue\tTreeFam\n\
                FBgn0000490|decapentaplegic\t7227\tFBgn0000492|Dpt\t7227\tparalogue\tTreeFam\n";
    converter
        .process(TabularSource::new(rows.as_bytes(), TabularOptions::with_min_columns(6)))
        .unwrap();
    let stats = converter.close().unwrap();

    assert_eq!(stats.key_conflicts, 1);
    let items = converter.sink().item_set();
    let dpp: Vec<_> = items
        .of_class("Gene")
        .into_iter()
        .filter(|gene| gene.attribute("primaryIdentifier") == Some("FBgn0000490"))
        .collect();
    assert_eq!(dpp.len(), 1);
    assert_eq!(dpp[0].attribute("symbol"), Some("dpp"));
}

// ============================================================================
// Skipped Records
// ============================================================================

#[test]
fn test_gff3_unknown_prefix_skips_feature() {
    let config = Gff3Config {
        taxon_id: None,
        ..Gff3Config::long_oligo()
    };
    let builder = Gff3Builder::new(config).unwrap();
    let mut converter = Converter::new(Box::new(builder), context(), MemorySink::new());

    let gff = "##gff-version 3\n\
               Pf3D7_01\toligo\toligo\t100\t170\t.\t+\t.\tID=Pf.oligo.1\n\
               chrX\toligo\toligo\t5\t75\t.\t-\t.\tID=Zz.oligo.9\n";
    converter.process(Gff3Source::new(gff.as_bytes())).unwrap();
    let stats = converter.close().unwrap();

    assert_eq!(stats.records_read, 2);
    assert_eq!(stats.records_skipped, 1);
    assert_eq!(stats.unresolved_references, 1);

    let items = converter.sink().item_set();
    let probes = items.of_class("OligoProbe");
    assert_eq!(probes.len(), 1);
    assert_eq!(probes[0].attribute("primaryIdentifier"), Some("Pf.oligo.1"));
    assert!(items.iter().all(|item| item.attribute("primaryIdentifier") != Some("Zz.oligo.9")));
    assert_eq!(items.of_class("Chromosome").len(), 1);
}

#[test]
fn test_required_reference_missing_skips_record() {
    let builder = MappingBuilder::new(presets::rnai_phenotype()).unwrap();
    let mut converter = Converter::new(Box::new(builder), context(), MemorySink::new());

    // Column 0 is empty, so there is no gene to point at
    let rows = "\t6239\tSck\n";
    converter
        .process(TabularSource::new(rows.as_bytes(), TabularOptions::with_min_columns(3)))
        .unwrap();
    let stats = converter.close().unwrap();

    assert_eq!(stats.records_skipped, 1);
    assert_eq!(stats.items_stored, 0);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_process_after_close_is_rejected() {
    let mut converter = Converter::new(Box::new(HomologyBuilder::new()), context(), MemorySink::new());
    converter.close().unwrap();
    assert_eq!(converter.state(), ConverterState::Closed);

    let result = converter.process(TabularSource::new("".as_bytes(), TabularOptions::default()));
    assert!(matches!(result, Err(BioconvError::InvalidState(_))));
    assert!(matches!(converter.close(), Err(BioconvError::InvalidState(_))));
}
