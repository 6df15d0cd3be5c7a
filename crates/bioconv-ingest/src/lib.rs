//! bioconv Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Converters that turn biological data files into a graph of generic
//! [`Item`]s: class-tagged attribute bags that reference each other by id.
//!
//! Every converter is the same pipeline:
//!
//! ```text
//! RecordSource --> Converter --> ItemBuilder <--> BuildContext (entity cache)
//!                      |
//!                      v
//!                   ItemSink
//! ```
//!
//! # Supported Sources
//!
//! - **Tab-delimited tables**: RNAi phenotypes, homology pairs, anything
//!   described by a [`mapping::RecordMapping`]
//! - **GFF3**: sequence features, configured by [`gff3::Gff3Config`]
//! - **PubMed XML**: publications, fetched with [`entrez::EntrezClient`]
//!
//! # Example
//!
//! ```no_run
//! use bioconv_ingest::context::BuildContext;
//! use bioconv_ingest::converter::Converter;
//! use bioconv_ingest::mapping::{presets, MappingBuilder};
//! use bioconv_ingest::resolver::OrganismRepository;
//! use bioconv_ingest::sink::MemorySink;
//! use bioconv_ingest::source::{TabularOptions, TabularSource};
//! use std::sync::Arc;
//!
//! fn main() -> bioconv_common::Result<()> {
//!     let builder = MappingBuilder::new(presets::rnai_phenotype())?;
//!     let ctx = BuildContext::new(Arc::new(OrganismRepository::default()));
//!     let mut converter = Converter::new(Box::new(builder), ctx, MemorySink::new());
//!
//!     let rows = "AC7.1\t6239\tSck\tpmid:12529635\n";
//!     converter.process(TabularSource::new(rows.as_bytes(), TabularOptions::with_min_columns(3)))?;
//!     let stats = converter.close()?;
//!     assert_eq!(stats.items_stored, 4);
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod cache;
pub mod config;
pub mod context;
pub mod converter;
pub mod entrez;
pub mod gff3;
pub mod homology;
pub mod item;
pub mod mapping;
pub mod pubmed;
pub mod resolver;
pub mod run;
pub mod sink;
pub mod source;

pub use builder::{BuildOutcome, ItemBuilder};
pub use converter::{ConversionStats, Converter, ConverterState};
pub use item::{Item, ItemId, ItemSet};
