//! Wiring a [`ConvertConfig`] into a converter run

use crate::builder::ItemBuilder;
use crate::config::{ConvertConfig, ConverterKind};
use crate::context::BuildContext;
use crate::converter::{ConversionStats, Converter};
use crate::gff3::Gff3Builder;
use crate::homology::HomologyBuilder;
use crate::mapping::MappingBuilder;
use crate::pubmed::{self, PubMedBuilder};
use crate::resolver::{MapIdResolver, OrganismRepository};
use crate::sink::{ItemSink, JsonLinesSink};
use crate::source::{open_path, open_source, SourceFormat};
use bioconv_common::{BioconvError, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Builder selected by the configuration
pub fn builder_for(config: &ConvertConfig) -> Result<Box<dyn ItemBuilder>> {
    Ok(match config.converter {
        ConverterKind::Phenotype | ConverterKind::Mapping => {
            Box::new(MappingBuilder::new(config.record_mapping()?)?)
        },
        ConverterKind::Homology => Box::new(HomologyBuilder::new()),
        ConverterKind::Gff3 => Box::new(Gff3Builder::new(config.gff3_config()?)?),
        ConverterKind::Pubmed => Box::new(PubMedBuilder::new()),
    })
}

/// Build context with the configured lookup snapshots
pub fn context_for(config: &ConvertConfig) -> Result<BuildContext> {
    let organisms = match &config.organisms_file {
        Some(path) => OrganismRepository::from_path(path)?,
        None => OrganismRepository::default(),
    };
    let ctx = BuildContext::new(Arc::new(organisms));

    Ok(match &config.id_resolver_file {
        Some(path) => ctx.with_id_resolver(Arc::new(MapIdResolver::from_path(path)?)),
        None => ctx,
    })
}

/// Convert every configured input into the configured output file
pub fn convert_files(config: &ConvertConfig) -> Result<ConversionStats> {
    if config.input.is_empty() {
        return Err(BioconvError::Config("no input files configured".into()));
    }

    let sink = JsonLinesSink::create(&config.output)?;
    let mut converter = Converter::new(builder_for(config)?, context_for(config)?, sink);
    let format = config.source_format();

    for input in &config.input {
        info!(input = %input.display(), "Converting");
        converter.process(open_path(&format, input)?)?;
    }
    converter.close()
}

/// Convert an in-memory PubMed document into an item file
pub fn convert_pubmed_document(
    config: &ConvertConfig,
    document: &str,
    output: &Path,
) -> Result<ConversionStats> {
    let format = SourceFormat::Xml {
        record_element: pubmed::RECORD_ELEMENT.to_string(),
    };
    let sink = JsonLinesSink::create(output)?;
    let mut converter = Converter::new(Box::new(PubMedBuilder::new()), context_for(config)?, sink);
    converter.process(open_source(&format, document.as_bytes()))?;
    let stats = converter.close()?;
    info!(stored = converter.sink().stored(), output = %output.display(), "PubMed items written");
    Ok(stats)
}
