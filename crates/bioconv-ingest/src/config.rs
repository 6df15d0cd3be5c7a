//! Conversion run configuration
//!
//! Layered with the `config` crate: an optional TOML or JSON file, then
//! environment variables prefixed `BIOCONV_` (nested keys separated by
//! `__`, e.g. `BIOCONV_ENTREZ__EMAIL`). A `.env` file is honoured.
//!
//! Field tables that are case-sensitive (GFF3 type maps, record mappings)
//! live in their own JSON files referenced from here.

use crate::entrez::EntrezConfig;
use crate::gff3::Gff3Config;
use crate::homology;
use crate::mapping::{presets, RecordMapping};
use crate::pubmed;
use crate::source::{SourceFormat, TabularOptions};
use bioconv_common::{BioconvError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "BIOCONV";

/// Default item output file
pub const DEFAULT_OUTPUT: &str = "items.jsonl";

/// Columns a phenotype row needs: gene, taxon, phenotype
pub const PHENOTYPE_MIN_COLUMNS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ConverterKind {
    /// RNAi phenotype table
    Phenotype,
    /// Pairwise homology table
    Homology,
    /// GFF3 annotation
    Gff3,
    /// PubMed XML
    Pubmed,
    /// Tab-delimited table with a JSON record mapping
    Mapping,
}

impl ConverterKind {
    /// Name used in configuration files and `BIOCONV_CONVERTER`
    pub fn as_str(&self) -> &'static str {
        match self {
            ConverterKind::Phenotype => "phenotype",
            ConverterKind::Homology => "homology",
            ConverterKind::Gff3 => "gff3",
            ConverterKind::Pubmed => "pubmed",
            ConverterKind::Mapping => "mapping",
        }
    }
}

fn default_output() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertConfig {
    pub converter: ConverterKind,
    #[serde(default)]
    pub input: Vec<PathBuf>,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    /// JSON organism list; the built-in list is used when absent
    #[serde(default)]
    pub organisms_file: Option<PathBuf>,
    /// Synonym table for the identifier resolver
    #[serde(default)]
    pub id_resolver_file: Option<PathBuf>,
    #[serde(default)]
    pub mapping_file: Option<PathBuf>,
    /// JSON [`Gff3Config`]
    #[serde(default)]
    pub gff3_file: Option<PathBuf>,
    /// Built-in configuration: `rnai_phenotype`, `affy_probe` (mapping) or
    /// `long_oligo`, `malaria`, `first_ef` (gff3)
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub tabular: TabularOptions,
    #[serde(default)]
    pub entrez: EntrezConfig,
}

impl ConvertConfig {
    pub fn new(converter: ConverterKind) -> Self {
        Self {
            converter,
            input: Vec::new(),
            output: default_output(),
            organisms_file: None,
            id_resolver_file: None,
            mapping_file: None,
            gff3_file: None,
            preset: None,
            tabular: TabularOptions::default(),
            entrez: EntrezConfig::default(),
        }
    }

    /// Load from an optional file, overridden by `BIOCONV_*` variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let loaded = Self::layered(path, None)?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// File and environment layers without validation.
    ///
    /// `converter` overrides both layers. Callers that apply further
    /// overrides validate afterwards.
    pub fn layered(path: Option<&Path>, converter: Option<ConverterKind>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("input")
                .try_parsing(true),
        );
        if let Some(converter) = converter {
            builder = builder
                .set_override("converter", converter.as_str())
                .map_err(|e| BioconvError::Config(e.to_string()))?;
        }

        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| BioconvError::Config(e.to_string()))
    }

    /// Reject combinations that cannot run
    pub fn validate(&self) -> Result<()> {
        match (self.converter, self.preset.as_deref()) {
            (ConverterKind::Mapping, None) if self.mapping_file.is_none() => {
                return Err(BioconvError::Config(
                    "mapping converter needs mapping_file or preset".into(),
                ));
            },
            (ConverterKind::Mapping, Some(preset)) if mapping_preset(preset).is_none() => {
                return Err(BioconvError::Config(format!("unknown mapping preset '{}'", preset)));
            },
            (ConverterKind::Gff3, None) if self.gff3_file.is_none() => {
                return Err(BioconvError::Config("gff3 converter needs gff3_file or preset".into()));
            },
            (ConverterKind::Gff3, Some(preset)) if gff3_preset(preset).is_none() => {
                return Err(BioconvError::Config(format!("unknown gff3 preset '{}'", preset)));
            },
            (ConverterKind::Phenotype | ConverterKind::Homology | ConverterKind::Pubmed, Some(preset)) => {
                return Err(BioconvError::Config(format!(
                    "preset '{}' does not apply to the {:?} converter",
                    preset, self.converter
                )));
            },
            _ => {},
        }
        if self.output.as_os_str().is_empty() {
            return Err(BioconvError::Config("output must not be empty".into()));
        }
        self.entrez.validate()
    }

    /// Record format the converter reads
    pub fn source_format(&self) -> SourceFormat {
        let tabular = |min_columns: usize| {
            let mut options = self.tabular.clone();
            options.min_columns = options.min_columns.max(min_columns);
            SourceFormat::Tabular(options)
        };
        match self.converter {
            ConverterKind::Phenotype => tabular(PHENOTYPE_MIN_COLUMNS),
            ConverterKind::Homology => tabular(homology::MIN_COLUMNS),
            ConverterKind::Mapping => tabular(0),
            ConverterKind::Gff3 => SourceFormat::Gff3,
            ConverterKind::Pubmed => SourceFormat::Xml {
                record_element: pubmed::RECORD_ELEMENT.to_string(),
            },
        }
    }

    /// Record mapping for the mapping and phenotype converters
    pub fn record_mapping(&self) -> Result<RecordMapping> {
        if self.converter == ConverterKind::Phenotype {
            return Ok(presets::rnai_phenotype());
        }
        if let Some(preset) = self.preset.as_deref() {
            return mapping_preset(preset)
                .ok_or_else(|| BioconvError::Config(format!("unknown mapping preset '{}'", preset)));
        }
        match &self.mapping_file {
            Some(path) => RecordMapping::from_path(path),
            None => Err(BioconvError::Config("no mapping_file configured".into())),
        }
    }

    pub fn gff3_config(&self) -> Result<Gff3Config> {
        if let Some(preset) = self.preset.as_deref() {
            return gff3_preset(preset)
                .ok_or_else(|| BioconvError::Config(format!("unknown gff3 preset '{}'", preset)));
        }
        match &self.gff3_file {
            Some(path) => {
                let file = std::fs::File::open(path)?;
                Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
            },
            None => Err(BioconvError::Config("no gff3_file configured".into())),
        }
    }
}

fn mapping_preset(name: &str) -> Option<RecordMapping> {
    match name {
        "rnai_phenotype" => Some(presets::rnai_phenotype()),
        "affy_probe" => Some(presets::affy_probe()),
        _ => None,
    }
}

fn gff3_preset(name: &str) -> Option<Gff3Config> {
    match name {
        "long_oligo" => Some(Gff3Config::long_oligo()),
        "malaria" => Some(Gff3Config::malaria()),
        "first_ef" => Some(Gff3Config::first_ef()),
        _ => None,
    }
}
