//! bioconv Ingest - data conversion tool

use anyhow::{bail, Context, Result};
use bioconv_common::logging::{init_logging, LogConfig, LogLevel};
use bioconv_ingest::config::{ConvertConfig, ConverterKind};
use bioconv_ingest::entrez::EntrezClient;
use bioconv_ingest::item::ItemSet;
use bioconv_ingest::run;
use clap::Parser;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "bioconv-ingest")]
#[command(author, version, about = "Convert biological data files into items")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Convert input files into a JSON-lines item file
    Convert {
        /// Configuration file (TOML or JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Converter to run
        #[arg(long, value_enum)]
        converter: Option<ConverterKind>,

        /// Input files, converted in order
        #[arg(short, long, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Output item file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Organism list (JSON)
        #[arg(long)]
        organisms: Option<PathBuf>,

        /// Identifier synonym table
        #[arg(long)]
        id_resolver: Option<PathBuf>,

        /// Record mapping (JSON)
        #[arg(long)]
        mapping: Option<PathBuf>,

        /// GFF3 configuration (JSON)
        #[arg(long)]
        gff3_config: Option<PathBuf>,

        /// Built-in mapping or GFF3 configuration
        #[arg(long)]
        preset: Option<String>,

        /// Skip rows with fewer columns
        #[arg(long)]
        min_columns: Option<usize>,
    },

    /// Fetch PubMed records from Entrez and convert them
    Pubmed {
        /// Comma-separated PubMed ids
        #[arg(long, value_delimiter = ',', required = true)]
        ids: Vec<String>,

        /// Output item file
        #[arg(short, long)]
        output: PathBuf,

        /// E-utilities base URL
        #[arg(long, env = "BIOCONV_ENTREZ_BASE_URL")]
        base_url: Option<String>,
    },

    /// Compare two item files, ignoring order
    Verify {
        /// Item file produced by a run
        #[arg(long)]
        actual: PathBuf,

        /// Golden item file
        #[arg(long)]
        expected: PathBuf,
    },
}

fn read_items(path: &Path) -> Result<ItemSet> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open item file {}", path.display()))?;
    Ok(ItemSet::from_json_lines(BufReader::new(file))?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("bioconv-ingest")
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env()?;
    let _guard = init_logging(&log_config)?;

    match cli.command {
        Command::Convert {
            config,
            converter,
            input,
            output,
            organisms,
            id_resolver,
            mapping,
            gff3_config,
            preset,
            min_columns,
        } => {
            let layered = ConvertConfig::layered(config.as_deref(), converter);
            let mut settings = match (&config, converter) {
                (None, None) => layered.context("Pass --config or --converter (or set BIOCONV_CONVERTER)")?,
                _ => layered?,
            };
            if !input.is_empty() {
                settings.input = input;
            }
            if let Some(output) = output {
                settings.output = output;
            }
            settings.organisms_file = organisms.or(settings.organisms_file);
            settings.id_resolver_file = id_resolver.or(settings.id_resolver_file);
            settings.mapping_file = mapping.or(settings.mapping_file);
            settings.gff3_file = gff3_config.or(settings.gff3_file);
            settings.preset = preset.or(settings.preset);
            if let Some(min_columns) = min_columns {
                settings.tabular.min_columns = min_columns;
            }
            settings.validate()?;

            info!(converter = ?settings.converter, inputs = settings.input.len(), "Starting conversion");
            let stats = run::convert_files(&settings)?;
            info!(
                items = stats.items_stored,
                skipped = stats.records_skipped + stats.rows_skipped,
                output = %settings.output.display(),
                "Conversion complete"
            );
        },
        Command::Pubmed {
            ids,
            output,
            base_url,
        } => {
            let mut settings = ConvertConfig::new(ConverterKind::Pubmed);
            if let Some(base_url) = base_url {
                settings.entrez.base_url = base_url;
            }
            settings.validate()?;

            let client = EntrezClient::new(settings.entrez.clone())?;
            let document = client.fetch_pubmed(&ids).await?;
            let stats = run::convert_pubmed_document(&settings, &document, &output)?;
            info!(items = stats.items_stored, output = %output.display(), "PubMed conversion complete");
        },
        Command::Verify { actual, expected } => {
            let diff = read_items(&actual)?.diff(&read_items(&expected)?);
            if !diff.is_empty() {
                for item in &diff.missing {
                    println!("missing:    {}", serde_json::to_string(item)?);
                }
                for item in &diff.unexpected {
                    println!("unexpected: {}", serde_json::to_string(item)?);
                }
                bail!(
                    "{} missing and {} unexpected items",
                    diff.missing.len(),
                    diff.unexpected.len()
                );
            }
            println!("Item sets match");
        },
    }

    Ok(())
}
