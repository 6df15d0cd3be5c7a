//! Record sources
//!
//! A record source turns a byte stream into a lazy, single-pass sequence of
//! [`Record`]s. Three format families are supported:
//!
//! - **tabular**: tab-delimited rows; short rows are skipped, never fatal
//! - **gff3**: GFF3 features; structural errors abort the conversion
//! - **xml**: one record per configured element; parse errors abort
//!
//! Re-reading an input means opening it again.

pub mod gff3;
pub mod tabular;
pub mod xml;

use bioconv_common::{BioconvError, Result};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{BufReader, Read};
use std::path::Path;

pub use gff3::Gff3Source;
pub use tabular::{TabularOptions, TabularSource};
pub use xml::{XmlElement, XmlSource};

/// Reference to one value of a record, by column index or by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRef {
    Column(usize),
    Attribute(String),
}

impl std::fmt::Display for FieldRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldRef::Column(i) => write!(f, "column {}", i),
            FieldRef::Attribute(name) => write!(f, "attribute '{}'", name),
        }
    }
}

/// Read-only view of one unit of input
#[derive(Debug, Clone, Default)]
pub struct Record {
    /// 1-based line of the input where the record starts
    pub line: usize,
    pub columns: Vec<String>,
    pub attributes: BTreeMap<String, Vec<String>>,
    /// Full element tree for XML records
    pub element: Option<XmlElement>,
}

impl Record {
    pub fn from_columns(line: usize, columns: Vec<String>) -> Self {
        Self {
            line,
            columns,
            ..Default::default()
        }
    }

    /// Column value; empty cells count as absent
    pub fn column(&self, index: usize) -> Option<&str> {
        self.columns
            .get(index)
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
    }

    pub fn require_column(&self, index: usize) -> Result<&str> {
        self.column(index).ok_or_else(|| {
            BioconvError::malformed(
                self.line,
                format!("missing required column {} ({} present)", index, self.columns.len()),
            )
        })
    }

    /// First value of a named attribute
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attribute_values(name)
            .iter()
            .map(|v| v.as_str())
            .find(|v| !v.is_empty())
    }

    pub fn attribute_values(&self, name: &str) -> &[String] {
        self.attributes.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn require_attribute(&self, name: &str) -> Result<&str> {
        self.attribute(name).ok_or_else(|| {
            BioconvError::malformed(self.line, format!("missing required attribute '{}'", name))
        })
    }

    pub fn field(&self, field: &FieldRef) -> Option<&str> {
        match field {
            FieldRef::Column(i) => self.column(*i),
            FieldRef::Attribute(name) => self.attribute(name),
        }
    }

    pub fn element(&self) -> Option<&XmlElement> {
        self.element.as_ref()
    }

    pub(crate) fn push_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.entry(name.into()).or_default().push(value.into());
    }
}

/// A lazy, finite, non-restartable sequence of records
pub trait RecordSource: Iterator<Item = Result<Record>> {
    /// Rows dropped by the source itself (for example too few columns)
    fn skipped(&self) -> usize {
        0
    }
}

impl<S: RecordSource + ?Sized> RecordSource for Box<S> {
    fn skipped(&self) -> usize {
        (**self).skipped()
    }
}

/// Input format descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum SourceFormat {
    Tabular(TabularOptions),
    Gff3,
    Xml { record_element: String },
}

/// Open a record source over any reader
pub fn open_source<'a, R>(format: &SourceFormat, reader: R) -> Box<dyn RecordSource + 'a>
where
    R: Read + 'a,
{
    match format {
        SourceFormat::Tabular(options) => Box::new(TabularSource::new(reader, options.clone())),
        SourceFormat::Gff3 => Box::new(Gff3Source::new(BufReader::new(reader))),
        SourceFormat::Xml { record_element } => {
            Box::new(XmlSource::new(BufReader::new(reader), record_element))
        },
    }
}

/// Open a file, transparently decompressing `.gz` inputs
pub fn open_path(format: &SourceFormat, path: &Path) -> Result<Box<dyn RecordSource>> {
    let file = std::fs::File::open(path)?;
    let reader: Box<dyn Read> = if path.extension().and_then(|s| s.to_str()) == Some("gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(open_source(format, reader))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn record() -> Record {
        let mut record = Record::from_columns(7, vec!["AC7.1".into(), "".into(), "Sck".into()]);
        record.push_attribute("Name", "");
        record.push_attribute("Name", "unc-22");
        record
    }

    #[test]
    fn test_missing_optional_column_is_absent() {
        let record = record();
        assert_eq!(record.column(0), Some("AC7.1"));
        assert_eq!(record.column(1), None);
        assert_eq!(record.column(9), None);
    }

    #[test]
    fn test_missing_required_column_is_malformed() {
        let err = record().require_column(5).unwrap_err();
        assert!(matches!(err, BioconvError::MalformedInput { line: 7, .. }));
    }

    #[test]
    fn test_attribute_skips_empty_values() {
        let record = record();
        assert_eq!(record.attribute("Name"), Some("unc-22"));
        assert_eq!(record.attribute_values("Name").len(), 2);
        assert!(record.require_attribute("ID").is_err());
    }

    #[test]
    fn test_field_ref_serde() {
        let column: FieldRef = serde_json::from_str(r#"{"column": 2}"#).unwrap();
        assert_eq!(column, FieldRef::Column(2));
        let attr: FieldRef = serde_json::from_str(r#"{"attribute": "Alias"}"#).unwrap();
        assert_eq!(record().field(&attr), None);
        assert_eq!(record().field(&column), Some("Sck"));
    }

    #[test]
    fn test_open_source_dispatches_on_format() {
        let format = SourceFormat::Tabular(TabularOptions::with_min_columns(2));
        let records: Vec<Record> = open_source(&format, "a\tb\nshort\n".as_bytes())
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_open_path_decompresses_gzip() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("phenotypes.tsv.gz");
        let mut encoder = GzEncoder::new(std::fs::File::create(&path).unwrap(), Compression::default());
        encoder
            .write_all(b"AC7.1\t6239\tSck\tpmid:12529635\nshort\n")
            .unwrap();
        encoder.finish().unwrap();

        let format = SourceFormat::Tabular(TabularOptions::with_min_columns(3));
        let mut source = open_path(&format, &path).unwrap();
        let records: Vec<Record> = source.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].column(3), Some("pmid:12529635"));
        assert_eq!(source.skipped(), 1);
    }
}
