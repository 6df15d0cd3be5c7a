//! Tab-delimited record source
//!
//! Rows are split on tabs without any quoting rules. A row with fewer
//! columns than `min_columns` is dropped and counted; it never aborts the
//! conversion.

use super::{Record, RecordSource};
use bioconv_common::{BioconvError, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;
use tracing::debug;

fn default_comment() -> Option<char> {
    Some('#')
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabularOptions {
    /// Rows with fewer columns are skipped
    #[serde(default)]
    pub min_columns: usize,
    /// Lines starting with this character are ignored
    #[serde(default = "default_comment")]
    pub comment: Option<char>,
    /// First non-comment line is a header
    #[serde(default)]
    pub has_header: bool,
}

impl TabularOptions {
    pub fn with_min_columns(min_columns: usize) -> Self {
        Self {
            min_columns,
            ..Self::default()
        }
    }
}

impl Default for TabularOptions {
    fn default() -> Self {
        Self {
            min_columns: 0,
            comment: default_comment(),
            has_header: false,
        }
    }
}

pub struct TabularSource<R: Read> {
    rows: csv::StringRecordsIntoIter<R>,
    min_columns: usize,
    skipped: usize,
}

impl<R: Read> TabularSource<R> {
    pub fn new(reader: R, options: TabularOptions) -> Self {
        let comment = options.comment.filter(char::is_ascii).map(|c| c as u8);
        let rows = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .quoting(false)
            .flexible(true)
            .has_headers(options.has_header)
            .comment(comment)
            .from_reader(reader)
            .into_records();

        Self {
            rows,
            min_columns: options.min_columns,
            skipped: 0,
        }
    }
}

impl<R: Read> Iterator for TabularSource<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let row = match self.rows.next()? {
                Ok(row) => row,
                Err(e) => return Some(Err(BioconvError::Csv(e.to_string()))),
            };
            let line = row.position().map(|p| p.line() as usize).unwrap_or(0);

            if row.len() < self.min_columns {
                debug!(
                    line,
                    columns = row.len(),
                    min_columns = self.min_columns,
                    "Skipping short row"
                );
                self.skipped += 1;
                continue;
            }

            let columns = row.iter().map(str::to_string).collect();
            return Some(Ok(Record::from_columns(line, columns)));
        }
    }
}

impl<R: Read> RecordSource for TabularSource<R> {
    fn skipped(&self) -> usize {
        self.skipped
    }
}
