//! GFF3 feature source
//!
//! Each feature line becomes one [`Record`]: columns 1-8 land in
//! `columns[0..8]` (seqid, source, type, start, end, score, strand, phase)
//! and column 9 is split into `attributes`. Structural errors are fatal.

use super::{Record, RecordSource};
use bioconv_common::{BioconvError, Result};
use std::io::BufRead;
use tracing::debug;

pub const SEQID: usize = 0;
pub const SOURCE: usize = 1;
pub const TYPE: usize = 2;
pub const START: usize = 3;
pub const END: usize = 4;
pub const SCORE: usize = 5;
pub const STRAND: usize = 6;
pub const PHASE: usize = 7;

pub struct Gff3Source<R: BufRead> {
    lines: std::io::Lines<R>,
    line_num: usize,
    finished: bool,
}

impl<R: BufRead> Gff3Source<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_num: 0,
            finished: false,
        }
    }
}

impl<R: BufRead> Iterator for Gff3Source<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        for line in self.lines.by_ref() {
            self.line_num += 1;
            let line_num = self.line_num;
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                },
            };

            if line.trim().is_empty() {
                continue;
            }
            // Sequence section: no more features follow
            if line.starts_with("##FASTA") || line.starts_with('>') {
                debug!(line = line_num, "Reached FASTA section");
                break;
            }
            if line.starts_with('#') {
                continue;
            }

            let parsed = parse_feature_line(&line, line_num);
            if parsed.is_err() {
                self.finished = true;
            }
            return Some(parsed);
        }

        self.finished = true;
        None
    }
}

impl<R: BufRead> RecordSource for Gff3Source<R> {}

/// Parse one GFF3 feature line
pub fn parse_feature_line(line: &str, line_num: usize) -> Result<Record> {
    let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('\t').collect();
    if fields.len() != 9 {
        return Err(BioconvError::malformed(
            line_num,
            format!("expected 9 tab-separated columns, got {}", fields.len()),
        ));
    }

    let start = parse_coordinate(fields[START], "start", line_num)?;
    let end = parse_coordinate(fields[END], "end", line_num)?;
    if start > end {
        return Err(BioconvError::malformed(
            line_num,
            format!("start {} is after end {}", start, end),
        ));
    }
    if !matches!(fields[STRAND], "+" | "-" | "." | "?") {
        return Err(BioconvError::malformed(
            line_num,
            format!("invalid strand '{}'", fields[STRAND]),
        ));
    }

    let columns = fields[..8].iter().map(|f| percent_decode(f)).collect();
    let mut record = Record::from_columns(line_num, columns);

    let attributes = fields[8].trim();
    if attributes != "." {
        for pair in attributes.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, values) = pair.split_once('=').ok_or_else(|| {
                BioconvError::malformed(line_num, format!("attribute '{}' has no value", pair))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(BioconvError::malformed(line_num, "attribute with empty name"));
            }
            for value in values.split(',') {
                record.push_attribute(percent_decode(key), percent_decode(value.trim()));
            }
        }
    }

    Ok(record)
}

fn parse_coordinate(value: &str, name: &str, line_num: usize) -> Result<u64> {
    value.parse::<u64>().map_err(|_| {
        BioconvError::malformed(line_num, format!("{} '{}' is not a positive integer", name, value))
    })
}

/// Decode `%XX` escapes; invalid escapes are kept verbatim
pub fn percent_decode(value: &str) -> String {
    if !value.contains('%') {
        return value.to_string();
    }

    let bytes = value.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                decoded.push(byte);
                i += 3;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}
