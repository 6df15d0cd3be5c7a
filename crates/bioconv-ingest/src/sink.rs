//! Item sinks
//!
//! A sink takes ownership of committed items. [`MemorySink`] keeps them for
//! verification; [`JsonLinesSink`] writes one JSON object per line.

use crate::item::{Item, ItemSet};
use bioconv_common::Result;
use serde_jsonlines::JsonLinesWriter;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

pub trait ItemSink {
    fn store(&mut self, item: Item) -> Result<()>;

    /// Flush buffered items and release the underlying resource
    fn close(&mut self) -> Result<()>;

    /// Number of items stored so far
    fn stored(&self) -> usize;
}

impl<S: ItemSink + ?Sized> ItemSink for Box<S> {
    fn store(&mut self, item: Item) -> Result<()> {
        (**self).store(item)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn stored(&self) -> usize {
        (**self).stored()
    }
}

#[derive(Debug, Default)]
pub struct MemorySink {
    items: Vec<Item>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Items in commit order
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn item_set(&self) -> ItemSet {
        ItemSet::from_items(self.items.iter().cloned())
    }

    pub fn into_items(self) -> Vec<Item> {
        self.items
    }
}

impl ItemSink for MemorySink {
    fn store(&mut self, item: Item) -> Result<()> {
        self.items.push(item);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn stored(&self) -> usize {
        self.items.len()
    }
}

pub struct JsonLinesSink<W: Write> {
    writer: JsonLinesWriter<W>,
    stored: usize,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: JsonLinesWriter::new(writer),
            stored: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl JsonLinesSink<BufWriter<File>> {
    /// Create (or truncate) an item file
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        debug!(path = %path.display(), "Writing items");
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> ItemSink for JsonLinesSink<W> {
    fn store(&mut self, item: Item) -> Result<()> {
        self.writer.write(&item)?;
        self.stored += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn stored(&self) -> usize {
        self.stored
    }
}
