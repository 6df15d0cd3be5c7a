//! XML record source
//!
//! Streams an XML document with quick-xml and yields one [`Record`] per
//! element named `record_element`, wherever it appears. The record carries
//! the whole subtree in `element` and a flattened view in `attributes`:
//! descendant text keyed by relative path (`Article/ArticleTitle`) and XML
//! attributes keyed as `path/@name` (`@name` on the record element itself).
//!
//! Any XML syntax error, or end of input inside a record, is fatal.

use super::{Record, RecordSource};
use bioconv_common::{BioconvError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::io::{BufRead, Read};

/// One element of an XML record subtree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Trimmed text content, absent when empty
    pub fn text(&self) -> Option<&str> {
        Some(self.text.trim()).filter(|t| !t.is_empty())
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// First descendant at a `/`-separated path
    pub fn find(&self, path: &str) -> Option<&XmlElement> {
        self.find_all(path).into_iter().next()
    }

    /// All descendants at a `/`-separated path, in document order
    pub fn find_all(&self, path: &str) -> Vec<&XmlElement> {
        let mut current = vec![self];
        for step in path.split('/').filter(|s| !s.is_empty()) {
            current = current
                .into_iter()
                .flat_map(|e| e.children.iter().filter(move |c| c.name == step))
                .collect();
        }
        current
    }

    pub fn text_at(&self, path: &str) -> Option<&str> {
        self.find(path).and_then(XmlElement::text)
    }

    fn flatten_into(&self, prefix: &str, record: &mut Record) {
        for (key, value) in &self.attributes {
            let name = if prefix.is_empty() {
                format!("@{}", key)
            } else {
                format!("{}/@{}", prefix, key)
            };
            record.push_attribute(name, value.clone());
        }
        for child in &self.children {
            let path = if prefix.is_empty() {
                child.name.clone()
            } else {
                format!("{}/{}", prefix, child.name)
            };
            if let Some(text) = child.text() {
                record.push_attribute(path.clone(), text);
            }
            child.flatten_into(&path, record);
        }
    }
}

/// BufRead wrapper that counts consumed newlines
struct LineCounter<R> {
    inner: R,
    newlines: usize,
}

impl<R> LineCounter<R> {
    /// Line of the last consumed byte
    fn line(&self) -> usize {
        self.newlines + 1
    }
}

impl<R: BufRead> Read for LineCounter<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.newlines += buf[..n].iter().filter(|b| **b == b'\n').count();
        Ok(n)
    }
}

impl<R: BufRead> BufRead for LineCounter<R> {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        // fill_buf does not read again while buffered data remains
        if let Ok(buf) = self.inner.fill_buf() {
            let amt = amt.min(buf.len());
            self.newlines += buf[..amt].iter().filter(|b| **b == b'\n').count();
        }
        self.inner.consume(amt);
    }
}

pub struct XmlSource<R: BufRead> {
    reader: Reader<LineCounter<R>>,
    buf: Vec<u8>,
    record_element: String,
    /// Elements open outside of any record
    depth: usize,
    finished: bool,
}

impl<R: BufRead> XmlSource<R> {
    pub fn new(reader: R, record_element: &str) -> Self {
        let mut reader = Reader::from_reader(LineCounter {
            inner: reader,
            newlines: 0,
        });
        reader.config_mut().trim_text(true);

        Self {
            reader,
            buf: Vec::new(),
            record_element: record_element.to_string(),
            depth: 0,
            finished: false,
        }
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            self.buf.clear();
            let event = self.reader.read_event_into(&mut self.buf);
            let line = self.reader.get_ref().line();
            let root = match event {
                Ok(Event::Start(e)) if is_named(&e, &self.record_element) => {
                    Some((element_from(&e, line)?, true))
                },
                Ok(Event::Empty(e)) if is_named(&e, &self.record_element) => {
                    Some((element_from(&e, line)?, false))
                },
                Ok(Event::Start(_)) => {
                    self.depth += 1;
                    None
                },
                Ok(Event::End(_)) => {
                    self.depth = self.depth.saturating_sub(1);
                    None
                },
                Ok(Event::Eof) if self.depth > 0 => {
                    return Err(BioconvError::malformed(
                        line,
                        format!("input ended with {} unclosed element(s)", self.depth),
                    ));
                },
                Ok(Event::Eof) => return Ok(None),
                Ok(_) => None,
                Err(e) => return Err(BioconvError::malformed(line, e.to_string())),
            };

            if let Some((root, has_children)) = root {
                let element = if has_children {
                    self.read_subtree(root)?
                } else {
                    root
                };
                let mut record = Record {
                    line,
                    ..Default::default()
                };
                element.flatten_into("", &mut record);
                record.element = Some(element);
                return Ok(Some(record));
            }
        }
    }

    fn read_subtree(&mut self, root: XmlElement) -> Result<XmlElement> {
        let mut stack = vec![root];
        loop {
            self.buf.clear();
            let event = self.reader.read_event_into(&mut self.buf);
            let line = self.reader.get_ref().line();
            match event {
                Ok(Event::Start(e)) => stack.push(element_from(&e, line)?),
                Ok(Event::Empty(e)) => {
                    let element = element_from(&e, line)?;
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(element);
                    }
                },
                Ok(Event::Text(t)) => {
                    let text = t
                        .unescape()
                        .map_err(|e| BioconvError::malformed(line, e.to_string()))?;
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&text);
                    }
                },
                Ok(Event::CData(c)) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                },
                Ok(Event::End(_)) => {
                    let Some(done) = stack.pop() else {
                        return Err(BioconvError::malformed(line, "unbalanced end tag"));
                    };
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(done),
                        None => return Ok(done),
                    }
                },
                Ok(Event::Eof) => {
                    return Err(BioconvError::malformed(
                        line,
                        format!("input ended inside <{}>", self.record_element),
                    ));
                },
                Ok(_) => {},
                Err(e) => return Err(BioconvError::malformed(line, e.to_string())),
            }
        }
    }
}

fn is_named(e: &BytesStart<'_>, name: &str) -> bool {
    e.local_name().as_ref() == name.as_bytes()
}

fn element_from(e: &BytesStart<'_>, line: usize) -> Result<XmlElement> {
    let mut element = XmlElement {
        name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
        ..Default::default()
    };
    for attr in e.attributes() {
        let attr = attr.map_err(|err| BioconvError::malformed(line, err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| BioconvError::malformed(line, err.to_string()))?;
        element.attributes.insert(key, value.into_owned());
    }
    Ok(element)
}

impl<R: BufRead> Iterator for XmlSource<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.finished = true;
                None
            },
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            },
        }
    }
}

impl<R: BufRead> RecordSource for XmlSource<R> {}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const ARTICLES: &str = r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation Status="MEDLINE">
      <PMID Version="1">12529635</PMID>
      <Article>
        <ArticleTitle>Genome-wide RNAi of &lt;i&gt;C. elegans&lt;/i&gt;</ArticleTitle>
        <AuthorList>
          <Author><LastName>Kamath</LastName><Initials>RS</Initials></Author>
          <Author><LastName>Ahringer</LastName><Initials>J</Initials></Author>
        </AuthorList>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation><PMID>11099033</PMID></MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>
"#;

    fn read(input: &str, element: &str) -> Vec<Result<Record>> {
        XmlSource::new(input.as_bytes(), element).collect()
    }

    #[test]
    fn test_one_record_per_element() {
        let records: Vec<Record> = read(ARTICLES, "PubmedArticle")
            .into_iter()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].line, 3);
        assert_eq!(records[0].attribute("MedlineCitation/PMID"), Some("12529635"));
        assert_eq!(records[0].attribute("MedlineCitation/@Status"), Some("MEDLINE"));
        assert_eq!(records[1].attribute("MedlineCitation/PMID"), Some("11099033"));
    }

    #[test]
    fn test_element_tree_keeps_structure() {
        let records = read(ARTICLES, "PubmedArticle");
        let record = records[0].as_ref().unwrap();
        let article = record.element().unwrap();
        let authors = article.find_all("MedlineCitation/Article/AuthorList/Author");
        assert_eq!(authors.len(), 2);
        assert_eq!(authors[1].text_at("LastName"), Some("Ahringer"));
        assert_eq!(
            article.text_at("MedlineCitation/Article/ArticleTitle"),
            Some("Genome-wide RNAi of <i>C. elegans</i>")
        );
        assert_eq!(article.find("MedlineCitation/PMID").unwrap().attribute("Version"), Some("1"));
    }

    #[test]
    fn test_mismatched_tag_is_fatal() {
        let input = "<set><rec><id>1</id></rec><rec><id>2</name></rec></set>";
        let results = read(input, "rec");
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(BioconvError::MalformedInput { .. })));
    }

    #[test]
    fn test_truncated_record_is_fatal() {
        let results = read("<set><rec><id>1</id>", "rec");
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn test_unclosed_root_is_fatal() {
        let input = "<PubmedArticleSet><PubmedArticle><MedlineCitation><PMID>1</PMID>\
</MedlineCitation></PubmedArticle>";
        let results = read(input, "PubmedArticle");
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(BioconvError::MalformedInput { .. })));
    }

    #[test]
    fn test_find_all_with_borrowed_path() {
        let records = read(ARTICLES, "PubmedArticle");
        let article = records[0].as_ref().unwrap().element().unwrap();
        let authors = {
            let path = format!("MedlineCitation/Article/{}/Author", "AuthorList");
            article.find_all(&path)
        };
        assert_eq!(authors.len(), 2);
        assert_eq!(authors[0].text_at("LastName"), Some("Kamath"));
        let citation = article.find("MedlineCitation").unwrap();
        assert_eq!(citation.children_named("PMID").count(), 1);
    }

    #[test]
    fn test_empty_record_element() {
        let records = read(r#"<set><rec id="a"/></set>"#, "rec");
        let record = records[0].as_ref().unwrap();
        assert_eq!(record.attribute("@id"), Some("a"));
    }
}
