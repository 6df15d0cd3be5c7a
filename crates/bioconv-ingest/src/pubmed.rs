//! PubMed article builder
//!
//! Consumes `PubmedArticle` XML records (as returned by Entrez efetch) and
//! produces one shared `Publication` per PMID with its `Author`s.

use crate::builder::{BuildOutcome, ItemBuilder};
use crate::context::{BuildContext, EntitySpec};
use crate::source::{Record, XmlElement};
use bioconv_common::{BioconvError, Result};
use tracing::debug;

/// Element that delimits one article
pub const RECORD_ELEMENT: &str = "PubmedArticle";

#[derive(Debug, Default)]
pub struct PubMedBuilder;

impl PubMedBuilder {
    pub fn new() -> Self {
        Self
    }
}

fn author_name(author: &XmlElement) -> Option<String> {
    match (author.text_at("LastName"), author.text_at("Initials")) {
        (Some(last), Some(initials)) => Some(format!("{} {}", last, initials)),
        (Some(last), None) => Some(last.to_string()),
        _ => author.text_at("CollectiveName").map(str::to_string),
    }
}

/// Publication year from `PubDate/Year`, else the leading year of `MedlineDate`
fn year(journal: &XmlElement) -> Option<String> {
    if let Some(year) = journal.text_at("JournalIssue/PubDate/Year") {
        return Some(year.to_string());
    }
    let medline_date = journal.text_at("JournalIssue/PubDate/MedlineDate")?;
    let year: String = medline_date.chars().take(4).collect();
    (year.len() == 4 && year.chars().all(|c| c.is_ascii_digit())).then_some(year)
}

impl ItemBuilder for PubMedBuilder {
    fn name(&self) -> &str {
        "pubmed"
    }

    fn build(&mut self, record: &Record, ctx: &mut BuildContext) -> Result<BuildOutcome> {
        let article = record.element().ok_or_else(|| {
            BioconvError::malformed(record.line, "PubMed records must come from an XML source")
        })?;
        let Some(pmid) = article.text_at("MedlineCitation/PMID") else {
            debug!(line = record.line, "Article without PMID");
            return Ok(BuildOutcome::Skipped);
        };

        let mut spec = EntitySpec::new("Publication").attribute("pubMedId", pmid);

        if let Some(details) = article.find("MedlineCitation/Article") {
            spec = spec
                .attribute("title", details.text_at("ArticleTitle").unwrap_or_default())
                .attribute("pages", details.text_at("Pagination/MedlinePgn").unwrap_or_default());

            if let Some(journal) = details.find("Journal") {
                let journal_name = journal
                    .text_at("ISOAbbreviation")
                    .or_else(|| journal.text_at("Title"))
                    .unwrap_or_default();
                spec = spec
                    .attribute("journal", journal_name)
                    .attribute("volume", journal.text_at("JournalIssue/Volume").unwrap_or_default())
                    .attribute("issue", journal.text_at("JournalIssue/Issue").unwrap_or_default())
                    .attribute("year", year(journal).unwrap_or_default());
            }

            let names: Vec<String> = details
                .find_all("AuthorList/Author")
                .into_iter()
                .filter_map(author_name)
                .collect();
            if let Some(first) = names.first() {
                spec = spec.attribute("firstAuthor", first.as_str());
            }
            let authors: Vec<_> = names
                .iter()
                .map(|name| ctx.entity(name, EntitySpec::new("Author").attribute("name", name.as_str())))
                .collect();
            spec = spec.collection("authors", authors);
        }

        ctx.entity(pmid, spec);
        Ok(BuildOutcome::Items(Vec::new()))
    }
}
