//! NCBI Entrez client for PubMed metadata
//!
//! Fetches `PubmedArticle` records with efetch, in batches, and merges the
//! responses into a single `PubmedArticleSet` document that the XML source
//! and [`crate::pubmed::PubMedBuilder`] consume.

use bioconv_common::{BioconvError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default E-utilities endpoint
pub const DEFAULT_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Identifiers per efetch request
pub const DEFAULT_BATCH_SIZE: usize = 200;

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_tool() -> String {
    "bioconv".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrezConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Reported to NCBI with every request
    #[serde(default = "default_tool")]
    pub tool: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Attempts per batch, including the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry; doubled on each further retry
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for EntrezConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            batch_size: default_batch_size(),
            tool: default_tool(),
            email: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl EntrezConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(BioconvError::Config("entrez batch_size must be at least 1".into()));
        }
        if self.max_retries == 0 {
            return Err(BioconvError::Config("entrez max_retries must be at least 1".into()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(BioconvError::Config(format!(
                "entrez base_url '{}' is not an http(s) URL",
                self.base_url
            )));
        }
        Ok(())
    }
}

pub struct EntrezClient {
    client: Client,
    config: EntrezConfig,
}

impl EntrezClient {
    pub fn new(config: EntrezConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(format!("{}/{}", config.tool, env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BioconvError::Network(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Fetch the given PubMed ids as one `PubmedArticleSet` document
    pub async fn fetch_pubmed(&self, ids: &[String]) -> Result<String> {
        let ids: Vec<&str> = ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .collect();

        let mut articles = String::new();
        for (batch, chunk) in ids.chunks(self.config.batch_size).enumerate() {
            debug!(batch, size = chunk.len(), "Fetching PubMed batch");
            let body = self.efetch_with_retry(&chunk.join(",")).await?;
            articles.push_str(article_set_body(&body)?);
            articles.push('\n');
        }

        info!(ids = ids.len(), bytes = articles.len(), "Fetched PubMed records");
        Ok(format!(
            "<?xml version=\"1.0\"?>\n<PubmedArticleSet>\n{}</PubmedArticleSet>\n",
            articles
        ))
    }

    async fn efetch_with_retry(&self, ids: &str) -> Result<String> {
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);
        let mut attempt = 1;
        loop {
            match self.efetch(ids).await {
                Ok(body) => return Ok(body),
                Err(e) if attempt < self.config.max_retries => {
                    warn!(attempt, max = self.config.max_retries, error = %e, "efetch failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn efetch(&self, ids: &str) -> Result<String> {
        let url = format!("{}/efetch.fcgi", self.config.base_url.trim_end_matches('/'));
        let mut query = vec![
            ("db", "pubmed"),
            ("retmode", "xml"),
            ("id", ids),
            ("tool", self.config.tool.as_str()),
        ];
        if let Some(email) = &self.config.email {
            query.push(("email", email.as_str()));
        }

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| BioconvError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BioconvError::Network(format!(
                "efetch returned HTTP {}",
                response.status()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| BioconvError::Network(e.to_string()))
    }
}

/// Content between `<PubmedArticleSet>` and `</PubmedArticleSet>`
fn article_set_body(document: &str) -> Result<&str> {
    const CLOSE: &str = "</PubmedArticleSet>";

    if document.contains("<PubmedArticleSet/>") {
        return Ok("");
    }
    let start = document
        .find("<PubmedArticleSet")
        .and_then(|open| document[open..].find('>').map(|end| open + end + 1));
    let end = document.rfind(CLOSE);
    match (start, end) {
        (Some(start), Some(end)) if start <= end => Ok(document[start..end].trim()),
        _ => Err(BioconvError::Network(
            "efetch response is not a PubmedArticleSet".into(),
        )),
    }
}
