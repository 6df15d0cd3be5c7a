//! End-to-end tests for the bioconv-ingest binary
//!
//! These tests validate:
//! - Converting fixture files to a JSON-lines item file
//! - Verifying item files against golden files
//! - Fetching and converting PubMed records from a mocked Entrez
//! - Configuration errors

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn bioconv() -> Command {
    let mut cmd = Command::cargo_bin("bioconv-ingest").expect("Failed to find binary");
    cmd.env_remove("BIOCONV_CONVERTER")
        .env_remove("BIOCONV_OUTPUT")
        .env("BIOCONV_LOG_LEVEL", "warn");
    cmd
}

// ============================================================================
// Convert and Verify
// ============================================================================

#[test]
fn test_convert_then_verify_against_golden() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("phenotype.jsonl");

    bioconv()
        .arg("convert")
        .arg("--converter")
        .arg("phenotype")
        .arg("--input")
        .arg(fixture("phenotype.tsv"))
        .arg("--output")
        .arg(&output)
        .assert()
        .success();

    bioconv()
        .arg("verify")
        .arg("--actual")
        .arg(&output)
        .arg("--expected")
        .arg(fixture("phenotype.expected.jsonl"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Item sets match"));
}

#[test]
fn test_convert_from_config_file() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("homology.jsonl");
    let config = dir.path().join("bioconv.toml");
    fs::write(
        &config,
        format!(
            "converter = \"homology\"\ninput = [{:?}]\noutput = {:?}\n",
            fixture("homology.tsv").display().to_string(),
            output.display().to_string()
        ),
    )
    .unwrap();

    bioconv()
        .arg("convert")
        .arg("--config")
        .arg(&config)
        .assert()
        .success();

    bioconv()
        .arg("verify")
        .arg("--actual")
        .arg(&output)
        .arg("--expected")
        .arg(fixture("homology.expected.jsonl"))
        .assert()
        .success();
}

#[test]
fn test_converter_flag_keeps_environment_settings() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("from-env.jsonl");

    bioconv()
        .env("BIOCONV_OUTPUT", &output)
        .arg("convert")
        .arg("--converter")
        .arg("homology")
        .arg("--input")
        .arg(fixture("homology.tsv"))
        .assert()
        .success();

    bioconv()
        .arg("verify")
        .arg("--actual")
        .arg(&output)
        .arg("--expected")
        .arg(fixture("homology.expected.jsonl"))
        .assert()
        .success();
}

#[test]
fn test_verify_reports_differences() {
    bioconv()
        .arg("verify")
        .arg("--actual")
        .arg(fixture("phenotype.expected.jsonl"))
        .arg("--expected")
        .arg(fixture("homology.expected.jsonl"))
        .assert()
        .failure()
        .stdout(predicate::str::contains("missing:"))
        .stdout(predicate::str::contains("unexpected:"))
        .stderr(predicate::str::contains("missing and"));
}

// ============================================================================
// Configuration Errors
// ============================================================================

#[test]
fn test_convert_without_input_fails() {
    let dir = TempDir::new().unwrap();

    bioconv()
        .arg("convert")
        .arg("--converter")
        .arg("homology")
        .arg("--output")
        .arg(dir.path().join("out.jsonl"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("no input files"));
}

#[test]
fn test_unknown_preset_fails() {
    bioconv()
        .arg("convert")
        .arg("--converter")
        .arg("gff3")
        .arg("--preset")
        .arg("affy_probe")
        .arg("--input")
        .arg(fixture("homology.tsv"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown gff3 preset"));
}

// ============================================================================
// PubMed
// ============================================================================

#[tokio::test]
async fn test_pubmed_fetch_and_convert() {
    let server = MockServer::start().await;
    let body = r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <PMID Version="1">12529635</PMID>
      <Article>
        <Journal>
          <JournalIssue><Volume>421</Volume><Issue>6920</Issue><PubDate><Year>2003</Year></PubDate></JournalIssue>
          <ISOAbbreviation>Nature</ISOAbbreviation>
        </Journal>
        <ArticleTitle>Systematic functional analysis of the Caenorhabditis elegans genome using RNAi.</ArticleTitle>
        <Pagination><MedlinePgn>231-7</MedlinePgn></Pagination>
        <AuthorList>
          <Author><LastName>Kamath</LastName><Initials>RS</Initials></Author>
          <Author><LastName>Ahringer</LastName><Initials>J</Initials></Author>
        </AuthorList>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

    Mock::given(method("GET"))
        .and(path("/efetch.fcgi"))
        .and(query_param("id", "12529635"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("pubmed.jsonl");
    let uri = server.uri();
    let out = output.clone();

    // The binary blocks, so run it off the runtime that serves the mock
    tokio::task::spawn_blocking(move || {
        bioconv()
            .arg("pubmed")
            .arg("--ids")
            .arg("12529635")
            .arg("--output")
            .arg(&out)
            .arg("--base-url")
            .arg(&uri)
            .assert()
            .success();
    })
    .await
    .unwrap();

    let content = fs::read_to_string(&output).unwrap();
    assert!(content.contains(r#""pubMedId":"12529635""#));
    assert!(content.contains(r#""name":"Kamath RS""#));
    assert_eq!(content.lines().filter(|l| l.contains(r#""class":"Author""#)).count(), 2);
}
