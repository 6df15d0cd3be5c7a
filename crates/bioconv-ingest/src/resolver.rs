//! Lookup collaborators injected into a conversion run
//!
//! Both the identifier resolver and the organism repository are immutable
//! snapshots handed to the converter behind an `Arc`. Nothing here is global,
//! so two runs (or two tests) never observe each other's data.

use bioconv_common::{BioconvError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::io::{BufRead, Read};
use std::path::Path;
use tracing::debug;

/// Outcome of an identifier lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(String),
    Ambiguous(Vec<String>),
    NotFound,
}

impl Resolution {
    pub fn resolved(self) -> Option<String> {
        match self {
            Resolution::Resolved(id) => Some(id),
            _ => None,
        }
    }
}

/// Maps a raw identifier to the canonical identifier within one organism
pub trait IdResolver: Send + Sync {
    fn resolve(&self, taxon_id: &str, identifier: &str) -> Resolution;
}

/// In-memory resolver built from a synonym table
///
/// Each line is `taxon<TAB>primary<TAB>synonym,synonym,...`; the synonym
/// column is optional. A primary identifier always resolves to itself. A
/// synonym shared by several primaries is ambiguous.
#[derive(Debug, Clone, Default)]
pub struct MapIdResolver {
    primaries: HashMap<String, BTreeSet<String>>,
    synonyms: HashMap<(String, String), BTreeSet<String>>,
}

impl MapIdResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, taxon_id: &str, primary: &str, synonyms: &[&str]) {
        self.primaries
            .entry(taxon_id.to_string())
            .or_default()
            .insert(primary.to_string());
        for synonym in synonyms.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            self.synonyms
                .entry((taxon_id.to_string(), synonym.to_string()))
                .or_default()
                .insert(primary.to_string());
        }
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut resolver = Self::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 2 || fields[0].trim().is_empty() || fields[1].trim().is_empty() {
                return Err(BioconvError::malformed(
                    index + 1,
                    "expected taxon, primary identifier and optional synonyms",
                ));
            }
            let synonyms: Vec<&str> = fields.get(2).map(|s| s.split(',').collect()).unwrap_or_default();
            resolver.insert(fields[0].trim(), fields[1].trim(), &synonyms);
        }
        debug!(
            organisms = resolver.primaries.len(),
            synonyms = resolver.synonyms.len(),
            "Loaded identifier resolver"
        );
        Ok(resolver)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }
}

impl IdResolver for MapIdResolver {
    fn resolve(&self, taxon_id: &str, identifier: &str) -> Resolution {
        let is_primary = self
            .primaries
            .get(taxon_id)
            .is_some_and(|ids| ids.contains(identifier));
        if is_primary {
            return Resolution::Resolved(identifier.to_string());
        }

        match self.synonyms.get(&(taxon_id.to_string(), identifier.to_string())) {
            Some(ids) if ids.len() == 1 => ids
                .iter()
                .next()
                .map(|id| Resolution::Resolved(id.clone()))
                .unwrap_or(Resolution::NotFound),
            Some(ids) => Resolution::Ambiguous(ids.iter().cloned().collect()),
            None => Resolution::NotFound,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganismData {
    pub taxon_id: String,
    /// Identifier prefix used by some sources (`Pf`, `Dm`)
    pub abbreviation: String,
    pub genus: String,
    pub species: String,
    pub short_name: String,
}

impl OrganismData {
    fn new(taxon_id: &str, abbreviation: &str, genus: &str, species: &str) -> Self {
        let initial = genus.chars().next().map(String::from).unwrap_or_default();
        Self {
            taxon_id: taxon_id.to_string(),
            abbreviation: abbreviation.to_string(),
            genus: genus.to_string(),
            species: species.to_string(),
            short_name: format!("{}. {}", initial, species),
        }
    }

    pub fn name(&self) -> String {
        format!("{} {}", self.genus, self.species)
    }
}

/// Snapshot of known organisms, looked up by taxon id or abbreviation
#[derive(Debug, Clone)]
pub struct OrganismRepository {
    organisms: Vec<OrganismData>,
    by_taxon: HashMap<String, usize>,
    by_abbreviation: HashMap<String, usize>,
}

impl OrganismRepository {
    pub fn new(organisms: Vec<OrganismData>) -> Self {
        let mut by_taxon = HashMap::new();
        let mut by_abbreviation = HashMap::new();
        for (index, organism) in organisms.iter().enumerate() {
            by_taxon.entry(organism.taxon_id.clone()).or_insert(index);
            if !organism.abbreviation.is_empty() {
                by_abbreviation
                    .entry(organism.abbreviation.clone())
                    .or_insert(index);
            }
        }
        Self {
            organisms,
            by_taxon,
            by_abbreviation,
        }
    }

    /// Read a JSON array of organisms
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self> {
        let organisms: Vec<OrganismData> = serde_json::from_reader(reader)?;
        Ok(Self::new(organisms))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_json_reader(std::io::BufReader::new(file))
    }

    pub fn by_taxon_id(&self, taxon_id: &str) -> Option<&OrganismData> {
        self.by_taxon.get(taxon_id).map(|i| &self.organisms[*i])
    }

    pub fn by_abbreviation(&self, abbreviation: &str) -> Option<&OrganismData> {
        self.by_abbreviation
            .get(abbreviation)
            .map(|i| &self.organisms[*i])
    }

    /// Organism whose abbreviation is the longest prefix of `identifier`
    pub fn by_identifier_prefix(&self, identifier: &str) -> Option<&OrganismData> {
        self.organisms
            .iter()
            .filter(|o| !o.abbreviation.is_empty() && identifier.starts_with(&o.abbreviation))
            .max_by_key(|o| o.abbreviation.len())
    }

    pub fn len(&self) -> usize {
        self.organisms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.organisms.is_empty()
    }
}

impl Default for OrganismRepository {
    fn default() -> Self {
        Self::new(vec![
            OrganismData::new("9606", "Hs", "Homo", "sapiens"),
            OrganismData::new("10090", "Mm", "Mus", "musculus"),
            OrganismData::new("7227", "Dm", "Drosophila", "melanogaster"),
            OrganismData::new("6239", "Ce", "Caenorhabditis", "elegans"),
            OrganismData::new("4932", "Sc", "Saccharomyces", "cerevisiae"),
            OrganismData::new("36329", "Pf", "Plasmodium", "falciparum"),
            OrganismData::new("7165", "Ag", "Anopheles", "gambiae"),
            OrganismData::new("7955", "Dr", "Danio", "rerio"),
            OrganismData::new("10116", "Rn", "Rattus", "norvegicus"),
            OrganismData::new("3702", "At", "Arabidopsis", "thaliana"),
        ])
    }
}
