//! CMIP6 store catalog
//!
//! The catalog is the CSV table listing every consolidated Zarr store with its
//! facets (`source_id`, `experiment_id`, `member_id`, `table_id`,
//! `variable_id`, ...). Queries match facets exactly.

use crate::config::MetadataSource;
use crate::errors::Result;
use log::info;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// One row of the catalog
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogEntry {
    #[serde(default)]
    pub activity_id: String,
    #[serde(default)]
    pub institution_id: String,
    pub source_id: String,
    pub experiment_id: String,
    pub member_id: String,
    pub table_id: String,
    pub variable_id: String,
    #[serde(default)]
    pub grid_label: String,
    pub zstore: String,
    #[serde(default)]
    pub dcpp_init_year: String,
    #[serde(default)]
    pub version: String,
}

/// Facet selection for a single dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query<'a> {
    pub table_id: &'a str,
    pub variable_id: &'a str,
    pub experiment_id: &'a str,
    pub source_id: &'a str,
    pub member_id: &'a str,
}

impl Query<'_> {
    pub fn matches(&self, entry: &CatalogEntry) -> bool {
        entry.table_id == self.table_id
            && entry.variable_id == self.variable_id
            && entry.experiment_id == self.experiment_id
            && entry.source_id == self.source_id
            && entry.member_id == self.member_id
    }
}

impl fmt::Display for Query<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "table_id == '{}' & variable_id == '{}' & experiment_id == '{}' & source_id == '{}' & member_id == '{}'",
            self.table_id, self.variable_id, self.experiment_id, self.source_id, self.member_id
        )
    }
}

/// In-memory catalog table
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// Parses a catalog CSV with a header row
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let entries = csv_reader
            .deserialize::<CatalogEntry>()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Self::from_reader(File::open(path)?)
    }

    /// Downloads and parses a catalog over HTTP
    ///
    /// The public catalog is large, so no overall timeout applies.
    pub fn fetch(url: &str) -> Result<Self> {
        Self::fetch_with_timeout(url, None)
    }

    /// Like [`Catalog::fetch`], with `timeout` bounding the whole request
    /// including the body read
    pub fn fetch_with_timeout(url: &str, timeout: Option<Duration>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        let response = client.get(url).send()?.error_for_status()?;
        let body = response.bytes()?;
        Self::from_reader(body.as_ref())
    }

    pub fn load(source: &MetadataSource) -> Result<Self> {
        let catalog = match source {
            MetadataSource::Local(path) => {
                info!("📄 Using local metadata from: {}", path.display());
                Self::from_path(path)?
            }
            MetadataSource::Remote(url) => {
                info!("🌐 Using metadata from {}", url);
                Self::fetch(url)?
            }
        };
        info!("✅ Catalog lists {} stores", catalog.len());
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// All matching entries in catalog order
    pub fn query(&self, query: &Query<'_>) -> Vec<&CatalogEntry> {
        self.entries.iter().filter(|entry| query.matches(entry)).collect()
    }

    /// The last matching entry, which is the store that gets downloaded
    pub fn select(&self, query: &Query<'_>) -> Option<&CatalogEntry> {
        self.entries.iter().rev().find(|entry| query.matches(entry))
    }

    /// Unique `source_id` values in first-appearance order
    pub fn unique_source_ids(&self) -> Vec<String> {
        unique(self.entries.iter().map(|e| e.source_id.as_str()))
    }

    /// Unique `member_id` values in first-appearance order
    pub fn unique_member_ids(&self) -> Vec<String> {
        unique(self.entries.iter().map(|e| e.member_id.as_str()))
    }
}

fn unique<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .filter(|v| seen.insert(*v))
        .map(str::to_string)
        .collect()
}
