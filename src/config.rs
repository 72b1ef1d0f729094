//! Run settings loaded from the JSON file given on the command line
//!
//! The file mirrors the layout used by the CMIP6 download scripts:
//!
//! ```json
//! {
//!   "metadata_csv": "",
//!   "out_dir": "./cmip6_data",
//!   "download_all_models": false,
//!   "download_all_members": false,
//!   "dataset": {
//!     "MPI-ESM1-2-LR": { "source_id": "MPI-ESM1-2-LR", "ens_members": ["r1i1p1f1"] }
//!   },
//!   "experiments": { "historical": [1950, 2014] },
//!   "variables": { "tas": "Amon" },
//!   "target_grid": [1.0, 1.0],
//!   "regrid_method": "bilinear"
//! }
//! ```

use crate::cftime::{TimeBound, TimeRange};
use crate::errors::{Cmip6Error, Result};
use crate::regrid::RegridMethod;
use serde::Deserialize;
use serde_json::{Map, Number, Value as JsonValue};
use std::fs;
use std::path::{Path, PathBuf};

/// Catalog of all consolidated CMIP6 Zarr stores on Google Cloud
pub const DEFAULT_METADATA_URL: &str =
    "https://storage.googleapis.com/cmip6/cmip6-zarr-consolidated-stores.csv";

/// Where the catalog table comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataSource {
    Local(PathBuf),
    Remote(String),
}

/// One explicitly requested model
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelEntry {
    pub source_id: String,
    #[serde(default)]
    pub ens_members: Vec<String>,
}

/// Target resolution for regridding, keeping the spacings as written
#[derive(Debug, Clone, PartialEq)]
pub struct TargetGridSpec {
    pub dlat: f64,
    pub dlon: f64,
    dlat_label: String,
    dlon_label: String,
}

impl TargetGridSpec {
    /// `"{dlat}x{dlon}"` suffix used in regridded file names
    pub fn label(&self) -> String {
        format!("{}x{}", self.dlat_label, self.dlon_label)
    }
}

#[derive(Debug, Deserialize)]
struct RawSettings {
    #[serde(default)]
    metadata_csv: String,
    out_dir: PathBuf,
    #[serde(default)]
    dataset: Map<String, JsonValue>,
    #[serde(default)]
    download_all_models: bool,
    #[serde(default)]
    download_all_members: bool,
    experiments: Map<String, JsonValue>,
    variables: Map<String, JsonValue>,
    #[serde(default)]
    target_grid: Vec<JsonValue>,
    #[serde(default)]
    regrid_method: Option<String>,
}

/// Validated run settings
///
/// Maps are kept as ordered vectors so that the download loop visits
/// experiments, models and variables in file order.
#[derive(Debug, Clone)]
pub struct Settings {
    pub metadata_csv: String,
    pub out_dir: PathBuf,
    pub dataset: Vec<(String, ModelEntry)>,
    pub download_all_models: bool,
    pub download_all_members: bool,
    pub experiments: Vec<(String, TimeRange)>,
    /// `(variable_id, table_id)` pairs
    pub variables: Vec<(String, String)>,
    pub target_grid: Option<TargetGridSpec>,
    pub regrid_method: Option<RegridMethod>,
}

impl Settings {
    /// Reads and validates a settings file
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Parses and validates settings from JSON text
    pub fn from_json_str(content: &str) -> Result<Self> {
        let raw: RawSettings = serde_json::from_str(content)?;
        let settings = Self::try_from(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.target_grid.is_some() && self.regrid_method.is_none() {
            return Err(invalid("'regrid_method' is required when 'target_grid' is set"));
        }
        if let Some(grid) = &self.target_grid {
            if grid.dlat <= 0.0 || grid.dlon <= 0.0 || grid.dlat > 180.0 || grid.dlon > 360.0 {
                return Err(invalid(format!(
                    "target grid spacing {} is outside (0, 180] x (0, 360]",
                    grid.label()
                )));
            }
        }
        if !self.download_all_models && self.dataset.is_empty() {
            return Err(invalid("'dataset' is empty and 'download_all_models' is false"));
        }
        if self.experiments.is_empty() {
            return Err(invalid("no experiments requested"));
        }
        if self.variables.is_empty() {
            return Err(invalid("no variables requested"));
        }
        Ok(())
    }

    /// Local catalog file when `metadata_csv` is set, the public catalog otherwise
    pub fn metadata_source(&self) -> MetadataSource {
        let path = self.metadata_csv.trim();
        if path.is_empty() {
            MetadataSource::Remote(DEFAULT_METADATA_URL.to_string())
        } else {
            MetadataSource::Local(PathBuf::from(path))
        }
    }

    /// Explicit model entry looked up by key, then by `source_id`
    pub fn model_entry(&self, model: &str) -> Option<&ModelEntry> {
        self.dataset
            .iter()
            .find(|(key, _)| key == model)
            .or_else(|| self.dataset.iter().find(|(_, entry)| entry.source_id == model))
            .map(|(_, entry)| entry)
    }

    pub fn regrid_enabled(&self) -> bool {
        self.target_grid.is_some()
    }
}

impl TryFrom<RawSettings> for Settings {
    type Error = Cmip6Error;

    fn try_from(raw: RawSettings) -> Result<Self> {
        let dataset = raw
            .dataset
            .into_iter()
            .map(|(key, value)| {
                let entry: ModelEntry = serde_json::from_value(value)
                    .map_err(|e| invalid(format!("dataset entry '{}': {}", key, e)))?;
                Ok((key, entry))
            })
            .collect::<Result<Vec<_>>>()?;

        let experiments = raw
            .experiments
            .into_iter()
            .map(|(experiment, bounds)| {
                let bounds = bounds
                    .as_array()
                    .filter(|b| b.len() == 2)
                    .ok_or_else(|| invalid(format!("experiment '{}' needs [start, end]", experiment)))?;
                let range = TimeRange::new(
                    TimeBound::from_json(&bounds[0])?,
                    TimeBound::from_json(&bounds[1])?,
                )?;
                Ok((experiment, range))
            })
            .collect::<Result<Vec<_>>>()?;

        let variables = raw
            .variables
            .into_iter()
            .map(|(variable, table)| match table {
                JsonValue::String(table) => Ok((variable, table)),
                other => Err(invalid(format!(
                    "table for variable '{}' must be a string, got {}",
                    variable, other
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        // Only a two-element grid turns regridding on.
        let target_grid = match raw.target_grid.as_slice() {
            [JsonValue::Number(dlat), JsonValue::Number(dlon)] => Some(grid_spec(dlat, dlon)?),
            [_, _] => return Err(invalid("'target_grid' entries must be numbers")),
            _ => None,
        };

        let regrid_method = match raw.regrid_method.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => Some(RegridMethod::parse(name)?),
            _ => None,
        };

        Ok(Self {
            metadata_csv: raw.metadata_csv,
            out_dir: raw.out_dir,
            dataset,
            download_all_models: raw.download_all_models,
            download_all_members: raw.download_all_members,
            experiments,
            variables,
            target_grid,
            regrid_method,
        })
    }
}

fn grid_spec(dlat: &Number, dlon: &Number) -> Result<TargetGridSpec> {
    let as_f64 = |n: &Number| {
        n.as_f64()
            .ok_or_else(|| invalid(format!("grid spacing {} is not representable", n)))
    };
    Ok(TargetGridSpec {
        dlat: as_f64(dlat)?,
        dlon: as_f64(dlon)?,
        dlat_label: dlat.to_string(),
        dlon_label: dlon.to_string(),
    })
}

fn invalid(message: impl Into<String>) -> Cmip6Error {
    Cmip6Error::InvalidSettings {
        message: message.into(),
    }
}
