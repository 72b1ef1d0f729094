//! Zarr I/O operations
//!
//! CMIP6 cloud stores are Zarr v2 groups with consolidated metadata
//! (`.zmetadata`). Metadata is parsed here from the consolidated document,
//! and chunk data is decoded through `zarrs` over either a synchronous HTTP
//! store or the local filesystem.

use crate::data_source::{ArrayMetadata, DType, DataReader};
use crate::errors::{Cmip6Error, Result};
use log::debug;
use ndarray::{ArrayD, IxDyn};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use zarrs::array::Array;
use zarrs::array_subset::ArraySubset;
use zarrs::storage::{ReadableStorage, ReadableStorageTraits};

const GCS_HTTP_ENDPOINT: &str = "https://storage.googleapis.com";
const CONSOLIDATED_KEY: &str = ".zmetadata";

/// Location of a Zarr store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZarrSource {
    /// Store served over HTTP(S); `gs://` URLs are mapped to the public GCS endpoint
    Http(String),
    /// Store on the local filesystem
    Local(PathBuf),
}

impl ZarrSource {
    /// Interprets a catalog `zstore` value
    pub fn parse(zstore: &str) -> Result<Self> {
        let zstore = zstore.trim();
        if zstore.is_empty() {
            return Err(Cmip6Error::ZarrError("empty store location".to_string()));
        }
        if let Some(path) = zstore.strip_prefix("gs://") {
            return Ok(ZarrSource::Http(format!(
                "{}/{}",
                GCS_HTTP_ENDPOINT,
                path.trim_end_matches('/')
            )));
        }
        if zstore.starts_with("https://") || zstore.starts_with("http://") {
            return Ok(ZarrSource::Http(zstore.trim_end_matches('/').to_string()));
        }
        if zstore.starts_with("s3://") {
            return Err(Cmip6Error::ZarrError(format!(
                "S3 stores are not supported: {}",
                zstore
            )));
        }
        Ok(ZarrSource::Local(PathBuf::from(
            zstore.strip_prefix("file://").unwrap_or(zstore),
        )))
    }

    fn read_consolidated(&self) -> Result<JsonValue> {
        let content = match self {
            ZarrSource::Http(url) => {
                let url = format!("{}/{}", url, CONSOLIDATED_KEY);
                debug!("Fetching consolidated metadata from {}", url);
                reqwest::blocking::get(&url)?.error_for_status()?.text()?
            }
            ZarrSource::Local(path) => fs::read_to_string(path.join(CONSOLIDATED_KEY))?,
        };
        Ok(serde_json::from_str(&content)?)
    }

    fn storage(&self) -> Result<ReadableStorage> {
        let storage: ReadableStorage = match self {
            ZarrSource::Http(url) => Arc::new(
                zarrs_http::HTTPStore::new(url).map_err(|e| Cmip6Error::ZarrError(e.to_string()))?,
            ),
            ZarrSource::Local(path) => Arc::new(
                zarrs::filesystem::FilesystemStore::new(path)
                    .map_err(|e| Cmip6Error::ZarrError(e.to_string()))?,
            ),
        };
        Ok(storage)
    }
}

/// Array and group metadata from a consolidated `.zmetadata` document
#[derive(Debug, Clone, Default)]
pub struct ConsolidatedMetadata {
    pub attributes: Map<String, JsonValue>,
    pub arrays: BTreeMap<String, ArrayMetadata>,
}

impl ConsolidatedMetadata {
    /// Builds array metadata from the `metadata` object of a consolidated document
    ///
    /// Only arrays at the root of the group are collected; CMIP6 stores are flat.
    pub fn from_json(document: &JsonValue) -> Result<Self> {
        let entries = document
            .get("metadata")
            .and_then(JsonValue::as_object)
            .ok_or_else(|| Cmip6Error::ZarrError("consolidated metadata lacks 'metadata'".to_string()))?;

        let attributes = entries
            .get(".zattrs")
            .and_then(JsonValue::as_object)
            .cloned()
            .unwrap_or_default();

        let mut arrays = BTreeMap::new();
        for (key, zarray) in entries {
            let Some(name) = key.strip_suffix("/.zarray") else {
                continue;
            };
            if name.contains('/') {
                continue;
            }
            let zattrs = entries
                .get(&format!("{}/.zattrs", name))
                .and_then(JsonValue::as_object)
                .cloned()
                .unwrap_or_default();
            arrays.insert(name.to_string(), parse_array_metadata(name, zarray, zattrs)?);
        }

        Ok(Self { attributes, arrays })
    }
}

fn parse_array_metadata(
    name: &str,
    zarray: &JsonValue,
    mut attributes: Map<String, JsonValue>,
) -> Result<ArrayMetadata> {
    let missing = |field: &str| Cmip6Error::ZarrError(format!("Missing {} in metadata of '{}'", field, name));

    let shape = zarray["shape"]
        .as_array()
        .ok_or_else(|| missing("shape"))?
        .iter()
        .map(|v| v.as_u64().map(|n| n as usize).ok_or_else(|| missing("integer shape")))
        .collect::<Result<Vec<_>>>()?;

    let raw_dtype = match &zarray["dtype"] {
        JsonValue::String(dtype) => dtype.clone(),
        // structured dtypes are lists of fields
        other => other.to_string(),
    };

    let dimensions = match attributes.remove("_ARRAY_DIMENSIONS") {
        Some(JsonValue::Array(dims)) => dims
            .iter()
            .map(|d| d.as_str().map(str::to_string).ok_or_else(|| missing("string dimension names")))
            .collect::<Result<Vec<_>>>()?,
        _ => (0..shape.len()).map(|i| format!("dim_{}", i)).collect(),
    };
    // xarray stores `_FillValue` as the array fill value, not as an attribute
    if !zarray["fill_value"].is_null() && !attributes.contains_key("_FillValue") {
        attributes.insert("_FillValue".to_string(), zarray["fill_value"].clone());
    }
    if dimensions.len() != shape.len() {
        return Err(Cmip6Error::ZarrError(format!(
            "array '{}' has {} dimension names for shape {:?}",
            name,
            dimensions.len(),
            shape
        )));
    }

    Ok(ArrayMetadata {
        name: name.to_string(),
        shape,
        dimensions,
        dtype: DType::from_zarr(name, &raw_dtype).ok(),
        raw_dtype,
        attributes,
    })
}

/// Zarr reader for a consolidated CMIP6 store
pub struct ZarrReader {
    source: ZarrSource,
    storage: ReadableStorage,
    metadata: ConsolidatedMetadata,
}

impl ZarrReader {
    /// Opens a store and reads its consolidated metadata
    pub fn open(source: ZarrSource) -> Result<Self> {
        let metadata = ConsolidatedMetadata::from_json(&source.read_consolidated()?)?;
        let storage = source.storage()?;
        debug!("Opened {:?} with {} arrays", source, metadata.arrays.len());
        Ok(Self {
            source,
            storage,
            metadata,
        })
    }

    pub fn source(&self) -> &ZarrSource {
        &self.source
    }

    fn open_array(&self, array_name: &str) -> Result<Array<dyn ReadableStorageTraits>> {
        Array::open(self.storage.clone(), &format!("/{}", array_name))
            .map_err(|e| Cmip6Error::ZarrError(format!("Failed to open array '{}': {}", array_name, e)))
    }
}

fn retrieve_as_f64<T>(
    array: &Array<dyn ReadableStorageTraits>,
    subset: &ArraySubset,
    array_name: &str,
) -> Result<Vec<f64>>
where
    T: zarrs::array::ElementOwned + Into<f64>,
{
    let elements = array
        .retrieve_array_subset_elements::<T>(subset)
        .map_err(|e| Cmip6Error::ZarrError(format!("Failed to read '{}': {}", array_name, e)))?;
    Ok(elements.into_iter().map(Into::into).collect())
}

impl DataReader for ZarrReader {
    fn list_arrays(&self) -> Result<Vec<String>> {
        Ok(self.metadata.arrays.keys().cloned().collect())
    }

    fn metadata(&self, array_name: &str) -> Result<ArrayMetadata> {
        self.metadata
            .arrays
            .get(array_name)
            .cloned()
            .ok_or_else(|| Cmip6Error::ArrayNotFound {
                array: array_name.to_string(),
            })
    }

    fn global_attributes(&self) -> Result<Map<String, JsonValue>> {
        Ok(self.metadata.attributes.clone())
    }

    fn read_slice(&self, array_name: &str, slice_ranges: &[(usize, usize)]) -> Result<ArrayD<f64>> {
        let metadata = self.metadata(array_name)?;
        check_ranges(&metadata, slice_ranges)?;
        let dtype = metadata.dtype.ok_or_else(|| Cmip6Error::UnsupportedDtype {
            array: array_name.to_string(),
            dtype: metadata.raw_dtype.clone(),
        })?;

        let array = self.open_array(array_name)?;
        let ranges: Vec<std::ops::Range<u64>> = slice_ranges
            .iter()
            .map(|&(start, end)| start as u64..end as u64)
            .collect();
        let subset = ArraySubset::new_with_ranges(&ranges);

        debug!("Reading '{}' {:?}", array_name, slice_ranges);
        let data = match dtype {
            DType::Int8 => retrieve_as_f64::<i8>(&array, &subset, array_name)?,
            DType::UInt8 => retrieve_as_f64::<u8>(&array, &subset, array_name)?,
            DType::Int16 => retrieve_as_f64::<i16>(&array, &subset, array_name)?,
            DType::Int32 => retrieve_as_f64::<i32>(&array, &subset, array_name)?,
            DType::Float32 => retrieve_as_f64::<f32>(&array, &subset, array_name)?,
            DType::Float64 => retrieve_as_f64::<f64>(&array, &subset, array_name)?,
            DType::Int64 => array
                .retrieve_array_subset_elements::<i64>(&subset)
                .map_err(|e| Cmip6Error::ZarrError(format!("Failed to read '{}': {}", array_name, e)))?
                .into_iter()
                .map(|v| v as f64)
                .collect(),
        };

        let shape: Vec<usize> = slice_ranges.iter().map(|(start, end)| end - start).collect();
        Ok(ArrayD::from_shape_vec(IxDyn(&shape), data)?)
    }
}

/// Validates `[start, end)` ranges against an array's shape
pub(crate) fn check_ranges(metadata: &ArrayMetadata, slice_ranges: &[(usize, usize)]) -> Result<()> {
    if slice_ranges.len() != metadata.shape.len() {
        return Err(Cmip6Error::ZarrError(format!(
            "{} ranges given for {}-dimensional array '{}'",
            slice_ranges.len(),
            metadata.shape.len(),
            metadata.name
        )));
    }
    for ((start, end), (len, dim)) in slice_ranges
        .iter()
        .zip(metadata.shape.iter().zip(&metadata.dimensions))
    {
        if start > end || end > len {
            return Err(Cmip6Error::ZarrError(format!(
                "range {}..{} is outside dimension '{}' of length {} in '{}'",
                start, end, dim, len, metadata.name
            )));
        }
    }
    Ok(())
}
