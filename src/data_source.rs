//! Data source abstraction over array stores
//!
//! The download loop only needs to list arrays, inspect their metadata and
//! read hyper-rectangular slices. [`DataReader`] captures exactly that, so the
//! Zarr reader and in-memory test sources are interchangeable.

use crate::errors::{Cmip6Error, Result};
use ndarray::ArrayD;
use serde_json::{Map, Value as JsonValue};
use std::fmt;

/// Storage data type of an array, from the Zarr v2 `dtype` string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    Int8,
    UInt8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl DType {
    /// Parses a little-endian or byte-order-free NumPy dtype string such as `<f4`
    pub fn from_zarr(array: &str, dtype: &str) -> Result<Self> {
        match dtype {
            "|i1" | "<i1" => Ok(DType::Int8),
            "|u1" | "<u1" => Ok(DType::UInt8),
            "<i2" => Ok(DType::Int16),
            "<i4" => Ok(DType::Int32),
            "<i8" => Ok(DType::Int64),
            "<f4" => Ok(DType::Float32),
            "<f8" => Ok(DType::Float64),
            other => Err(Cmip6Error::UnsupportedDtype {
                array: array.to_string(),
                dtype: other.to_string(),
            }),
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::Float32 | DType::Float64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::Int8 => "int8",
            DType::UInt8 => "uint8",
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
        };
        f.write_str(name)
    }
}

/// Metadata for one array of a store
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayMetadata {
    pub name: String,
    pub shape: Vec<usize>,
    pub dimensions: Vec<String>,
    /// `None` when the dtype cannot be decoded
    pub dtype: Option<DType>,
    pub raw_dtype: String,
    pub attributes: Map<String, JsonValue>,
}

impl ArrayMetadata {
    /// Position of a named dimension
    pub fn dimension_index(&self, dim: &str) -> Option<usize> {
        self.dimensions.iter().position(|d| d == dim)
    }

    /// String attribute lookup
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(JsonValue::as_str)
    }
}

/// Read access to a store of named arrays
pub trait DataReader {
    /// Names of every array in the store
    fn list_arrays(&self) -> Result<Vec<String>>;

    /// Metadata of one array
    fn metadata(&self, array_name: &str) -> Result<ArrayMetadata>;

    /// Global (root group) attributes
    fn global_attributes(&self) -> Result<Map<String, JsonValue>>;

    /// Reads the `[start, end)` ranges of every dimension, converted to `f64`
    fn read_slice(&self, array_name: &str, slice_ranges: &[(usize, usize)]) -> Result<ArrayD<f64>>;

    /// Reads an entire array
    fn read_array(&self, array_name: &str) -> Result<ArrayD<f64>> {
        let metadata = self.metadata(array_name)?;
        let ranges: Vec<(usize, usize)> = metadata.shape.iter().map(|&len| (0, len)).collect();
        self.read_slice(array_name, &ranges)
    }
}
