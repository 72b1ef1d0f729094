//! NetCDF output
//!
//! Writes an in-memory [`Dataset`] to a NetCDF file, converting the JSON
//! attributes carried over from the Zarr store into NetCDF attributes.

use crate::data_source::DType;
use crate::dataset::{Dataset, Variable};
use crate::errors::Result;
use chrono::Utc;
use log::{debug, warn};
use netcdf::{create, AttributeValue, FileMut, VariableMut};
use serde_json::{Map, Value as JsonValue};
use std::{fs, path::Path};

/// Attributes that only describe the Zarr encoding
const ZARR_ONLY_ATTRIBUTES: [&str; 1] = ["_ARRAY_DIMENSIONS"];

/// Attributes whose type must match the variable type
const TYPED_ATTRIBUTES: [&str; 2] = ["_FillValue", "missing_value"];

/// NetCDF writer for datasets
pub struct NetCDFWriter<'a> {
    output_path: &'a Path,
}

macro_rules! put_typed {
    ($file:expr, $variable:expr, $dims:expr, $t:ty) => {{
        let mut nc_var = $file.add_variable::<$t>(&$variable.name, $dims)?;
        put_variable_attributes(&mut nc_var, $variable, |v| AttributeValue::from(v as $t))?;
        let values: Vec<$t> = $variable.data.iter().map(|&v| v as $t).collect();
        nc_var.put_values(&values, ..)?;
    }};
}

impl<'a> NetCDFWriter<'a> {
    /// Create a new NetCDF writer
    pub fn new(output_path: &'a Path) -> Self {
        Self { output_path }
    }

    /// Writes the dataset, replacing any existing file
    pub fn write(&self, dataset: &Dataset) -> Result<()> {
        if self.output_path.exists() {
            fs::remove_file(self.output_path)?;
        }

        let mut file = create(self.output_path)?;

        for dim in &dataset.dimensions {
            file.add_dimension(&dim.name, dim.len)?;
        }

        for variable in &dataset.variables {
            write_variable(&mut file, variable)?;
        }

        put_global_attributes(&mut file, &dataset.attributes)?;
        debug!(
            "Wrote {} variables to {}",
            dataset.variables.len(),
            self.output_path.display()
        );
        Ok(())
    }
}

/// Writes a dataset to `output_path`
pub fn write_dataset(dataset: &Dataset, output_path: &Path) -> Result<()> {
    NetCDFWriter::new(output_path).write(dataset)
}

fn write_variable(file: &mut FileMut, variable: &Variable) -> Result<()> {
    let dims: Vec<&str> = variable.dimensions.iter().map(String::as_str).collect();
    match variable.dtype {
        DType::Int8 => put_typed!(file, variable, &dims, i8),
        DType::UInt8 => put_typed!(file, variable, &dims, u8),
        DType::Int16 => put_typed!(file, variable, &dims, i16),
        DType::Int32 => put_typed!(file, variable, &dims, i32),
        DType::Int64 => put_typed!(file, variable, &dims, i64),
        DType::Float32 => put_typed!(file, variable, &dims, f32),
        DType::Float64 => put_typed!(file, variable, &dims, f64),
    }
    Ok(())
}

fn put_variable_attributes(
    nc_var: &mut VariableMut<'_>,
    variable: &Variable,
    typed: impl Fn(f64) -> AttributeValue,
) -> Result<()> {
    for (name, value) in &variable.attributes {
        if ZARR_ONLY_ATTRIBUTES.contains(&name.as_str()) {
            continue;
        }
        let attribute = if TYPED_ATTRIBUTES.contains(&name.as_str()) {
            variable.attribute_f64(name).map(&typed)
        } else {
            json_to_attribute(value)
        };
        match attribute {
            Some(attribute) => {
                nc_var.put_attribute(name, attribute)?;
            }
            None => warn!(
                "⚠ Skipped unsupported attribute '{}' on '{}'",
                name, variable.name
            ),
        }
    }
    Ok(())
}

fn put_global_attributes(file: &mut FileMut, attributes: &Map<String, JsonValue>) -> Result<()> {
    for (name, value) in attributes {
        if name == "history" {
            continue;
        }
        match json_to_attribute(value) {
            Some(attribute) => {
                file.add_attribute(name, attribute)?;
            }
            None => warn!("⚠ Skipped unsupported global attribute '{}'", name),
        }
    }

    let entry = format!("{} subset with cmip6_fetch", Utc::now().to_rfc3339());
    let history = match attributes.get("history").and_then(JsonValue::as_str) {
        Some(previous) if !previous.is_empty() => format!("{}\n{}", previous, entry),
        _ => entry,
    };
    file.add_attribute("history", history)?;
    Ok(())
}

/// Converts a JSON attribute value into the closest NetCDF attribute
///
/// Returns `None` for nulls, objects and mixed arrays.
pub fn json_to_attribute(value: &JsonValue) -> Option<AttributeValue> {
    match value {
        JsonValue::String(s) => Some(AttributeValue::Str(s.clone())),
        JsonValue::Bool(b) => Some(AttributeValue::Short(i16::from(*b))),
        JsonValue::Number(n) => Some(number_to_attribute(n)),
        JsonValue::Array(values) if values.is_empty() => None,
        JsonValue::Array(values) => {
            if let Some(strings) = values
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
            {
                return Some(AttributeValue::Strs(strings));
            }
            if let Some(ints) = values.iter().map(JsonValue::as_i64).collect::<Option<Vec<_>>>() {
                return Some(match ints
                    .iter()
                    .map(|&i| i32::try_from(i).ok())
                    .collect::<Option<Vec<_>>>()
                {
                    Some(small) => AttributeValue::Ints(small),
                    None => AttributeValue::Longlongs(ints),
                });
            }
            values
                .iter()
                .map(JsonValue::as_f64)
                .collect::<Option<Vec<_>>>()
                .map(AttributeValue::Doubles)
        }
        JsonValue::Null | JsonValue::Object(_) => None,
    }
}

fn number_to_attribute(n: &serde_json::Number) -> AttributeValue {
    if let Some(i) = n.as_i64() {
        return match i32::try_from(i) {
            Ok(small) => AttributeValue::Int(small),
            Err(_) => AttributeValue::Longlong(i),
        };
    }
    AttributeValue::Double(n.as_f64().unwrap_or(f64::NAN))
}
