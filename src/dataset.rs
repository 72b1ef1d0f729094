//! In-memory datasets and time subsetting
//!
//! A [`Dataset`] holds the variables of one store after the experiment's
//! time range has been applied, ready to be written or regridded.

use crate::cftime::{TimeRange, TimeUnits};
use crate::data_source::{DType, DataReader};
use crate::errors::{Cmip6Error, Result};
use log::{debug, warn};
use ndarray::ArrayD;
use serde_json::{Map, Value as JsonValue};

/// Name of the time dimension and coordinate in CMIP6 stores
pub const TIME: &str = "time";

/// A named dimension and its length
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub len: usize,
}

/// A named, typed, attributed n-dimensional array
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub dimensions: Vec<String>,
    pub dtype: DType,
    pub attributes: Map<String, JsonValue>,
    pub data: ArrayD<f64>,
}

impl Variable {
    /// Whether the variable is the coordinate of its only dimension
    pub fn is_coordinate(&self) -> bool {
        self.dimensions.len() == 1 && self.dimensions[0] == self.name
    }

    pub fn has_dimension(&self, dim: &str) -> bool {
        self.dimensions.iter().any(|d| d == dim)
    }

    /// Numeric attribute lookup
    pub fn attribute_f64(&self, key: &str) -> Option<f64> {
        match self.attributes.get(key)? {
            JsonValue::Number(n) => n.as_f64(),
            JsonValue::String(s) => match s.as_str() {
                "NaN" | "nan" => Some(f64::NAN),
                "Infinity" => Some(f64::INFINITY),
                "-Infinity" => Some(f64::NEG_INFINITY),
                _ => None,
            },
            JsonValue::Array(values) => values.first().and_then(JsonValue::as_f64),
            _ => None,
        }
    }

    /// `_FillValue` or `missing_value`, whichever is set
    pub fn fill_value(&self) -> Option<f64> {
        self.attribute_f64("_FillValue")
            .or_else(|| self.attribute_f64("missing_value"))
    }

    /// Compares at storage precision; f32 data is widened on read
    pub fn is_fill(&self, value: f64, fill: f64) -> bool {
        match self.dtype {
            DType::Float32 => value as f32 == fill as f32,
            _ => value == fill,
        }
    }
}

/// A set of variables sharing named dimensions, plus global attributes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub dimensions: Vec<Dimension>,
    pub variables: Vec<Variable>,
    pub attributes: Map<String, JsonValue>,
}

impl Dataset {
    pub fn new(attributes: Map<String, JsonValue>) -> Self {
        Self {
            dimensions: Vec::new(),
            variables: Vec::new(),
            attributes,
        }
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn dimension_len(&self, name: &str) -> Option<usize> {
        self.dimensions.iter().find(|d| d.name == name).map(|d| d.len)
    }

    /// Adds a variable, registering its dimensions
    ///
    /// # Errors
    ///
    /// Fails if the data rank does not match the dimension names or a
    /// dimension already exists with a different length.
    pub fn add_variable(&mut self, variable: Variable) -> Result<()> {
        let shape = variable.data.shape();
        if shape.len() != variable.dimensions.len() {
            return Err(Cmip6Error::Generic(format!(
                "variable '{}' has {} dimensions but rank {} data",
                variable.name,
                variable.dimensions.len(),
                shape.len()
            )));
        }
        for (dim, &len) in variable.dimensions.iter().zip(shape) {
            match self.dimension_len(dim) {
                Some(existing) if existing != len => {
                    return Err(Cmip6Error::Generic(format!(
                        "dimension '{}' has length {} but variable '{}' uses {}",
                        dim, existing, variable.name, len
                    )));
                }
                Some(_) => {}
                None => self.dimensions.push(Dimension {
                    name: dim.clone(),
                    len,
                }),
            }
        }
        self.variables.push(variable);
        Ok(())
    }

    /// Loads every decodable array of a store restricted to a time range
    ///
    /// Stores without a `time` coordinate (fixed fields) are loaded whole.
    /// Returns `Ok(None)` when no time step falls inside the range.
    pub fn load_time_subset<R: DataReader + ?Sized>(
        reader: &R,
        range: &TimeRange,
    ) -> Result<Option<Dataset>> {
        let names = reader.list_arrays()?;
        let time_window = if names.iter().any(|n| n == TIME) {
            match time_index_range(reader, range)? {
                Some(window) => Some(window),
                None => return Ok(None),
            }
        } else {
            debug!("Store has no '{}' coordinate, loading it whole", TIME);
            None
        };

        let mut dataset = Dataset::new(reader.global_attributes()?);
        for name in &names {
            let metadata = reader.metadata(name)?;
            let Some(dtype) = metadata.dtype else {
                warn!(
                    "⚠ Skipping array '{}' with unsupported dtype {}",
                    name, metadata.raw_dtype
                );
                continue;
            };

            let ranges: Vec<(usize, usize)> = metadata
                .dimensions
                .iter()
                .zip(&metadata.shape)
                .map(|(dim, &len)| match time_window {
                    Some(window) if dim == TIME => window,
                    _ => (0, len),
                })
                .collect();

            let data = reader.read_slice(name, &ranges)?;
            dataset.add_variable(Variable {
                name: name.clone(),
                dimensions: metadata.dimensions,
                dtype,
                attributes: metadata.attributes,
                data,
            })?;
        }
        Ok(Some(dataset))
    }
}

/// Index window of the store's time coordinate inside `range`
fn time_index_range<R: DataReader + ?Sized>(
    reader: &R,
    range: &TimeRange,
) -> Result<Option<(usize, usize)>> {
    let metadata = reader.metadata(TIME)?;
    if metadata.dimensions.len() != 1 || metadata.dimensions[0] != TIME {
        return Err(Cmip6Error::DimensionNotFound {
            array: TIME.to_string(),
            dim: TIME.to_string(),
        });
    }
    let units = metadata
        .attribute_str("units")
        .ok_or_else(|| Cmip6Error::InvalidTime {
            message: "time coordinate has no 'units' attribute".to_string(),
        })?;
    let units = TimeUnits::parse(units, metadata.attribute_str("calendar"))?;

    let values = reader.read_array(TIME)?;
    let values: Vec<f64> = values.iter().copied().collect();
    let window = range.index_range(&units, &values)?;
    debug!(
        "Time window {:?} of {} steps for {}..{}",
        window,
        values.len(),
        range.start.label,
        range.end.label
    );
    Ok(window)
}
