//! Horizontal regridding onto a regular global lat/lon grid
//!
//! # Organization
//!
//! - [`grid`]: source and destination grid descriptions
//! - [`weights`]: sparse weight construction per method
//!
//! A [`Regridder`] computes its weights once from the source grid and then
//! applies them to every horizontal slice of every variable, with slices
//! processed in parallel on the rayon pool.

pub mod grid;
pub mod weights;

pub use grid::{linspace, GridAxis, SourceGrid, TargetGrid};
pub use weights::SparseWeights;

use crate::data_source::DType;
use crate::dataset::{Dataset, Variable};
use crate::errors::{Cmip6Error, Result};
use log::{debug, info};
use ndarray::{Array1, ArrayD, IxDyn};
use rayon::prelude::*;
use serde_json::{json, Map, Value as JsonValue};
use std::fmt;

/// Supported regridding methods, named as in ESMF/xESMF
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegridMethod {
    Bilinear,
    Conservative,
    ConservativeNormed,
    NearestS2d,
}

impl RegridMethod {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim() {
            "bilinear" => Ok(RegridMethod::Bilinear),
            "conservative" => Ok(RegridMethod::Conservative),
            "conservative_normed" => Ok(RegridMethod::ConservativeNormed),
            "nearest_s2d" => Ok(RegridMethod::NearestS2d),
            "nearest_d2s" | "patch" => Err(Cmip6Error::InvalidSettings {
                message: format!("regrid method '{}' is not supported", name),
            }),
            other => Err(Cmip6Error::InvalidSettings {
                message: format!("unknown regrid method '{}'", other),
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RegridMethod::Bilinear => "bilinear",
            RegridMethod::Conservative => "conservative",
            RegridMethod::ConservativeNormed => "conservative_normed",
            RegridMethod::NearestS2d => "nearest_s2d",
        }
    }

    fn normalizes(self) -> bool {
        self == RegridMethod::ConservativeNormed
    }
}

impl fmt::Display for RegridMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Precomputed regridding from one source grid to a target grid
#[derive(Debug, Clone)]
pub struct Regridder {
    pub method: RegridMethod,
    pub source: SourceGrid,
    pub target: TargetGrid,
    weights: SparseWeights,
}

impl Regridder {
    pub fn new(source: SourceGrid, target: TargetGrid, method: RegridMethod) -> Self {
        let (lat, lon) = match method {
            RegridMethod::Bilinear => (
                weights::linear_lat(&source.lat, &target.lat),
                weights::linear_lon(&source.lon, &target.lon),
            ),
            RegridMethod::Conservative | RegridMethod::ConservativeNormed => (
                weights::conservative_lat(&source.lat, &target.lat),
                weights::conservative_lon(&source.lon, &target.lon),
            ),
            RegridMethod::NearestS2d => (
                weights::nearest_lat(&source.lat, &target.lat),
                weights::nearest_lon(&source.lon, &target.lon),
            ),
        };
        let weights = SparseWeights::outer(&lat, &lon, source.lat.len(), source.lon.len());
        debug!(
            "Built {} weights for {:?} -> {:?}",
            method,
            source.shape(),
            target.shape()
        );
        Self {
            method,
            source,
            target,
            weights,
        }
    }

    /// Detects the source grid of a dataset and builds the regridder
    pub fn from_dataset(dataset: &Dataset, target: TargetGrid, method: RegridMethod) -> Result<Self> {
        Ok(Self::new(SourceGrid::from_dataset(dataset)?, target, method))
    }

    pub fn weights(&self) -> &SparseWeights {
        &self.weights
    }

    /// Regrids every horizontal variable of a dataset
    ///
    /// Variables whose trailing dimensions are `(lat, lon)` are regridded,
    /// variables without horizontal dimensions are copied, and horizontal
    /// bounds or other partially horizontal variables are dropped.
    pub fn regrid_dataset(&self, dataset: &Dataset) -> Result<Dataset> {
        let lat_dim = self.source.lat_dim.as_str();
        let lon_dim = self.source.lon_dim.as_str();

        let mut attributes = dataset.attributes.clone();
        attributes.insert("regrid_method".to_string(), json!(self.method.as_str()));
        let mut out = Dataset::new(attributes);
        out.add_variable(self.coordinate("lat", &self.target.lat.centers, "latitude", "degrees_north", "Y"))?;
        out.add_variable(self.coordinate("lon", &self.target.lon.centers, "longitude", "degrees_east", "X"))?;

        for variable in &dataset.variables {
            if variable.name == lat_dim || variable.name == lon_dim {
                continue;
            }
            let has_lat = variable.has_dimension(lat_dim);
            let has_lon = variable.has_dimension(lon_dim);
            match (has_lat, has_lon) {
                (false, false) => out.add_variable(variable.clone())?,
                (true, true) => {
                    info!("🔄 Regridding '{}' with {}", variable.name, self.method);
                    out.add_variable(self.regrid_variable(variable)?)?;
                }
                _ => debug!("Dropping '{}' on the source grid", variable.name),
            }
        }
        Ok(out)
    }

    fn coordinate(&self, name: &str, values: &[f64], standard_name: &str, units: &str, axis: &str) -> Variable {
        let mut attributes = Map::new();
        attributes.insert("standard_name".to_string(), json!(standard_name));
        attributes.insert("long_name".to_string(), json!(standard_name));
        attributes.insert("units".to_string(), json!(units));
        attributes.insert("axis".to_string(), json!(axis));
        Variable {
            name: name.to_string(),
            dimensions: vec![name.to_string()],
            dtype: DType::Float64,
            attributes,
            data: Array1::from(values.to_vec()).into_dyn(),
        }
    }

    /// Regrids one variable whose last two dimensions are `(lat, lon)`
    pub fn regrid_variable(&self, variable: &Variable) -> Result<Variable> {
        let rank = variable.dimensions.len();
        if rank < 2
            || variable.dimensions[rank - 2] != self.source.lat_dim
            || variable.dimensions[rank - 1] != self.source.lon_dim
        {
            return Err(Cmip6Error::RegridError(format!(
                "variable '{}' has dimensions {:?}; expected trailing ({}, {})",
                variable.name, variable.dimensions, self.source.lat_dim, self.source.lon_dim
            )));
        }

        let (n_src_lat, n_src_lon) = self.source.shape();
        let shape = variable.data.shape();
        if shape[rank - 2] != n_src_lat || shape[rank - 1] != n_src_lon {
            return Err(Cmip6Error::RegridError(format!(
                "variable '{}' has horizontal shape {:?}, grid is {:?}",
                variable.name,
                &shape[rank - 2..],
                (n_src_lat, n_src_lon)
            )));
        }

        let fill = variable.fill_value().filter(|f| !f.is_nan());
        let mut input: Vec<f64> = variable.data.iter().copied().collect();
        if let Some(fill) = fill {
            input
                .iter_mut()
                .filter(|v| variable.is_fill(**v, fill))
                .for_each(|v| *v = f64::NAN);
        }

        let n_src = self.weights.n_src;
        let n_dst = self.weights.n_dst();
        let n_slices = if n_src == 0 { 0 } else { input.len() / n_src };
        let mut output = vec![f64::NAN; n_slices * n_dst];
        let normalize = self.method.normalizes();
        input
            .par_chunks(n_src.max(1))
            .zip(output.par_chunks_mut(n_dst.max(1)))
            .for_each(|(field, out)| self.weights.apply(field, normalize, out));

        if let Some(fill) = fill {
            output.iter_mut().filter(|v| v.is_nan()).for_each(|v| *v = fill);
        }

        let (n_lat, n_lon) = self.target.shape();
        let mut out_shape = shape[..rank - 2].to_vec();
        out_shape.extend([n_lat, n_lon]);
        let mut dimensions = variable.dimensions[..rank - 2].to_vec();
        dimensions.extend(["lat".to_string(), "lon".to_string()]);

        let mut attributes = variable.attributes.clone();
        attributes.insert("regrid_method".to_string(), JsonValue::from(self.method.as_str()));

        Ok(Variable {
            name: variable.name.clone(),
            dimensions,
            dtype: if variable.dtype.is_float() {
                variable.dtype
            } else {
                DType::Float64
            },
            attributes,
            data: ArrayD::from_shape_vec(IxDyn(&out_shape), output)?,
        })
    }
}
