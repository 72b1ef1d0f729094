//! Rectilinear latitude/longitude grids

use crate::dataset::Dataset;
use crate::errors::{Cmip6Error, Result};

const LAT_NAMES: [&str; 2] = ["lat", "latitude"];
const LON_NAMES: [&str; 2] = ["lon", "longitude"];

/// Cell centres and cell bounds along one horizontal axis
#[derive(Debug, Clone, PartialEq)]
pub struct GridAxis {
    pub centers: Vec<f64>,
    /// `(lower, upper)` edges per cell, `lower < upper`
    pub bounds: Vec<(f64, f64)>,
}

impl GridAxis {
    /// Axis with bounds half-way between neighbouring centres
    pub fn from_centers(centers: Vec<f64>, clamp: Option<(f64, f64)>) -> Self {
        let bounds = edges_from_centers(&centers, clamp);
        Self { centers, bounds }
    }

    /// Like [`GridAxis::from_centers`], but a single cell spans `spacing`
    pub fn with_spacing(centers: Vec<f64>, spacing: f64, clamp: Option<(f64, f64)>) -> Self {
        if centers.len() != 1 {
            return Self::from_centers(centers, clamp);
        }
        let (lower, upper) = (centers[0] - spacing / 2.0, centers[0] + spacing / 2.0);
        let bounds = match clamp {
            Some((lo, hi)) => vec![(lower.clamp(lo, hi), upper.clamp(lo, hi))],
            None => vec![(lower, upper)],
        };
        Self { centers, bounds }
    }

    pub fn len(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }
}

fn edges_from_centers(centers: &[f64], clamp: Option<(f64, f64)>) -> Vec<(f64, f64)> {
    let n = centers.len();
    let clamp_value = |v: f64| clamp.map_or(v, |(lo, hi)| v.clamp(lo, hi));
    (0..n)
        .map(|i| {
            let lower = if i > 0 {
                (centers[i - 1] + centers[i]) / 2.0
            } else if n > 1 {
                centers[0] - (centers[1] - centers[0]) / 2.0
            } else {
                centers[0]
            };
            let upper = if i + 1 < n {
                (centers[i] + centers[i + 1]) / 2.0
            } else if n > 1 {
                centers[n - 1] + (centers[n - 1] - centers[n - 2]) / 2.0
            } else {
                centers[0]
            };
            let (a, b) = (clamp_value(lower), clamp_value(upper));
            (a.min(b), a.max(b))
        })
        .collect()
}

/// Evenly spaced values from `start` to `end` inclusive
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Global regular destination grid with cell-centred coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct TargetGrid {
    pub dlat: f64,
    pub dlon: f64,
    pub lat: GridAxis,
    pub lon: GridAxis,
}

impl TargetGrid {
    /// Builds the `dlat` x `dlon` grid
    ///
    /// The grid has `trunc(180 / dlat)` latitudes from `-90 + dlat/2` to
    /// `90 - dlat/2` and `trunc(360 / dlon)` longitudes from `dlon/2` to
    /// `360 - dlon/2`.
    pub fn from_spacing(dlat: f64, dlon: f64) -> Result<Self> {
        let n_lat = (180.0 / dlat) as usize;
        let n_lon = (360.0 / dlon) as usize;
        if !(dlat > 0.0 && dlon > 0.0) || n_lat == 0 || n_lon == 0 {
            return Err(Cmip6Error::RegridError(format!(
                "grid spacing {}x{} yields an empty grid",
                dlat, dlon
            )));
        }
        let lat = linspace(-90.0 + dlat / 2.0, 90.0 - dlat / 2.0, n_lat);
        let lon = linspace(dlon / 2.0, 360.0 - dlon / 2.0, n_lon);
        Ok(Self {
            dlat,
            dlon,
            lat: GridAxis::with_spacing(lat, dlat, Some((-90.0, 90.0))),
            lon: GridAxis::with_spacing(lon, dlon, None),
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.lat.len(), self.lon.len())
    }
}

/// Horizontal grid of a source dataset
#[derive(Debug, Clone, PartialEq)]
pub struct SourceGrid {
    pub lat_dim: String,
    pub lon_dim: String,
    pub lat: GridAxis,
    pub lon: GridAxis,
}

impl SourceGrid {
    /// Finds 1-D latitude and longitude coordinates and their bounds
    ///
    /// # Errors
    ///
    /// Fails when the dataset has no horizontal coordinates or they are
    /// two-dimensional (curvilinear grids are not supported).
    pub fn from_dataset(dataset: &Dataset) -> Result<Self> {
        let (lat_dim, lat) = find_axis(dataset, &LAT_NAMES, Some((-90.0, 90.0)))?;
        let (lon_dim, lon) = find_axis(dataset, &LON_NAMES, None)?;
        Ok(Self {
            lat_dim,
            lon_dim,
            lat,
            lon,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.lat.len(), self.lon.len())
    }
}

fn find_axis(
    dataset: &Dataset,
    names: &[&str],
    clamp: Option<(f64, f64)>,
) -> Result<(String, GridAxis)> {
    let variable = names
        .iter()
        .find_map(|name| dataset.variable(name))
        .ok_or_else(|| Cmip6Error::RegridError(format!("no {} coordinate found", names[0])))?;
    if !variable.is_coordinate() {
        return Err(Cmip6Error::RegridError(format!(
            "coordinate '{}' has dimensions {:?}; curvilinear grids are not supported",
            variable.name, variable.dimensions
        )));
    }
    let centers: Vec<f64> = variable.data.iter().copied().collect();
    if centers.is_empty() {
        return Err(Cmip6Error::RegridError(format!(
            "coordinate '{}' is empty",
            variable.name
        )));
    }

    let bounds_name = variable
        .attributes
        .get("bounds")
        .and_then(|b| b.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}_bnds", variable.name));
    let bounds = dataset
        .variable(&bounds_name)
        .filter(|b| b.data.shape() == &[centers.len(), 2][..])
        .map(|b| {
            b.data
                .outer_iter()
                .map(|edge| {
                    let edge: Vec<f64> = edge.iter().copied().collect();
                    let (a, b) = (edge[0], edge[1]);
                    let (a, b) = (a.min(b), a.max(b));
                    clamp.map_or((a, b), |(lo, hi)| (a.clamp(lo, hi), b.clamp(lo, hi)))
                })
                .collect::<Vec<_>>()
        });

    let axis = match bounds {
        Some(bounds) => GridAxis { centers, bounds },
        None => GridAxis::from_centers(centers, clamp),
    };
    Ok((variable.name.clone(), axis))
}
