//! Sparse interpolation weights between rectilinear grids
//!
//! Every method here is separable on a rectilinear grid: 1-D weights are
//! computed per axis and combined with an outer product, so each destination
//! cell ends up with a short list of `(source index, weight)` pairs.

use super::grid::GridAxis;

/// Weights of one destination coordinate along one axis
pub(crate) type AxisWeights = Vec<Vec<(usize, f64)>>;

/// Row-major `(lat, lon)` sparse weight matrix
#[derive(Debug, Clone, PartialEq)]
pub struct SparseWeights {
    pub n_src: usize,
    /// One row per destination cell; an empty row is an unmapped cell
    pub rows: Vec<Vec<(usize, f64)>>,
}

impl SparseWeights {
    /// Combines latitude and longitude weights into 2-D cell weights
    pub(crate) fn outer(lat: &AxisWeights, lon: &AxisWeights, n_src_lat: usize, n_src_lon: usize) -> Self {
        let mut rows = Vec::with_capacity(lat.len() * lon.len());
        for lat_row in lat {
            for lon_row in lon {
                let row = lat_row
                    .iter()
                    .flat_map(|&(i, wi)| {
                        lon_row
                            .iter()
                            .map(move |&(j, wj)| (i * n_src_lon + j, wi * wj))
                    })
                    .filter(|&(_, w)| w > 0.0)
                    .collect();
                rows.push(row);
            }
        }
        Self {
            n_src: n_src_lat * n_src_lon,
            rows,
        }
    }

    pub fn n_dst(&self) -> usize {
        self.rows.len()
    }

    /// Applies the weights to one horizontal field
    ///
    /// With `normalize`, NaN inputs are skipped and the result is divided by
    /// the weight of the valid inputs; otherwise any NaN input yields NaN.
    pub fn apply(&self, field: &[f64], normalize: bool, out: &mut [f64]) {
        debug_assert_eq!(field.len(), self.n_src);
        debug_assert_eq!(out.len(), self.rows.len());
        for (value, row) in out.iter_mut().zip(&self.rows) {
            let mut sum = 0.0;
            let mut weight = 0.0;
            let mut poisoned = false;
            for &(src, w) in row {
                let v = field[src];
                if v.is_nan() {
                    poisoned = true;
                    continue;
                }
                sum += w * v;
                weight += w;
            }
            *value = if weight == 0.0 || (poisoned && !normalize) {
                f64::NAN
            } else if normalize {
                sum / weight
            } else {
                sum
            };
        }
    }
}

fn wrap_360(lon: f64) -> f64 {
    lon.rem_euclid(360.0)
}

/// Source indices sorted by coordinate value
fn sorted_order(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    order
}

/// Linear interpolation weights along latitude; targets outside the source range are unmapped
pub(crate) fn linear_lat(src: &GridAxis, dst: &GridAxis) -> AxisWeights {
    let order = sorted_order(&src.centers);
    let sorted: Vec<f64> = order.iter().map(|&i| src.centers[i]).collect();
    let (first, last) = (sorted[0], sorted[sorted.len() - 1]);

    dst.centers
        .iter()
        .map(|&t| {
            if t < first || t > last {
                return Vec::new();
            }
            if sorted.len() == 1 {
                return vec![(order[0], 1.0)];
            }
            let upper = sorted.partition_point(|&v| v < t).clamp(1, sorted.len() - 1);
            let lower = upper - 1;
            let span = sorted[upper] - sorted[lower];
            let f = if span > 0.0 { (t - sorted[lower]) / span } else { 0.0 };
            vec![(order[lower], 1.0 - f), (order[upper], f)]
        })
        .collect()
}

/// Linear interpolation weights along periodic longitude
///
/// Pairs spanning a gap wider than one and a half times the median spacing
/// (a regional source) leave the target unmapped.
pub(crate) fn linear_lon(src: &GridAxis, dst: &GridAxis) -> AxisWeights {
    let wrapped: Vec<f64> = src.centers.iter().map(|&v| wrap_360(v)).collect();
    let order = sorted_order(&wrapped);
    let sorted: Vec<f64> = order.iter().map(|&i| wrapped[i]).collect();
    let n = sorted.len();
    if n == 1 {
        return dst.centers.iter().map(|_| vec![(order[0], 1.0)]).collect();
    }

    let mut gaps: Vec<f64> = sorted.windows(2).map(|w| w[1] - w[0]).collect();
    gaps.push(sorted[0] + 360.0 - sorted[n - 1]);
    let mut spacing = gaps.clone();
    spacing.sort_by(f64::total_cmp);
    let max_gap = spacing[spacing.len() / 2] * 1.5;

    dst.centers
        .iter()
        .map(|&t| {
            let t = wrap_360(t);
            let upper = sorted.partition_point(|&v| v < t);
            let (lower, upper, lo_val, hi_val) = if upper == 0 {
                (n - 1, 0, sorted[n - 1] - 360.0, sorted[0])
            } else if upper == n {
                (n - 1, 0, sorted[n - 1], sorted[0] + 360.0)
            } else {
                (upper - 1, upper, sorted[upper - 1], sorted[upper])
            };
            let span = hi_val - lo_val;
            if span > max_gap {
                return Vec::new();
            }
            let f = if span > 0.0 { (t - lo_val) / span } else { 0.0 };
            vec![(order[lower], 1.0 - f), (order[upper], f)]
        })
        .collect()
}

/// Nearest source centre along latitude
pub(crate) fn nearest_lat(src: &GridAxis, dst: &GridAxis) -> AxisWeights {
    dst.centers
        .iter()
        .map(|&t| {
            let nearest = argmin(src.centers.iter().map(|&v| (v - t).abs()));
            vec![(nearest, 1.0)]
        })
        .collect()
}

/// Nearest source centre along periodic longitude
pub(crate) fn nearest_lon(src: &GridAxis, dst: &GridAxis) -> AxisWeights {
    dst.centers
        .iter()
        .map(|&t| {
            let nearest = argmin(src.centers.iter().map(|&v| {
                let d = wrap_360(v - t);
                d.min(360.0 - d)
            }));
            vec![(nearest, 1.0)]
        })
        .collect()
}

fn argmin(distances: impl Iterator<Item = f64>) -> usize {
    distances
        .enumerate()
        .fold((0, f64::INFINITY), |best, (i, d)| if d < best.1 { (i, d) } else { best })
        .0
}

/// Area-overlap weights along latitude, measured in `sin(lat)` so cells carry spherical area
pub(crate) fn conservative_lat(src: &GridAxis, dst: &GridAxis) -> AxisWeights {
    let sin = |deg: f64| deg.to_radians().sin();
    dst.bounds
        .iter()
        .map(|&(d0, d1)| {
            let (s0, s1) = (sin(d0), sin(d1));
            let width = s1 - s0;
            if width <= 0.0 {
                return Vec::new();
            }
            src.bounds
                .iter()
                .enumerate()
                .filter_map(|(i, &(a, b))| {
                    let overlap = sin(b).min(s1) - sin(a).max(s0);
                    (overlap > 0.0).then(|| (i, overlap / width))
                })
                .collect()
        })
        .collect()
}

/// Overlap weights along periodic longitude
pub(crate) fn conservative_lon(src: &GridAxis, dst: &GridAxis) -> AxisWeights {
    dst.bounds
        .iter()
        .map(|&(d0, d1)| {
            let width = d1 - d0;
            if width <= 0.0 {
                return Vec::new();
            }
            src.bounds
                .iter()
                .enumerate()
                .filter_map(|(i, &(a, b))| {
                    let cell = (b - a).min(360.0);
                    let a = wrap_360(a);
                    let b = a + cell;
                    let overlap: f64 = [-360.0, 0.0, 360.0]
                        .iter()
                        .map(|shift| ((b + shift).min(d1) - (a + shift).max(d0)).max(0.0))
                        .sum();
                    (overlap > 0.0).then(|| (i, overlap / width))
                })
                .collect()
        })
        .collect()
}
