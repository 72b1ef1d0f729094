//! Shared fixtures: in-memory readers and tiny on-disk Zarr v2 stores

#![allow(dead_code)]

use cmip6_fetch::data_source::{ArrayMetadata, DType, DataReader};
use cmip6_fetch::errors::{Cmip6Error, Result};
use ndarray::{ArrayD, IxDyn, Slice};
use serde_json::{json, Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// One array of a test store
#[derive(Debug, Clone)]
pub struct TestArray {
    pub name: String,
    pub dimensions: Vec<String>,
    pub dtype: DType,
    pub attributes: Map<String, JsonValue>,
    /// `.zarray` fill value, `null` when unset
    pub fill_value: JsonValue,
    pub data: ArrayD<f64>,
}

impl TestArray {
    pub fn new(name: &str, dims: &[&str], dtype: DType, shape: &[usize], values: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            dimensions: dims.iter().map(|d| d.to_string()).collect(),
            dtype,
            attributes: Map::new(),
            fill_value: JsonValue::Null,
            data: ArrayD::from_shape_vec(IxDyn(shape), values).expect("shape matches values"),
        }
    }

    pub fn with_attr(mut self, key: &str, value: JsonValue) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    pub fn with_fill(mut self, value: JsonValue) -> Self {
        self.fill_value = value;
        self
    }

    fn zarr_dtype(&self) -> &'static str {
        match self.dtype {
            DType::Int8 => "|i1",
            DType::UInt8 => "|u1",
            DType::Int16 => "<i2",
            DType::Int32 => "<i4",
            DType::Int64 => "<i8",
            DType::Float32 => "<f4",
            DType::Float64 => "<f8",
        }
    }

    /// Metadata as `ZarrReader` reports it, with the fill value as `_FillValue`
    fn metadata(&self) -> ArrayMetadata {
        let mut attributes = self.attributes.clone();
        if !self.fill_value.is_null() {
            attributes
                .entry("_FillValue")
                .or_insert_with(|| self.fill_value.clone());
        }
        ArrayMetadata {
            name: self.name.clone(),
            shape: self.data.shape().to_vec(),
            dimensions: self.dimensions.clone(),
            dtype: Some(self.dtype),
            raw_dtype: self.zarr_dtype().to_string(),
            attributes,
        }
    }

    fn little_endian_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        for &v in self.data.iter() {
            match self.dtype {
                DType::Int8 => bytes.extend((v as i8).to_le_bytes()),
                DType::UInt8 => bytes.extend((v as u8).to_le_bytes()),
                DType::Int16 => bytes.extend((v as i16).to_le_bytes()),
                DType::Int32 => bytes.extend((v as i32).to_le_bytes()),
                DType::Int64 => bytes.extend((v as i64).to_le_bytes()),
                DType::Float32 => bytes.extend((v as f32).to_le_bytes()),
                DType::Float64 => bytes.extend(v.to_le_bytes()),
            }
        }
        bytes
    }
}

/// `DataReader` over arrays held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    pub arrays: BTreeMap<String, TestArray>,
    pub attributes: Map<String, JsonValue>,
}

impl MemoryReader {
    pub fn new(arrays: Vec<TestArray>) -> Self {
        Self {
            arrays: arrays.into_iter().map(|a| (a.name.clone(), a)).collect(),
            attributes: Map::new(),
        }
    }
}

impl DataReader for MemoryReader {
    fn list_arrays(&self) -> Result<Vec<String>> {
        Ok(self.arrays.keys().cloned().collect())
    }

    fn metadata(&self, array_name: &str) -> Result<ArrayMetadata> {
        self.arrays
            .get(array_name)
            .map(TestArray::metadata)
            .ok_or_else(|| Cmip6Error::ArrayNotFound {
                array: array_name.to_string(),
            })
    }

    fn global_attributes(&self) -> Result<Map<String, JsonValue>> {
        Ok(self.attributes.clone())
    }

    fn read_slice(&self, array_name: &str, slice_ranges: &[(usize, usize)]) -> Result<ArrayD<f64>> {
        let array = self.arrays.get(array_name).ok_or_else(|| Cmip6Error::ArrayNotFound {
            array: array_name.to_string(),
        })?;
        Ok(array
            .data
            .slice_each_axis(|axis| {
                let (start, end) = slice_ranges[axis.axis.index()];
                Slice::from(start..end)
            })
            .to_owned())
    }
}

/// Monthly mid-month time values in days, for a 360-day or noleap calendar
pub fn monthly_days(years: usize, days_per_month: f64) -> Vec<f64> {
    (0..years * 12)
        .map(|m| m as f64 * days_per_month + 15.0)
        .collect()
}

/// A small global `tas(time, lat, lon)` store layout
///
/// Time is monthly in a 360_day calendar starting 2000-01, the grid is
/// 4 latitudes by 8 longitudes and `tas = 250 + lat / 10 + month index`.
/// As in xarray-written stores, the `tas` fill value lives in `.zarray`.
pub fn tas_store_arrays(years: usize) -> Vec<TestArray> {
    let lat = vec![-67.5, -22.5, 22.5, 67.5];
    let lon: Vec<f64> = (0..8).map(|i| 22.5 + 45.0 * i as f64).collect();
    let time = monthly_days(years, 30.0);
    let n_time = time.len();

    let mut tas = Vec::with_capacity(n_time * lat.len() * lon.len());
    for t in 0..n_time {
        for &la in &lat {
            for _ in &lon {
                tas.push(250.0 + la / 10.0 + t as f64);
            }
        }
    }

    vec![
        TestArray::new("time", &["time"], DType::Float64, &[n_time], time)
            .with_attr("units", json!("days since 2000-01-01"))
            .with_attr("calendar", json!("360_day"))
            .with_attr("standard_name", json!("time")),
        TestArray::new("lat", &["lat"], DType::Float64, &[4], lat)
            .with_attr("units", json!("degrees_north"))
            .with_attr("standard_name", json!("latitude")),
        TestArray::new("lon", &["lon"], DType::Float64, &[8], lon)
            .with_attr("units", json!("degrees_east"))
            .with_attr("standard_name", json!("longitude")),
        TestArray::new("tas", &["time", "lat", "lon"], DType::Float32, &[n_time, 4, 8], tas)
            .with_attr("units", json!("K"))
            .with_attr("standard_name", json!("air_temperature"))
            .with_fill(json!(1.0e20)),
    ]
}

/// Writes an uncompressed, single-chunk, consolidated Zarr v2 store
pub fn write_zarr_v2_store(root: &Path, arrays: &[TestArray], attributes: Map<String, JsonValue>) {
    fs::create_dir_all(root).expect("create store root");
    let mut consolidated = Map::new();

    let zgroup = json!({ "zarr_format": 2 });
    let root_attrs = JsonValue::Object(attributes);
    write_json(&root.join(".zgroup"), &zgroup);
    write_json(&root.join(".zattrs"), &root_attrs);
    consolidated.insert(".zgroup".to_string(), zgroup);
    consolidated.insert(".zattrs".to_string(), root_attrs);

    for array in arrays {
        let dir = root.join(&array.name);
        fs::create_dir_all(&dir).expect("create array dir");
        let shape = array.data.shape().to_vec();
        let chunks: Vec<usize> = shape.iter().map(|&s| s.max(1)).collect();
        let zarray = json!({
            "zarr_format": 2,
            "shape": shape,
            "chunks": chunks,
            "dtype": array.zarr_dtype(),
            "compressor": null,
            "fill_value": array.fill_value,
            "filters": null,
            "order": "C"
        });
        let mut zattrs = array.attributes.clone();
        zattrs.insert("_ARRAY_DIMENSIONS".to_string(), json!(array.dimensions));
        let zattrs = JsonValue::Object(zattrs);

        write_json(&dir.join(".zarray"), &zarray);
        write_json(&dir.join(".zattrs"), &zattrs);
        consolidated.insert(format!("{}/.zarray", array.name), zarray);
        consolidated.insert(format!("{}/.zattrs", array.name), zattrs);

        let chunk_key = if shape.is_empty() {
            "0".to_string()
        } else {
            vec!["0"; shape.len()].join(".")
        };
        fs::write(dir.join(chunk_key), array.little_endian_bytes()).expect("write chunk");
    }

    write_json(
        &root.join(".zmetadata"),
        &json!({ "metadata": consolidated, "zarr_consolidated_format": 1 }),
    );
}

fn write_json(path: &Path, value: &JsonValue) {
    fs::write(path, serde_json::to_vec_pretty(value).expect("serialize")).expect("write json");
}

/// Catalog CSV with the standard column set
pub fn catalog_csv(rows: &[(&str, &str, &str, &str, &str, &str)]) -> String {
    let mut csv = String::from(
        "activity_id,institution_id,source_id,experiment_id,member_id,table_id,variable_id,grid_label,zstore,dcpp_init_year,version\n",
    );
    for (source, experiment, member, table, variable, zstore) in rows {
        csv.push_str(&format!(
            "CMIP,TEST,{},{},{},{},{},gn,{},,20200101\n",
            source, experiment, member, table, variable, zstore
        ));
    }
    csv
}
