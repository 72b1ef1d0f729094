//! Unit tests for settings, catalog, time decoding and store metadata
//!
//! These tests cover the pieces of the download loop that do not touch the
//! network or the filesystem.

use cmip6_fetch::{
    catalog::{Catalog, Query},
    cftime::{Calendar, CalendarDate, TimeBound, TimeRange, TimeUnits},
    config::{MetadataSource, Settings, DEFAULT_METADATA_URL},
    data_source::DType,
    errors::{Cmip6Error, Result},
    parallel::ParallelConfig,
    pipeline::output_file_name,
    regrid::{RegridMethod, TargetGrid},
    zarr_io::{ConsolidatedMetadata, ZarrSource},
};
use serde_json::json;
use std::path::PathBuf;

mod common;

const SETTINGS: &str = r#"{
    "metadata_csv": "  ",
    "out_dir": "/tmp/cmip6_out",
    "download_all_models": false,
    "download_all_members": false,
    "dataset": {
        "mpi": { "source_id": "MPI-ESM1-2-LR", "ens_members": ["r1i1p1f1", "r2i1p1f1"] },
        "cesm": { "source_id": "CESM2", "ens_members": ["r1i1p1f1"] }
    },
    "experiments": { "ssp585": [2015, 2100], "historical": ["1950", "2014-06"] },
    "variables": { "tas": "Amon", "pr": "day" },
    "target_grid": [1.0, 2],
    "regrid_method": "bilinear"
}"#;

#[test]
fn test_error_types() {
    let not_found = Cmip6Error::ArrayNotFound {
        array: "tas".to_string(),
    };
    assert_eq!(format!("{}", not_found), "Array 'tas' not found in store");

    let dim_err = Cmip6Error::DimensionNotFound {
        array: "tas".to_string(),
        dim: "time".to_string(),
    };
    assert!(format!("{}", dim_err).contains("Dimension 'time' not found on array 'tas'"));

    let generic: Cmip6Error = "Test error".into();
    assert_eq!(format!("{}", generic), "Test error");

    let io: Cmip6Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
    assert!(format!("{}", io).starts_with("I/O error"));
    assert!(std::error::Error::source(&io).is_some());
}

#[test]
fn test_settings_preserve_file_order() -> Result<()> {
    let settings = Settings::from_json_str(SETTINGS)?;

    let experiments: Vec<&str> = settings.experiments.iter().map(|(e, _)| e.as_str()).collect();
    assert_eq!(experiments, vec!["ssp585", "historical"]);

    let models: Vec<&str> = settings.dataset.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(models, vec!["mpi", "cesm"]);

    assert_eq!(
        settings.variables,
        vec![
            ("tas".to_string(), "Amon".to_string()),
            ("pr".to_string(), "day".to_string())
        ]
    );
    assert_eq!(settings.regrid_method, Some(RegridMethod::Bilinear));
    assert!(settings.regrid_enabled());
    Ok(())
}

#[test]
fn test_settings_grid_label_keeps_number_text() -> Result<()> {
    let settings = Settings::from_json_str(SETTINGS)?;
    let grid = settings.target_grid.as_ref().expect("grid enabled");
    assert_eq!(grid.dlat, 1.0);
    assert_eq!(grid.dlon, 2.0);
    assert_eq!(grid.label(), "1.0x2");
    Ok(())
}

#[test]
fn test_settings_metadata_source() -> Result<()> {
    let settings = Settings::from_json_str(SETTINGS)?;
    assert_eq!(
        settings.metadata_source(),
        MetadataSource::Remote(DEFAULT_METADATA_URL.to_string())
    );

    let local = SETTINGS.replace(r#""metadata_csv": "  ""#, r#""metadata_csv": "catalog.csv""#);
    let settings = Settings::from_json_str(&local)?;
    assert_eq!(
        settings.metadata_source(),
        MetadataSource::Local(PathBuf::from("catalog.csv"))
    );
    Ok(())
}

#[test]
fn test_settings_model_lookup_by_key_or_source() -> Result<()> {
    let settings = Settings::from_json_str(SETTINGS)?;
    assert_eq!(settings.model_entry("mpi").map(|e| e.ens_members.len()), Some(2));
    assert_eq!(settings.model_entry("CESM2").map(|e| e.source_id.as_str()), Some("CESM2"));
    assert!(settings.model_entry("UKESM1-0-LL").is_none());
    Ok(())
}

#[test]
fn test_settings_without_grid_disable_regridding() -> Result<()> {
    let json = SETTINGS
        .replace(r#""target_grid": [1.0, 2],"#, r#""target_grid": [],"#)
        .replace(r#""regrid_method": "bilinear""#, r#""regrid_method": """#);
    let settings = Settings::from_json_str(&json)?;
    assert!(settings.target_grid.is_none());
    assert!(settings.regrid_method.is_none());
    assert!(!settings.regrid_enabled());
    Ok(())
}

#[test]
fn test_settings_rejects_bad_input() {
    let no_method = SETTINGS.replace(r#""regrid_method": "bilinear""#, r#""regrid_method": """#);
    assert!(matches!(
        Settings::from_json_str(&no_method),
        Err(Cmip6Error::InvalidSettings { .. })
    ));

    let patch = SETTINGS.replace(r#""regrid_method": "bilinear""#, r#""regrid_method": "patch""#);
    assert!(matches!(
        Settings::from_json_str(&patch),
        Err(Cmip6Error::InvalidSettings { .. })
    ));

    let reversed = SETTINGS.replace("[2015, 2100]", "[2100, 2015]");
    assert!(matches!(
        Settings::from_json_str(&reversed),
        Err(Cmip6Error::InvalidSettings { .. })
    ));

    let negative = SETTINGS.replace("[1.0, 2]", "[-1.0, 2]");
    assert!(Settings::from_json_str(&negative).is_err());

    assert!(matches!(
        Settings::from_json_str("{ not json"),
        Err(Cmip6Error::JsonError(_))
    ));
}

#[test]
fn test_catalog_query_select_and_unique() -> Result<()> {
    let csv = common::catalog_csv(&[
        ("MPI-ESM1-2-LR", "historical", "r1i1p1f1", "Amon", "tas", "gs://cmip6/a/v1"),
        ("CESM2", "historical", "r1i1p1f1", "Amon", "tas", "gs://cmip6/b/v1"),
        ("MPI-ESM1-2-LR", "historical", "r1i1p1f1", "Amon", "tas", "gs://cmip6/a/v2"),
        ("MPI-ESM1-2-LR", "historical", "r2i1p1f1", "Amon", "pr", "gs://cmip6/c/v1"),
    ]);
    let catalog = Catalog::from_reader(csv.as_bytes())?;
    assert_eq!(catalog.len(), 4);

    let query = Query {
        table_id: "Amon",
        variable_id: "tas",
        experiment_id: "historical",
        source_id: "MPI-ESM1-2-LR",
        member_id: "r1i1p1f1",
    };
    assert_eq!(catalog.query(&query).len(), 2);
    assert_eq!(catalog.select(&query).map(|e| e.zstore.as_str()), Some("gs://cmip6/a/v2"));

    let missing = Query {
        experiment_id: "ssp585",
        ..query.clone()
    };
    assert!(catalog.select(&missing).is_none());

    assert_eq!(catalog.unique_source_ids(), vec!["MPI-ESM1-2-LR", "CESM2"]);
    assert_eq!(catalog.unique_member_ids(), vec!["r1i1p1f1", "r2i1p1f1"]);

    assert!(query.to_string().contains("variable_id == 'tas'"));
    Ok(())
}

#[test]
fn test_catalog_ignores_extra_columns() -> Result<()> {
    let csv = "source_id,experiment_id,member_id,table_id,variable_id,zstore,extra\n\
               CESM2,piControl,r1i1p1f1,Omon,tos,gs://cmip6/x,ignored\n";
    let catalog = Catalog::from_reader(csv.as_bytes())?;
    let entry = &catalog.entries()[0];
    assert_eq!(entry.variable_id, "tos");
    assert_eq!(entry.grid_label, "");
    Ok(())
}

#[test]
fn test_calendar_parsing() -> Result<()> {
    assert_eq!(Calendar::parse("noleap")?, Calendar::NoLeap);
    assert_eq!(Calendar::parse("365_day")?, Calendar::NoLeap);
    assert_eq!(Calendar::parse("GREGORIAN")?, Calendar::Standard);
    assert_eq!(Calendar::parse("360_day")?, Calendar::Day360);
    assert!(Calendar::parse("lunar").is_err());
    Ok(())
}

#[test]
fn test_decode_days_in_model_calendars() -> Result<()> {
    let noleap = TimeUnits::parse("days since 1850-01-01", Some("noleap"))?;
    // 165 noleap years later
    assert_eq!(noleap.decode(365.0 * 165.0)?, CalendarDate::new(2015, 1, 1));
    assert_eq!(noleap.decode(59.0)?, CalendarDate::new(1850, 3, 1));

    let day360 = TimeUnits::parse("days since 2000-01-01", Some("360_day"))?;
    assert_eq!(day360.decode(359.5)?, CalendarDate::new(2000, 12, 30));
    assert_eq!(day360.decode(360.0)?, CalendarDate::new(2001, 1, 1));

    let standard = TimeUnits::parse("days since 1850-01-01 00:00:00", None)?;
    assert_eq!(standard.decode(366.0)?, CalendarDate::new(1851, 1, 2));

    let all_leap = TimeUnits::parse("days since 2001-02-28", Some("all_leap"))?;
    assert_eq!(all_leap.decode(1.0)?, CalendarDate::new(2001, 2, 29));

    let julian = TimeUnits::parse("days since 1900-02-28", Some("julian"))?;
    assert_eq!(julian.decode(1.0)?, CalendarDate::new(1900, 2, 29));
    Ok(())
}

#[test]
fn test_decode_hours_and_reference_time() -> Result<()> {
    let hours = TimeUnits::parse("hours since 2000-01-01 12:00:00", Some("proleptic_gregorian"))?;
    assert_eq!(hours.decode(11.0)?, CalendarDate::new(2000, 1, 1));
    assert_eq!(hours.decode(12.0)?, CalendarDate::new(2000, 1, 2));
    assert_eq!(hours.decode(-13.0)?, CalendarDate::new(1999, 12, 31));

    assert!(TimeUnits::parse("days after 2000-01-01", None).is_err());
    assert!(TimeUnits::parse("fortnights since 2000-01-01", None).is_err());
    assert!(TimeUnits::parse("days since 2000-02-30", Some("noleap")).is_err());
    Ok(())
}

#[test]
fn test_time_bounds_and_ranges() -> Result<()> {
    let start = TimeBound::from_json(&json!(1950))?;
    assert_eq!(start.label, "1950");
    let end = TimeBound::from_json(&json!("1951-02"))?;
    assert_eq!(end.month, Some(2));
    assert!(TimeBound::parse("1951-13").is_err());
    assert!(TimeBound::from_json(&json!(true)).is_err());

    let float_year = TimeBound::from_json(&json!(1950.0))?;
    assert_eq!(float_year.year, 1950);
    assert_eq!(float_year.month, None);
    assert_eq!(float_year.label, "1950.0");
    assert!(TimeBound::from_json(&json!(1950.5)).is_err());

    let range = TimeRange::new(start, end)?;
    assert!(!range.contains(CalendarDate::new(1949, 12, 31)));
    assert!(range.contains(CalendarDate::new(1950, 1, 1)));
    assert!(range.contains(CalendarDate::new(1951, 2, 28)));
    assert!(!range.contains(CalendarDate::new(1951, 3, 1)));
    Ok(())
}

#[test]
fn test_time_index_range_is_inclusive_of_end_year() -> Result<()> {
    let units = TimeUnits::parse("days since 2000-01-01", Some("360_day"))?;
    let values = common::monthly_days(3, 30.0);
    let range = TimeRange::new(TimeBound::parse("2001")?, TimeBound::parse("2001")?)?;
    assert_eq!(range.index_range(&units, &values)?, Some((12, 24)));

    let later = TimeRange::new(TimeBound::parse("2010")?, TimeBound::parse("2020")?)?;
    assert_eq!(later.index_range(&units, &values)?, None);
    Ok(())
}

#[test]
fn test_output_file_names() -> Result<()> {
    let settings = Settings::from_json_str(SETTINGS)?;
    let (_, range) = &settings.experiments[1];
    let name = output_file_name("tas", "historical", "Amon", "CESM2", "r1i1p1f1", range, None);
    assert_eq!(name, "tas_historical_Amon_CESM2_r1i1p1f1_1950_2014-06.nc");

    let regridded = output_file_name(
        "tas",
        "historical",
        "Amon",
        "CESM2",
        "r1i1p1f1",
        range,
        settings.target_grid.as_ref(),
    );
    assert_eq!(regridded, "tas_historical_Amon_CESM2_r1i1p1f1_1950_2014-06_1.0x2.nc");
    Ok(())
}

#[test]
fn test_target_grid_construction() -> Result<()> {
    let grid = TargetGrid::from_spacing(1.0, 1.0)?;
    assert_eq!(grid.shape(), (180, 360));
    assert!((grid.lat.centers[0] + 89.5).abs() < 1e-12);
    assert!((grid.lat.centers[179] - 89.5).abs() < 1e-12);
    assert!((grid.lon.centers[0] - 0.5).abs() < 1e-12);
    assert!((grid.lon.centers[359] - 359.5).abs() < 1e-12);
    assert_eq!(grid.lat.bounds[0].0, -90.0);

    // truncating division: 180 / 0.7 = 257.14
    let odd = TargetGrid::from_spacing(0.7, 2.5)?;
    assert_eq!(odd.shape(), (257, 144));

    assert!(TargetGrid::from_spacing(0.0, 1.0).is_err());
    Ok(())
}

#[test]
fn test_zarr_source_parsing() -> Result<()> {
    assert_eq!(
        ZarrSource::parse("gs://cmip6/CMIP6/CMIP/NCAR/CESM2/historical/r1i1p1f1/Amon/tas/gn/v20190308/")?,
        ZarrSource::Http(
            "https://storage.googleapis.com/cmip6/CMIP6/CMIP/NCAR/CESM2/historical/r1i1p1f1/Amon/tas/gn/v20190308"
                .to_string()
        )
    );
    assert_eq!(
        ZarrSource::parse("/data/store.zarr")?,
        ZarrSource::Local(PathBuf::from("/data/store.zarr"))
    );
    assert!(ZarrSource::parse("s3://bucket/store").is_err());
    assert!(ZarrSource::parse("  ").is_err());
    Ok(())
}

#[test]
fn test_consolidated_metadata_parsing() -> Result<()> {
    let document = json!({
        "metadata": {
            ".zattrs": { "source_id": "CESM2" },
            ".zgroup": { "zarr_format": 2 },
            "tas/.zarray": { "shape": [12, 2, 3], "chunks": [6, 2, 3], "dtype": "<f4", "fill_value": 1.0e20, "zarr_format": 2 },
            "pr/.zarray": { "shape": [12, 2, 3], "chunks": [6, 2, 3], "dtype": "<f4", "fill_value": "NaN", "zarr_format": 2 },
            "pr/.zattrs": { "_ARRAY_DIMENSIONS": ["time", "lat", "lon"], "_FillValue": -999.0 },
            "lat/.zarray": { "shape": [2], "chunks": [2], "dtype": "<f8", "fill_value": null, "zarr_format": 2 },
            "lat/.zattrs": { "_ARRAY_DIMENSIONS": ["lat"] },
            "tas/.zattrs": { "_ARRAY_DIMENSIONS": ["time", "lat", "lon"], "units": "K" },
            "member_id/.zarray": { "shape": [1], "chunks": [1], "dtype": "|O", "zarr_format": 2 },
            "member_id/.zattrs": { "_ARRAY_DIMENSIONS": ["member_id"] }
        },
        "zarr_consolidated_format": 1
    });
    let metadata = ConsolidatedMetadata::from_json(&document)?;
    assert_eq!(metadata.attributes["source_id"], json!("CESM2"));

    let tas = &metadata.arrays["tas"];
    assert_eq!(tas.shape, vec![12, 2, 3]);
    assert_eq!(tas.dimensions, vec!["time", "lat", "lon"]);
    assert_eq!(tas.dtype, Some(DType::Float32));
    assert_eq!(tas.attribute_str("units"), Some("K"));
    assert!(!tas.attributes.contains_key("_ARRAY_DIMENSIONS"));

    // the array fill value stands in for a missing `_FillValue` attribute
    assert_eq!(tas.attributes.get("_FillValue"), Some(&json!(1.0e20)));
    assert_eq!(metadata.arrays["pr"].attributes.get("_FillValue"), Some(&json!(-999.0)));
    assert!(!metadata.arrays["lat"].attributes.contains_key("_FillValue"));

    let member = &metadata.arrays["member_id"];
    assert_eq!(member.dtype, None);
    assert_eq!(member.raw_dtype, "|O");

    assert!(ConsolidatedMetadata::from_json(&json!({})).is_err());
    Ok(())
}

#[test]
fn test_parallel_config() {
    let default_config = ParallelConfig::default();
    assert!(default_config.num_threads.is_none());
    assert!(default_config.current_threads() > 0);

    assert_eq!(ParallelConfig::with_threads(4).num_threads, Some(4));
    assert!(ParallelConfig::all_cores().num_threads.unwrap() > 0);
    assert!(ParallelConfig::with_threads(0).setup_global_pool().is_err());
}
