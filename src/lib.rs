//! cmip6_fetch: CMIP6 download, time subsetting and regridding
//!
//! Retrieves CMIP6 model output from the cloud-hosted catalog of consolidated
//! Zarr stores, filters it by experiment, model, variable and ensemble
//! member, subsets it to each experiment's time range, optionally regrids it
//! to a regular lat/lon grid and writes everything to NetCDF.
//!
//! ## Module Organization
//!
//! - [`config`]: JSON run settings
//! - [`catalog`]: the CSV table of available stores and facet queries
//! - [`cftime`]: CF time decoding across model calendars
//! - [`data_source`]: the array reader abstraction
//! - [`zarr_io`]: consolidated Zarr v2 stores over HTTP or the filesystem
//! - [`dataset`]: in-memory datasets and time subsetting
//! - [`regrid`]: bilinear, conservative and nearest-neighbour regridding
//! - [`netcdf_io`]: NetCDF output
//! - [`pipeline`]: the filter-and-fetch loop
//! - [`parallel`]: thread pool configuration
//! - [`errors`]: centralized error handling
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cmip6_fetch::prelude::*;
//! use std::path::Path;
//!
//! let settings = Settings::from_path(Path::new("settings.json")).unwrap();
//! let catalog = Catalog::load(&settings.metadata_source()).unwrap();
//! let summary = Pipeline::new(&settings, &catalog, ZarrOpener, RunOptions::default())
//!     .run()
//!     .unwrap();
//! summary.log();
//! ```

pub mod catalog;
pub mod cftime;
pub mod cli;
pub mod config;
pub mod data_source;
pub mod dataset;
pub mod errors;
pub mod netcdf_io;
pub mod parallel;
pub mod pipeline;
pub mod regrid;
pub mod zarr_io;

pub use errors::{Cmip6Error, Result};

// High-level convenience API
pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::catalog::{Catalog, CatalogEntry, Query};
    pub use crate::cftime::{Calendar, CalendarDate, TimeBound, TimeRange, TimeUnits};
    pub use crate::config::{MetadataSource, Settings};
    pub use crate::data_source::{ArrayMetadata, DType, DataReader};
    pub use crate::dataset::{Dataset, Variable};
    pub use crate::errors::{Cmip6Error, Result};
    pub use crate::netcdf_io::{write_dataset, NetCDFWriter};
    pub use crate::parallel::ParallelConfig;
    pub use crate::pipeline::{Pipeline, RunOptions, RunSummary, StoreOpener, ZarrOpener};
    pub use crate::regrid::{RegridMethod, Regridder, TargetGrid};
    pub use crate::zarr_io::{ZarrReader, ZarrSource};
}
