//! Defines command-line interface options using `clap` for cmip6_fetch.

use clap::Parser;
use std::path::PathBuf;

/// Download CMIP6 model output from the cloud catalog into NetCDF files
#[derive(Parser, Debug)]
#[command(
    name = "cmip6-fetch",
    version,
    about = "Download, time-subset and regrid CMIP6 data from cloud Zarr stores"
)]
pub struct Args {
    /// Path to the JSON settings file
    pub settings: PathBuf,

    /// Enable verbose output.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Number of threads to use for regridding. Defaults to number of CPU cores.
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Only list the stores that would be downloaded.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Stop at the first dataset that fails instead of continuing.
    #[arg(long, default_value_t = false)]
    pub fail_fast: bool,
}
