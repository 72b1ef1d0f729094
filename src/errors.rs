//! Centralized error handling for cmip6_fetch
//!
//! Every fallible operation in the crate returns [`Result`], so catalog,
//! store, regridding and NetCDF failures can be reported per dataset by the
//! download loop without aborting the whole run.

use std::fmt;

/// Main error type for cmip6_fetch operations
#[derive(Debug)]
pub enum Cmip6Error {
    /// NetCDF file operation errors
    NetCDFError(netcdf::Error),

    /// I/O operation errors
    IoError(std::io::Error),

    /// Settings or consolidated metadata could not be parsed
    JsonError(serde_json::Error),

    /// Catalog table could not be parsed
    CsvError(csv::Error),

    /// HTTP request failed
    HttpError(reqwest::Error),

    /// Invalid run settings
    InvalidSettings { message: String },

    /// Zarr store access or decoding errors
    ZarrError(String),

    /// Array not present in a store
    ArrayNotFound { array: String },

    /// Dimension not found on an array
    DimensionNotFound { array: String, dim: String },

    /// Array data type that cannot be decoded
    UnsupportedDtype { array: String, dtype: String },

    /// CF time units or calendar that cannot be decoded
    InvalidTime { message: String },

    /// Regridding setup or application errors
    RegridError(String),

    /// Array shape or dimension error
    ArrayError(ndarray::ShapeError),

    /// Thread pool configuration error
    ThreadPoolError(String),

    /// Generic error
    Generic(String),
}

impl fmt::Display for Cmip6Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cmip6Error::NetCDFError(e) => write!(f, "NetCDF error: {}", e),
            Cmip6Error::IoError(e) => write!(f, "I/O error: {}", e),
            Cmip6Error::JsonError(e) => write!(f, "JSON error: {}", e),
            Cmip6Error::CsvError(e) => write!(f, "Catalog error: {}", e),
            Cmip6Error::HttpError(e) => write!(f, "HTTP error: {}", e),
            Cmip6Error::InvalidSettings { message } => write!(f, "Invalid settings: {}", message),
            Cmip6Error::ZarrError(msg) => write!(f, "Zarr error: {}", msg),
            Cmip6Error::ArrayNotFound { array } => write!(f, "Array '{}' not found in store", array),
            Cmip6Error::DimensionNotFound { array, dim } => {
                write!(f, "Dimension '{}' not found on array '{}'", dim, array)
            }
            Cmip6Error::UnsupportedDtype { array, dtype } => {
                write!(f, "Unsupported data type '{}' for array '{}'", dtype, array)
            }
            Cmip6Error::InvalidTime { message } => write!(f, "Invalid time coordinate: {}", message),
            Cmip6Error::RegridError(msg) => write!(f, "Regridding error: {}", msg),
            Cmip6Error::ArrayError(e) => write!(f, "Array error: {}", e),
            Cmip6Error::ThreadPoolError(msg) => write!(f, "Thread pool error: {}", msg),
            Cmip6Error::Generic(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Cmip6Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Cmip6Error::NetCDFError(e) => Some(e),
            Cmip6Error::IoError(e) => Some(e),
            Cmip6Error::JsonError(e) => Some(e),
            Cmip6Error::CsvError(e) => Some(e),
            Cmip6Error::HttpError(e) => Some(e),
            Cmip6Error::ArrayError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<netcdf::Error> for Cmip6Error {
    fn from(error: netcdf::Error) -> Self {
        Cmip6Error::NetCDFError(error)
    }
}

impl From<std::io::Error> for Cmip6Error {
    fn from(error: std::io::Error) -> Self {
        Cmip6Error::IoError(error)
    }
}

impl From<serde_json::Error> for Cmip6Error {
    fn from(error: serde_json::Error) -> Self {
        Cmip6Error::JsonError(error)
    }
}

impl From<csv::Error> for Cmip6Error {
    fn from(error: csv::Error) -> Self {
        Cmip6Error::CsvError(error)
    }
}

impl From<reqwest::Error> for Cmip6Error {
    fn from(error: reqwest::Error) -> Self {
        Cmip6Error::HttpError(error)
    }
}

impl From<ndarray::ShapeError> for Cmip6Error {
    fn from(error: ndarray::ShapeError) -> Self {
        Cmip6Error::ArrayError(error)
    }
}

impl From<String> for Cmip6Error {
    fn from(error: String) -> Self {
        Cmip6Error::Generic(error)
    }
}

impl From<&str> for Cmip6Error {
    fn from(error: &str) -> Self {
        Cmip6Error::Generic(error.to_string())
    }
}

/// Result type alias for cmip6_fetch operations
pub type Result<T> = std::result::Result<T, Cmip6Error>;
