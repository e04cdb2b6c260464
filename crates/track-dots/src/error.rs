use std::path::PathBuf;
use thiserror::Error;

/// Errors of the command line driver
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse GPX file {path}: {source}")]
    Gpx {
        path: PathBuf,
        source: gpx::errors::GpxError,
    },

    #[error("Failed to parse JSON file {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Unsupported input {0}: expected a .json or .gpx file")]
    UnsupportedInput(PathBuf),

    #[error("Invalid center {0:?}: expected LAT,LNG")]
    InvalidCenter(String),

    #[error("No track could be loaded")]
    NothingLoaded,

    #[error(transparent)]
    Data(#[from] track_dots_lib::DataError),
}

pub type Result<T> = std::result::Result<T, CliError>;
