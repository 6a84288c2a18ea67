//! Capture error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("failed to read device directory {path:?}: {source}")]
    DeviceDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no capture devices found")]
    NoDevices,

    #[error("device not found: {0}")]
    DeviceNotFound(String),
}

pub type Result<T> = std::result::Result<T, CaptureError>;
