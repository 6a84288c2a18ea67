//! Error types for job installation

use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

use crate::installer::ApplyStage;

/// Input field rejected by validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Device,
    Interval,
    Quality,
    OutputDir,
    ScriptDir,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Field::Device => "device",
            Field::Interval => "interval",
            Field::Quality => "quality",
            Field::OutputDir => "output_dir",
            Field::ScriptDir => "script_dir",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: Field,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: Field, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Failures of the schedule table backend
#[derive(Error, Debug)]
pub enum TableError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Command {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("table content is not valid UTF-8")]
    Malformed(#[from] std::string::FromUtf8Error),

    #[error("i/o error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum InstallError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to write script {path:?}: {source}")]
    ScriptWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read schedule table: {0}")]
    TableRead(TableError),

    #[error("failed to write schedule table: {0}")]
    TableWrite(TableError),

    #[error("schedule table was modified concurrently on all {attempts} attempts")]
    TableChanged { attempts: u32 },
}

impl InstallError {
    /// Stage of `apply` this error terminated
    pub fn stage(&self) -> ApplyStage {
        match self {
            InstallError::Validation(_) => ApplyStage::Validating,
            InstallError::ScriptWrite { .. } => ApplyStage::RenderingScripts,
            InstallError::TableRead(_) => ApplyStage::ReadingTable,
            InstallError::TableWrite(_) | InstallError::TableChanged { .. } => ApplyStage::WritingTable,
        }
    }
}
