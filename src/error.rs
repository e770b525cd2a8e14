use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that abort a whole comparison run
#[derive(Error, Debug)]
pub enum CompareError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corpus enumeration failed: {path} - {reason}")]
    Enumeration { path: PathBuf, reason: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Report serialization error: {0}")]
    Report(#[from] serde_json::Error),
}

/// Failure of a single converter invocation. Isolated to one
/// (file, format, variant) triple.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvocationFailure {
    #[error("Could not start converter {executable}: {reason}")]
    Spawn { executable: PathBuf, reason: String },

    #[error("Could not create output directory {path}: {reason}")]
    OutputDirectory { path: PathBuf, reason: String },

    #[error("Could not remove previous output {path}: {reason}")]
    StaleOutput { path: PathBuf, reason: String },

    #[error("Error converting with {executable} ({status}): {output}")]
    NonZeroExit {
        executable: PathBuf,
        status: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("Converter {executable} I/O failure: {reason}")]
    Io { executable: PathBuf, reason: String },
}

impl InvocationFailure {
    /// Captured converter output, if the process got far enough to produce any
    pub fn diagnostic_output(&self) -> Option<&str> {
        match self {
            InvocationFailure::NonZeroExit { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Failure while computing a diff between two converter outputs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiffError {
    #[error("Could not read {path} for comparison: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("XML parsing error: {path} - {details}")]
    XmlParse { path: PathBuf, details: String },
}

/// Why a comparison ended up `Failed`. Stored on error records, so it is
/// cloneable and serializable.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureCause {
    #[error("{failure}")]
    Invocation {
        variant: String,
        failure: InvocationFailure,
    },

    #[error("XML parsing error: {path} - {details}")]
    Parse { path: PathBuf, details: String },

    #[error("Diff computation error: {path} - {reason}")]
    DiffComputation { path: PathBuf, reason: String },
}

impl From<DiffError> for FailureCause {
    fn from(err: DiffError) -> Self {
        match err {
            DiffError::Read { path, reason } => FailureCause::DiffComputation { path, reason },
            DiffError::XmlParse { path, details } => FailureCause::Parse { path, details },
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, CompareError>;

/// Diff result type alias
pub type DiffResult<T> = std::result::Result<T, DiffError>;
