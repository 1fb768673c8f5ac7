use std::path::PathBuf;
use thiserror::Error;

/// Classifier artifacts could not be loaded. Fatal at startup.
#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid model artifact {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Aligned input does not fit the loaded classifier.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelInputError {
    #[error("feature length mismatch: got {got}, expected {expected}")]
    FeatureCount { expected: usize, got: usize },

    #[error("class index {index} outside label decoder ({classes} classes)")]
    UnknownClass { index: usize, classes: usize },

    #[error("classifier backend error: {0}")]
    Backend(String),
}

/// Why a generated advisory is unavailable. Never fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdvisoryError {
    #[error("HF_TOKEN not found")]
    MissingCredential,

    #[error("{0}")]
    Transport(String),

    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

#[derive(Error, Debug)]
pub enum CsvError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV input has no header row")]
    MissingHeader,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    ModelInput(#[from] ModelInputError),

    #[error(transparent)]
    Csv(#[from] CsvError),
}
