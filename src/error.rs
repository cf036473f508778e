use thiserror::Error;

/// Hard failures of the cockpit engine.
///
/// Row-level data quality problems are not errors: they are reported in a
/// `QualityReport`. Only input that cannot be read as a table at all, bad
/// configuration and illegal CAPA status moves end up here.
#[derive(Error, Debug)]
pub enum CockpitError {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("dataset is not tabular: {0}")]
    NotTabular(String),

    #[error("dataset not loaded: {0}")]
    MissingDataset(String),

    #[error("CSV read failed: {0}")]
    Csv(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown metric: {0}")]
    UnknownMetric(String),

    #[error("unknown dimension: {0}")]
    UnknownDimension(String),

    #[error("invalid root cause reference: {0} (expected dimension:key:metric)")]
    InvalidRootCause(String),

    #[error("CAPA {id}: cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: String,
    },
}

impl From<std::io::Error> for CockpitError {
    fn from(err: std::io::Error) -> Self {
        CockpitError::Io(err.to_string())
    }
}

impl From<csv::Error> for CockpitError {
    fn from(err: csv::Error) -> Self {
        CockpitError::Csv(err.to_string())
    }
}

impl From<serde_json::Error> for CockpitError {
    fn from(err: serde_json::Error) -> Self {
        CockpitError::Json(err.to_string())
    }
}

pub type CockpitResult<T> = Result<T, CockpitError>;
