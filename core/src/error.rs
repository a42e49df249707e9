use crate::gate::GateFinding;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("malformed {endpoint} capture at line {line}, column {column}: {message}")]
    MalformedCapture {
        endpoint: String,
        line: u32,
        column: u32,
        message: String,
    },

    #[error("{} unsanitized field(s) found", .0.len())]
    UnsanitizedFields(Vec<GateFinding>),

    #[error("unrecognized device: {0}")]
    UnrecognizedDevice(String),

    #[error("corpus integrity: {0}")]
    CorpusIntegrity(String),

    #[error("determinism violation: {0}")]
    DeterminismViolation(String),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
