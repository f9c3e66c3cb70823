use crate::models::ProcessingStage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("pdf parse error: {0}")]
    Parse(String),

    #[error("no text could be extracted from the pdf")]
    Empty,
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed embedding response: {0}")]
    MalformedResponse(String),

    #[error("embedding dimension {actual} != {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("store request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search query is empty")]
    EmptyQuery,

    #[error("query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector lookup failed: {0}")]
    Backend(#[from] PersistenceError),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal processing transition {from} -> {to}")]
pub struct TransitionError {
    pub from: ProcessingStage,
    pub to: ProcessingStage,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid chunking config: {0}")]
    InvalidChunking(String),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("report not found: {0}")]
    ReportNotFound(String),

    #[error("report {report_id} is already {status} and cannot be reprocessed")]
    ReportFinalized { report_id: String, status: String },

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
