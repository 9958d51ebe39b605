use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("case not found: {0}")]
    NotFound(String),

    #[error("case already stored: {0}")]
    Duplicate(String),

    #[error("invalid blob key: {0:?}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("case JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[error("{0}")]
    Other(String),
}
