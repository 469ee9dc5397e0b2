use thiserror::Error;

#[derive(Error, Debug)]
pub enum VizError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport or malformed-payload failure on a bulk fetch.
    /// Retryable: callers keep their previous working set.
    #[error("Failed to fetch data: {message}")]
    Fetch { message: String },

    #[error("Entity not found: {entity_id}")]
    NotFound { entity_id: String },

    #[error("No data available")]
    EmptyDataset,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type VizResult<T> = Result<T, VizError>;
