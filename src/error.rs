use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV parsing failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Source schema error: {0}")]
    Schema(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Source unavailable after retries: {0}")]
    SourceUnavailable(String),

    #[error("Store write failed: {0}")]
    Write(String),

    #[error("Store read failed: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Transient transport failures are worth another attempt; schema and
    /// auth problems are corrected by configuration, not by retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Http(_) | SyncError::SourceUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
