use gapfill_storage::StorageError;

/// Errors that can occur while rendering or delivering a report.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
