use thiserror::Error;

/// Errors produced by [`ProviderInventory`](crate::ProviderInventory) implementations.
///
/// Every variant aborts the run; a failed listing is never "no scenes".
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider unavailable after {attempts} attempt(s): {reason}")]
    Unavailable { attempts: u32, reason: String },

    #[error("provider rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid provider url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Failure of a single page request, before the retry policy decides.
#[derive(Debug, Error)]
pub(crate) enum PageError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed page: {0}")]
    Malformed(String),

    #[error("page flagged partial")]
    Partial,
}
