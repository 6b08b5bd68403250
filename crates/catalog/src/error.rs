use thiserror::Error;

use gapfill_storage::StorageError;

/// Errors produced by [`CatalogIndex`](crate::CatalogIndex) implementations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The backing store could not be listed. Never reported as "no scenes".
    #[error("catalog unavailable at {location}: {reason}")]
    Unavailable { location: String, reason: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}
