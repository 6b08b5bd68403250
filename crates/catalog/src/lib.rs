//! Locally indexed scenes.
//!
//! The catalog is whatever the ingestion pipeline has written to the object
//! store. Listing is streamed; only parsed [`SceneKey`](gapfill_core::SceneKey)s
//! are kept in memory.

pub mod error;
pub mod layout;
pub mod memory;
pub mod object;

use async_trait::async_trait;

use gapfill_core::{SceneQuery, SceneSet};

pub use error::CatalogError;
pub use memory::MemoryCatalog;
pub use object::ObjectStoreCatalog;

/// Source of the scenes that are already indexed locally.
#[async_trait]
pub trait CatalogIndex: Send + Sync {
    /// Every indexed scene admitted by `query`.
    async fn list_indexed(&self, query: &SceneQuery) -> Result<SceneSet, CatalogError>;

    /// Human-readable location for logs and reports.
    fn location(&self) -> String;
}
