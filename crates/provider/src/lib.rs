//! Upstream acquisition record of the satellite data provider.

pub mod error;
pub mod http;
pub mod memory;
pub mod record;

use async_trait::async_trait;

use gapfill_core::{SceneQuery, SceneSet};

pub use error::ProviderError;
pub use http::HttpProvider;
pub use memory::MemoryProvider;

/// Source of the scenes the provider says were acquired.
#[async_trait]
pub trait ProviderInventory: Send + Sync {
    async fn list_provider(&self, query: &SceneQuery) -> Result<SceneSet, ProviderError>;

    fn location(&self) -> String;
}
