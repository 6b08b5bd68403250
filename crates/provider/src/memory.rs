use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use gapfill_core::{Provenance, SceneKey, SceneQuery, SceneRecord, SceneSet};

use crate::error::ProviderError;
use crate::ProviderInventory;

/// Fixed provider inventory for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    keys: Vec<SceneKey>,
    failure: Option<String>,
    calls: AtomicU32,
}

impl MemoryProvider {
    pub fn new(keys: impl IntoIterator<Item = SceneKey>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
            ..Self::default()
        }
    }

    /// A provider whose every listing fails as unavailable.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Number of `list_provider` calls so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderInventory for MemoryProvider {
    async fn list_provider(&self, query: &SceneQuery) -> Result<SceneSet, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.failure {
            return Err(ProviderError::Unavailable {
                attempts: 1,
                reason: reason.clone(),
            });
        }
        Ok(self
            .keys
            .iter()
            .filter(|key| query.admits(key))
            .map(|key| {
                SceneRecord::new(key.clone(), Provenance::Provider)
                    .with_source_uri(format!("memory://provider/{}", key.canonical()))
            })
            .collect())
    }

    fn location(&self) -> String {
        "memory://provider".to_string()
    }
}
