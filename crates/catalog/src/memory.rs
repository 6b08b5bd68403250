use async_trait::async_trait;

use gapfill_core::{Provenance, SceneKey, SceneQuery, SceneRecord, SceneSet};

use crate::error::CatalogError;
use crate::CatalogIndex;

/// Fixed, in-process catalog for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    keys: Vec<SceneKey>,
    failure: Option<String>,
}

impl MemoryCatalog {
    pub fn new(keys: impl IntoIterator<Item = SceneKey>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
            failure: None,
        }
    }

    /// A catalog whose every listing fails as unavailable.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            keys: Vec::new(),
            failure: Some(reason.into()),
        }
    }
}

#[async_trait]
impl CatalogIndex for MemoryCatalog {
    async fn list_indexed(&self, query: &SceneQuery) -> Result<SceneSet, CatalogError> {
        if let Some(reason) = &self.failure {
            return Err(CatalogError::Unavailable {
                location: self.location(),
                reason: reason.clone(),
            });
        }
        Ok(self
            .keys
            .iter()
            .filter(|key| query.admits(key))
            .map(|key| SceneRecord::new(key.clone(), Provenance::Indexed))
            .collect())
    }

    fn location(&self) -> String {
        "memory://catalog".to_string()
    }
}
