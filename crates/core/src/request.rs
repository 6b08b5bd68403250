//! Work item published to the ingestion queue for a gap.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::scene::SceneKey;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackfillRequest {
    pub scene: SceneKey,
    /// Canonical `product/tile/date/version` string of `scene`.
    pub scene_id: String,
    pub source_uri: Option<String>,
    pub target_queue: String,
    /// Lowercase hex SHA-256 of `scene_id`; downstream deduplicates on it.
    pub token: String,
    pub requested_at: DateTime<Utc>,
}

impl BackfillRequest {
    pub fn new(scene: SceneKey, source_uri: Option<String>, target_queue: impl Into<String>) -> Self {
        let scene_id = scene.canonical();
        Self {
            token: idempotency_token(&scene),
            scene,
            scene_id,
            source_uri,
            target_queue: target_queue.into(),
            requested_at: Utc::now(),
        }
    }
}

/// Stable token for a scene: same key, same token, across runs and hosts.
pub fn idempotency_token(key: &SceneKey) -> String {
    let digest = Sha256::digest(key.canonical().as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Product, TileId};
    use chrono::NaiveDate;

    fn key() -> SceneKey {
        SceneKey::new(
            Product::Landsat8,
            TileId::path_row(172, 83),
            NaiveDate::from_ymd_opt(2023, 1, 2),
            "C2L2",
        )
    }

    #[test]
    fn token_is_stable_hex_sha256() {
        let a = BackfillRequest::new(key(), None, "ingest");
        let b = BackfillRequest::new(key(), Some("s3://x".into()), "other");
        assert_eq!(a.token, b.token);
        assert_eq!(a.token.len(), 64);
        assert!(a.token.bytes().all(|c| c.is_ascii_digit() || (b'a'..=b'f').contains(&c)));
        assert_eq!(a.token, "0d2e3c8407c327f762a33b81035725ac3609597ef714d10a064f801be14e0307");
        assert_eq!(a.scene_id, "landsat_8/172083/2023-01-02/C2L2");
    }

    #[test]
    fn different_keys_differ() {
        let mut other = key();
        other.acquired = NaiveDate::from_ymd_opt(2023, 1, 3);
        assert_ne!(idempotency_token(&key()), idempotency_token(&other));
    }
}
