pub mod backend;
pub mod error;

use bytes::Bytes;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use tracing::info;

use gapfill_core::config::{AwsConfig, CatalogConfig, ReportConfig};

pub use backend::{LocalBackend, S3Backend, StorageBackend};
pub use error::StorageError;

impl StorageBackend {
    /// Backend holding the scene catalog. An S3 bucket wins over a local directory.
    pub fn for_catalog(aws: &AwsConfig, catalog: &CatalogConfig) -> Result<Self, StorageError> {
        match (&catalog.bucket, &catalog.local_dir) {
            (Some(bucket), _) => Ok(StorageBackend::S3(S3Backend::new(aws, bucket, &catalog.prefix)?)),
            (None, Some(dir)) => Ok(StorageBackend::Local(LocalBackend::new(dir)?)),
            (None, None) => Err(StorageError::NotConfigured(
                "set CATALOG_BUCKET or CATALOG_LOCAL_DIR".into(),
            )),
        }
    }

    /// Backend receiving gap reports, or `None` when no report bucket is set.
    pub fn for_reports(aws: &AwsConfig, report: &ReportConfig) -> Result<Option<Self>, StorageError> {
        report
            .bucket
            .as_deref()
            .map(|bucket| S3Backend::new(aws, bucket, "").map(StorageBackend::S3))
            .transpose()
    }

    /// Write a JSON document under `key` (already prefixed) and return its URI.
    pub async fn put_json(&self, key: &str, body: &serde_json::Value) -> Result<String, StorageError> {
        let bytes = serde_json::to_vec_pretty(body)
            .map_err(|e| StorageError::Other(format!("serialize {key}: {e}")))?;
        let len = bytes.len();
        let path = ObjectPath::from(key);
        self.store()
            .put(&path, PutPayload::from(Bytes::from(bytes)))
            .await?;
        let uri = self.uri(key);
        info!(uri = %uri, bytes = len, "Object written");
        Ok(uri)
    }

}

/// Helper so callers holding an `Arc<dyn ObjectStore>` can share the key rules.
pub fn join_key(prefix: &str, relative: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let relative = relative.trim_start_matches('/');
    match (prefix.is_empty(), relative.is_empty()) {
        (true, _) => relative.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix}/{relative}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_key_handles_empty_parts() {
        assert_eq!(join_key("", "a/b"), "a/b");
        assert_eq!(join_key("/inv/", "/a"), "inv/a");
        assert_eq!(join_key("inv", ""), "inv");
    }

    #[tokio::test]
    async fn memory_put_then_get() {
        let backend = StorageBackend::memory();
        let uri = backend
            .put_json("status-report/x.json", &serde_json::json!({"missing": []}))
            .await
            .unwrap();
        assert_eq!(uri, "memory:///status-report/x.json");
        let bytes = backend
            .store()
            .get(&ObjectPath::from("status-report/x.json"))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["missing"], serde_json::json!([]));
    }

    #[test]
    fn catalog_backend_requires_a_location() {
        let aws = AwsConfig {
            region: "af-south-1".into(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            endpoint_url: None,
        };
        let catalog = CatalogConfig {
            bucket: None,
            prefix: String::new(),
            local_dir: None,
        };
        assert!(matches!(
            StorageBackend::for_catalog(&aws, &catalog),
            Err(StorageError::NotConfigured(_))
        ));
    }
}
