use std::path::{Path, PathBuf};
use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::ObjectStore;
use tracing::info;

use gapfill_core::config::AwsConfig;

use crate::error::StorageError;

/// Unified storage backend wrapping object_store.
#[derive(Clone)]
pub enum StorageBackend {
    Local(LocalBackend),
    S3(S3Backend),
    /// Process-local store used by tests and dry runs.
    Memory(Arc<dyn ObjectStore>),
}

impl StorageBackend {
    /// Get the underlying ObjectStore.
    pub fn store(&self) -> &dyn ObjectStore {
        match self {
            StorageBackend::Local(b) => b.store.as_ref(),
            StorageBackend::S3(b) => b.store.as_ref(),
            StorageBackend::Memory(store) => store.as_ref(),
        }
    }

    /// Get an Arc-wrapped ObjectStore.
    pub fn store_arc(&self) -> Arc<dyn ObjectStore> {
        match self {
            StorageBackend::Local(b) => b.store.clone(),
            StorageBackend::S3(b) => b.store.clone(),
            StorageBackend::Memory(store) => store.clone(),
        }
    }

    pub fn memory() -> Self {
        StorageBackend::Memory(Arc::new(InMemory::new()))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, StorageBackend::S3(_))
    }

    /// Key prefix every object lives under (e.g. "deafrica-landsat").
    pub fn prefix(&self) -> &str {
        match self {
            StorageBackend::S3(b) => &b.prefix,
            StorageBackend::Local(_) | StorageBackend::Memory(_) => "",
        }
    }

    /// Join the backend prefix and a relative key.
    pub fn key(&self, relative: &str) -> String {
        let relative = relative.trim_start_matches('/');
        let prefix = self.prefix();
        if prefix.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{}", prefix, relative)
        }
    }

    /// Externally meaningful URI for an object key.
    pub fn uri(&self, key: &str) -> String {
        match self {
            StorageBackend::S3(b) => format!("s3://{}/{}", b.bucket, key),
            StorageBackend::Local(b) => format!("file://{}/{}", b.data_dir.display(), key),
            StorageBackend::Memory(_) => format!("memory:///{}", key),
        }
    }
}

/// Local filesystem backend.
#[derive(Clone)]
pub struct LocalBackend {
    pub store: Arc<dyn ObjectStore>,
    pub data_dir: PathBuf,
}

impl LocalBackend {
    pub fn new(data_dir: &Path) -> Result<Self, StorageError> {
        let canonical = std::fs::canonicalize(data_dir).unwrap_or_else(|_| data_dir.to_path_buf());
        let store = LocalFileSystem::new_with_prefix(&canonical)
            .map_err(|e| StorageError::Other(format!("local filesystem error: {e}")))?;
        info!("Storage: local backend at {}", canonical.display());
        Ok(Self {
            store: Arc::new(store),
            data_dir: canonical,
        })
    }
}

/// S3 backend.
#[derive(Clone)]
pub struct S3Backend {
    pub store: Arc<dyn ObjectStore>,
    pub bucket: String,
    pub prefix: String,
}

impl S3Backend {
    pub fn new(aws: &AwsConfig, bucket: &str, prefix: &str) -> Result<Self, StorageError> {
        if bucket.is_empty() {
            return Err(StorageError::NotConfigured("bucket name is empty".into()));
        }

        let mut builder = AmazonS3Builder::new().with_region(&aws.region);

        if let Some(ref key) = aws.access_key_id {
            builder = builder.with_access_key_id(key);
        }
        if let Some(ref secret) = aws.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }
        if let Some(ref token) = aws.session_token {
            builder = builder.with_token(token);
        }

        if let Some(ref endpoint) = aws.endpoint_url {
            // object_store requires an absolute endpoint URL
            let endpoint_url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                endpoint.clone()
            } else {
                format!("https://{}", endpoint)
            };
            builder = builder
                .with_bucket_name(bucket)
                .with_endpoint(&endpoint_url)
                .with_allow_http(endpoint_url.starts_with("http://"));
        } else {
            // Plain AWS: let the URL drive endpoint resolution
            builder = builder.with_url(format!("s3://{}", bucket));
        }

        let store = builder.build()?;
        let prefix = prefix.trim_matches('/').to_string();

        info!(
            "Storage: S3 backend s3://{}/{} (region: {})",
            bucket, prefix, aws.region
        );

        Ok(Self {
            store: Arc::new(store),
            bucket: bucket.to_string(),
            prefix,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_backend_creates() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(tmp.path()).unwrap();
        let backend = StorageBackend::Local(backend);
        assert!(!backend.is_remote());
        assert_eq!(backend.key("/a/b.json"), "a/b.json");
    }

    #[test]
    fn s3_requires_bucket() {
        let aws = AwsConfig {
            region: "af-south-1".into(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            endpoint_url: None,
        };
        assert!(matches!(
            S3Backend::new(&aws, "", ""),
            Err(StorageError::NotConfigured(_))
        ));
    }

    #[test]
    fn s3_keys_and_uris_include_prefix() {
        let aws = AwsConfig {
            region: "af-south-1".into(),
            access_key_id: Some("key".into()),
            secret_access_key: Some("secret".into()),
            session_token: None,
            endpoint_url: None,
        };
        let backend = StorageBackend::S3(S3Backend::new(&aws, "deafrica-landsat", "/inventory/").unwrap());
        assert!(backend.is_remote());
        let key = backend.key("status-report/x.json");
        assert_eq!(key, "inventory/status-report/x.json");
        assert_eq!(backend.uri(&key), "s3://deafrica-landsat/inventory/status-report/x.json");
    }
}
