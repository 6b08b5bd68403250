use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::path::Path as ObjectPath;
use tracing::{debug, info, warn};

use gapfill_core::{Provenance, SceneKey, SceneQuery, SceneRecord, SceneSet};
use gapfill_storage::StorageBackend;

use crate::error::CatalogError;
use crate::layout;
use crate::CatalogIndex;

/// Catalog read from scene metadata documents in an object store.
pub struct ObjectStoreCatalog {
    backend: StorageBackend,
}

/// Counters for one listing pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ListingStats {
    pub objects: u64,
    pub matched_suffix: u64,
    pub unparsed: u64,
    pub outside_query: u64,
}

impl ObjectStoreCatalog {
    pub fn new(backend: StorageBackend) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &StorageBackend {
        &self.backend
    }

    /// Stream one prefix into `scenes`, keeping only parsed keys.
    async fn list_prefix(
        &self,
        relative: &str,
        query: &SceneQuery,
        scenes: &mut SceneSet,
        stats: &mut ListingStats,
    ) -> Result<(), CatalogError> {
        let list_prefix = self.backend.key(relative);
        let suffix = layout::metadata_suffix(query.product);
        let path = ObjectPath::from(list_prefix.as_str());
        let mut stream = self.backend.store().list(Some(&path));

        let unavailable = |e: object_store::Error| CatalogError::Unavailable {
            location: self.backend.uri(&list_prefix),
            reason: e.to_string(),
        };

        while let Some(meta) = stream.try_next().await.map_err(unavailable)? {
            stats.objects += 1;
            let key = meta.location.to_string();
            if !key.ends_with(suffix) {
                continue;
            }
            stats.matched_suffix += 1;

            let scene = match SceneKey::from_object_path(&key) {
                Ok(scene) => scene,
                Err(e) => {
                    stats.unparsed += 1;
                    debug!(key = %key, error = %e, "Skipping unparseable catalog key");
                    continue;
                }
            };
            if !query.admits(&scene) {
                stats.outside_query += 1;
                continue;
            }

            let scene_dir = key.rsplit_once('/').map(|(dir, _)| dir).unwrap_or(&key);
            let mut record = SceneRecord::new(scene, Provenance::Indexed)
                .with_source_uri(format!("{}/", self.backend.uri(scene_dir)))
                .with_size(meta.size as u64);
            if let Some(etag) = meta.e_tag {
                record = record.with_checksum(etag.trim_matches('"'));
            }
            scenes.insert(record);
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogIndex for ObjectStoreCatalog {
    async fn list_indexed(&self, query: &SceneQuery) -> Result<SceneSet, CatalogError> {
        let prefixes = layout::list_prefixes(query);
        info!(
            product = %query.product,
            range = %query.range,
            region = %query.region.name,
            prefixes = prefixes.len(),
            location = %self.location(),
            "Listing catalog index"
        );

        let mut scenes = SceneSet::new();
        let mut stats = ListingStats::default();
        for relative in &prefixes {
            self.list_prefix(relative, query, &mut scenes, &mut stats).await?;
            debug!(prefix = %relative, scenes = scenes.len(), "Prefix listed");
        }

        if stats.unparsed > 0 {
            warn!(unparsed = stats.unparsed, "Catalog keys did not parse as scene ids");
        }
        info!(
            objects = stats.objects,
            matched = stats.matched_suffix,
            outside_query = stats.outside_query,
            scenes = scenes.len(),
            "Catalog index listed"
        );
        Ok(scenes)
    }

    fn location(&self) -> String {
        self.backend.uri(self.backend.prefix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use gapfill_core::{Product, Region, TileId};
    use object_store::PutPayload;

    async fn put(backend: &StorageBackend, key: &str) {
        backend
            .store()
            .put(&ObjectPath::from(key), PutPayload::from(Bytes::from_static(b"{}")))
            .await
            .unwrap();
    }

    fn query(product: Product, range: &str) -> SceneQuery {
        SceneQuery::new(product, range.parse().unwrap(), Region::named("africa"))
    }

    #[tokio::test]
    async fn lists_landsat_stac_documents() {
        let backend = StorageBackend::memory();
        let base = "collection02/level-2/standard/oli-tirs/2023/172/083";
        let id = "LC08_L2SP_172083_20230101_20230110_02_T1";
        put(&backend, &format!("{base}/{id}/{id}_SR_stac.json")).await;
        put(&backend, &format!("{base}/{id}/{id}_SR_B1.TIF")).await;
        put(&backend, &format!("{base}/garbage/readme_stac.json")).await;
        // Outside the requested range.
        let late = "LC08_L2SP_172083_20230301_20230310_02_T1";
        put(&backend, &format!("{base}/{late}/{late}_SR_stac.json")).await;

        let catalog = ObjectStoreCatalog::new(backend);
        let scenes = catalog
            .list_indexed(&query(Product::Landsat8, "2023-01-01..2023-01-31"))
            .await
            .unwrap();

        assert_eq!(scenes.len(), 1);
        let record = scenes.records().next().unwrap();
        assert_eq!(record.key.tile, TileId::path_row(172, 83));
        assert_eq!(record.provenance, Provenance::Indexed);
        assert_eq!(record.size_bytes, Some(2));
        assert_eq!(
            record.source_uri.as_deref(),
            Some(format!("memory:///{base}/{id}/").as_str())
        );
    }

    #[tokio::test]
    async fn other_sensors_are_not_listed() {
        let backend = StorageBackend::memory();
        let id = "LE07_L2SP_172083_20230101_20230110_02_T1";
        put(&backend, &format!("collection02/level-2/standard/etm/2023/172/083/{id}/{id}_stac.json")).await;

        let catalog = ObjectStoreCatalog::new(backend);
        let scenes = catalog
            .list_indexed(&query(Product::Landsat8, "2023-01-01..2023-01-31"))
            .await
            .unwrap();
        assert!(scenes.is_empty());
    }

    #[tokio::test]
    async fn lists_sentinel2_cog_documents() {
        let backend = StorageBackend::memory();
        let id = "S2A_34HBH_20230101_0_L2A";
        put(&backend, &format!("sentinel-s2-l2a-cogs/34/H/BH/2023/1/{id}/{id}.json")).await;
        put(&backend, &format!("sentinel-s2-l2a-cogs/34/H/BH/2023/1/{id}/B04.tif")).await;

        let catalog = ObjectStoreCatalog::new(backend);
        let scenes = catalog
            .list_indexed(&query(Product::Sentinel2, "2023-01-01..2023-01-31"))
            .await
            .unwrap();
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes.keys().next().unwrap().version, "L2A");
    }

    #[tokio::test]
    async fn local_directory_catalog() {
        let tmp = tempfile::tempdir().unwrap();
        let id = "LC09_L2SP_181070_20230105_20230107_02_T1";
        let dir = tmp
            .path()
            .join(format!("collection02/level-2/standard/oli-tirs/2023/181/070/{id}"));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{id}_stac.json")), b"{}").unwrap();

        let backend = StorageBackend::Local(gapfill_storage::LocalBackend::new(tmp.path()).unwrap());
        let catalog = ObjectStoreCatalog::new(backend);
        let scenes = catalog
            .list_indexed(&query(Product::Landsat9, "2023-01-01..2023-01-31"))
            .await
            .unwrap();
        assert_eq!(scenes.len(), 1);
    }
}
