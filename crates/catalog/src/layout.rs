//! Object-store layouts of the two catalog families.
//!
//! ```text
//! collection02/level-2/standard/{sensor}/{year}/{path}/{row}/{scene_id}/{scene_id}_stac.json
//! sentinel-s2-l2a-cogs/{utm}/{band}/{square}/{year}/{month}/{scene_id}/{scene_id}.json
//! ```

use std::collections::BTreeSet;

use gapfill_core::{Product, SceneQuery, TileId};

pub const LANDSAT_ROOT: &str = "collection02/level-2/standard";
pub const SENTINEL2_ROOT: &str = "sentinel-s2-l2a-cogs";

/// Sensor directory used by the USGS collection-2 layout.
pub fn sensor_dir(product: Product) -> Option<&'static str> {
    match product {
        Product::Landsat5 => Some("tm"),
        Product::Landsat7 => Some("etm"),
        Product::Landsat8 | Product::Landsat9 => Some("oli-tirs"),
        Product::Sentinel2 => None,
    }
}

/// Suffix of the per-scene metadata document.
pub fn metadata_suffix(product: Product) -> &'static str {
    if product.is_landsat() {
        "_stac.json"
    } else {
        ".json"
    }
}

/// Relative prefixes to list for `query`, narrowest first.
///
/// Landsat partitions by year before tile, so every year spanned by the
/// range is listed. Sentinel-2 partitions by tile before year; without a
/// tile allow-list the whole root has to be listed.
pub fn list_prefixes(query: &SceneQuery) -> Vec<String> {
    let years: Vec<i32> = query.range.years().collect();
    let tiles = query.region.tiles.as_ref();
    let mut prefixes = BTreeSet::new();

    match sensor_dir(query.product) {
        Some(sensor) => {
            for year in &years {
                let base = format!("{LANDSAT_ROOT}/{sensor}/{year}/");
                match tiles {
                    None => {
                        prefixes.insert(base);
                    }
                    Some(tiles) => {
                        for tile in tiles {
                            if let TileId::PathRow { path, row } = tile {
                                prefixes.insert(format!("{base}{path:03}/{row:03}/"));
                            }
                        }
                    }
                }
            }
        }
        None => match tiles {
            None => {
                prefixes.insert(format!("{SENTINEL2_ROOT}/"));
            }
            Some(tiles) => {
                for tile in tiles {
                    if let TileId::Mgrs(code) = tile {
                        let Some(tile_dir) = mgrs_dir(code) else { continue };
                        for year in &years {
                            prefixes.insert(format!("{SENTINEL2_ROOT}/{tile_dir}/{year}/"));
                        }
                    }
                }
            }
        },
    }

    prefixes.into_iter().collect()
}

/// `34HBH` -> `34/H/BH`; the UTM zone is written without zero padding.
fn mgrs_dir(code: &str) -> Option<String> {
    if code.len() != 5 || !code.is_ascii() {
        return None;
    }
    let zone: u8 = code[..2].parse().ok()?;
    Some(format!("{}/{}/{}", zone, &code[2..3], &code[3..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gapfill_core::Region;

    fn query(product: Product, range: &str, region: Region) -> SceneQuery {
        SceneQuery::new(product, range.parse().unwrap(), region)
    }

    #[test]
    fn landsat_lists_each_year() {
        let q = query(Product::Landsat8, "2022-12-01..2023-01-31", Region::named("africa"));
        assert_eq!(
            list_prefixes(&q),
            vec![
                "collection02/level-2/standard/oli-tirs/2022/".to_string(),
                "collection02/level-2/standard/oli-tirs/2023/".to_string(),
            ]
        );
    }

    #[test]
    fn landsat_tiles_narrow_the_listing() {
        let region = Region::named("africa").with_tiles([TileId::path_row(172, 83), TileId::Mgrs("34HBH".into())]);
        let q = query(Product::Landsat7, "2023-01-01..2023-01-31", region);
        assert_eq!(list_prefixes(&q), vec!["collection02/level-2/standard/etm/2023/172/083/".to_string()]);
    }

    #[test]
    fn sentinel2_without_tiles_lists_root() {
        let q = query(Product::Sentinel2, "2023-01-01..2023-01-31", Region::named("africa"));
        assert_eq!(list_prefixes(&q), vec!["sentinel-s2-l2a-cogs/".to_string()]);
    }

    #[test]
    fn sentinel2_tile_directories() {
        let region = Region::named("africa").with_tiles([TileId::Mgrs("04QFJ".into())]);
        let q = query(Product::Sentinel2, "2023-01-01..2023-01-31", region);
        assert_eq!(list_prefixes(&q), vec!["sentinel-s2-l2a-cogs/4/Q/FJ/2023/".to_string()]);
    }
}
