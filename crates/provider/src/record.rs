//! Map loosely-typed provider scene objects onto [`SceneRecord`]s.
//!
//! Providers disagree on field names (USGS bulk metadata, STAC items, ad-hoc
//! JSON), so each attribute is found by probing well-known keys, first on the
//! object itself and then under `properties`.

use chrono::NaiveDate;
use serde_json::{Map, Value};

use gapfill_core::{Product, Provenance, SceneKey, SceneRecord, TileId};

/// Well-known field names for the scene id (tried in order).
const ID_KEYS: &[&str] = &[
    "display_id", "displayId", "Display ID",
    "product_id", "productId", "landsat_product_id",
    "scene_id", "sceneId",
    "id", "ID",
];

/// Well-known field names for the acquisition date.
const DATE_KEYS: &[&str] = &[
    "acquired", "acquisition_date", "acquisitionDate",
    "date_acquired", "Date Acquired",
    "datetime", "sensing_time", "date",
];

const PATH_KEYS: &[&str] = &["wrs_path", "path", "WRS Path"];
const ROW_KEYS: &[&str] = &["wrs_row", "row", "WRS Row"];
const TILE_KEYS: &[&str] = &["tile", "tile_id", "mgrs_tile", "s2:mgrs_tile", "pathrow"];
const URI_KEYS: &[&str] = &["uri", "source_uri", "href", "url", "download_url"];
const SIZE_KEYS: &[&str] = &["size_bytes", "size", "file_size"];
const CHECKSUM_KEYS: &[&str] = &["checksum", "sha256", "md5"];
const DAY_NIGHT_KEYS: &[&str] = &["day_night", "dayNight", "day_night_indicator", "Day/Night Indicator"];

/// Outcome of mapping one provider object.
#[derive(Debug, Clone, PartialEq)]
pub enum Mapped {
    Scene(SceneRecord),
    /// Night acquisition; not part of the reconciled set.
    Night,
    /// No usable identity.
    Rejected(String),
}

fn probe<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    let nested = obj.get("properties").and_then(Value::as_object);
    keys.iter().find_map(|k| {
        obj.get(*k)
            .or_else(|| nested.and_then(|p| p.get(*k)))
            .filter(|v| !v.is_null())
    })
}

fn probe_str(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    probe(obj, keys).and_then(|v| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn probe_u64(obj: &Map<String, Value>, keys: &[&str]) -> Option<u64> {
    probe(obj, keys).and_then(|v| match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Accepts `2023-01-01`, `2023/01/01`, `20230101` and RFC 3339 timestamps.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Some(head) = raw.get(..10) {
        for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
            if let Ok(date) = NaiveDate::parse_from_str(head, fmt) {
                return Some(date);
            }
        }
    }
    raw.get(..8)
        .filter(|d| d.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y%m%d").ok())
}

fn probe_tile(obj: &Map<String, Value>) -> Option<TileId> {
    if let (Some(path), Some(row)) = (probe_str(obj, PATH_KEYS), probe_str(obj, ROW_KEYS)) {
        if let Ok(tile) = TileId::from_path_row_fields(&path, &row) {
            return Some(tile);
        }
    }
    probe_str(obj, TILE_KEYS).and_then(|t| t.parse().ok())
}

/// Map one scene object for `product`.
///
/// A parseable scene id wins. Otherwise the key is assembled from tile and
/// date fields; a missing date leaves `acquired` empty rather than guessing.
pub fn map_scene(value: &Value, product: Product) -> Mapped {
    let Some(obj) = value.as_object() else {
        return Mapped::Rejected(format!("scene entry is not an object: {value}"));
    };

    if let Some(flag) = probe_str(obj, DAY_NIGHT_KEYS) {
        if !flag.eq_ignore_ascii_case("DAY") {
            return Mapped::Night;
        }
    }

    let id = probe_str(obj, ID_KEYS);
    let parsed = id.as_deref().and_then(|id| SceneKey::parse_scene_id(id).ok());
    let key = match parsed {
        Some(key) => key,
        None => match probe_tile(obj) {
            Some(tile) => {
                let acquired = probe_str(obj, DATE_KEYS).and_then(|d| parse_date(&d));
                SceneKey::new(product, tile, acquired, product.default_version())
            }
            None => {
                return Mapped::Rejected(match id {
                    Some(id) => format!("unrecognized scene id {id:?} and no tile fields"),
                    None => "no scene id or tile fields".to_string(),
                })
            }
        },
    };

    let mut record = SceneRecord::new(key, Provenance::Provider);
    if let Some(uri) = probe_str(obj, URI_KEYS) {
        record = record.with_source_uri(uri);
    }
    if let Some(size) = probe_u64(obj, SIZE_KEYS) {
        record = record.with_size(size);
    }
    if let Some(checksum) = probe_str(obj, CHECKSUM_KEYS) {
        record = record.with_checksum(checksum);
    }
    Mapped::Scene(record)
}
