//! Canonical scene identity.
//!
//! Providers and the local catalog name the same acquisition differently
//! (USGS bulk ids, ESA product ids, COG directory names). Everything is
//! normalized into a [`SceneKey`] at the client boundary so reconciliation
//! is a plain set operation.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SceneError;

// ── Product ───────────────────────────────────────────────────

/// Products the gap tools know how to reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Product {
    #[serde(rename = "landsat_5")]
    Landsat5,
    #[serde(rename = "landsat_7")]
    Landsat7,
    #[serde(rename = "landsat_8")]
    Landsat8,
    #[serde(rename = "landsat_9")]
    Landsat9,
    #[serde(rename = "sentinel_2")]
    Sentinel2,
}

impl Product {
    pub const ALL: [Product; 5] = [
        Product::Landsat5,
        Product::Landsat7,
        Product::Landsat8,
        Product::Landsat9,
        Product::Sentinel2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Product::Landsat5 => "landsat_5",
            Product::Landsat7 => "landsat_7",
            Product::Landsat8 => "landsat_8",
            Product::Landsat9 => "landsat_9",
            Product::Sentinel2 => "sentinel_2",
        }
    }

    pub fn is_landsat(&self) -> bool {
        !matches!(self, Product::Sentinel2)
    }

    /// Mission prefix used in product ids (e.g. `LC08`).
    pub fn mission_prefix(&self) -> &'static str {
        match self {
            Product::Landsat5 => "LT05",
            Product::Landsat7 => "LE07",
            Product::Landsat8 => "LC08",
            Product::Landsat9 => "LC09",
            Product::Sentinel2 => "S2",
        }
    }

    /// Version assumed when a provider record does not carry one.
    ///
    /// Only level-2 collections are reconciled, so the version is a
    /// property of the product rather than of each scene.
    pub fn default_version(&self) -> &'static str {
        if self.is_landsat() {
            "C2L2"
        } else {
            "L2A"
        }
    }

    /// Resolve the mission code at the start of a product id.
    pub fn from_mission(code: &str) -> Option<Product> {
        match code.to_ascii_uppercase().as_str() {
            "LT05" => Some(Product::Landsat5),
            "LE07" => Some(Product::Landsat7),
            "LC08" | "LO08" => Some(Product::Landsat8),
            "LC09" | "LO09" => Some(Product::Landsat9),
            "S2A" | "S2B" | "S2C" => Some(Product::Sentinel2),
            _ => None,
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Product {
    type Err = SceneError;

    /// Accepts operator spellings such as `landsat_8`, `ls8`, `LC08`,
    /// `sentinel-2` or `s2_l2a`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "landsat5" | "ls5" | "l5" | "lt05" => Ok(Product::Landsat5),
            "landsat7" | "ls7" | "l7" | "le07" => Ok(Product::Landsat7),
            "landsat8" | "ls8" | "l8" | "lc08" => Ok(Product::Landsat8),
            "landsat9" | "ls9" | "l9" | "lc09" => Ok(Product::Landsat9),
            "sentinel2" | "s2" | "s2l2a" | "sentinel2l2a" => Ok(Product::Sentinel2),
            _ => Err(SceneError::UnknownProduct(s.to_string())),
        }
    }
}

// ── Tile ──────────────────────────────────────────────────────

/// Spatial tile of a scene: a WRS-2 path/row or an MGRS grid square.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TileId {
    PathRow { path: u16, row: u16 },
    Mgrs(String),
}

impl TileId {
    pub fn path_row(path: u16, row: u16) -> Self {
        TileId::PathRow { path, row }
    }

    /// Build a path/row from the separate, possibly unpadded, fields found
    /// in provider metadata (`"72"`, `"083"`).
    pub fn from_path_row_fields(path: &str, row: &str) -> Result<Self, SceneError> {
        let parse = |v: &str| {
            v.trim()
                .parse::<u16>()
                .ok()
                .filter(|n| *n < 1000)
                .ok_or_else(|| SceneError::InvalidTile(format!("{path}/{row}")))
        };
        Ok(TileId::PathRow {
            path: parse(path)?,
            row: parse(row)?,
        })
    }

    pub fn mgrs(code: &str) -> Result<Self, SceneError> {
        let upper = code.trim().to_ascii_uppercase();
        let code = upper
            .strip_prefix('T')
            .filter(|c| c.len() == 5)
            .unwrap_or(upper.as_str());
        let bytes = code.as_bytes();
        let valid = bytes.len() == 5
            && bytes[..2].iter().all(u8::is_ascii_digit)
            && bytes[2..].iter().all(u8::is_ascii_uppercase);
        if !valid {
            return Err(SceneError::InvalidTile(code.to_string()));
        }
        Ok(TileId::Mgrs(code.to_string()))
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileId::PathRow { path, row } => write!(f, "{path:03}{row:03}"),
            TileId::Mgrs(code) => f.write_str(code),
        }
    }
}

impl FromStr for TileId {
    type Err = SceneError;

    /// Digits-only input is a path/row (left-padded to six digits, so the
    /// integer form `70068` of `070068` is accepted); anything else must be
    /// an MGRS square.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !s.is_empty() && s.len() <= 6 && s.bytes().all(|b| b.is_ascii_digit()) {
            let padded = format!("{s:0>6}");
            return TileId::from_path_row_fields(&padded[..3], &padded[3..]);
        }
        TileId::mgrs(s)
    }
}

impl TryFrom<String> for TileId {
    type Error = SceneError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TileId> for String {
    fn from(tile: TileId) -> Self {
        tile.to_string()
    }
}

// ── SceneKey ──────────────────────────────────────────────────

/// Join key for reconciliation.
///
/// `acquired` is `None` only when the upstream record carried no usable
/// acquisition date; such scenes are reported as unclassifiable gaps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SceneKey {
    pub product: Product,
    pub tile: TileId,
    pub acquired: Option<NaiveDate>,
    pub version: String,
}

impl SceneKey {
    pub fn new(
        product: Product,
        tile: TileId,
        acquired: Option<NaiveDate>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            product,
            tile,
            acquired,
            version: version.into().to_ascii_uppercase(),
        }
    }

    /// Stable `product/tile/date/version` form used for hashing and display.
    pub fn canonical(&self) -> String {
        let date = self
            .acquired
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        format!("{}/{}/{}/{}", self.product, self.tile, date, self.version)
    }

    /// Parse any supported product id naming convention.
    pub fn parse_scene_id(id: &str) -> Result<Self, SceneError> {
        let id = id
            .trim()
            .trim_end_matches('/')
            .trim_end_matches(".SAFE")
            .trim_end_matches("_stac.json")
            .trim_end_matches(".json");
        if id.starts_with("S2") {
            parse_sentinel2_id(id)
        } else if id.starts_with('L') {
            parse_landsat_id(id)
        } else {
            Err(SceneError::UnrecognizedId(id.to_string()))
        }
    }

    /// Find the scene id inside an object-store key.
    ///
    /// Directory segments are tried from the deepest one up, so both
    /// `.../LC08_..._T1/LC08_..._T1_stac.json` and `.../S2A_34HBH_20230101_0_L2A/`
    /// resolve to the scene directory.
    pub fn from_object_path(path: &str) -> Result<Self, SceneError> {
        let trimmed = path.trim_end_matches('/');
        let mut segments: Vec<&str> = trimmed.split('/').collect();
        if !path.ends_with('/') && segments.len() > 1 {
            segments.pop();
        }
        segments
            .iter()
            .rev()
            .find_map(|seg| SceneKey::parse_scene_id(seg).ok())
            .ok_or_else(|| SceneError::UnrecognizedId(path.to_string()))
    }
}

impl fmt::Display for SceneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// `LC08_L2SP_172083_20230101_20230110_02_T1`
fn parse_landsat_id(id: &str) -> Result<SceneKey, SceneError> {
    let bad = || SceneError::UnrecognizedId(id.to_string());
    let parts: Vec<&str> = id.split('_').collect();
    if parts.len() < 6 {
        return Err(bad());
    }
    let product = Product::from_mission(parts[0]).ok_or_else(bad)?;
    if !product.is_landsat() {
        return Err(bad());
    }
    let (path, row) = parts[2]
        .get(..3)
        .zip(parts[2].get(3..))
        .filter(|_| parts[2].len() == 6 && parts[2].bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(bad)?;
    let tile = TileId::from_path_row_fields(path, row).map_err(|_| bad())?;
    let acquired = NaiveDate::parse_from_str(parts[3], "%Y%m%d").map_err(|_| bad())?;
    let level = parts[1].get(..2).filter(|l| l.starts_with('L')).ok_or_else(bad)?;
    let collection = parts[5].trim_start_matches('0');
    if collection.is_empty() || !collection.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    Ok(SceneKey::new(
        product,
        tile,
        Some(acquired),
        format!("C{collection}{level}"),
    ))
}

/// `S2A_MSIL2A_20230101T080321_N0509_R035_T34HBH_20230101T100000` (ESA) or
/// `S2A_34HBH_20230101_0_L2A` (COG catalog).
fn parse_sentinel2_id(id: &str) -> Result<SceneKey, SceneError> {
    let bad = || SceneError::UnrecognizedId(id.to_string());
    let parts: Vec<&str> = id.split('_').collect();
    Product::from_mission(parts[0])
        .filter(|p| *p == Product::Sentinel2)
        .ok_or_else(bad)?;

    let (tile, date, level) = if parts.len() >= 6 && parts[1].starts_with("MSI") {
        let tile = parts
            .iter()
            .skip(2)
            .find(|p| p.len() == 6 && p.starts_with('T'))
            .ok_or_else(bad)?;
        (*tile, parts[2].get(..8).ok_or_else(bad)?, &parts[1][3..])
    } else if parts.len() >= 5 {
        (parts[1], parts[2], parts[4])
    } else {
        return Err(bad());
    };

    let tile = TileId::mgrs(tile).map_err(|_| bad())?;
    let acquired = NaiveDate::parse_from_str(date, "%Y%m%d").map_err(|_| bad())?;
    Ok(SceneKey::new(Product::Sentinel2, tile, Some(acquired), level))
}

// ── SceneRecord / SceneSet ────────────────────────────────────

/// Which inventory a record was observed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Provider,
    Indexed,
}

/// One observation of a scene in one inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneRecord {
    pub key: SceneKey,
    pub provenance: Provenance,
    pub source_uri: Option<String>,
    pub size_bytes: Option<u64>,
    pub checksum: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl SceneRecord {
    pub fn new(key: SceneKey, provenance: Provenance) -> Self {
        Self {
            key,
            provenance,
            source_uri: None,
            size_bytes: None,
            checksum: None,
            observed_at: Utc::now(),
        }
    }

    pub fn with_source_uri(mut self, uri: impl Into<String>) -> Self {
        self.source_uri = Some(uri.into());
        self
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }
}

/// Records keyed by canonical scene key, iterated in key order.
///
/// Re-observing a key keeps the first record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneSet(BTreeMap<SceneKey, SceneRecord>);

impl SceneSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record; returns `false` when the key was already present.
    pub fn insert(&mut self, record: SceneRecord) -> bool {
        use std::collections::btree_map::Entry;
        match self.0.entry(record.key.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    pub fn contains(&self, key: &SceneKey) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &SceneKey) -> Option<&SceneRecord> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &SceneKey> {
        self.0.keys()
    }

    pub fn records(&self) -> impl Iterator<Item = &SceneRecord> {
        self.0.values()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&SceneKey) -> bool) {
        self.0.retain(|k, _| keep(k));
    }
}

impl FromIterator<SceneRecord> for SceneSet {
    fn from_iter<I: IntoIterator<Item = SceneRecord>>(iter: I) -> Self {
        let mut set = SceneSet::new();
        for record in iter {
            set.insert(record);
        }
        set
    }
}

impl Extend<SceneRecord> for SceneSet {
    fn extend<I: IntoIterator<Item = SceneRecord>>(&mut self, iter: I) {
        for record in iter {
            self.insert(record);
        }
    }
}

impl IntoIterator for SceneSet {
    type Item = SceneRecord;
    type IntoIter = std::collections::btree_map::IntoValues<SceneKey, SceneRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_values()
    }
}
