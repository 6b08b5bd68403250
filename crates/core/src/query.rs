//! Query keys shared by both inventory clients.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::SceneError;
use crate::scene::{Product, SceneKey, TileId};

/// Inclusive acquisition date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, SceneError> {
        if start > end {
            return Err(SceneError::InvalidDateRange(format!("{start}..{end}")));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Calendar years touched by the range (catalog layouts partition by year).
    pub fn years(&self) -> RangeInclusive<i32> {
        self.start.year()..=self.end.year()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl FromStr for DateRange {
    type Err = SceneError;

    /// `2023-01-01..2023-01-31`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once("..")
            .ok_or_else(|| SceneError::InvalidDateRange(s.to_string()))?;
        let parse = |v: &str| {
            NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d")
                .map_err(|_| SceneError::InvalidDateRange(s.to_string()))
        };
        DateRange::new(parse(start)?, parse(end)?)
    }
}

/// Named area of interest.
///
/// The name is forwarded to upstream services; the optional tile allow-list
/// is applied locally to both inventories. No allow-list admits every tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub tiles: Option<BTreeSet<TileId>>,
}

impl Region {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tiles: None,
        }
    }

    pub fn with_tiles(mut self, tiles: impl IntoIterator<Item = TileId>) -> Self {
        self.tiles = Some(tiles.into_iter().collect());
        self
    }

    pub fn admits(&self, tile: &TileId) -> bool {
        self.tiles.as_ref().map_or(true, |allowed| allowed.contains(tile))
    }

    /// Parse a tile list: one tile per line or comma separated, `#` starts a
    /// comment. Integer path/rows such as `172083` are accepted.
    pub fn parse_tile_list(text: &str) -> Result<BTreeSet<TileId>, SceneError> {
        text.lines()
            .map(|line| line.split('#').next().unwrap_or(""))
            .flat_map(|line| line.split(','))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::parse)
            .collect()
    }
}

/// The key both inventories are queried by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneQuery {
    pub product: Product,
    pub range: DateRange,
    pub region: Region,
}

impl SceneQuery {
    pub fn new(product: Product, range: DateRange, region: Region) -> Self {
        Self {
            product,
            range,
            region,
        }
    }

    /// Whether a key falls inside this query.
    ///
    /// Keys without an acquisition date are admitted: the upstream already
    /// scoped them to the range and they must surface as unclassifiable.
    pub fn admits(&self, key: &SceneKey) -> bool {
        key.product == self.product
            && key.acquired.map_or(true, |d| self.range.contains(d))
            && self.region.admits(&key.tile)
    }
}

/// Products and/or date ranges left out of reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    pub product: Option<Product>,
    pub range: Option<DateRange>,
}

impl Exclusion {
    pub fn excludes(&self, key: &SceneKey) -> bool {
        let product_match = self.product.map_or(true, |p| p == key.product);
        let range_match = match (self.range, key.acquired) {
            (None, _) => true,
            (Some(range), Some(date)) => range.contains(date),
            (Some(_), None) => false,
        };
        product_match && range_match
    }

    /// Parse a comma-separated list of exclusions.
    pub fn parse_list(s: &str) -> Result<Vec<Exclusion>, SceneError> {
        s.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl FromStr for Exclusion {
    type Err = SceneError;

    /// `landsat_7`, `landsat_7@2003-05-31..2023-12-31` or `*@2020-01-01..2020-01-31`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (product, range) = match s.split_once('@') {
            Some((p, r)) => (p.trim(), Some(r.parse::<DateRange>()?)),
            None => (s.trim(), None),
        };
        let product = match product {
            "" | "*" => None,
            p => Some(p.parse::<Product>()?),
        };
        if product.is_none() && range.is_none() {
            return Err(SceneError::InvalidExclusion(s.to_string()));
        }
        Ok(Exclusion { product, range })
    }
}
