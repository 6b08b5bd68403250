//! Set reconciliation of the provider record against the local catalog.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use gapfill_catalog::CatalogIndex;
use gapfill_core::{Exclusion, SceneQuery, SceneRecord, SceneSet};
use gapfill_provider::ProviderInventory;

use crate::error::ReconcileError;
use crate::gap::{severity_for, Gap, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    /// Gaps are provider scenes missing from the catalog.
    #[default]
    Difference,
    /// Every provider scene is a gap and nothing is an orphan (full re-drive).
    Force,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOptions {
    pub grace_period_days: u32,
    pub exclusions: Vec<Exclusion>,
    pub mode: ReconcileMode,
}

impl ReconcileOptions {
    pub fn new(grace_period_days: u32) -> Self {
        Self {
            grace_period_days,
            exclusions: Vec::new(),
            mode: ReconcileMode::Difference,
        }
    }

    pub fn with_exclusions(mut self, exclusions: Vec<Exclusion>) -> Self {
        self.exclusions = exclusions;
        self
    }

    pub fn with_mode(mut self, mode: ReconcileMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Output of one reconciliation. Gaps and orphans are in key order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    pub query: SceneQuery,
    pub today: NaiveDate,
    pub grace_period_days: u32,
    pub mode: ReconcileMode,
    pub provider_count: usize,
    pub indexed_count: usize,
    pub excluded_count: usize,
    pub gaps: Vec<Gap>,
    /// Indexed scenes the provider has no record of.
    pub orphans: Vec<SceneRecord>,
}

impl Reconciliation {
    pub fn count(&self, severity: Severity) -> usize {
        self.gaps.iter().filter(|g| g.severity == severity).count()
    }

    pub fn counts_by_severity(&self) -> BTreeMap<Severity, usize> {
        Severity::ALL.iter().map(|s| (*s, self.count(*s))).collect()
    }
}

fn apply_exclusions(set: &mut SceneSet, exclusions: &[Exclusion]) -> usize {
    let before = set.len();
    if !exclusions.is_empty() {
        set.retain(|key| !exclusions.iter().any(|e| e.excludes(key)));
    }
    before - set.len()
}

/// Reconcile two already-fetched sets. Pure: same inputs, same output.
pub fn reconcile(
    query: &SceneQuery,
    mut provider: SceneSet,
    mut indexed: SceneSet,
    options: &ReconcileOptions,
    today: NaiveDate,
) -> Reconciliation {
    let excluded_count = apply_exclusions(&mut provider, &options.exclusions)
        + apply_exclusions(&mut indexed, &options.exclusions);

    let provider_count = provider.len();
    let indexed_count = indexed.len();

    let orphans = match options.mode {
        ReconcileMode::Difference => indexed
            .records()
            .filter(|r| !provider.contains(&r.key))
            .cloned()
            .collect(),
        ReconcileMode::Force => Vec::new(),
    };

    let gaps = provider
        .into_iter()
        .filter(|r| options.mode == ReconcileMode::Force || !indexed.contains(&r.key))
        .map(|record| {
            let (age_days, severity) = severity_for(record.key.acquired, today, options.grace_period_days);
            Gap {
                record,
                age_days,
                severity,
            }
        })
        .collect();

    Reconciliation {
        query: query.clone(),
        today,
        grace_period_days: options.grace_period_days,
        mode: options.mode,
        provider_count,
        indexed_count,
        excluded_count,
        gaps,
        orphans,
    }
}

/// Fetches both inventories concurrently, then reconciles.
pub struct Reconciler {
    options: ReconcileOptions,
}

impl Reconciler {
    pub fn new(options: ReconcileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Either listing failing aborts the run before any reconciliation.
    pub async fn run(
        &self,
        catalog: &dyn CatalogIndex,
        provider: &dyn ProviderInventory,
        query: &SceneQuery,
        today: NaiveDate,
    ) -> Result<Reconciliation, ReconcileError> {
        let (indexed, upstream) = tokio::try_join!(
            async { catalog.list_indexed(query).await.map_err(ReconcileError::from) },
            async { provider.list_provider(query).await.map_err(ReconcileError::from) },
        )?;
        debug!(indexed = indexed.len(), provider = upstream.len(), "Inventories fetched");
        Ok(self.reconcile_sets(query, upstream, indexed, today))
    }

    /// Reconcile inventories the caller fetched itself.
    pub fn reconcile_sets(
        &self,
        query: &SceneQuery,
        provider: SceneSet,
        indexed: SceneSet,
        today: NaiveDate,
    ) -> Reconciliation {
        let result = reconcile(query, provider, indexed, &self.options, today);
        info!(
            product = %query.product,
            mode = ?result.mode,
            provider = result.provider_count,
            indexed = result.indexed_count,
            excluded = result.excluded_count,
            gaps = result.gaps.len(),
            stale = result.count(Severity::Stale),
            unclassifiable = result.count(Severity::Unclassifiable),
            orphans = result.orphans.len(),
            "Reconciled"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gapfill_catalog::MemoryCatalog;
    use gapfill_core::{Product, Provenance, Region, SceneKey, TileId};
    use gapfill_provider::MemoryProvider;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn key(row: u16, date: Option<&str>) -> SceneKey {
        SceneKey::new(Product::Landsat8, TileId::path_row(172, row), date.map(d), "C2L2")
    }

    fn set(keys: &[SceneKey], provenance: Provenance) -> SceneSet {
        keys.iter().map(|k| SceneRecord::new(k.clone(), provenance)).collect()
    }

    fn query() -> SceneQuery {
        SceneQuery::new(Product::Landsat8, "2023-01-01..2023-01-31".parse().unwrap(), Region::named("africa"))
    }

    #[test]
    fn difference_gaps_and_orphans() {
        let provider = set(&[key(1, Some("2023-01-01")), key(2, Some("2023-01-02"))], Provenance::Provider);
        let indexed = set(&[key(1, Some("2023-01-01")), key(3, Some("2023-01-03"))], Provenance::Indexed);
        let result = reconcile(&query(), provider, indexed, &ReconcileOptions::new(3), d("2023-01-10"));

        assert_eq!(result.gaps.len(), 1);
        assert_eq!(result.gaps[0].record.key, key(2, Some("2023-01-02")));
        assert_eq!(result.gaps[0].severity, Severity::Stale);
        assert_eq!(result.gaps[0].age_days, Some(8));
        assert_eq!(result.orphans.len(), 1);
        assert_eq!(result.orphans[0].key, key(3, Some("2023-01-03")));
    }

    #[test]
    fn force_mode_redrives_everything() {
        let provider = set(&[key(1, Some("2023-01-01")), key(2, None)], Provenance::Provider);
        let indexed = set(&[key(1, Some("2023-01-01")), key(3, Some("2023-01-03"))], Provenance::Indexed);
        let options = ReconcileOptions::new(3).with_mode(ReconcileMode::Force);
        let result = reconcile(&query(), provider, indexed, &options, d("2023-01-10"));

        assert_eq!(result.gaps.len(), 2);
        assert!(result.orphans.is_empty());
        assert_eq!(result.count(Severity::Unclassifiable), 1);
    }

    #[test]
    fn exclusions_apply_to_both_sides() {
        let provider = set(&[key(1, Some("2023-01-05")), key(2, Some("2023-01-20"))], Provenance::Provider);
        let indexed = set(&[key(3, Some("2023-01-06"))], Provenance::Indexed);
        let options = ReconcileOptions::new(3)
            .with_exclusions(Exclusion::parse_list("landsat_8@2023-01-01..2023-01-10").unwrap());
        let result = reconcile(&query(), provider, indexed, &options, d("2023-01-21"));

        assert_eq!(result.excluded_count, 2);
        assert_eq!(result.gaps.len(), 1);
        assert_eq!(result.gaps[0].severity, Severity::Expected);
        assert!(result.orphans.is_empty());
    }

    #[test]
    fn counts_cover_every_severity() {
        let result = reconcile(&query(), SceneSet::new(), SceneSet::new(), &ReconcileOptions::new(1), d("2023-01-10"));
        let counts = result.counts_by_severity();
        assert_eq!(counts.len(), 3);
        assert!(counts.values().all(|c| *c == 0));
    }

    #[tokio::test]
    async fn run_end_to_end() {
        let catalog = MemoryCatalog::new([key(1, Some("2023-01-01"))]);
        let provider = MemoryProvider::new([key(1, Some("2023-01-01")), key(2, Some("2023-01-02"))]);
        let reconciler = Reconciler::new(ReconcileOptions::new(3));
        let result = reconciler.run(&catalog, &provider, &query(), d("2023-01-10")).await.unwrap();

        assert_eq!(result.gaps.len(), 1);
        assert_eq!(result.gaps[0].record.key, key(2, Some("2023-01-02")));
        assert_eq!(result.gaps[0].severity, Severity::Stale);
        assert_eq!(result.gaps[0].age_days, Some(8));
    }

    #[tokio::test]
    async fn catalog_failure_aborts() {
        let catalog = MemoryCatalog::failing("listing denied");
        let provider = MemoryProvider::new([key(1, Some("2023-01-01"))]);
        let err = Reconciler::new(ReconcileOptions::new(3))
            .run(&catalog, &provider, &query(), d("2023-01-10"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Catalog(_)));
    }

    #[tokio::test]
    async fn provider_failure_aborts() {
        let catalog = MemoryCatalog::new(Vec::<SceneKey>::new());
        let provider = MemoryProvider::failing("503");
        let err = Reconciler::new(ReconcileOptions::new(3))
            .run(&catalog, &provider, &query(), d("2023-01-10"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Provider(_)));
    }
}
