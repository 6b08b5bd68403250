//! One tool run: fetch, reconcile, report, optionally dispatch.
//!
//! Every stage runs against a single run deadline. The two inventory
//! fetches run concurrently and both must succeed before anything is
//! reconciled.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};

use gapfill_backfill::{BackfillDispatcher, BackfillOptions, DispatchOutcome};
use gapfill_catalog::CatalogIndex;
use gapfill_core::{Config, ConfigError, FailureKind, SceneQuery, Stage};
use gapfill_provider::ProviderInventory;
use gapfill_queue::{QueueInspector, QueueTransport};
use gapfill_reconcile::{Gap, ReconcileMode, ReconcileOptions, Reconciler};
use gapfill_report::{DeliveryResult, Report, ReportEmitter, ReportPublisher, ReportSink, RunContext};

use crate::error::RunError;

/// External systems a run talks to.
pub struct Components {
    pub catalog: Arc<dyn CatalogIndex>,
    pub provider: Arc<dyn ProviderInventory>,
    pub queue: Arc<dyn QueueTransport>,
    pub sinks: Vec<Box<dyn ReportSink>>,
}

#[derive(Debug, Clone)]
pub struct GapReportRequest {
    pub query: SceneQuery,
    pub today: NaiveDate,
    pub dispatch: bool,
    pub force: bool,
    pub include_unclassifiable: bool,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub report: Report,
    pub summary: String,
    pub deliveries: Vec<DeliveryResult>,
}

pub struct Pipeline {
    config: Config,
    grace_period_days: u32,
    environment: String,
    catalog: Arc<dyn CatalogIndex>,
    provider: Arc<dyn ProviderInventory>,
    queue: Arc<dyn QueueTransport>,
    publisher: ReportPublisher,
}

/// Run `fut` against `deadline`, mapping failure and expiry to a [`RunError`].
async fn staged<T, E: fmt::Display>(
    stage: Stage,
    kind: FailureKind,
    computed: bool,
    deadline: Instant,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, RunError> {
    match timeout_at(deadline, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(RunError::new(stage, kind, computed, e.to_string())),
        Err(_) => Err(RunError::timeout(stage, computed)),
    }
}

impl Pipeline {
    pub fn new(config: Config, components: Components) -> Result<Self, ConfigError> {
        config.validate()?;
        let grace_period_days = config
            .reconcile
            .grace_period_days
            .ok_or(ConfigError::Missing("GRACE_PERIOD_DAYS"))?;
        let emitter = ReportEmitter::new(config.report.alert_threshold);
        Ok(Self {
            grace_period_days,
            environment: config.profile_label().to_uppercase(),
            catalog: components.catalog,
            provider: components.provider,
            queue: components.queue,
            publisher: ReportPublisher::new(emitter, components.sinks),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// `RunConfig::timeout` is capped, so the addition cannot overflow.
    fn deadline(&self) -> Instant {
        Instant::now() + self.config.run.timeout()
    }

    pub async fn gap_report(&self, request: &GapReportRequest) -> Result<RunOutcome, RunError> {
        let deadline = self.deadline();
        let query = &request.query;
        info!(
            product = %query.product,
            range = %query.range,
            region = %query.region.name,
            catalog = %self.catalog.location(),
            provider = %self.provider.location(),
            dispatch = request.dispatch,
            force = request.force,
            "Gap report started"
        );

        let (indexed, upstream) = tokio::try_join!(
            staged(
                Stage::Catalog,
                FailureKind::CatalogUnavailable,
                false,
                deadline,
                self.catalog.list_indexed(query),
            ),
            staged(
                Stage::Provider,
                FailureKind::ProviderUnavailable,
                false,
                deadline,
                self.provider.list_provider(query),
            ),
        )?;

        let mode = if request.force {
            ReconcileMode::Force
        } else {
            ReconcileMode::Difference
        };
        let options = ReconcileOptions::new(self.grace_period_days)
            .with_exclusions(self.config.reconcile.exclusions.clone())
            .with_mode(mode);
        let result = Reconciler::new(options).reconcile_sets(query, upstream, indexed, request.today);

        let ctx = RunContext::new(self.environment.clone());
        let report = self.publisher.emitter().gap_report(&result, &ctx);
        let mut outcome = self.finish(report.into(), deadline).await?;

        if request.dispatch {
            let dispatched = self
                .dispatch(&result.gaps, request.include_unclassifiable, deadline)
                .await?;
            if let Report::Gap(ref mut gap_report) = outcome.report {
                gap_report.dispatch = Some(dispatched);
            }
        }
        Ok(outcome)
    }

    async fn dispatch(
        &self,
        gaps: &[Gap],
        include_unclassifiable: bool,
        deadline: Instant,
    ) -> Result<DispatchOutcome, RunError> {
        let options = BackfillOptions {
            concurrency: self.config.backfill.concurrency,
            max_per_second: self.config.backfill.max_per_second,
            include_unclassifiable,
        };
        let dispatcher = staged(
            Stage::Dispatch,
            FailureKind::QueueUnavailable,
            true,
            deadline,
            BackfillDispatcher::connect(
                self.queue.clone(),
                &self.config.queue.ingest_queue,
                self.config.retry.clone(),
                options,
            ),
        )
        .await?;

        timeout_at(deadline, dispatcher.dispatch(gaps))
            .await
            .map_err(|_| RunError::timeout(Stage::Dispatch, true))
    }

    pub async fn dead_letter(&self, queue: &str) -> Result<RunOutcome, RunError> {
        let deadline = self.deadline();
        let inspector = QueueInspector::new(
            self.queue.clone(),
            self.config.queue.receive_threshold,
            self.config.queue.inspect_max_messages,
        )
        .with_primary_peek(self.config.queue.peek_primary);
        let inspection = staged(
            Stage::Inspect,
            FailureKind::QueueUnavailable,
            false,
            deadline,
            inspector.inspect(queue),
        )
        .await?;

        let ctx = RunContext::new(self.environment.clone());
        let report = self.publisher.emitter().dead_letter_report(&inspection, &ctx);
        self.finish(report.into(), deadline).await
    }

    /// Deliver to every sink, then render the human summary.
    async fn finish(&self, mut report: Report, deadline: Instant) -> Result<RunOutcome, RunError> {
        let deliveries = timeout_at(deadline, self.publisher.publish(&mut report))
            .await
            .map_err(|_| RunError::timeout(Stage::Report, true))?;

        let summary = self.publisher.emitter().summary(&report).unwrap_or_else(|e| {
            warn!(error = %e, "Summary rendering failed");
            String::new()
        });
        Ok(RunOutcome {
            report,
            summary,
            deliveries,
        })
    }
}
