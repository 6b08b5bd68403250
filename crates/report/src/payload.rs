//! Structured report payloads.
//!
//! Every payload carries [`SCHEMA_VERSION`]. Fields are only ever added; a
//! breaking change bumps the version.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use gapfill_backfill::DispatchOutcome;
use gapfill_core::{DateRange, Product};
use gapfill_queue::{ClassifiedMessage, DeadLetterReason, Inspection, MessageClass};
use gapfill_reconcile::{Gap, ReconcileMode, Reconciliation, Severity};

use crate::error::ReportError;
use crate::templating::SummaryRenderer;

pub const SCHEMA_VERSION: u32 = 1;

/// Identity of the run producing a report.
#[derive(Debug, Clone, Serialize)]
pub struct RunContext {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    /// Deployment label shown in summaries (e.g. "DEV", "PROD").
    pub environment: String,
}

impl RunContext {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            environment: environment.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GapCounts {
    pub provider: usize,
    pub indexed: usize,
    pub excluded: usize,
    pub gaps: usize,
    pub expected: usize,
    pub stale: usize,
    pub unclassifiable: usize,
    pub orphans: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GapEntry {
    pub scene_id: String,
    pub tile: String,
    pub acquired: Option<NaiveDate>,
    pub age_days: Option<i64>,
    pub severity: Severity,
    pub source_uri: Option<String>,
}

impl From<&Gap> for GapEntry {
    fn from(gap: &Gap) -> Self {
        Self {
            scene_id: gap.record.key.canonical(),
            tile: gap.record.key.tile.to_string(),
            acquired: gap.record.key.acquired,
            age_days: gap.age_days,
            severity: gap.severity,
            source_uri: gap.record.source_uri.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrphanEntry {
    pub scene_id: String,
    pub tile: String,
    pub acquired: Option<NaiveDate>,
    pub source_uri: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GapReport {
    pub schema_version: u32,
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub environment: String,
    pub product: Product,
    pub range: DateRange,
    pub region: String,
    pub today: NaiveDate,
    pub mode: ReconcileMode,
    pub grace_period_days: u32,
    pub counts: GapCounts,
    pub gaps: Vec<GapEntry>,
    pub orphans: Vec<OrphanEntry>,
    /// Present when the run also dispatched backfills.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<DispatchOutcome>,
    /// Where the report was stored, once a sink has written it.
    pub location: Option<String>,
}

impl GapReport {
    pub fn is_empty(&self) -> bool {
        self.gaps.is_empty() && self.orphans.is_empty()
    }
}

/// One classified queue message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageEntry {
    pub message_id: String,
    pub receive_count: u32,
    pub enqueued_at: DateTime<Utc>,
    /// `None` when the body names no recognizable scene.
    pub scene_id: Option<String>,
    #[serde(flatten)]
    pub class: MessageClass,
}

impl From<&ClassifiedMessage> for MessageEntry {
    fn from(m: &ClassifiedMessage) -> Self {
        Self {
            message_id: m.message.id.clone(),
            receive_count: m.message.receive_count,
            enqueued_at: m.message.enqueued_at,
            scene_id: m.scene.as_ref().map(|k| k.canonical()),
            class: m.class,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeadLetterReport {
    pub schema_version: u32,
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub environment: String,
    pub queue: String,
    pub dead_letter_queue: Option<String>,
    pub threshold: Option<u32>,
    /// Whether the primary queue was read; otherwise `in_flight` is empty and
    /// only `approximate_in_flight` is known.
    pub primary_peeked: bool,
    pub in_flight: Vec<MessageEntry>,
    pub unparsed: usize,
    pub approximate_depth: Option<u64>,
    pub approximate_in_flight: Option<u64>,
    pub dead_letter_depth: Option<u64>,
    pub inspected_at: DateTime<Utc>,
    pub dead_letter: Vec<MessageEntry>,
    pub location: Option<String>,
}

impl DeadLetterReport {
    pub fn count_reason(&self, pred: impl Fn(&DeadLetterReason) -> bool) -> usize {
        self.dead_letter
            .iter()
            .filter(|e| matches!(e.class, MessageClass::DeadLetter { ref reason } if pred(reason)))
            .count()
    }
}

/// A report of either kind, as handed to sinks.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Report {
    Gap(GapReport),
    DeadLetter(DeadLetterReport),
}

impl Report {
    pub fn run_id(&self) -> Uuid {
        match self {
            Report::Gap(r) => r.run_id,
            Report::DeadLetter(r) => r.run_id,
        }
    }

    pub fn location(&self) -> Option<&str> {
        match self {
            Report::Gap(r) => r.location.as_deref(),
            Report::DeadLetter(r) => r.location.as_deref(),
        }
    }

    pub fn set_location(&mut self, location: String) {
        match self {
            Report::Gap(r) => r.location = Some(location),
            Report::DeadLetter(r) => r.location = Some(location),
        }
    }

    /// Nothing worth storing: no gaps, orphans or dead letters.
    pub fn is_empty(&self) -> bool {
        match self {
            Report::Gap(r) => r.is_empty(),
            Report::DeadLetter(r) => r.dead_letter.is_empty(),
        }
    }

    /// Object name under the report prefix, e.g. `landsat_8_2023-01-10_gap_report.json`.
    pub fn object_name(&self) -> String {
        match self {
            Report::Gap(r) => {
                let date = r.generated_at.format("%Y-%m-%d");
                match r.mode {
                    ReconcileMode::Difference => format!("{}_{date}_gap_report.json", r.product),
                    ReconcileMode::Force => format!("{}_{date}_gap_report_update.json", r.product),
                }
            }
            Report::DeadLetter(r) => {
                format!("{}_{}_dead_letter_report.json", r.queue, r.generated_at.format("%Y-%m-%d"))
            }
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value, ReportError> {
        Ok(match self {
            Report::Gap(r) => serde_json::to_value(r)?,
            Report::DeadLetter(r) => serde_json::to_value(r)?,
        })
    }
}

impl From<GapReport> for Report {
    fn from(r: GapReport) -> Self {
        Report::Gap(r)
    }
}

impl From<DeadLetterReport> for Report {
    fn from(r: DeadLetterReport) -> Self {
        Report::DeadLetter(r)
    }
}

/// Flat, stable summary for external notifiers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertPayload {
    pub schema_version: u32,
    pub kind: &'static str,
    pub run_id: Uuid,
    pub environment: String,
    pub product: Option<Product>,
    pub queue: Option<String>,
    pub gaps: usize,
    pub expected: usize,
    pub stale: usize,
    pub unclassifiable: usize,
    pub orphans: usize,
    pub dead_letter: usize,
    pub failed_dispatches: usize,
    pub alert_threshold: usize,
    pub threshold_exceeded: bool,
    pub report_uri: Option<String>,
    /// Short human-readable summary; chat webhooks display this field.
    pub text: String,
}

/// Builds reports and alert payloads. Never filters or reorders entries.
#[derive(Debug, Clone)]
pub struct ReportEmitter {
    alert_threshold: usize,
    renderer: SummaryRenderer,
}

impl ReportEmitter {
    pub fn new(alert_threshold: usize) -> Self {
        Self {
            alert_threshold,
            renderer: SummaryRenderer::new(),
        }
    }

    pub fn alert_threshold(&self) -> usize {
        self.alert_threshold
    }

    pub fn gap_report(&self, result: &Reconciliation, ctx: &RunContext) -> GapReport {
        let counts = GapCounts {
            provider: result.provider_count,
            indexed: result.indexed_count,
            excluded: result.excluded_count,
            gaps: result.gaps.len(),
            expected: result.count(Severity::Expected),
            stale: result.count(Severity::Stale),
            unclassifiable: result.count(Severity::Unclassifiable),
            orphans: result.orphans.len(),
        };
        GapReport {
            schema_version: SCHEMA_VERSION,
            run_id: ctx.run_id,
            generated_at: ctx.generated_at,
            environment: ctx.environment.clone(),
            product: result.query.product,
            range: result.query.range,
            region: result.query.region.name.clone(),
            today: result.today,
            mode: result.mode,
            grace_period_days: result.grace_period_days,
            counts,
            gaps: result.gaps.iter().map(GapEntry::from).collect(),
            orphans: result
                .orphans
                .iter()
                .map(|r| OrphanEntry {
                    scene_id: r.key.canonical(),
                    tile: r.key.tile.to_string(),
                    acquired: r.key.acquired,
                    source_uri: r.source_uri.clone(),
                })
                .collect(),
            dispatch: None,
            location: None,
        }
    }

    pub fn dead_letter_report(&self, inspection: &Inspection, ctx: &RunContext) -> DeadLetterReport {
        let dead_letter: Vec<MessageEntry> = inspection.dead_letter.iter().map(MessageEntry::from).collect();
        DeadLetterReport {
            schema_version: SCHEMA_VERSION,
            run_id: ctx.run_id,
            generated_at: ctx.generated_at,
            environment: ctx.environment.clone(),
            queue: inspection.queue.clone(),
            dead_letter_queue: inspection.dead_letter_queue.clone(),
            threshold: inspection.threshold,
            primary_peeked: inspection.primary_peeked,
            in_flight: inspection.in_flight.iter().map(MessageEntry::from).collect(),
            unparsed: dead_letter.iter().filter(|e| e.scene_id.is_none()).count(),
            approximate_depth: inspection.approximate_depth,
            approximate_in_flight: inspection.approximate_in_flight,
            dead_letter_depth: inspection.dead_letter_depth,
            inspected_at: inspection.inspected_at,
            dead_letter,
            location: None,
        }
    }

    /// Alert payload for `report` as it stands (including any stored location).
    ///
    /// A forced re-drive reports every provider scene as a gap, so it never
    /// trips the threshold.
    pub fn alert(&self, report: &Report) -> Result<AlertPayload, ReportError> {
        let text = self.renderer.render_alert_text(report)?;
        let payload = match report {
            Report::Gap(r) => {
                let failed_dispatches = r.dispatch.as_ref().map_or(0, |d| d.failed);
                AlertPayload {
                    schema_version: SCHEMA_VERSION,
                    kind: "gap_report",
                    run_id: r.run_id,
                    environment: r.environment.clone(),
                    product: Some(r.product),
                    queue: None,
                    gaps: r.counts.gaps,
                    expected: r.counts.expected,
                    stale: r.counts.stale,
                    unclassifiable: r.counts.unclassifiable,
                    orphans: r.counts.orphans,
                    dead_letter: 0,
                    failed_dispatches,
                    alert_threshold: self.alert_threshold,
                    threshold_exceeded: r.mode == ReconcileMode::Difference
                        && (r.counts.gaps > self.alert_threshold || r.counts.orphans > self.alert_threshold),
                    report_uri: r.location.clone(),
                    text,
                }
            }
            Report::DeadLetter(r) => AlertPayload {
                schema_version: SCHEMA_VERSION,
                kind: "dead_letter_report",
                run_id: r.run_id,
                environment: r.environment.clone(),
                product: None,
                queue: Some(r.queue.clone()),
                gaps: 0,
                expected: 0,
                stale: 0,
                unclassifiable: 0,
                orphans: 0,
                dead_letter: r.dead_letter.len(),
                failed_dispatches: 0,
                alert_threshold: self.alert_threshold,
                threshold_exceeded: r.dead_letter.len() > self.alert_threshold,
                report_uri: r.location.clone(),
                text,
            },
        };
        Ok(payload)
    }

    /// Full human-readable summary, grouped by severity or classification.
    pub fn summary(&self, report: &Report) -> Result<String, ReportError> {
        self.renderer.render_summary(report)
    }
}
