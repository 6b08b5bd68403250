//! Minijinja rendering of human-readable report summaries.
//!
//! Templates are fixed strings, so a fresh [`minijinja::Environment`] is built
//! per render call. Rendering never reorders or drops entries.

use serde::Serialize;

use gapfill_backfill::DispatchOutcome;
use gapfill_queue::{DeadLetterReason, MessageClass};
use gapfill_reconcile::Severity;

use crate::error::ReportError;
use crate::payload::{MessageEntry, DeadLetterReport, GapCounts, GapEntry, GapReport, OrphanEntry, Report};

const GAP_ALERT_TEXT: &str = r#"*{{ product | upper }} GAP REPORT - {{ environment }}*
Missing Scenes: {{ counts.gaps }}
Orphan Scenes: {{ counts.orphans }}
Report: {% if location %}{{ location }}{% elif counts.gaps == 0 and counts.orphans == 0 %}No missing scenes were found{% else %}not stored{% endif %}"#;

const GAP_SUMMARY: &str = r#"{{ product | upper }} gap report ({{ environment }}) for {{ range }} in {{ region }}
Provider: {{ counts.provider }}, indexed: {{ counts.indexed }}, excluded: {{ counts.excluded }}, grace: {{ grace_period_days }} days
{% for group in groups %}
{{ group.severity }} ({{ group.count | plural("gap") }})
{%- for gap in group.scenes %}
  {{ gap.scene_id }}{% if gap.acquired %} age {{ gap.age_days }}d{% endif %}
{%- endfor %}
{% endfor %}
orphan ({{ counts.orphans | plural("scene") }})
{%- for orphan in orphans %}
  {{ orphan.scene_id }}
{%- endfor %}
{% if dispatch %}
dispatch: {{ dispatch.requested }} requested, {{ dispatch.skipped }} skipped, {{ dispatch.failed }} failed
{% endif %}"#;

const DEAD_LETTER_ALERT_TEXT: &str = r#"*DEAD-LETTER REPORT {{ queue }} - {{ environment }}*
Dead-letter messages: {{ dead_letter_count }}
Unparsed: {{ unparsed }}
Report: {% if location %}{{ location }}{% else %}not stored{% endif %}"#;

const DEAD_LETTER_SUMMARY: &str = r#"Dead-letter report for {{ queue }} ({{ environment }})
Threshold: {% if threshold %}{{ threshold }} receives{% else %}none{% endif %}, in flight: {{ in_flight_label }}
{% for group in groups %}
{{ group.label }} ({{ group.count | plural("message") }})
{%- for m in group.messages %}
  {{ m.message_id }} receives={{ m.receive_count }} scene={% if m.scene_id %}{{ m.scene_id }}{% else %}unparsed{% endif %}
{%- endfor %}
{% endfor %}
{%- if in_flight %}
in_flight ({{ in_flight | length | plural("message") }})
{%- for m in in_flight %}
  {{ m.message_id }} receives={{ m.receive_count }} scene={% if m.scene_id %}{{ m.scene_id }}{% else %}unparsed{% endif %}
{%- endfor %}
{% endif %}"#;

#[derive(Serialize)]
struct SeverityGroup<'a> {
    severity: &'static str,
    count: usize,
    scenes: Vec<&'a GapEntry>,
}

#[derive(Serialize)]
struct GapContext<'a> {
    product: String,
    environment: &'a str,
    range: String,
    region: &'a str,
    grace_period_days: u32,
    counts: &'a GapCounts,
    groups: Vec<SeverityGroup<'a>>,
    orphans: &'a [OrphanEntry],
    dispatch: Option<&'a DispatchOutcome>,
    location: Option<&'a str>,
}

impl<'a> GapContext<'a> {
    fn new(r: &'a GapReport) -> Self {
        let groups = Severity::ALL
            .iter()
            .map(|severity| {
                let scenes: Vec<&GapEntry> = r.gaps.iter().filter(|g| g.severity == *severity).collect();
                SeverityGroup {
                    severity: severity.as_str(),
                    count: scenes.len(),
                    scenes,
                }
            })
            .collect();
        Self {
            product: r.product.to_string(),
            environment: &r.environment,
            range: r.range.to_string(),
            region: &r.region,
            grace_period_days: r.grace_period_days,
            counts: &r.counts,
            groups,
            orphans: &r.orphans,
            dispatch: r.dispatch.as_ref(),
            location: r.location.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct ReasonGroup<'a> {
    label: &'static str,
    count: usize,
    messages: Vec<&'a MessageEntry>,
}

#[derive(Serialize)]
struct DeadLetterContext<'a> {
    queue: &'a str,
    environment: &'a str,
    threshold: Option<u32>,
    in_flight_label: String,
    in_flight: &'a [MessageEntry],
    unparsed: usize,
    dead_letter_count: usize,
    groups: Vec<ReasonGroup<'a>>,
    location: Option<&'a str>,
}

impl<'a> DeadLetterContext<'a> {
    fn new(r: &'a DeadLetterReport) -> Self {
        let entries: &'a [MessageEntry] = &r.dead_letter;
        let group = move |label: &'static str, pred: fn(&DeadLetterReason) -> bool| {
            let messages: Vec<&'a MessageEntry> = entries
                .iter()
                .filter(|e| matches!(e.class, MessageClass::DeadLetter { ref reason } if pred(reason)))
                .collect();
            ReasonGroup {
                label,
                count: messages.len(),
                messages,
            }
        };
        Self {
            queue: &r.queue,
            environment: &r.environment,
            threshold: r.threshold,
            in_flight_label: in_flight_label(r),
            in_flight: &r.in_flight,
            unparsed: r.unparsed,
            dead_letter_count: r.dead_letter.len(),
            groups: vec![
                group("in_dead_letter_queue", |r| matches!(r, DeadLetterReason::InDeadLetterQueue)),
                group("receive_count_exceeded", |r| {
                    matches!(r, DeadLetterReason::ReceiveCountExceeded { .. })
                }),
            ],
            location: r.location.as_deref(),
        }
    }
}

/// Peeked messages are counted exactly; otherwise the queue attribute is an estimate.
fn in_flight_label(r: &DeadLetterReport) -> String {
    match (r.primary_peeked, r.approximate_in_flight) {
        (true, _) => r.in_flight.len().to_string(),
        (false, Some(n)) => format!("~{n} (not read)"),
        (false, None) => "unknown (not read)".to_string(),
    }
}

/// Renders report summaries using minijinja.
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryRenderer;

impl SummaryRenderer {
    pub fn new() -> Self {
        Self
    }

    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        env.add_filter("plural", plural_filter);
        env
    }

    fn render<S: Serialize>(template: &str, ctx: S) -> Result<String, ReportError> {
        Self::build_env()
            .render_str(template, ctx)
            .map_err(|e| ReportError::Template(e.to_string()))
    }

    /// Short text for chat webhooks.
    pub fn render_alert_text(&self, report: &Report) -> Result<String, ReportError> {
        match report {
            Report::Gap(r) => Self::render(GAP_ALERT_TEXT, GapContext::new(r)),
            Report::DeadLetter(r) => Self::render(DEAD_LETTER_ALERT_TEXT, DeadLetterContext::new(r)),
        }
    }

    /// Every entry, grouped by severity or dead-letter reason.
    pub fn render_summary(&self, report: &Report) -> Result<String, ReportError> {
        match report {
            Report::Gap(r) => Self::render(GAP_SUMMARY, GapContext::new(r)),
            Report::DeadLetter(r) => Self::render(DEAD_LETTER_SUMMARY, DeadLetterContext::new(r)),
        }
    }
}

/// Custom filter: `3 | plural("gap")` renders "3 gaps".
fn plural_filter(count: usize, noun: String) -> String {
    if count == 1 {
        format!("1 {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{ReportEmitter, RunContext};
    use chrono::{NaiveDate, Utc};
    use gapfill_core::{Product, Provenance, Region, SceneKey, SceneQuery, SceneRecord, SceneSet, TileId};
    use gapfill_queue::{ClassifiedMessage, Inspection, QueueMessage};
    use gapfill_reconcile::{reconcile, ReconcileOptions};

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn gap_report(provider_rows: &[(u16, &str)], indexed_rows: &[(u16, &str)]) -> Report {
        let set = |rows: &[(u16, &str)], provenance| -> SceneSet {
            rows.iter()
                .map(|(row, date)| {
                    SceneRecord::new(
                        SceneKey::new(Product::Landsat8, TileId::path_row(172, *row), Some(d(date)), "C2L2"),
                        provenance,
                    )
                })
                .collect()
        };
        let query = SceneQuery::new(Product::Landsat8, "2023-01-01..2023-01-31".parse().unwrap(), Region::named("africa"));
        let result = reconcile(
            &query,
            set(provider_rows, Provenance::Provider),
            set(indexed_rows, Provenance::Indexed),
            &ReconcileOptions::new(3),
            d("2023-01-10"),
        );
        ReportEmitter::new(200).gap_report(&result, &RunContext::new("DEV")).into()
    }

    #[test]
    fn alert_text_matches_chat_format() {
        let mut report = gap_report(&[(1, "2023-01-01"), (2, "2023-01-02")], &[(1, "2023-01-01")]);
        report.set_location("s3://bucket/status-report/x.json".into());
        let text = SummaryRenderer::new().render_alert_text(&report).unwrap();
        assert_eq!(
            text,
            "*LANDSAT_8 GAP REPORT - DEV*\nMissing Scenes: 1\nOrphan Scenes: 0\nReport: s3://bucket/status-report/x.json"
        );
    }

    #[test]
    fn alert_text_without_gaps() {
        let report = gap_report(&[(1, "2023-01-01")], &[(1, "2023-01-01")]);
        let text = SummaryRenderer::new().render_alert_text(&report).unwrap();
        assert!(text.ends_with("Report: No missing scenes were found"));
    }

    #[test]
    fn summary_groups_by_severity_in_order() {
        let report = gap_report(
            &[(1, "2023-01-01"), (2, "2023-01-02"), (3, "2023-01-09"), (5, "2023-01-03")],
            &[(1, "2023-01-01"), (8, "2023-01-04")],
        );
        let summary = SummaryRenderer::new().render_summary(&report).unwrap();

        assert!(summary.contains("expected (1 gap)"));
        assert!(summary.contains("stale (2 gaps)"));
        assert!(summary.contains("unclassifiable (0 gaps)"));
        assert!(summary.contains("orphan (1 scene)"));
        assert!(summary.contains("landsat_8/172008/2023-01-04/C2L2"));
        let first = summary.find("landsat_8/172002/2023-01-02/C2L2 age 8d").unwrap();
        let second = summary.find("landsat_8/172005/2023-01-03/C2L2 age 7d").unwrap();
        assert!(first < second);
        assert!(!summary.contains("dispatch:"));
    }

    #[test]
    fn dead_letter_summary_groups_by_reason() {
        let message = |id: &str, receive_count: u32| QueueMessage {
            id: id.into(),
            receipt_handle: String::new(),
            body: String::new(),
            enqueued_at: Utc::now(),
            receive_count,
        };
        let inspection = Inspection {
            queue: "ingest".into(),
            dead_letter_queue: None,
            threshold: Some(3),
            primary_peeked: true,
            in_flight: Vec::new(),
            dead_letter: vec![ClassifiedMessage {
                message: message("m1", 4),
                scene: None,
                class: MessageClass::DeadLetter {
                    reason: DeadLetterReason::ReceiveCountExceeded { receive_count: 4, threshold: 3 },
                },
            }],
            approximate_depth: None,
            approximate_in_flight: None,
            dead_letter_depth: None,
            inspected_at: Utc::now(),
        };
        let report: Report = ReportEmitter::new(200)
            .dead_letter_report(&inspection, &RunContext::new("DEV"))
            .into();
        let summary = SummaryRenderer::new().render_summary(&report).unwrap();

        assert!(summary.contains("Threshold: 3 receives, in flight: 0"));
        assert!(summary.contains("in_dead_letter_queue (0 messages)"));
        assert!(summary.contains("receive_count_exceeded (1 message)"));
        assert!(summary.contains("m1 receives=4 scene=unparsed"));
        assert!(!summary.contains("in_flight ("));
    }

    #[test]
    fn dead_letter_summary_lists_in_flight_messages() {
        let inspection = Inspection {
            queue: "ingest".into(),
            dead_letter_queue: None,
            threshold: Some(3),
            primary_peeked: true,
            in_flight: vec![ClassifiedMessage {
                message: QueueMessage {
                    id: "m2".into(),
                    receipt_handle: String::new(),
                    body: String::new(),
                    enqueued_at: Utc::now(),
                    receive_count: 1,
                },
                scene: SceneKey::parse_scene_id("LC08_L2SP_172083_20230101_20230110_02_T1").ok(),
                class: MessageClass::InFlight,
            }],
            dead_letter: Vec::new(),
            approximate_depth: Some(1),
            approximate_in_flight: Some(0),
            dead_letter_depth: None,
            inspected_at: Utc::now(),
        };
        let emitter = ReportEmitter::new(200);
        let report: Report = emitter.dead_letter_report(&inspection, &RunContext::new("DEV")).into();
        let summary = SummaryRenderer::new().render_summary(&report).unwrap();
        assert!(summary.contains("in flight: 1"));
        assert!(summary.contains("in_flight (1 message)"));
        assert!(summary.contains("m2 receives=1 scene=landsat_8/172083/2023-01-01/C2L2"));

        let counted = Inspection {
            primary_peeked: false,
            in_flight: Vec::new(),
            approximate_in_flight: Some(4),
            ..inspection
        };
        let report: Report = emitter.dead_letter_report(&counted, &RunContext::new("DEV")).into();
        let summary = SummaryRenderer::new().render_summary(&report).unwrap();
        assert!(summary.contains("in flight: ~4 (not read)"));
    }

    #[test]
    fn plural_filter_counts() {
        assert_eq!(plural_filter(0, "gap".into()), "0 gaps");
        assert_eq!(plural_filter(1, "gap".into()), "1 gap");
    }
}
