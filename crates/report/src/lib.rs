//! Gap and dead-letter reports.
//!
//! This crate provides:
//! - `ReportEmitter` turning reconciliation and inspection results into stable JSON reports
//! - `AlertPayload`, the flat summary external notifiers consume
//! - Minijinja rendering of human-readable summaries
//! - `ReportSink` with object-store and webhook implementations, plus a publisher
//!   that delivers a report to every configured sink

pub mod error;
pub mod payload;
pub mod publisher;
pub mod sink;
pub mod templating;

pub use error::ReportError;
pub use payload::{
    AlertPayload, MessageEntry, DeadLetterReport, GapCounts, GapEntry, GapReport, OrphanEntry, Report,
    ReportEmitter, RunContext, SCHEMA_VERSION,
};
pub use publisher::{DeliveryResult, ReportPublisher};
pub use sink::{ObjectStoreSink, ReportSink, WebhookSink};
pub use templating::SummaryRenderer;
