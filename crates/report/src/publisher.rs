//! Delivers a report to every configured sink.
//!
//! Sinks run in order. A location returned by one sink is visible to the
//! sinks after it, so the webhook can link the stored report. Individual sink
//! failures don't block other sinks.

use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::payload::{Report, ReportEmitter};
use crate::sink::ReportSink;

/// Result of delivering a report to a single sink.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryResult {
    pub sink: String,
    pub success: bool,
    pub location: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

pub struct ReportPublisher {
    emitter: ReportEmitter,
    sinks: Vec<Box<dyn ReportSink>>,
}

impl ReportPublisher {
    pub fn new(emitter: ReportEmitter, sinks: Vec<Box<dyn ReportSink>>) -> Self {
        Self { emitter, sinks }
    }

    pub fn emitter(&self) -> &ReportEmitter {
        &self.emitter
    }

    pub async fn publish(&self, report: &mut Report) -> Vec<DeliveryResult> {
        let mut results = Vec::with_capacity(self.sinks.len());

        for sink in &self.sinks {
            let start = Instant::now();
            let delivered = match self.emitter.alert(report) {
                Ok(alert) => sink.deliver(report, &alert).await,
                Err(e) => Err(e),
            };
            let duration_ms = start.elapsed().as_millis() as u64;

            let result = match delivered {
                Ok(location) => {
                    if let Some(ref loc) = location {
                        report.set_location(loc.clone());
                    }
                    info!(sink = sink.sink_name(), location = ?location, duration_ms, "Report delivered");
                    DeliveryResult {
                        sink: sink.sink_name().to_string(),
                        success: true,
                        location,
                        error: None,
                        duration_ms,
                    }
                }
                Err(e) => {
                    warn!(sink = sink.sink_name(), error = %e, duration_ms, "Report delivery failed");
                    DeliveryResult {
                        sink: sink.sink_name().to_string(),
                        success: false,
                        location: None,
                        error: Some(e.to_string()),
                        duration_ms,
                    }
                }
            };
            results.push(result);
        }

        results
    }
}
