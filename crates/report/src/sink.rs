//! Report destinations.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use gapfill_core::config::NotifyOn;
use gapfill_storage::{join_key, StorageBackend};

use crate::error::ReportError;
use crate::payload::{AlertPayload, Report};

/// A place a finished report goes.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Deliver `report`. Returns the stored location when the sink keeps a copy.
    async fn deliver(&self, report: &Report, alert: &AlertPayload) -> Result<Option<String>, ReportError>;

    /// Human-readable name for this sink (e.g. "object_store", "webhook").
    fn sink_name(&self) -> &str;
}

/// Writes the full JSON report to `{prefix}/{object_name}`.
///
/// Empty reports are not written.
pub struct ObjectStoreSink {
    backend: StorageBackend,
    prefix: String,
}

impl ObjectStoreSink {
    pub fn new(backend: StorageBackend, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
        }
    }

    pub fn key_for(&self, report: &Report) -> String {
        self.backend.key(&join_key(&self.prefix, &report.object_name()))
    }
}

#[async_trait]
impl ReportSink for ObjectStoreSink {
    async fn deliver(&self, report: &Report, _alert: &AlertPayload) -> Result<Option<String>, ReportError> {
        if report.is_empty() {
            debug!(run_id = %report.run_id(), "Nothing to store");
            return Ok(None);
        }
        let key = self.key_for(report);
        let uri = self.backend.put_json(&key, &report.to_json()?).await?;
        Ok(Some(uri))
    }

    fn sink_name(&self) -> &str {
        "object_store"
    }
}

/// POSTs the [`AlertPayload`] as JSON.
#[derive(Debug)]
pub struct WebhookSink {
    url: String,
    notify_on: NotifyOn,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, notify_on: NotifyOn, timeout: Duration) -> Result<Self, ReportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            notify_on,
            client,
        })
    }

    fn should_notify(&self, alert: &AlertPayload) -> bool {
        match self.notify_on {
            NotifyOn::Always => true,
            NotifyOn::Threshold => alert.threshold_exceeded,
        }
    }
}

#[async_trait]
impl ReportSink for WebhookSink {
    async fn deliver(&self, _report: &Report, alert: &AlertPayload) -> Result<Option<String>, ReportError> {
        if !self.should_notify(alert) {
            debug!(url = %self.url, "Alert threshold not exceeded, webhook skipped");
            return Ok(None);
        }

        let response = self.client.post(&self.url).json(alert).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            warn!(url = %self.url, %status, body = %body, "webhook returned non-2xx status");
            return Err(ReportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(url = %self.url, status = %status, "webhook alert delivered");
        Ok(None)
    }

    fn sink_name(&self) -> &str {
        "webhook"
    }
}
