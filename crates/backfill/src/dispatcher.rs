use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use gapfill_core::{AttemptError, BackfillRequest, FailureKind, RetryPolicy, SceneKey};
use gapfill_queue::{OutgoingMessage, QueueError, QueueHandle, QueueTransport};
use gapfill_reconcile::{Gap, Severity};

use crate::throttle::Throttle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillOptions {
    pub concurrency: usize,
    pub max_per_second: Option<u32>,
    /// Dispatch gaps without an acquisition date too.
    pub include_unclassifiable: bool,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            concurrency: 8,
            max_per_second: None,
            include_unclassifiable: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchFailure {
    pub scene: SceneKey,
    pub token: String,
    pub kind: FailureKind,
    pub attempts: u32,
    pub error: String,
}

/// Tally of one dispatch batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub requested: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Unclassifiable gaps left out (`ClassificationAmbiguous`).
    pub skipped_keys: Vec<SceneKey>,
    pub failures: Vec<DispatchFailure>,
}

/// Publishes one [`BackfillRequest`] per gap to the ingestion queue.
pub struct BackfillDispatcher {
    transport: Arc<dyn QueueTransport>,
    queue: QueueHandle,
    retry: RetryPolicy,
    options: BackfillOptions,
    throttle: Option<Throttle>,
}

impl BackfillDispatcher {
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        queue: QueueHandle,
        retry: RetryPolicy,
        options: BackfillOptions,
    ) -> Self {
        let throttle = options.max_per_second.map(Throttle::per_second);
        Self {
            transport,
            queue,
            retry,
            options,
            throttle,
        }
    }

    /// Resolve `queue_name` on `transport` and build a dispatcher for it.
    pub async fn connect(
        transport: Arc<dyn QueueTransport>,
        queue_name: &str,
        retry: RetryPolicy,
        options: BackfillOptions,
    ) -> Result<Self, QueueError> {
        let queue = transport.resolve(queue_name).await?;
        Ok(Self::new(transport, queue, retry, options))
    }

    pub fn queue(&self) -> &QueueHandle {
        &self.queue
    }

    /// Publish every eligible gap. Individual failures never stop the batch.
    pub async fn dispatch(&self, gaps: &[Gap]) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        let mut eligible = Vec::with_capacity(gaps.len());
        for gap in gaps {
            if gap.severity == Severity::Unclassifiable && !self.options.include_unclassifiable {
                outcome.skipped_keys.push(gap.record.key.clone());
            } else {
                eligible.push(gap);
            }
        }
        outcome.skipped = outcome.skipped_keys.len();
        if outcome.skipped > 0 {
            warn!(
                skipped = outcome.skipped,
                kind = %FailureKind::ClassificationAmbiguous,
                "Skipping gaps without acquisition date"
            );
        }

        info!(
            queue = %self.queue.name,
            gaps = eligible.len(),
            concurrency = self.options.concurrency,
            max_per_second = ?self.options.max_per_second,
            "Dispatching backfill requests"
        );

        let results: Vec<Result<(), DispatchFailure>> = stream::iter(eligible)
            .map(|gap| self.publish_one(gap))
            .buffer_unordered(self.options.concurrency.max(1))
            .collect()
            .await;

        for result in results {
            match result {
                Ok(()) => outcome.requested += 1,
                Err(failure) => outcome.failures.push(failure),
            }
        }
        outcome.failures.sort_by(|a, b| a.scene.cmp(&b.scene));
        outcome.failed = outcome.failures.len();

        info!(
            requested = outcome.requested,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "Backfill dispatch finished"
        );
        outcome
    }

    async fn publish_one(&self, gap: &Gap) -> Result<(), DispatchFailure> {
        let request = BackfillRequest::new(
            gap.record.key.clone(),
            gap.record.source_uri.clone(),
            self.queue.name.clone(),
        );
        let failure = |attempts: u32, error: String| DispatchFailure {
            scene: request.scene.clone(),
            token: request.token.clone(),
            kind: FailureKind::PublishFailure,
            attempts,
            error,
        };

        let body = serde_json::to_string(&request).map_err(|e| failure(0, e.to_string()))?;
        let body = body.as_str();
        let token = request.token.as_str();
        let group = request.scene.product.as_str();

        let result = self
            .retry
            .run("backfill_publish", move |_| async move {
                if let Some(ref throttle) = self.throttle {
                    throttle.acquire().await;
                }
                let message = OutgoingMessage {
                    body,
                    dedup_id: token,
                    group_id: group,
                };
                self.transport
                    .publish(&self.queue, message)
                    .await
                    .map_err(|e| match e {
                        QueueError::NotFound(_) => AttemptError::Permanent(e),
                        other => AttemptError::transient(other),
                    })
            })
            .await;

        match result {
            Ok(message_id) => {
                debug!(scene = %request.scene_id, token = %request.token, message_id = %message_id, "Backfill request published");
                Ok(())
            }
            Err(exhausted) => {
                warn!(
                    scene = %request.scene_id,
                    attempts = exhausted.attempts,
                    error = %exhausted.last_error,
                    kind = %FailureKind::PublishFailure,
                    "Backfill publish failed"
                );
                Err(failure(exhausted.attempts, exhausted.last_error.to_string()))
            }
        }
    }
}
