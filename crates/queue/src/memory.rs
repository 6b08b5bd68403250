//! In-process transport for tests and dry runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::QueueError;
use crate::transport::{OutgoingMessage, QueueDepth, QueueHandle, QueueMessage, QueueTransport};

/// A message accepted by [`MemoryTransport::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub queue: String,
    pub message_id: String,
    pub body: String,
    pub dedup_id: Option<String>,
    pub group_id: Option<String>,
}

#[derive(Debug, Default)]
struct MemoryQueue {
    messages: Vec<QueueMessage>,
    dead_letter: Option<String>,
    max_receive_count: Option<u32>,
}

type PublishFilter = Box<dyn Fn(&str) -> bool + Send + Sync>;

#[derive(Default)]
struct State {
    queues: HashMap<String, MemoryQueue>,
    published: Vec<Published>,
    publish_attempts: u32,
}

/// Queues keyed by name; URLs are `memory://{name}`.
#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<State>,
    reject_publish: Option<PublishFilter>,
    unavailable: bool,
}

fn url_for(name: &str) -> String {
    format!("memory://{name}")
}

fn name_for(url: &str) -> &str {
    url.strip_prefix("memory://").unwrap_or(url)
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose every call fails with a connection error.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Fail every publish whose body matches `filter`.
    pub fn reject_publish_when(mut self, filter: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.reject_publish = Some(Box::new(filter));
        self
    }

    /// Declare a queue, optionally redriving into `dead_letter` after `max_receive_count`.
    pub async fn add_queue(&self, name: &str, dead_letter: Option<&str>, max_receive_count: Option<u32>) {
        let mut state = self.state.lock().await;
        if let Some(dlq) = dead_letter {
            state.queues.entry(dlq.to_string()).or_default();
        }
        let queue = state.queues.entry(name.to_string()).or_default();
        queue.dead_letter = dead_letter.map(str::to_string);
        queue.max_receive_count = max_receive_count;
    }

    /// Put a message on a queue as if it had been received `receive_count` times.
    pub async fn push(&self, queue: &str, id: &str, body: &str, receive_count: u32) {
        let mut state = self.state.lock().await;
        state.queues.entry(queue.to_string()).or_default().messages.push(QueueMessage {
            id: id.to_string(),
            receipt_handle: format!("rh-{id}"),
            body: body.to_string(),
            enqueued_at: Utc::now(),
            receive_count,
        });
    }

    pub async fn published(&self) -> Vec<Published> {
        self.state.lock().await.published.clone()
    }

    /// Publish calls made so far, including rejected ones.
    pub async fn publish_attempts(&self) -> u32 {
        self.state.lock().await.publish_attempts
    }

    /// Current receive counts on `queue`, in push order.
    pub async fn receive_counts(&self, queue: &str) -> Vec<u32> {
        self.state
            .lock()
            .await
            .queues
            .get(queue)
            .map_or_else(Vec::new, |q| q.messages.iter().map(|m| m.receive_count).collect())
    }

    pub async fn message_count(&self, queue: &str) -> usize {
        self.state
            .lock()
            .await
            .queues
            .get(queue)
            .map_or(0, |q| q.messages.len())
    }

    fn check_available(&self) -> Result<(), QueueError> {
        if self.unavailable {
            return Err(QueueError::Connection("memory transport unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl QueueTransport for MemoryTransport {
    async fn resolve(&self, name: &str) -> Result<QueueHandle, QueueError> {
        self.check_available()?;
        let name = name_for(name);
        let state = self.state.lock().await;
        let queue = state
            .queues
            .get(name)
            .ok_or_else(|| QueueError::NotFound(name.to_string()))?;
        Ok(QueueHandle {
            name: name.to_string(),
            url: url_for(name),
            dead_letter_url: queue.dead_letter.as_deref().map(url_for),
            max_receive_count: queue.max_receive_count,
            fifo: name.ends_with(".fifo"),
        })
    }

    /// Like SQS, a peek counts as a receive: returned messages carry their
    /// count as it was, and the stored count goes up by one.
    async fn peek(&self, url: &str, max_messages: u32) -> Result<Vec<QueueMessage>, QueueError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let queue = state
            .queues
            .get_mut(name_for(url))
            .ok_or_else(|| QueueError::NotFound(url.to_string()))?;
        let mut peeked = Vec::new();
        for message in queue.messages.iter_mut().take(max_messages as usize) {
            peeked.push(message.clone());
            message.receive_count += 1;
        }
        Ok(peeked)
    }

    async fn depth(&self, url: &str) -> Result<QueueDepth, QueueError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .queues
            .get(name_for(url))
            .map(|q| QueueDepth {
                visible: Some(q.messages.len() as u64),
                in_flight: Some(0),
            })
            .unwrap_or_default())
    }

    async fn publish(&self, handle: &QueueHandle, message: OutgoingMessage<'_>) -> Result<String, QueueError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state.publish_attempts += 1;
        if self.reject_publish.as_ref().is_some_and(|reject| reject(message.body)) {
            return Err(QueueError::Publish(format!("rejected by {}", handle.name)));
        }
        let message_id = format!("mem-{}", state.published.len() + 1);
        state.published.push(Published {
            queue: handle.name.clone(),
            message_id: message_id.clone(),
            body: message.body.to_string(),
            dedup_id: handle.fifo.then(|| message.dedup_id.to_string()),
            group_id: handle.fifo.then(|| message.group_id.to_string()),
        });
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect::{DeadLetterReason, MessageClass, QueueInspector};
    use std::sync::Arc;

    async fn ingest_with_dlq() -> Arc<MemoryTransport> {
        let transport = Arc::new(MemoryTransport::new());
        transport.add_queue("ingest", Some("ingest-dlq"), Some(5)).await;
        transport
            .push("ingest", "a", r#"{"scene_id": "LC08_L2SP_172083_20230101_20230110_02_T1"}"#, 4)
            .await;
        transport.push("ingest", "b", "garbage", 5).await;
        transport
            .push("ingest-dlq", "c", "LC09_L2SP_181070_20230105_20230107_02_T1", 1)
            .await;
        transport
    }

    #[tokio::test]
    async fn inspection_uses_redrive_threshold() {
        let transport = ingest_with_dlq().await;
        let inspector = QueueInspector::new(transport.clone(), None, 100).with_primary_peek(true);
        let inspection = inspector.inspect("ingest").await.unwrap();

        assert_eq!(inspection.threshold, Some(5));
        assert_eq!(inspection.in_flight.len(), 1);
        assert!(inspection.in_flight[0].scene.is_some());
        assert_eq!(inspection.dead_letter.len(), 2);
        assert_eq!(inspection.approximate_depth, Some(2));
        assert_eq!(inspection.dead_letter_depth, Some(1));

        let parked = inspection.dead_letter.iter().find(|m| m.message.id == "c").unwrap();
        assert_eq!(parked.class, MessageClass::DeadLetter { reason: DeadLetterReason::InDeadLetterQueue });
        let stuck = inspection.dead_letter.iter().find(|m| m.message.id == "b").unwrap();
        assert!(stuck.scene.is_none());
    }

    #[tokio::test]
    async fn configured_threshold_overrides_redrive() {
        let transport = ingest_with_dlq().await;
        let inspection = QueueInspector::new(transport.clone(), Some(10), 100)
            .with_primary_peek(true)
            .inspect("ingest")
            .await
            .unwrap();
        assert_eq!(inspection.threshold, Some(10));
        assert_eq!(inspection.in_flight.len(), 2);
        assert_eq!(inspection.dead_letter.len(), 1);
    }

    #[tokio::test]
    async fn inspection_is_read_only() {
        let transport = ingest_with_dlq().await;
        QueueInspector::new(transport.clone(), None, 100).inspect("ingest").await.unwrap();
        assert_eq!(transport.message_count("ingest").await, 2);
        assert_eq!(transport.message_count("ingest-dlq").await, 1);
    }

    #[tokio::test]
    async fn default_inspection_leaves_primary_receive_counts_alone() {
        let transport = ingest_with_dlq().await;
        let inspector = QueueInspector::new(transport.clone(), None, 100);
        for _ in 0..3 {
            let inspection = inspector.inspect("ingest").await.unwrap();
            assert!(!inspection.primary_peeked);
            assert!(inspection.in_flight.is_empty());
            assert_eq!(inspection.dead_letter.len(), 1);
            assert_eq!(inspection.approximate_depth, Some(2));
            assert_eq!(inspection.approximate_in_flight, Some(0));
        }
        assert_eq!(transport.receive_counts("ingest").await, vec![4, 5]);
    }

    #[tokio::test]
    async fn primary_peek_counts_as_a_receive() {
        let transport = ingest_with_dlq().await;
        let inspection = QueueInspector::new(transport.clone(), None, 100)
            .with_primary_peek(true)
            .inspect("ingest")
            .await
            .unwrap();
        assert!(inspection.primary_peeked);
        assert_eq!(inspection.in_flight[0].message.receive_count, 4);
        assert_eq!(transport.receive_counts("ingest").await, vec![5, 6]);
    }

    #[tokio::test]
    async fn without_threshold_only_dlq_classifies() {
        let transport = Arc::new(MemoryTransport::new());
        transport.add_queue("plain", None, None).await;
        transport.push("plain", "a", "{}", 50).await;
        let inspection = QueueInspector::new(transport, None, 100)
            .with_primary_peek(true)
            .inspect("plain")
            .await
            .unwrap();
        assert_eq!(inspection.in_flight.len(), 1);
        assert!(inspection.dead_letter.is_empty());
        assert_eq!(inspection.dead_letter_depth, None);
    }

    #[tokio::test]
    async fn unknown_queue_and_unavailable_transport() {
        let transport = Arc::new(MemoryTransport::new());
        let err = QueueInspector::new(transport, None, 10).inspect("missing").await.unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));

        let err = QueueInspector::new(Arc::new(MemoryTransport::unavailable()), None, 10)
            .inspect("ingest")
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Connection(_)));
    }

    #[tokio::test]
    async fn fifo_publish_carries_dedup_and_group() {
        let transport = MemoryTransport::new();
        transport.add_queue("ingest.fifo", None, None).await;
        let handle = transport.resolve("ingest.fifo").await.unwrap();
        assert!(handle.fifo);
        transport
            .publish(&handle, OutgoingMessage { body: "{}", dedup_id: "tok", group_id: "landsat_8" })
            .await
            .unwrap();
        let published = transport.published().await;
        assert_eq!(published[0].dedup_id.as_deref(), Some("tok"));
        assert_eq!(published[0].group_id.as_deref(), Some("landsat_8"));
    }
}
