//! Queue transport trait and types.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// A raw message as seen by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Unique message identifier from the queue provider.
    pub id: String,
    /// Provider-specific handle. Never used to acknowledge: inspection is read-only.
    #[serde(default, skip_serializing)]
    pub receipt_handle: String,
    /// Raw message body.
    pub body: String,
    /// When the message was sent to the queue.
    pub enqueued_at: DateTime<Utc>,
    /// Number of times this message has been received.
    pub receive_count: u32,
}

/// A resolved queue and its redrive configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueHandle {
    pub name: String,
    pub url: String,
    pub dead_letter_url: Option<String>,
    /// `maxReceiveCount` of the redrive policy, if any.
    pub max_receive_count: Option<u32>,
    pub fifo: bool,
}

impl fmt::Display for QueueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.url)?;
        if let Some(ref dlq) = self.dead_letter_url {
            write!(f, " -> {dlq}")?;
        }
        Ok(())
    }
}

/// Approximate message counts from queue attributes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueDepth {
    /// Messages available for retrieval.
    pub visible: Option<u64>,
    /// Messages received by a consumer and not yet deleted.
    pub in_flight: Option<u64>,
}

/// One message to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage<'a> {
    pub body: &'a str,
    /// Idempotency token; sent as the deduplication id on FIFO queues.
    pub dedup_id: &'a str,
    /// FIFO message group.
    pub group_id: &'a str,
}

/// Trait for ingestion queue backends.
///
/// Implementations must keep `peek` non-destructive: no deletes, purges
/// or acknowledgements. A peek may still count as a receive on the broker.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Resolve a queue name (or URL) together with its dead-letter queue.
    async fn resolve(&self, name: &str) -> Result<QueueHandle, QueueError>;

    /// Read up to `max_messages` distinct messages without consuming them.
    async fn peek(&self, url: &str, max_messages: u32) -> Result<Vec<QueueMessage>, QueueError>;

    /// Approximate visible and in-flight counts, read from attributes only.
    async fn depth(&self, url: &str) -> Result<QueueDepth, QueueError>;

    /// Publish a message, returning the transport's message id.
    async fn publish(&self, handle: &QueueHandle, message: OutgoingMessage<'_>) -> Result<String, QueueError>;
}
