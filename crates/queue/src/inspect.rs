//! Dead-letter classification of live ingestion messages.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use gapfill_core::SceneKey;

use crate::error::QueueError;
use crate::parser::parse_scene_reference;
use crate::transport::{QueueMessage, QueueTransport};

/// Why a message counts as dead-letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DeadLetterReason {
    /// Sitting in the transport's dead-letter queue.
    InDeadLetterQueue,
    /// Received at least `threshold` times on the primary queue.
    ReceiveCountExceeded { receive_count: u32, threshold: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum MessageClass {
    InFlight,
    DeadLetter {
        #[serde(flatten)]
        reason: DeadLetterReason,
    },
}

impl MessageClass {
    pub fn is_dead_letter(&self) -> bool {
        matches!(self, MessageClass::DeadLetter { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedMessage {
    pub message: QueueMessage,
    pub scene: Option<SceneKey>,
    pub class: MessageClass,
}

/// Result of one read-only inspection pass.
#[derive(Debug, Clone, Serialize)]
pub struct Inspection {
    pub queue: String,
    pub dead_letter_queue: Option<String>,
    /// Receive-count threshold in effect, if any.
    pub threshold: Option<u32>,
    /// Whether primary-queue messages were read, not just counted.
    pub primary_peeked: bool,
    pub in_flight: Vec<ClassifiedMessage>,
    pub dead_letter: Vec<ClassifiedMessage>,
    pub approximate_depth: Option<u64>,
    /// Primary-queue messages currently held by a consumer.
    pub approximate_in_flight: Option<u64>,
    pub dead_letter_depth: Option<u64>,
    pub inspected_at: DateTime<Utc>,
}

/// Classify one message.
///
/// Messages in the dead-letter queue are always dead-letter. Without a
/// threshold, primary-queue messages are always in flight.
pub fn classify(message: &QueueMessage, in_dead_letter_queue: bool, threshold: Option<u32>) -> MessageClass {
    if in_dead_letter_queue {
        return MessageClass::DeadLetter {
            reason: DeadLetterReason::InDeadLetterQueue,
        };
    }
    match threshold {
        Some(threshold) if message.receive_count >= threshold => MessageClass::DeadLetter {
            reason: DeadLetterReason::ReceiveCountExceeded {
                receive_count: message.receive_count,
                threshold,
            },
        },
        _ => MessageClass::InFlight,
    }
}

/// Read-only view of a queue and its dead-letter queue.
///
/// By default only the dead-letter queue is read; the primary queue is
/// counted from its attributes. Reading a primary message bumps its receive
/// count, which under a redrive policy moves it toward the dead-letter
/// queue, so [`QueueInspector::with_primary_peek`] has to opt in.
pub struct QueueInspector {
    transport: Arc<dyn QueueTransport>,
    threshold: Option<u32>,
    max_messages: u32,
    peek_primary: bool,
}

impl QueueInspector {
    /// `threshold` overrides the queue's redrive `maxReceiveCount`.
    pub fn new(transport: Arc<dyn QueueTransport>, threshold: Option<u32>, max_messages: u32) -> Self {
        Self {
            transport,
            threshold,
            max_messages: max_messages.max(1),
            peek_primary: false,
        }
    }

    /// Also read primary-queue messages and classify them by receive count.
    pub fn with_primary_peek(mut self, peek_primary: bool) -> Self {
        self.peek_primary = peek_primary;
        self
    }

    pub async fn inspect(&self, queue_name: &str) -> Result<Inspection, QueueError> {
        let handle = self.transport.resolve(queue_name).await?;
        let threshold = self.threshold.or(handle.max_receive_count);
        info!(queue = %handle, threshold = ?threshold, peek_primary = self.peek_primary, "Inspecting queue");

        let mut in_flight = Vec::new();
        let mut dead_letter = Vec::new();

        let primary = if self.peek_primary {
            self.transport.peek(&handle.url, self.max_messages).await?
        } else {
            Vec::new()
        };
        debug!(count = primary.len(), "Peeked primary queue");
        for message in primary {
            let class = classify(&message, false, threshold);
            let classified = ClassifiedMessage {
                scene: parse_scene_reference(&message.body),
                message,
                class,
            };
            if class.is_dead_letter() {
                dead_letter.push(classified);
            } else {
                in_flight.push(classified);
            }
        }

        let mut dead_letter_depth = None;
        if let Some(ref dlq_url) = handle.dead_letter_url {
            let parked = self.transport.peek(dlq_url, self.max_messages).await?;
            debug!(count = parked.len(), "Peeked dead-letter queue");
            dead_letter.extend(parked.into_iter().map(|message| ClassifiedMessage {
                scene: parse_scene_reference(&message.body),
                class: classify(&message, true, threshold),
                message,
            }));
            dead_letter_depth = self.transport.depth(dlq_url).await?.visible;
        }
        let depth = self.transport.depth(&handle.url).await?;

        let unparsed = dead_letter.iter().filter(|m| m.scene.is_none()).count();
        info!(
            queue = %handle.name,
            in_flight = in_flight.len(),
            dead_letter = dead_letter.len(),
            unparsed_dead_letter = unparsed,
            depth = ?depth.visible,
            approximate_in_flight = ?depth.in_flight,
            dead_letter_depth = ?dead_letter_depth,
            "Queue inspected"
        );

        Ok(Inspection {
            queue: handle.name,
            dead_letter_queue: handle.dead_letter_url,
            threshold,
            primary_peeked: self.peek_primary,
            in_flight,
            dead_letter,
            approximate_depth: depth.visible,
            approximate_in_flight: depth.in_flight,
            dead_letter_depth,
            inspected_at: Utc::now(),
        })
    }
}
