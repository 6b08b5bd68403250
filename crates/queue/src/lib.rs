//! Ingestion queue access: read-only inspection and backfill publishing.

pub mod error;
pub mod inspect;
pub mod memory;
pub mod parser;
pub mod sqs;
pub mod transport;

pub use error::QueueError;
pub use inspect::{classify, ClassifiedMessage, DeadLetterReason, Inspection, MessageClass, QueueInspector};
pub use memory::{MemoryTransport, Published};
pub use parser::parse_scene_reference;
pub use sqs::SqsTransport;
pub use transport::{OutgoingMessage, QueueDepth, QueueHandle, QueueMessage, QueueTransport};
