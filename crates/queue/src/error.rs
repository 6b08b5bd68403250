//! Queue error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("queue not found: {0}")]
    NotFound(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("provider error: {0}")]
    Provider(String),
}
