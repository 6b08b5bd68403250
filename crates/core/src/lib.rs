pub mod config;
pub mod error;
pub mod query;
pub mod request;
pub mod retry;
pub mod scene;

pub use config::Config;
pub use error::*;
pub use query::*;
pub use request::{idempotency_token, BackfillRequest};
pub use retry::{AttemptError, RetryExhausted, RetryPolicy};
pub use scene::*;
