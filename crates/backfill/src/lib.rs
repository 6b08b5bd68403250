//! Re-drive ingestion for detected gaps.

pub mod dispatcher;
pub mod throttle;

pub use dispatcher::{BackfillDispatcher, BackfillOptions, DispatchFailure, DispatchOutcome};
pub use throttle::Throttle;
