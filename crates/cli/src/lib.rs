//! The `gapfill` tool: argument parsing, run pipeline and output.

pub mod cli;
pub mod error;
pub mod output;
pub mod pipeline;

pub use error::{RunError, EXIT_INVALID_CONFIG, EXIT_OK, EXIT_RUN_FAILED};
pub use pipeline::{Components, GapReportRequest, Pipeline, RunOutcome};
