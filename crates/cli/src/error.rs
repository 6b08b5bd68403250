use std::fmt;

use serde::Serialize;

use gapfill_core::{FailureKind, Stage};

/// Exit code for a completed run, gaps or not.
pub const EXIT_OK: i32 = 0;
/// Exit code for a run that failed at some stage.
pub const EXIT_RUN_FAILED: i32 = 1;
/// Exit code for invalid configuration or arguments.
pub const EXIT_INVALID_CONFIG: i32 = 2;

/// A fatal run failure.
///
/// `computed` tells the operator whether gap or dead-letter data existed
/// when the run stopped. Re-running is always safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunError {
    pub stage: Stage,
    pub kind: FailureKind,
    pub computed: bool,
    pub message: String,
}

impl RunError {
    pub fn new(stage: Stage, kind: FailureKind, computed: bool, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            computed,
            message: message.into(),
        }
    }

    pub fn timeout(stage: Stage, computed: bool) -> Self {
        Self::new(stage, FailureKind::Timeout, computed, "run deadline expired")
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let progress = if self.computed {
            "results were computed"
        } else {
            "nothing was computed"
        };
        write!(f, "{} stage failed ({}); {}: {}", self.stage, self.kind, progress, self.message)
    }
}

impl std::error::Error for RunError {}
