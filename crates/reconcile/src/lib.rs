pub mod error;
pub mod gap;
pub mod reconciler;

pub use error::ReconcileError;
pub use gap::{severity_for, Gap, Severity};
pub use reconciler::{reconcile, ReconcileMode, ReconcileOptions, Reconciler, Reconciliation};
