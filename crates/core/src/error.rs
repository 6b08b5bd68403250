use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Errors raised while parsing scene identities and query keys.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    #[error("unknown product: {0}")]
    UnknownProduct(String),

    #[error("unrecognized scene id: {0}")]
    UnrecognizedId(String),

    #[error("invalid tile: {0}")]
    InvalidTile(String),

    #[error("invalid date range: {0}")]
    InvalidDateRange(String),

    #[error("invalid exclusion: {0}")]
    InvalidExclusion(String),
}

/// Failure taxonomy surfaced to operators and the alerting payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    CatalogUnavailable,
    ProviderUnavailable,
    QueueUnavailable,
    Timeout,
    /// Per-gap publish failure; never fatal to a run.
    PublishFailure,
    /// Missing acquisition metadata; a skip reason, never fatal to a run.
    ClassificationAmbiguous,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::CatalogUnavailable => "CatalogUnavailable",
            FailureKind::ProviderUnavailable => "ProviderUnavailable",
            FailureKind::QueueUnavailable => "QueueUnavailable",
            FailureKind::Timeout => "Timeout",
            FailureKind::PublishFailure => "PublishFailure",
            FailureKind::ClassificationAmbiguous => "ClassificationAmbiguous",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage a run was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Catalog,
    Provider,
    Report,
    Dispatch,
    Inspect,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Catalog => "catalog",
            Stage::Provider => "provider",
            Stage::Report => "report",
            Stage::Dispatch => "dispatch",
            Stage::Inspect => "inspect",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invalid or incomplete configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
