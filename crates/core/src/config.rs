use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::query::Exclusion;
use crate::retry::RetryPolicy;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str) -> bool {
    profiled_env_opt(profile, key)
        .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub aws: AwsConfig,
    pub catalog: CatalogConfig,
    pub provider: ProviderConfig,
    pub retry: RetryPolicy,
    pub reconcile: ReconcileConfig,
    pub queue: QueueConfig,
    pub backfill: BackfillConfig,
    pub report: ReportConfig,
    pub run: RunConfig,
    /// Raw values that failed to parse, reported by [`Config::validate`].
    #[serde(skip)]
    invalid: Vec<(&'static str, String)>,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `GAPFILL_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("GAPFILL_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        let mut invalid = Vec::new();
        Self {
            profile: p.to_string(),
            aws: AwsConfig::from_env_profiled(p),
            catalog: CatalogConfig::from_env_profiled(p),
            provider: ProviderConfig::from_env_profiled(p),
            retry: retry_from_env_profiled(p),
            reconcile: ReconcileConfig::from_env_profiled(p, &mut invalid),
            queue: QueueConfig::from_env_profiled(p, &mut invalid),
            backfill: BackfillConfig::from_env_profiled(p),
            report: ReportConfig::from_env_profiled(p),
            run: RunConfig::from_env_profiled(p),
            invalid,
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Check settings that have no safe default.
    ///
    /// The grace period is operational policy and must be set explicitly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some((key, raw)) = self.invalid.first() {
            return Err(ConfigError::Invalid {
                key: *key,
                reason: raw.clone(),
            });
        }
        if self.reconcile.grace_period_days.is_none() {
            return Err(ConfigError::Missing("GRACE_PERIOD_DAYS"));
        }
        if self.backfill.concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "BACKFILL_CONCURRENCY",
                reason: "must be at least 1".into(),
            });
        }
        if self.run.timeout_secs > MAX_RUN_TIMEOUT_SECS {
            return Err(ConfigError::Invalid {
                key: "RUN_TIMEOUT_SECS",
                reason: format!("must be at most {MAX_RUN_TIMEOUT_SECS}"),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "RETRY_MAX_ATTEMPTS",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  aws:        region={}", self.aws.region);
        tracing::info!("  catalog:    {}", self.catalog.location());
        tracing::info!("  provider:   base_url={}, page_size={}", self.provider.base_url, self.provider.page_size);
        tracing::info!("  retry:      attempts={}, initial={}ms", self.retry.max_attempts, self.retry.initial_delay_ms);
        tracing::info!("  reconcile:  grace_days={:?}, exclusions={}", self.reconcile.grace_period_days, self.reconcile.exclusions.len());
        tracing::info!("  queue:      ingest={}, threshold={:?}, peek_primary={}", self.queue.ingest_queue, self.queue.receive_threshold, self.queue.peek_primary);
        tracing::info!("  backfill:   concurrency={}, max_per_second={:?}", self.backfill.concurrency, self.backfill.max_per_second);
        tracing::info!("  report:     bucket={}, webhook={}", self.report.bucket.as_deref().unwrap_or("(none)"), self.report.webhook_url.is_some());
        tracing::info!("  run:        timeout={}s", self.run.timeout_secs);
    }

    /// Return a redacted view safe for printing (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "aws": {
                "region": self.aws.region,
                "endpoint_url": self.aws.endpoint_url,
                "static_credentials": self.aws.access_key_id.is_some(),
            },
            "catalog": {
                "location": self.catalog.location(),
            },
            "provider": {
                "base_url": self.provider.base_url,
                "page_size": self.provider.page_size,
                "timeout_secs": self.provider.timeout_secs,
                "api_key": self.provider.api_key.is_some(),
            },
            "retry": self.retry,
            "reconcile": {
                "grace_period_days": self.reconcile.grace_period_days,
                "exclusions": self.reconcile.exclusions.len(),
            },
            "queue": {
                "ingest_queue": self.queue.ingest_queue,
                "receive_threshold": self.queue.receive_threshold,
                "inspect_max_messages": self.queue.inspect_max_messages,
                "peek_primary": self.queue.peek_primary,
                "endpoint_url": self.queue.endpoint_url,
            },
            "backfill": {
                "concurrency": self.backfill.concurrency,
                "max_per_second": self.backfill.max_per_second,
            },
            "report": {
                "bucket": self.report.bucket,
                "prefix": self.report.prefix,
                "webhook": self.report.webhook_url.is_some(),
                "alert_threshold": self.report.alert_threshold,
                "notify_on": self.report.notify_on,
            },
            "run": { "timeout_secs": self.run.timeout_secs },
        })
    }
}

// ── AWS ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            region: profiled_env_or(p, "AWS_REGION", "af-south-1"),
            access_key_id: profiled_env_opt(p, "AWS_ACCESS_KEY_ID"),
            secret_access_key: profiled_env_opt(p, "AWS_SECRET_ACCESS_KEY"),
            session_token: profiled_env_opt(p, "AWS_SESSION_TOKEN"),
            endpoint_url: profiled_env_opt(p, "AWS_ENDPOINT_URL"),
        }
    }
}

// ── Catalog index ─────────────────────────────────────────────

/// Where the locally indexed scenes live: an S3 bucket or a local directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub bucket: Option<String>,
    pub prefix: String,
    pub local_dir: Option<PathBuf>,
}

impl CatalogConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            bucket: profiled_env_opt(p, "CATALOG_BUCKET"),
            prefix: profiled_env_or(p, "CATALOG_PREFIX", "")
                .trim_matches('/')
                .to_string(),
            local_dir: profiled_env_opt(p, "CATALOG_LOCAL_DIR").map(PathBuf::from),
        }
    }

    pub fn location(&self) -> String {
        match (&self.bucket, &self.local_dir) {
            (Some(bucket), _) => format!("s3://{}/{}", bucket, self.prefix),
            (None, Some(dir)) => format!("file://{}", dir.display()),
            (None, None) => "(unset)".to_string(),
        }
    }
}

// ── Provider inventory ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub page_size: u32,
    pub timeout_secs: u64,
}

impl ProviderConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            base_url: profiled_env_or(p, "PROVIDER_BASE_URL", "http://localhost:8080")
                .trim_end_matches('/')
                .to_string(),
            api_key: profiled_env_opt(p, "PROVIDER_API_KEY"),
            page_size: profiled_env_u32(p, "PROVIDER_PAGE_SIZE", 500),
            timeout_secs: profiled_env_u64(p, "PROVIDER_TIMEOUT_SECS", 60),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn retry_from_env_profiled(p: &str) -> RetryPolicy {
    let defaults = RetryPolicy::default();
    RetryPolicy {
        max_attempts: profiled_env_u32(p, "RETRY_MAX_ATTEMPTS", defaults.max_attempts),
        initial_delay_ms: profiled_env_u64(p, "RETRY_INITIAL_DELAY_MS", defaults.initial_delay_ms),
        max_delay_ms: profiled_env_u64(p, "RETRY_MAX_DELAY_MS", defaults.max_delay_ms),
        multiplier: profiled_env_opt(p, "RETRY_MULTIPLIER")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.multiplier),
    }
}

// ── Reconciliation ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Expected provider-to-catalog latency. No default: gaps younger than
    /// this are `expected`, older ones `stale`.
    pub grace_period_days: Option<u32>,
    pub exclusions: Vec<Exclusion>,
}

impl ReconcileConfig {
    fn from_env_profiled(p: &str, invalid: &mut Vec<(&'static str, String)>) -> Self {
        let grace_period_days = match profiled_env_opt(p, "GRACE_PERIOD_DAYS") {
            Some(raw) => match raw.parse() {
                Ok(days) => Some(days),
                Err(_) => {
                    invalid.push(("GRACE_PERIOD_DAYS", raw));
                    None
                }
            },
            None => None,
        };
        let exclusions = match profiled_env_opt(p, "RECONCILE_EXCLUDE") {
            Some(raw) => Exclusion::parse_list(&raw).unwrap_or_else(|e| {
                invalid.push(("RECONCILE_EXCLUDE", e.to_string()));
                Vec::new()
            }),
            None => Vec::new(),
        };
        Self {
            grace_period_days,
            exclusions,
        }
    }
}

// ── Ingestion queue ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue name (or URL) that backfill requests are published to.
    pub ingest_queue: String,
    /// Receive count at which a message counts as dead-letter. When unset the
    /// transport's redrive policy is used.
    pub receive_threshold: Option<u32>,
    pub inspect_max_messages: u32,
    /// Read primary-queue messages during inspection. Each read counts as a
    /// receive on SQS.
    pub peek_primary: bool,
    /// SQS endpoint override. Separate from `AWS_ENDPOINT_URL`, which
    /// belongs to the object store.
    pub endpoint_url: Option<String>,
}

impl QueueConfig {
    fn from_env_profiled(p: &str, invalid: &mut Vec<(&'static str, String)>) -> Self {
        let receive_threshold = match profiled_env_opt(p, "DEAD_LETTER_RECEIVE_THRESHOLD") {
            Some(raw) => match raw.parse::<u32>() {
                Ok(t) if t > 0 => Some(t),
                _ => {
                    invalid.push(("DEAD_LETTER_RECEIVE_THRESHOLD", raw));
                    None
                }
            },
            None => None,
        };
        Self {
            ingest_queue: profiled_env_or(p, "INGEST_QUEUE", ""),
            receive_threshold,
            inspect_max_messages: profiled_env_u32(p, "QUEUE_INSPECT_MAX_MESSAGES", 1000),
            peek_primary: profiled_env_bool(p, "QUEUE_PEEK_PRIMARY"),
            endpoint_url: profiled_env_opt(p, "QUEUE_ENDPOINT_URL"),
        }
    }
}

// ── Backfill ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillConfig {
    pub concurrency: usize,
    /// Publish rate ceiling; `None` = limited by concurrency only.
    pub max_per_second: Option<u32>,
}

impl BackfillConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            concurrency: profiled_env_u32(p, "BACKFILL_CONCURRENCY", 8) as usize,
            max_per_second: profiled_env_opt(p, "BACKFILL_MAX_PER_SECOND")
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0),
        }
    }
}

// ── Report ────────────────────────────────────────────────────

/// When the webhook sink fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyOn {
    Always,
    Threshold,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub bucket: Option<String>,
    pub prefix: String,
    pub webhook_url: Option<String>,
    pub alert_threshold: usize,
    pub notify_on: NotifyOn,
}

impl ReportConfig {
    fn from_env_profiled(p: &str) -> Self {
        let notify_on = match profiled_env_or(p, "REPORT_NOTIFY_ON", "threshold").to_lowercase().as_str() {
            "always" => NotifyOn::Always,
            _ => NotifyOn::Threshold,
        };
        Self {
            bucket: profiled_env_opt(p, "REPORT_BUCKET"),
            prefix: profiled_env_or(p, "REPORT_PREFIX", "status-report")
                .trim_matches('/')
                .to_string(),
            webhook_url: profiled_env_opt(p, "REPORT_WEBHOOK_URL"),
            alert_threshold: profiled_env_u32(p, "REPORT_ALERT_THRESHOLD", 200) as usize,
            notify_on,
        }
    }
}

// ── Run ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub timeout_secs: u64,
}

/// Longest accepted run deadline: one week.
pub const MAX_RUN_TIMEOUT_SECS: u64 = 7 * 24 * 3600;

impl RunConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            timeout_secs: profiled_env_u64(p, "RUN_TIMEOUT_SECS", 3600),
        }
    }

    /// Run deadline, never longer than [`MAX_RUN_TIMEOUT_SECS`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.min(MAX_RUN_TIMEOUT_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own profile prefix so parallel tests never share keys.

    #[test]
    fn grace_period_is_required() {
        let config = Config::for_profile("CFGTEST_MISSING");
        if config.reconcile.grace_period_days.is_none() {
            assert_eq!(config.validate(), Err(ConfigError::Missing("GRACE_PERIOD_DAYS")));
        }
    }

    #[test]
    fn profiled_keys_take_precedence() {
        env::set_var("CFGTEST_PREC_GRACE_PERIOD_DAYS", "3");
        env::set_var("CFGTEST_PREC_BACKFILL_CONCURRENCY", "2");
        env::set_var("CFGTEST_PREC_RECONCILE_EXCLUDE", "landsat_7@2003-05-31..2003-12-31");
        let config = Config::for_profile("cfgtest_prec");
        assert_eq!(config.profile, "CFGTEST_PREC");
        assert_eq!(config.reconcile.grace_period_days, Some(3));
        assert_eq!(config.backfill.concurrency, 2);
        assert_eq!(config.reconcile.exclusions.len(), 1);
        assert!(config.validate().is_ok());
        env::remove_var("CFGTEST_PREC_GRACE_PERIOD_DAYS");
        env::remove_var("CFGTEST_PREC_BACKFILL_CONCURRENCY");
        env::remove_var("CFGTEST_PREC_RECONCILE_EXCLUDE");
    }

    #[test]
    fn malformed_values_fail_validation() {
        env::set_var("CFGTEST_BAD_GRACE_PERIOD_DAYS", "three");
        let config = Config::for_profile("CFGTEST_BAD");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "GRACE_PERIOD_DAYS", .. })
        ));
        env::remove_var("CFGTEST_BAD_GRACE_PERIOD_DAYS");
    }

    #[test]
    fn queue_endpoint_is_separate_from_object_store_endpoint() {
        env::set_var("CFGTEST_ENDPOINT_AWS_ENDPOINT_URL", "http://minio:9000");
        let config = Config::for_profile("CFGTEST_ENDPOINT");
        assert_eq!(config.aws.endpoint_url.as_deref(), Some("http://minio:9000"));
        if env::var("QUEUE_ENDPOINT_URL").is_err() {
            assert_eq!(config.queue.endpoint_url, None);
        }

        env::set_var("CFGTEST_ENDPOINT_QUEUE_ENDPOINT_URL", "http://localstack:4566");
        let config = Config::for_profile("CFGTEST_ENDPOINT");
        assert_eq!(config.queue.endpoint_url.as_deref(), Some("http://localstack:4566"));
        assert_eq!(config.aws.endpoint_url.as_deref(), Some("http://minio:9000"));
        env::remove_var("CFGTEST_ENDPOINT_AWS_ENDPOINT_URL");
        env::remove_var("CFGTEST_ENDPOINT_QUEUE_ENDPOINT_URL");
    }

    #[test]
    fn primary_peek_is_opt_in() {
        if env::var("QUEUE_PEEK_PRIMARY").is_err() {
            assert!(!Config::for_profile("CFGTEST_PEEK_OFF").queue.peek_primary);
        }
        env::set_var("CFGTEST_PEEK_ON_QUEUE_PEEK_PRIMARY", "true");
        assert!(Config::for_profile("CFGTEST_PEEK_ON").queue.peek_primary);
        env::remove_var("CFGTEST_PEEK_ON_QUEUE_PEEK_PRIMARY");
    }

    #[test]
    fn oversized_run_timeout_is_rejected() {
        env::set_var("CFGTEST_TIMEOUT_GRACE_PERIOD_DAYS", "3");
        env::set_var("CFGTEST_TIMEOUT_RUN_TIMEOUT_SECS", u64::MAX.to_string());
        let config = Config::for_profile("CFGTEST_TIMEOUT");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "RUN_TIMEOUT_SECS", .. })
        ));
        assert_eq!(config.run.timeout(), Duration::from_secs(MAX_RUN_TIMEOUT_SECS));
        env::remove_var("CFGTEST_TIMEOUT_GRACE_PERIOD_DAYS");
        env::remove_var("CFGTEST_TIMEOUT_RUN_TIMEOUT_SECS");
    }

    #[test]
    fn redacted_summary_hides_secrets() {
        env::set_var("CFGTEST_REDACT_PROVIDER_API_KEY", "super-secret");
        let config = Config::for_profile("CFGTEST_REDACT");
        let summary = config.redacted_summary().to_string();
        assert!(!summary.contains("super-secret"));
        assert_eq!(config.redacted_summary()["provider"]["api_key"], true);
        env::remove_var("CFGTEST_REDACT_PROVIDER_API_KEY");
    }
}
