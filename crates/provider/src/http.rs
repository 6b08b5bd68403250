use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use gapfill_core::config::ProviderConfig;
use gapfill_core::{AttemptError, RetryExhausted, RetryPolicy, SceneQuery, SceneSet};

use crate::error::{PageError, ProviderError};
use crate::record::{map_scene, Mapped};
use crate::ProviderInventory;

/// Well-known field names for the scene array of a page.
const SCENE_ARRAY_KEYS: &[&str] = &["scenes", "features", "results", "items"];

/// Well-known field names for the continuation token.
const NEXT_TOKEN_KEYS: &[&str] = &["next_page_token", "next", "nextToken"];

const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Paginated JSON inventory API.
///
/// `GET {base_url}/scenes?product=..&start=..&end=..&region=..&page_size=..[&page_token=..]`
pub struct HttpProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    page_size: u32,
    retry: RetryPolicy,
}

/// One decoded page.
#[derive(Debug)]
struct Page {
    scenes: Vec<Value>,
    next: Option<String>,
    /// Set when the rate-limit window is exhausted.
    pause: Option<Duration>,
}

#[derive(Debug, Default)]
struct PageStats {
    pages: u32,
    seen: u64,
    night: u64,
    rejected: u64,
    outside_query: u64,
}

impl HttpProvider {
    pub fn new(config: &ProviderConfig, retry: RetryPolicy) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ProviderError::Unavailable {
                attempts: 0,
                reason: format!("HTTP client: {e}"),
            })?;
        Url::parse(&config.base_url)?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            page_size: config.page_size.max(1),
            retry,
        })
    }

    fn page_url(&self, query: &SceneQuery, token: Option<&str>) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&format!("{}/scenes", self.base_url))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("product", query.product.as_str())
                .append_pair("start", &query.range.start.format("%Y-%m-%d").to_string())
                .append_pair("end", &query.range.end.format("%Y-%m-%d").to_string())
                .append_pair("region", &query.region.name)
                .append_pair("page_size", &self.page_size.to_string());
            if let Some(token) = token {
                pairs.append_pair("page_token", token);
            }
        }
        Ok(url)
    }

    async fn fetch_page(&self, url: &Url) -> Result<Page, AttemptError<PageError>> {
        let mut request = self.client.get(url.clone());
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_builder() {
                AttemptError::Permanent(PageError::Http(e))
            } else {
                AttemptError::transient(PageError::Http(e))
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = PageError::Status {
                status: status.as_u16(),
                body: truncate(&body, 200),
            };
            return Err(if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                AttemptError::Transient {
                    error,
                    retry_after: retry_after(&headers),
                }
            } else {
                AttemptError::Permanent(error)
            });
        }

        // Cut-off bodies surface as read or decode errors; both are worth a retry.
        let text = response
            .text()
            .await
            .map_err(|e| AttemptError::transient(PageError::Http(e)))?;
        let body: Value = serde_json::from_str(&text)
            .map_err(|e| AttemptError::transient(PageError::Malformed(e.to_string())))?;

        let mut page = decode_page(body).map_err(|e| match e {
            PageError::Partial => AttemptError::transient(e),
            other => AttemptError::Permanent(other),
        })?;
        if page.next.is_some() {
            page.pause = rate_limit_pause(&headers);
        }
        Ok(page)
    }
}

#[async_trait]
impl ProviderInventory for HttpProvider {
    async fn list_provider(&self, query: &SceneQuery) -> Result<SceneSet, ProviderError> {
        info!(
            product = %query.product,
            range = %query.range,
            region = %query.region.name,
            base_url = %self.base_url,
            "Listing provider inventory"
        );

        let mut scenes = SceneSet::new();
        let mut stats = PageStats::default();
        let mut token: Option<String> = None;

        loop {
            let url = self.page_url(query, token.as_deref())?;
            let url = &url;
            let page = self
                .retry
                .run("provider_page", move |attempt| async move {
                    debug!(url = %url, attempt, "Fetching provider page");
                    self.fetch_page(url).await
                })
                .await
                .map_err(into_provider_error)?;

            stats.pages += 1;
            for value in &page.scenes {
                stats.seen += 1;
                match map_scene(value, query.product) {
                    Mapped::Scene(record) if query.admits(&record.key) => {
                        scenes.insert(record);
                    }
                    Mapped::Scene(_) => stats.outside_query += 1,
                    Mapped::Night => stats.night += 1,
                    Mapped::Rejected(reason) => {
                        stats.rejected += 1;
                        warn!(page = stats.pages, reason = %reason, "Rejected provider record");
                    }
                }
            }
            debug!(page = stats.pages, entries = page.scenes.len(), scenes = scenes.len(), "Provider page decoded");

            match page.next {
                Some(next) if token.as_deref() == Some(next.as_str()) => {
                    return Err(ProviderError::Unavailable {
                        attempts: 1,
                        reason: format!("provider repeated page token {next:?}"),
                    });
                }
                Some(next) => {
                    if let Some(pause) = page.pause {
                        info!(pause_ms = pause.as_millis() as u64, "Provider rate limit reached, pausing");
                        tokio::time::sleep(pause).await;
                    }
                    token = Some(next);
                }
                None => break,
            }
        }

        info!(
            pages = stats.pages,
            seen = stats.seen,
            night = stats.night,
            rejected = stats.rejected,
            outside_query = stats.outside_query,
            scenes = scenes.len(),
            "Provider inventory listed"
        );
        Ok(scenes)
    }

    fn location(&self) -> String {
        self.base_url.clone()
    }
}

fn into_provider_error(e: RetryExhausted<PageError>) -> ProviderError {
    match e.last_error {
        PageError::Status { status, body } if e.permanent => ProviderError::Rejected { status, body },
        other => ProviderError::Unavailable {
            attempts: e.attempts,
            reason: other.to_string(),
        },
    }
}

fn decode_page(body: Value) -> Result<Page, PageError> {
    let obj = match body {
        Value::Array(scenes) => {
            return Ok(Page {
                scenes,
                next: None,
                pause: None,
            })
        }
        Value::Object(obj) => obj,
        other => return Err(PageError::Malformed(format!("expected an object, got {other}"))),
    };

    if obj.get("partial").and_then(Value::as_bool).unwrap_or(false) {
        return Err(PageError::Partial);
    }

    let scenes = SCENE_ARRAY_KEYS
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_array))
        .cloned()
        .ok_or_else(|| PageError::Malformed(format!("no scene array under any of {SCENE_ARRAY_KEYS:?}")))?;

    let next = NEXT_TOKEN_KEYS
        .iter()
        .find_map(|k| obj.get(*k))
        .and_then(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

    Ok(Page {
        scenes,
        next,
        pause: None,
    })
}

/// `Retry-After` as delta-seconds or an HTTP date.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    (at - Utc::now()).to_std().ok().or(Some(Duration::ZERO))
}

/// Pause needed before the next request when the window is used up.
///
/// The reset header is read as seconds from now, or as a Unix timestamp
/// when it is clearly one.
fn rate_limit_pause(headers: &HeaderMap) -> Option<Duration> {
    let header = |name: &str| headers.get(name)?.to_str().ok()?.trim().parse::<u64>().ok();
    if header(RATE_LIMIT_REMAINING)? > 0 {
        return None;
    }
    let reset = header(RATE_LIMIT_RESET).unwrap_or(1);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let secs = if reset > 1_000_000_000 { reset.saturating_sub(now) } else { reset };
    Some(Duration::from_secs(secs))
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
