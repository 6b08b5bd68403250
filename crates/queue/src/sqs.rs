//! AWS SQS transport.

use std::collections::HashSet;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_sqs::config::BehaviorVersion;
use aws_sdk_sqs::types::{MessageSystemAttributeName, QueueAttributeName};
use aws_sdk_sqs::Client;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use tracing::{debug, info};

use gapfill_core::config::{AwsConfig, QueueConfig};

use crate::error::QueueError;
use crate::transport::{OutgoingMessage, QueueDepth, QueueHandle, QueueMessage, QueueTransport};

/// SQS caps receives at 10 messages per request.
const MAX_BATCH: u32 = 10;

/// SQS-backed ingestion queue.
pub struct SqsTransport {
    client: Client,
}

impl SqsTransport {
    /// Credentials and region come from `aws`; the endpoint only from
    /// `queue.endpoint_url` (`QUEUE_ENDPOINT_URL`).
    pub fn new(aws: &AwsConfig, queue: &QueueConfig) -> Self {
        let region = aws_sdk_sqs::config::Region::new(aws.region.clone());

        // Not aws_config::defaults(): it would pick up an AWS_ENDPOINT_URL meant
        // for the object store and send SQS calls there.
        let mut sqs_config = aws_sdk_sqs::Config::builder()
            .region(region)
            .behavior_version(BehaviorVersion::latest());

        if let (Some(key_id), Some(secret)) = (&aws.access_key_id, &aws.secret_access_key) {
            let creds = Credentials::new(
                key_id,
                secret,
                aws.session_token.clone(),
                None,
                "gapfill-queue-static",
            );
            sqs_config = sqs_config.credentials_provider(creds);
        }

        if let Some(url) = queue.endpoint_url.as_deref().map(endpoint_url) {
            sqs_config = sqs_config.endpoint_url(url);
        }

        info!(region = %aws.region, endpoint = ?queue.endpoint_url, "SQS transport initialized");
        Self {
            client: Client::from_conf(sqs_config.build()),
        }
    }

    async fn queue_url(&self, name: &str, owner: Option<&str>) -> Result<String, QueueError> {
        let resp = self
            .client
            .get_queue_url()
            .queue_name(name)
            .set_queue_owner_aws_account_id(owner.map(str::to_string))
            .send()
            .await
            .map_err(|e| {
                let detail = format!("{e:?}");
                if detail.contains("NonExistentQueue") || detail.contains("QueueDoesNotExist") {
                    QueueError::NotFound(name.to_string())
                } else {
                    QueueError::Connection(format!("SQS get_queue_url failed: {detail}"))
                }
            })?;
        resp.queue_url()
            .map(str::to_string)
            .ok_or_else(|| QueueError::NotFound(name.to_string()))
    }
}

fn endpoint_url(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{endpoint}")
    }
}

/// Queue name from a queue URL (`https://sqs.../123456789012/name`).
fn name_from_url(url: &str) -> &str {
    url.trim_end_matches('/').rsplit('/').next().unwrap_or(url)
}

/// Target queue and `maxReceiveCount` from a `RedrivePolicy` attribute.
///
/// `maxReceiveCount` arrives as a string or a number depending on who set it.
pub fn parse_redrive_policy(raw: &str) -> Option<RedriveTarget> {
    let policy: Value = serde_json::from_str(raw).ok()?;
    let arn = policy.get("deadLetterTargetArn")?.as_str()?;
    // arn:aws:sqs:{region}:{account}:{name}
    let mut parts = arn.rsplitn(3, ':');
    let name = parts.next()?.to_string();
    let account = parts.next()?.to_string();
    let max_receive_count = policy.get("maxReceiveCount").and_then(|v| match v {
        Value::Number(n) => n.as_u64().map(|n| n as u32),
        Value::String(s) => s.parse().ok(),
        _ => None,
    });
    Some(RedriveTarget {
        name,
        account,
        max_receive_count,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedriveTarget {
    pub name: String,
    pub account: String,
    pub max_receive_count: Option<u32>,
}

#[async_trait]
impl QueueTransport for SqsTransport {
    async fn resolve(&self, name: &str) -> Result<QueueHandle, QueueError> {
        let url = if name.starts_with("https://") || name.starts_with("http://") {
            name.to_string()
        } else {
            self.queue_url(name, None).await?
        };

        let resp = self
            .client
            .get_queue_attributes()
            .queue_url(&url)
            .attribute_names(QueueAttributeName::RedrivePolicy)
            .send()
            .await
            .map_err(|e| QueueError::Connection(format!("SQS get_queue_attributes failed: {e:?}")))?;

        let redrive = resp
            .attributes()
            .and_then(|attrs| attrs.get(&QueueAttributeName::RedrivePolicy))
            .and_then(|raw| parse_redrive_policy(raw));

        let (dead_letter_url, max_receive_count) = match redrive {
            Some(target) => (
                Some(self.queue_url(&target.name, Some(&target.account)).await?),
                target.max_receive_count,
            ),
            None => (None, None),
        };

        let handle = QueueHandle {
            name: name_from_url(&url).to_string(),
            fifo: url.ends_with(".fifo"),
            url,
            dead_letter_url,
            max_receive_count,
        };
        debug!(queue = %handle, max_receive_count = ?handle.max_receive_count, "Resolved SQS queue");
        Ok(handle)
    }

    /// Every receive here increments `ApproximateReceiveCount`, so the loop
    /// ends at the first id it has already seen.
    async fn peek(&self, url: &str, max_messages: u32) -> Result<Vec<QueueMessage>, QueueError> {
        let mut seen = HashSet::new();
        let mut messages = Vec::new();

        'poll: while (messages.len() as u32) < max_messages {
            let capped = (max_messages - messages.len() as u32).min(MAX_BATCH) as i32;
            // Zero visibility leaves every message available to the real consumers.
            let resp = self
                .client
                .receive_message()
                .queue_url(url)
                .max_number_of_messages(capped)
                .wait_time_seconds(1)
                .visibility_timeout(0)
                .message_system_attribute_names(MessageSystemAttributeName::All)
                .send()
                .await
                .map_err(|e| QueueError::Connection(format!("SQS receive failed: {e:?}")))?;

            let batch = resp.messages.unwrap_or_default();
            if batch.is_empty() {
                break;
            }
            for msg in batch {
                let id = msg.message_id().unwrap_or("unknown").to_string();
                if !seen.insert(id.clone()) {
                    debug!(url, total = messages.len(), "Peek wrapped around");
                    break 'poll;
                }

                let attribute = |name: MessageSystemAttributeName| {
                    msg.attributes().and_then(|attrs| attrs.get(&name)).cloned()
                };
                let enqueued_at = attribute(MessageSystemAttributeName::SentTimestamp)
                    .and_then(|ts| ts.parse::<i64>().ok())
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                    .unwrap_or_else(Utc::now);
                let receive_count = attribute(MessageSystemAttributeName::ApproximateReceiveCount)
                    .and_then(|c| c.parse::<u32>().ok())
                    .unwrap_or(1);

                messages.push(QueueMessage {
                    id,
                    receipt_handle: msg.receipt_handle().unwrap_or_default().to_string(),
                    body: msg.body().unwrap_or_default().to_string(),
                    enqueued_at,
                    receive_count,
                });
            }

            debug!(url, total = messages.len(), "Peeked SQS batch");
        }
        messages.truncate(max_messages as usize);

        Ok(messages)
    }

    async fn depth(&self, url: &str) -> Result<QueueDepth, QueueError> {
        let resp = self
            .client
            .get_queue_attributes()
            .queue_url(url)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessagesNotVisible)
            .send()
            .await
            .map_err(|e| QueueError::Connection(format!("SQS depth check failed: {e:?}")))?;

        let count = |name: QueueAttributeName| {
            resp.attributes()
                .and_then(|attrs| attrs.get(&name))
                .and_then(|v| v.parse::<u64>().ok())
        };
        Ok(QueueDepth {
            visible: count(QueueAttributeName::ApproximateNumberOfMessages),
            in_flight: count(QueueAttributeName::ApproximateNumberOfMessagesNotVisible),
        })
    }

    async fn publish(&self, handle: &QueueHandle, message: OutgoingMessage<'_>) -> Result<String, QueueError> {
        let mut request = self
            .client
            .send_message()
            .queue_url(&handle.url)
            .message_body(message.body);
        if handle.fifo {
            request = request
                .message_deduplication_id(message.dedup_id)
                .message_group_id(message.group_id);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| QueueError::Publish(format!("SQS send_message failed: {e:?}")))?;
        Ok(resp.message_id().unwrap_or_default().to_string())
    }
}
