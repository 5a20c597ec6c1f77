//! Push delivery trigger.
//!
//! Publishing hands each message of a push subscription to a [`Pusher`].
//! Delivery is fire-and-forget: it never blocks or fails the publish, is not
//! retried, and does not change the message's delivery state. Pulling stays
//! the source of truth.

use std::collections::HashMap;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{HeaderName, HeaderValue};
use serde::Serialize;
use tracing::{debug, warn};

use super::message::Message;
use super::subscription::{PushConfig, Subscription};
use crate::config::PushSettings;
use crate::utils::{Error, Result};

pub trait Pusher: Send + Sync {
    /// Starts delivering `message` to the subscription's push endpoint.
    /// Must return without waiting for the delivery.
    fn push(&self, subscription: &Subscription, message: &Message);
}

/// JSON body POSTed to push endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct PushEnvelope {
    pub subscription: String,
    pub message: PushedMessage,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushedMessage {
    pub message_id: String,
    /// Base64 of the payload.
    pub data: String,
    pub attributes: HashMap<String, String>,
    /// RFC 3339.
    pub publish_time: String,
}

impl PushEnvelope {
    pub fn new(subscription: &str, message: &Message) -> Self {
        Self {
            subscription: subscription.to_string(),
            message: PushedMessage {
                message_id: message.id.clone(),
                data: STANDARD.encode(&message.data),
                attributes: message.attributes.to_map(),
                publish_time: chrono::DateTime::from_timestamp_millis(message.published_at)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default(),
            },
        }
    }
}

/// Pushes over HTTP on detached tokio tasks.
#[derive(Debug, Clone)]
pub struct HttpPusher {
    client: reqwest::Client,
}

impl HttpPusher {
    pub fn new(settings: &PushSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    async fn send(
        client: &reqwest::Client,
        config: &PushConfig,
        envelope: &PushEnvelope,
    ) -> Result<()> {
        let url = config.url()?;
        let mut request = client.post(url).json(envelope);

        // push config attributes travel as headers
        for (key, value) in config.attributes.to_map() {
            match (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                (Ok(name), Ok(value)) => request = request.header(name, value),
                _ => warn!("Skipping push attribute {key:?}: not a valid HTTP header"),
            }
        }

        let response = request.send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::PushRejected {
                endpoint: config.endpoint.clone(),
                status: response.status().as_u16(),
            })
        }
    }
}

impl Pusher for HttpPusher {
    fn push(&self, subscription: &Subscription, message: &Message) {
        let Some(config) = subscription.push_config.clone() else {
            return;
        };
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(
                    "No async runtime; skipping push of {} to {}",
                    message.id, config.endpoint
                );
                return;
            }
        };

        let client = self.client.clone();
        let envelope = PushEnvelope::new(&subscription.name, message);
        handle.spawn(async move {
            match Self::send(&client, &config, &envelope).await {
                Ok(()) => debug!(
                    "Pushed {} for {} to {}",
                    envelope.message.message_id, envelope.subscription, config.endpoint
                ),
                Err(e) => warn!(
                    "Push of {} for {} failed: {e}",
                    envelope.message.message_id, envelope.subscription
                ),
            }
        });
    }
}
