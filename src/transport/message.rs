//! Wire protocol spoken over the WebSocket.
//!
//! Every text frame from a client is one [`ClientMessage`]; the server answers
//! each with exactly one [`ServerMessage`]. Payloads travel as standard
//! base64 so arbitrary bytes survive JSON.

use std::collections::HashMap;
use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::broker::{Message, ReceivedMessage, Subscription, Topic};
use crate::utils::{Error, Result};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "create_topic")]
    CreateTopic { topic: String },
    #[serde(rename = "get_topic")]
    GetTopic { topic: String },
    #[serde(rename = "list_topics")]
    ListTopics,
    #[serde(rename = "delete_topic")]
    DeleteTopic { topic: String },
    #[serde(rename = "publish")]
    Publish {
        topic: String,
        messages: Vec<OutgoingMessage>,
    },
    #[serde(rename = "create_subscription")]
    CreateSubscription {
        subscription: String,
        topic: String,
        /// Falls back to the configured default when absent.
        #[serde(default)]
        ack_deadline_seconds: Option<i64>,
        #[serde(default)]
        push_endpoint: String,
        #[serde(default)]
        push_attributes: HashMap<String, String>,
    },
    #[serde(rename = "get_subscription")]
    GetSubscription { subscription: String },
    #[serde(rename = "list_subscriptions")]
    ListSubscriptions,
    #[serde(rename = "delete_subscription")]
    DeleteSubscription { subscription: String },
    #[serde(rename = "modify_push_config")]
    ModifyPushConfig {
        subscription: String,
        #[serde(default)]
        push_endpoint: String,
        #[serde(default)]
        push_attributes: HashMap<String, String>,
    },
    #[serde(rename = "modify_ack_deadline")]
    ModifyAckDeadline {
        subscription: String,
        ack_id: String,
        ack_deadline_seconds: i64,
    },
    #[serde(rename = "pull")]
    Pull {
        subscription: String,
        max_messages: usize,
    },
    #[serde(rename = "ack")]
    Ack {
        subscription: String,
        ack_ids: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "topic")]
    Topic { topic: TopicInfo },
    #[serde(rename = "topics")]
    Topics { topics: Vec<TopicInfo> },
    #[serde(rename = "subscription")]
    Subscription { subscription: SubscriptionInfo },
    #[serde(rename = "subscriptions")]
    Subscriptions { subscriptions: Vec<SubscriptionInfo> },
    #[serde(rename = "published")]
    Published { message_ids: Vec<String> },
    #[serde(rename = "pulled")]
    Pulled {
        received_messages: Vec<ReceivedInfo>,
    },
    #[serde(rename = "acked")]
    Acked { failed_ack_ids: Vec<String> },
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "error")]
    Error { code: u16, message: String },
}

impl ServerMessage {
    pub fn error(err: &Error) -> Self {
        ServerMessage::Error {
            code: err.kind().status_code(),
            message: err.to_string(),
        }
    }
}

/// A message as submitted by a publisher.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OutgoingMessage {
    /// Base64 of the payload.
    pub data: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl OutgoingMessage {
    pub fn new(data: &[u8]) -> Self {
        Self {
            data: STANDARD.encode(data),
            attributes: HashMap::new(),
        }
    }

    pub fn decode_data(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.data)
            .map_err(|e| Error::InvalidArgument(format!("data is not valid base64: {e}")))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MessageInfo {
    pub message_id: String,
    pub topic: String,
    /// Base64 of the payload.
    pub data: String,
    pub attributes: HashMap<String, String>,
    /// Milliseconds since UNIX epoch.
    pub publish_time: i64,
}

impl MessageInfo {
    pub fn decode_data(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.data)
            .map_err(|e| Error::InvalidArgument(format!("data is not valid base64: {e}")))
    }
}

impl fmt::Display for MessageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.decode_data() {
            Ok(data) => write!(
                f,
                "{} on {}: {}",
                self.message_id,
                self.topic,
                String::from_utf8_lossy(&data)
            ),
            Err(_) => write!(f, "{} on {}: <{}>", self.message_id, self.topic, self.data),
        }
    }
}

impl From<&Message> for MessageInfo {
    fn from(message: &Message) -> Self {
        Self {
            message_id: message.id.clone(),
            topic: message.topic.clone(),
            data: STANDARD.encode(&message.data),
            attributes: message.attributes.to_map(),
            publish_time: message.published_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ReceivedInfo {
    pub ack_id: String,
    pub message: MessageInfo,
}

impl From<&ReceivedMessage> for ReceivedInfo {
    fn from(received: &ReceivedMessage) -> Self {
        Self {
            ack_id: received.ack_id.clone(),
            message: MessageInfo::from(&received.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TopicInfo {
    pub name: String,
    pub subscriptions: Vec<String>,
}

impl From<&Topic> for TopicInfo {
    fn from(topic: &Topic) -> Self {
        Self {
            name: topic.name.clone(),
            subscriptions: topic.subscriptions.iter().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SubscriptionInfo {
    pub name: String,
    pub topic: String,
    pub ack_deadline_seconds: u64,
    /// Empty for pull-only subscriptions.
    pub push_endpoint: String,
    pub push_attributes: HashMap<String, String>,
}

impl From<&Subscription> for SubscriptionInfo {
    fn from(subscription: &Subscription) -> Self {
        let (push_endpoint, push_attributes) = match &subscription.push_config {
            Some(config) => (config.endpoint.clone(), config.attributes.to_map()),
            None => (String::new(), HashMap::new()),
        };
        Self {
            name: subscription.name.clone(),
            topic: subscription.topic.clone(),
            ack_deadline_seconds: subscription.ack_deadline.as_secs(),
            push_endpoint,
            push_attributes,
        }
    }
}
