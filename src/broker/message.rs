//! Published messages and their registry.
//!
//! A `Message` is written once at publish time and never modified; delivery
//! progress lives in [`MessageStatus`](super::status::MessageStatus) records
//! that point back at it by id.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attributes::Attributes;
use crate::persistence::{Storage, Table};
use crate::utils::{Error, Result, timestamp_millis};

const MESSAGE_PREFIX: &str = "messages/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub data: Vec<u8>,
    pub attributes: Attributes,
    pub topic: String,
    /// Milliseconds since UNIX epoch.
    pub published_at: i64,
}

impl Message {
    /// Builds a message with a fresh UUID, stamped with the current time.
    pub fn new(topic: &str, data: Vec<u8>, attributes: Attributes) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            data,
            attributes,
            topic: topic.to_string(),
            published_at: timestamp_millis(),
        }
    }
}

/// Message records keyed by message id.
#[derive(Debug)]
pub struct MessageRegistry {
    table: Table<Message>,
}

impl MessageRegistry {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            table: Table::new(storage, MESSAGE_PREFIX),
        }
    }

    pub fn get(&self, id: &str) -> Result<Message> {
        self.table
            .get(id)?
            .ok_or_else(|| Error::MessageNotFound(id.to_string()))
    }

    pub fn set(&self, message: &Message) -> Result<()> {
        self.table.set(&message.id, message)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.table.delete(id)
    }

    pub fn list(&self) -> Result<Vec<Message>> {
        self.table.list()
    }
}
