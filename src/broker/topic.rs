//! Topic management
//!
//! A `Topic` holds the names of the subscriptions bound to it. Subscriptions
//! themselves live in the subscription registry; the topic only keeps the
//! name set so publish can fan out without scanning every subscription.
//!
//! Concurrency note: create/delete and binding changes are serialised by the
//! registry lock; reads go straight to storage.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::persistence::{Storage, Table};
use crate::utils::{Error, Result, timestamp_millis};

const TOPIC_PREFIX: &str = "topics/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    pub subscriptions: BTreeSet<String>,
    pub created_at: i64,
}

impl Topic {
    /// Create a new topic with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscriptions: BTreeSet::new(),
            created_at: timestamp_millis(),
        }
    }

    /// Add a subscription to the topic. Duplicate adds are ignored.
    pub fn subscribe(&mut self, subscription: &str) {
        self.subscriptions.insert(subscription.to_string());
    }

    /// Remove a subscription from the topic.
    pub fn unsubscribe(&mut self, subscription: &str) {
        self.subscriptions.remove(subscription);
    }
}

pub(crate) fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidArgument(format!("{kind} name must not be empty")));
    }
    if name.chars().any(char::is_control) {
        return Err(Error::InvalidArgument(format!(
            "{kind} name {name:?} contains control characters"
        )));
    }
    Ok(())
}

#[derive(Debug)]
pub struct TopicRegistry {
    table: Table<Topic>,
    lock: Mutex<()>,
}

impl TopicRegistry {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            table: Table::new(storage, TOPIC_PREFIX),
            lock: Mutex::new(()),
        }
    }

    pub fn create(&self, name: &str) -> Result<Topic> {
        validate_name("topic", name)?;
        let _guard = self.lock.lock();
        if self.table.contains(name)? {
            return Err(Error::TopicAlreadyExists(name.to_string()));
        }
        let topic = Topic::new(name);
        self.table.set(name, &topic)?;
        Ok(topic)
    }

    pub fn get(&self, name: &str) -> Result<Topic> {
        self.table
            .get(name)?
            .ok_or_else(|| Error::TopicNotFound(name.to_string()))
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        self.table.contains(name)
    }

    /// All topics ordered by name.
    pub fn list(&self) -> Result<Vec<Topic>> {
        self.table.list()
    }

    /// Removes the topic record. Bound subscriptions are left in place.
    pub fn delete(&self, name: &str) -> Result<Topic> {
        let _guard = self.lock.lock();
        let topic = self.get(name)?;
        self.table.delete(name)?;
        Ok(topic)
    }

    pub fn bind(&self, name: &str, subscription: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let mut topic = self.get(name)?;
        topic.subscribe(subscription);
        self.table.set(name, &topic)
    }

    pub fn unbind(&self, name: &str, subscription: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let mut topic = self.get(name)?;
        topic.unsubscribe(subscription);
        self.table.set(name, &topic)
    }
}
