//! Subscriptions and their registry.
//!
//! A subscription is bound to one topic by name for its whole life. It
//! carries the ack deadline handed to each new delivery and an optional push
//! endpoint; without one it is pull-only.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use url::Url;

use super::attributes::Attributes;
use super::status::StatusRegistry;
use super::topic::{TopicRegistry, validate_name};
use crate::persistence::{Storage, Table};
use crate::utils::{Error, Result, timestamp_millis};

const SUBSCRIPTION_PREFIX: &str = "subscriptions/";

/// Where and how to push messages for a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushConfig {
    pub endpoint: String,
    pub attributes: Attributes,
}

impl PushConfig {
    /// An empty endpoint means pull-only and yields `None`.
    pub fn parse(endpoint: &str, attributes: Attributes) -> Result<Option<Self>> {
        if endpoint.is_empty() {
            return Ok(None);
        }
        Url::parse(endpoint).map_err(|source| Error::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            source,
        })?;
        Ok(Some(Self {
            endpoint: endpoint.to_string(),
            attributes,
        }))
    }

    pub fn url(&self) -> Result<Url> {
        Url::parse(&self.endpoint).map_err(|source| Error::InvalidEndpoint {
            endpoint: self.endpoint.clone(),
            source,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub name: String,
    pub topic: String,
    pub ack_deadline: Duration,
    pub push_config: Option<PushConfig>,
    pub created_at: i64,
}

/// Seconds to a deadline; negative input is treated as zero.
pub fn ack_deadline_from_secs(seconds: i64) -> Duration {
    Duration::from_secs(u64::try_from(seconds).unwrap_or(0))
}

impl Subscription {
    pub fn new(
        name: &str,
        topic: &str,
        ack_deadline_secs: i64,
        push_config: Option<PushConfig>,
    ) -> Self {
        Self {
            name: name.to_string(),
            topic: topic.to_string(),
            ack_deadline: ack_deadline_from_secs(ack_deadline_secs),
            push_config,
            created_at: timestamp_millis(),
        }
    }

    pub fn set_ack_deadline(&mut self, seconds: i64) {
        self.ack_deadline = ack_deadline_from_secs(seconds);
    }

    pub fn set_push_config(&mut self, endpoint: &str, attributes: Attributes) -> Result<()> {
        self.push_config = PushConfig::parse(endpoint, attributes)?;
        Ok(())
    }

    pub fn is_push(&self) -> bool {
        self.push_config.is_some()
    }
}

#[derive(Debug)]
pub struct SubscriptionRegistry {
    table: Table<Subscription>,
    lock: Mutex<()>,
}

impl SubscriptionRegistry {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            table: Table::new(storage, SUBSCRIPTION_PREFIX),
            lock: Mutex::new(()),
        }
    }

    /// Creates the subscription and binds it to `topic`.
    ///
    /// Fails with `SubscriptionAlreadyExists`, `InvalidEndpoint` or
    /// `TopicNotFound`; nothing is stored on failure.
    pub fn create(
        &self,
        topics: &TopicRegistry,
        name: &str,
        topic: &str,
        ack_deadline_secs: i64,
        push_endpoint: &str,
        push_attributes: Attributes,
    ) -> Result<Subscription> {
        validate_name("subscription", name)?;
        let _guard = self.lock.lock();
        if self.table.contains(name)? {
            return Err(Error::SubscriptionAlreadyExists(name.to_string()));
        }
        let push_config = PushConfig::parse(push_endpoint, push_attributes)?;
        let subscription = Subscription::new(name, topic, ack_deadline_secs, push_config);

        topics.bind(topic, name)?;
        if let Err(e) = self.table.set(name, &subscription) {
            // keep the topic's binding set consistent with what was stored
            let _ = topics.unbind(topic, name);
            return Err(e);
        }
        Ok(subscription)
    }

    pub fn get(&self, name: &str) -> Result<Subscription> {
        self.table
            .get(name)?
            .ok_or_else(|| Error::SubscriptionNotFound(name.to_string()))
    }

    /// All subscriptions ordered by name.
    pub fn list(&self) -> Result<Vec<Subscription>> {
        self.table.list()
    }

    /// Whether `name` exists and is bound to `topic`.
    pub fn is_bound(&self, name: &str, topic: &str) -> Result<bool> {
        Ok(self
            .table
            .get(name)?
            .is_some_and(|subscription| subscription.topic == topic))
    }

    /// Removes the subscription, unbinds it from its topic if the topic
    /// still exists and drops its delivery records. Returns the subscription
    /// with the ids of messages nothing else is waiting for.
    ///
    /// The records are dropped before the lock is released, so a
    /// subscription re-created under the same name never loses statuses
    /// written for it.
    pub fn delete(
        &self,
        topics: &TopicRegistry,
        statuses: &StatusRegistry,
        name: &str,
    ) -> Result<(Subscription, Vec<String>)> {
        let _guard = self.lock.lock();
        let subscription = self.get(name)?;
        self.table.delete(name)?;
        match topics.unbind(&subscription.topic, name) {
            Ok(()) | Err(Error::TopicNotFound(_)) => {}
            Err(e) => return Err(e),
        }
        let released = statuses.remove_subscription(name)?;
        Ok((subscription, released))
    }

    pub fn set_ack_deadline(&self, name: &str, seconds: i64) -> Result<Subscription> {
        self.update(name, |subscription| {
            subscription.set_ack_deadline(seconds);
            Ok(())
        })
    }

    pub fn set_push_config(
        &self,
        name: &str,
        endpoint: &str,
        attributes: Attributes,
    ) -> Result<Subscription> {
        self.update(name, |subscription| {
            subscription.set_push_config(endpoint, attributes)
        })
    }

    fn update<F>(&self, name: &str, apply: F) -> Result<Subscription>
    where
        F: FnOnce(&mut Subscription) -> Result<()>,
    {
        let _guard = self.lock.lock();
        let mut subscription = self.get(name)?;
        apply(&mut subscription)?;
        self.table.set(name, &subscription)?;
        Ok(subscription)
    }
}
