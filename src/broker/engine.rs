//! Broker engine
//!
//! `Broker` wires the registries together and implements the operations the
//! transport exposes:
//! - topic and subscription lifecycle
//! - publish: store the message once and fan out one `Wait` status per bound
//!   subscription, triggering push delivery where configured
//! - pull: hand out readable statuses as deliveries with fresh ack ids
//! - ack: finish a delivery and drop the message once every subscription
//!   has acknowledged it
//!
//! Concurrency and usage notes:
//! - Each registry guards its own read-decide-write sequences, so the broker
//!   is shared as a plain `Arc<Broker>` without an outer lock.
//! - There is no background redelivery task. An unacknowledged delivery
//!   becomes readable again once its ack deadline has elapsed, which pull
//!   evaluates against the clock value it is given.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::attributes::Attributes;
use super::message::{Message, MessageRegistry};
use super::push::Pusher;
use super::status::{MessageStatus, StatusRegistry};
use super::subscription::{Subscription, SubscriptionRegistry, ack_deadline_from_secs};
use super::topic::{Topic, TopicRegistry};
use crate::persistence::{MemoryStore, Storage};
use crate::utils::{Error, Result, timestamp_millis};

/// One message handed out by a pull, with the token needed to ack it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivedMessage {
    pub ack_id: String,
    pub message: Message,
}

pub struct Broker {
    topics: TopicRegistry,
    subscriptions: SubscriptionRegistry,
    messages: MessageRegistry,
    statuses: StatusRegistry,
    pusher: Option<Arc<dyn Pusher>>,
}

impl Broker {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            topics: TopicRegistry::new(storage.clone()),
            subscriptions: SubscriptionRegistry::new(storage.clone()),
            messages: MessageRegistry::new(storage.clone()),
            statuses: StatusRegistry::new(storage),
            pusher: None,
        }
    }

    /// A broker backed by a fresh [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn with_pusher(mut self, pusher: Arc<dyn Pusher>) -> Self {
        self.pusher = Some(pusher);
        self
    }

    // ---- topics ----

    pub fn create_topic(&self, name: &str) -> Result<Topic> {
        let topic = self.topics.create(name)?;
        info!("Created topic {name}");
        Ok(topic)
    }

    pub fn get_topic(&self, name: &str) -> Result<Topic> {
        self.topics.get(name)
    }

    pub fn list_topics(&self) -> Result<Vec<Topic>> {
        self.topics.list()
    }

    /// Deletes the topic record only; its subscriptions keep their backlog
    /// but receive nothing new.
    pub fn delete_topic(&self, name: &str) -> Result<()> {
        let topic = self.topics.delete(name)?;
        if !topic.subscriptions.is_empty() {
            warn!(
                "Deleted topic {name} with {} subscription(s) still attached",
                topic.subscriptions.len()
            );
        } else {
            info!("Deleted topic {name}");
        }
        Ok(())
    }

    /// Publishes one message and returns its id.
    pub fn publish(&self, topic: &str, data: Vec<u8>, attributes: Attributes) -> Result<String> {
        let topic = self.topics.get(topic)?;
        self.publish_to(&topic, data, attributes)
    }

    /// Publishes several messages to the same topic, returning their ids in
    /// order. Stops at the first failure.
    pub fn publish_batch<I>(&self, topic: &str, messages: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = (Vec<u8>, Attributes)>,
    {
        let topic = self.topics.get(topic)?;
        messages
            .into_iter()
            .map(|(data, attributes)| self.publish_to(&topic, data, attributes))
            .collect()
    }

    fn publish_to(&self, topic: &Topic, data: Vec<u8>, attributes: Attributes) -> Result<String> {
        let message = Message::new(&topic.name, data, attributes);

        let mut bound = Vec::with_capacity(topic.subscriptions.len());
        for name in &topic.subscriptions {
            match self.subscriptions.get(name) {
                Ok(subscription) if subscription.topic == topic.name => bound.push(subscription),
                Ok(_) | Err(Error::SubscriptionNotFound(_)) => {
                    warn!("Topic {} lists stale subscription {name}", topic.name)
                }
                Err(e) => return Err(e),
            }
        }

        if bound.is_empty() {
            debug!(
                "Published {} to {} with no subscriptions; dropping",
                message.id, topic.name
            );
            return Ok(message.id);
        }

        self.messages.set(&message)?;
        let statuses: Vec<_> = bound
            .iter()
            .map(|s| MessageStatus::new(&s.name, &message.id, s.ack_deadline))
            .collect();
        let written = self
            .statuses
            .insert_all(&statuses, |name| self.subscriptions.is_bound(name, &topic.name))?;
        if written == 0 {
            // every subscription went away while publishing
            self.messages.delete(&message.id)?;
            return Ok(message.id);
        }
        debug!(
            "Published {} to {} for {written} subscription(s)",
            message.id, topic.name
        );

        if let Some(pusher) = &self.pusher {
            for subscription in bound.iter().filter(|s| s.is_push()) {
                pusher.push(subscription, &message);
            }
        }

        Ok(message.id)
    }

    // ---- subscriptions ----

    pub fn create_subscription(
        &self,
        name: &str,
        topic: &str,
        ack_deadline_secs: i64,
        push_endpoint: &str,
        push_attributes: Attributes,
    ) -> Result<Subscription> {
        let subscription = self.subscriptions.create(
            &self.topics,
            name,
            topic,
            ack_deadline_secs,
            push_endpoint,
            push_attributes,
        )?;
        info!(
            "Created subscription {name} on topic {topic} (ack deadline {:?})",
            subscription.ack_deadline
        );
        Ok(subscription)
    }

    pub fn get_subscription(&self, name: &str) -> Result<Subscription> {
        self.subscriptions.get(name)
    }

    pub fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        self.subscriptions.list()
    }

    /// Deletes the subscription with its delivery records, dropping messages
    /// no other subscription still waits for.
    pub fn delete_subscription(&self, name: &str) -> Result<()> {
        let (_, released) = self.subscriptions.delete(&self.topics, &self.statuses, name)?;
        for message_id in &released {
            self.messages.delete(message_id)?;
        }
        info!(
            "Deleted subscription {name}, released {} message(s)",
            released.len()
        );
        Ok(())
    }

    pub fn set_ack_deadline(&self, name: &str, seconds: i64) -> Result<Subscription> {
        self.subscriptions.set_ack_deadline(name, seconds)
    }

    /// An empty endpoint switches the subscription to pull-only.
    pub fn set_push_config(
        &self,
        name: &str,
        endpoint: &str,
        attributes: Attributes,
    ) -> Result<Subscription> {
        self.subscriptions.set_push_config(name, endpoint, attributes)
    }

    // ---- delivery ----

    /// Pulls up to `max_messages` readable messages, lowest message id first.
    ///
    /// Returns [`Error::EmptyMessage`] when nothing is readable right now.
    pub fn pull(&self, subscription: &str, max_messages: usize) -> Result<Vec<ReceivedMessage>> {
        self.pull_at(subscription, max_messages, timestamp_millis())
    }

    /// [`Broker::pull`] evaluated at `now` (ms since epoch).
    pub fn pull_at(
        &self,
        subscription: &str,
        max_messages: usize,
        now: i64,
    ) -> Result<Vec<ReceivedMessage>> {
        if max_messages == 0 {
            return Err(Error::InvalidArgument(
                "max_messages must be greater than zero".to_string(),
            ));
        }
        let subscription = self.subscriptions.get(subscription)?;

        let ack_deadline = subscription.ack_deadline;
        let result = self
            .statuses
            .deliver(&subscription.name, max_messages, ack_deadline, now);
        let delivered = match result {
            Ok(delivered) => delivered,
            Err(Error::EmptyMessage) => {
                debug!("Nothing readable for {}", subscription.name);
                return Err(Error::EmptyMessage);
            }
            Err(e) => return Err(e),
        };

        let mut received = Vec::with_capacity(delivered.len());
        for status in delivered {
            match self.messages.get(&status.message_id) {
                Ok(message) => received.push(ReceivedMessage {
                    ack_id: status.ack_id,
                    message,
                }),
                Err(Error::MessageNotFound(id)) => {
                    warn!(
                        "Dropping status {} of {}: message {id} is gone",
                        status.id, subscription.name
                    );
                    self.statuses.remove(&status.id)?;
                }
                Err(e) => return Err(e),
            }
        }

        if received.is_empty() {
            return Err(Error::EmptyMessage);
        }
        debug!(
            "Delivered {} message(s) to {}",
            received.len(),
            subscription.name
        );
        Ok(received)
    }

    /// Acknowledges one delivery of `subscription`.
    pub fn ack(&self, subscription: &str, ack_id: &str) -> Result<()> {
        let outcome = self.statuses.acknowledge(subscription, ack_id)?;
        debug!("Acked {} on {subscription}", outcome.status.message_id);
        if let Some(message_id) = outcome.released {
            self.messages.delete(&message_id)?;
            debug!("Released message {message_id}");
        }
        Ok(())
    }

    /// Acknowledges each id independently; the result for every id is
    /// reported in order.
    pub fn acknowledge<S>(&self, subscription: &str, ack_ids: &[S]) -> Result<Vec<Result<()>>>
    where
        S: AsRef<str>,
    {
        self.subscriptions.get(subscription)?;
        Ok(ack_ids
            .iter()
            .map(|ack_id| self.ack(subscription, ack_id.as_ref()))
            .collect())
    }

    /// Changes the deadline of one in-flight delivery. Negative seconds are
    /// treated as zero.
    pub fn modify_ack_deadline(&self, subscription: &str, ack_id: &str, seconds: i64) -> Result<()> {
        self.subscriptions.get(subscription)?;
        self.statuses
            .modify_ack_deadline(subscription, ack_id, ack_deadline_from_secs(seconds))?;
        Ok(())
    }

    // ---- inspection ----

    pub fn get_message(&self, id: &str) -> Result<Message> {
        self.messages.get(id)
    }

    pub fn message_status(&self, subscription: &str, message_id: &str) -> Result<MessageStatus> {
        self.statuses
            .find_by_subscription_and_message(subscription, message_id)?
            .ok_or_else(|| {
                Error::MessageNotFound(MessageStatus::status_id(subscription, message_id))
            })
    }

    /// Unacknowledged messages of `subscription`, readable or in flight.
    pub fn backlog(&self, subscription: &str) -> Result<usize> {
        self.subscriptions.get(subscription)?;
        self.statuses.backlog(subscription)
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("topics", &self.topics)
            .field("subscriptions", &self.subscriptions)
            .field("push", &self.pusher.is_some())
            .finish()
    }
}
