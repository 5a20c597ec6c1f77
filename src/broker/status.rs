//! Per-(subscription, message) delivery tracking.
//!
//! Every message published to a topic gets one [`MessageStatus`] per bound
//! subscription. A status moves `Wait -> Delivered -> Ack`; a delivered
//! status whose ack deadline has elapsed becomes readable again without its
//! stored state changing, see [`MessageStatus::readable`].
//!
//! The registry serialises every read-decide-write sequence behind one lock,
//! so two concurrent pulls can never both select the same status.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::persistence::{Storage, Table};
use crate::utils::{Error, Result};

const STATUS_PREFIX: &str = "statuses/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Wait,
    Delivered,
    Ack,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageStatus {
    /// `"{subscription}-{message_id}"`.
    pub id: String,
    pub subscription: String,
    pub message_id: String,
    /// Token of the current delivery; empty unless `state` is `Delivered`.
    #[serde(default)]
    pub ack_id: String,
    pub ack_deadline: Duration,
    pub state: DeliveryState,
    /// Milliseconds since UNIX epoch of the latest delivery.
    pub delivered_at: Option<i64>,
    /// Every subscription the message was fanned out to, this one included.
    #[serde(default)]
    pub fanout: Vec<String>,
}

impl MessageStatus {
    pub fn new(subscription: &str, message_id: &str, ack_deadline: Duration) -> Self {
        Self {
            id: Self::status_id(subscription, message_id),
            subscription: subscription.to_string(),
            message_id: message_id.to_string(),
            ack_id: String::new(),
            ack_deadline,
            state: DeliveryState::Wait,
            delivered_at: None,
            fanout: Vec::new(),
        }
    }

    pub fn status_id(subscription: &str, message_id: &str) -> String {
        format!("{subscription}-{message_id}")
    }

    /// Whether a pull at `now` (ms since epoch) may hand this status out.
    ///
    /// A delivery whose deadline has fully elapsed is readable again; a zero
    /// deadline therefore makes a delivered message immediately re-readable.
    pub fn readable(&self, now: i64) -> bool {
        match self.state {
            DeliveryState::Wait => true,
            DeliveryState::Ack => false,
            DeliveryState::Delivered => match self.delivered_at {
                Some(at) => {
                    let deadline = i64::try_from(self.ack_deadline.as_millis()).unwrap_or(i64::MAX);
                    now.saturating_sub(at) >= deadline
                }
                None => true,
            },
        }
    }

    /// Starts a new delivery, invalidating any previous ack id.
    pub fn deliver(&mut self, now: i64, ack_deadline: Duration) {
        self.ack_id = Uuid::new_v4().to_string();
        self.ack_deadline = ack_deadline;
        self.state = DeliveryState::Delivered;
        self.delivered_at = Some(now);
    }

    pub fn acknowledge(&mut self) {
        self.ack_id.clear();
        self.state = DeliveryState::Ack;
    }

    pub fn is_acked(&self) -> bool {
        self.state == DeliveryState::Ack
    }
}

/// Result of acknowledging one delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct AckOutcome {
    pub status: MessageStatus,
    /// Set when this ack was the last outstanding one for the message; the
    /// message's statuses are already gone and the caller drops the message.
    pub released: Option<String>,
}

#[derive(Debug)]
pub struct StatusRegistry {
    table: Table<MessageStatus>,
    lock: Mutex<()>,
}

impl StatusRegistry {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            table: Table::new(storage, STATUS_PREFIX),
            lock: Mutex::new(()),
        }
    }

    /// Stores fresh statuses for subscriptions that `is_bound` still accepts,
    /// returning how many were written. Each written status records the full
    /// set of written subscriptions so the ack path can find its siblings.
    ///
    /// `is_bound` runs under the registry lock so a subscription deleted
    /// concurrently cannot be left with statuses nobody will clean up.
    pub fn insert_all<F>(&self, statuses: &[MessageStatus], is_bound: F) -> Result<usize>
    where
        F: Fn(&str) -> Result<bool>,
    {
        let _guard = self.lock.lock();
        let mut bound = Vec::with_capacity(statuses.len());
        for status in statuses {
            if is_bound(&status.subscription)? {
                bound.push(status);
            }
        }
        let fanout: Vec<String> = bound.iter().map(|s| s.subscription.clone()).collect();
        for status in &bound {
            let mut status = MessageStatus::clone(status);
            status.fanout = fanout.clone();
            self.table.set(&status.id, &status)?;
        }
        Ok(bound.len())
    }

    pub fn find_by_subscription_and_message(
        &self,
        subscription: &str,
        message_id: &str,
    ) -> Result<Option<MessageStatus>> {
        self.table
            .get(&MessageStatus::status_id(subscription, message_id))
    }

    /// Every status of `subscription`, ordered by message id.
    pub fn by_subscription(&self, subscription: &str) -> Result<Vec<MessageStatus>> {
        let mut statuses: Vec<_> = self
            .table
            .scan(&format!("{subscription}-"))?
            .into_iter()
            .filter(|s| s.subscription == subscription)
            .collect();
        statuses.sort_by(|a, b| a.message_id.cmp(&b.message_id));
        Ok(statuses)
    }

    /// Statuses of the same message still stored, found by point lookups
    /// over the fan-out list.
    fn siblings(&self, status: &MessageStatus) -> Result<Vec<MessageStatus>> {
        let names = if status.fanout.is_empty() {
            std::slice::from_ref(&status.subscription)
        } else {
            status.fanout.as_slice()
        };
        let mut siblings = Vec::with_capacity(names.len());
        for name in names {
            let found = self.find_by_subscription_and_message(name, &status.message_id)?;
            siblings.extend(found);
        }
        Ok(siblings)
    }

    /// The in-flight delivery of `subscription` holding `ack_id`.
    pub fn find_by_ack_id(&self, subscription: &str, ack_id: &str) -> Result<MessageStatus> {
        if ack_id.is_empty() {
            return Err(Error::AckIdNotFound(ack_id.to_string()));
        }
        self.by_subscription(subscription)?
            .into_iter()
            .find(|s| s.state == DeliveryState::Delivered && s.ack_id == ack_id)
            .ok_or_else(|| Error::AckIdNotFound(ack_id.to_string()))
    }

    /// Up to `limit` statuses readable at `now`, lowest message id first.
    /// Nothing is modified.
    pub fn collect_readable_by_subscription(
        &self,
        subscription: &str,
        limit: usize,
        now: i64,
    ) -> Result<Vec<MessageStatus>> {
        Ok(self
            .by_subscription(subscription)?
            .into_iter()
            .filter(|s| s.readable(now))
            .take(limit)
            .collect())
    }

    /// Selects up to `limit` readable statuses and marks them delivered in
    /// one critical section.
    ///
    /// Returns [`Error::EmptyMessage`] when nothing is readable right now.
    pub fn deliver(
        &self,
        subscription: &str,
        limit: usize,
        ack_deadline: Duration,
        now: i64,
    ) -> Result<Vec<MessageStatus>> {
        let _guard = self.lock.lock();
        let mut selected = self.collect_readable_by_subscription(subscription, limit, now)?;
        if selected.is_empty() {
            return Err(Error::EmptyMessage);
        }
        for status in &mut selected {
            status.deliver(now, ack_deadline);
            self.table.set(&status.id, status)?;
        }
        Ok(selected)
    }

    /// Moves the delivery holding `ack_id` to `Ack`.
    ///
    /// When every status of the underlying message is acknowledged, those
    /// statuses are removed and the message id is reported back in
    /// [`AckOutcome::released`].
    pub fn acknowledge(&self, subscription: &str, ack_id: &str) -> Result<AckOutcome> {
        let _guard = self.lock.lock();
        let mut status = self.find_by_ack_id(subscription, ack_id)?;
        status.acknowledge();
        self.table.set(&status.id, &status)?;

        let siblings = self.siblings(&status)?;
        let released = if siblings.iter().all(MessageStatus::is_acked) {
            for sibling in &siblings {
                self.table.delete(&sibling.id)?;
            }
            Some(status.message_id.clone())
        } else {
            None
        };

        Ok(AckOutcome { status, released })
    }

    /// Replaces the deadline of the delivery holding `ack_id`, keeping its
    /// state and delivery time.
    pub fn modify_ack_deadline(
        &self,
        subscription: &str,
        ack_id: &str,
        ack_deadline: Duration,
    ) -> Result<MessageStatus> {
        let _guard = self.lock.lock();
        let mut status = self.find_by_ack_id(subscription, ack_id)?;
        status.ack_deadline = ack_deadline;
        self.table.set(&status.id, &status)?;
        Ok(status)
    }

    /// Drops a single status record.
    pub fn remove(&self, id: &str) -> Result<()> {
        let _guard = self.lock.lock();
        self.table.delete(id)
    }

    /// Drops every status of `subscription` and returns the ids of messages
    /// that are left with nothing outstanding. Their remaining (acked)
    /// statuses are removed as well.
    pub fn remove_subscription(&self, subscription: &str) -> Result<Vec<String>> {
        let _guard = self.lock.lock();
        let removed = self.by_subscription(subscription)?;
        for status in &removed {
            self.table.delete(&status.id)?;
        }

        let mut released = Vec::new();
        for status in removed {
            let siblings = self.siblings(&status)?;
            if siblings.iter().all(MessageStatus::is_acked) {
                for sibling in &siblings {
                    self.table.delete(&sibling.id)?;
                }
                released.push(status.message_id);
            }
        }
        Ok(released)
    }

    /// Number of statuses of `subscription` that are not yet acknowledged.
    pub fn backlog(&self, subscription: &str) -> Result<usize> {
        Ok(self
            .by_subscription(subscription)?
            .iter()
            .filter(|s| !s.is_acked())
            .count())
    }
}
