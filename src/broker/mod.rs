//! The broker: topics, subscriptions, messages and their delivery state.
//!
//! [`Broker`] is the entry point; the registries it is built from are public
//! so they can be used and tested on their own.

pub mod attributes;
pub mod engine;
pub mod message;
pub mod push;
pub mod status;
pub mod subscription;
pub mod topic;

pub use attributes::Attributes;
pub use engine::{Broker, ReceivedMessage};
pub use message::Message;
pub use push::{HttpPusher, Pusher};
pub use status::{DeliveryState, MessageStatus};
pub use subscription::{PushConfig, Subscription};
pub use topic::Topic;
