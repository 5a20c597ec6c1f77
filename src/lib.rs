//! # PullSub
//!
//! `pullsub` is a pull-based publish/subscribe broker. Publishers post
//! messages to topics; every subscription bound to a topic gets its own copy
//! to pull, acknowledge within an ack deadline, or have redelivered once that
//! deadline lapses. A message is dropped as soon as every subscription has
//! acknowledged it.
//!
//! ## Core Modules
//!
//! - `broker`: Topics, subscriptions, messages and per-subscription delivery
//!   state, plus the optional push trigger.
//! - `config`: Loads layered configuration from files and the environment.
//! - `persistence`: The key-value storage contract and its in-memory and
//!   sled backends.
//! - `transport`: The WebSocket server and its JSON protocol.
//! - `utils`: Shared error type, logging setup and clock helpers.

pub mod broker;
pub mod config;
pub mod persistence;
pub mod transport;
pub mod utils;
