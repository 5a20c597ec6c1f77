//! String attributes attached to messages and push configurations.
//!
//! The map sits behind its own lock so handlers holding the same
//! [`Message`](super::message::Message) on different threads can read or
//! extend it without going through a registry.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Default)]
pub struct Attributes {
    inner: RwLock<HashMap<String, String>>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.write().insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.read().get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.inner.write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Copy of the current contents; key order is unspecified.
    pub fn to_map(&self) -> HashMap<String, String> {
        self.inner.read().clone()
    }
}

impl Clone for Attributes {
    fn clone(&self) -> Self {
        Self::from(self.to_map())
    }
}

impl PartialEq for Attributes {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || self.to_map() == other.to_map()
    }
}

impl From<HashMap<String, String>> for Attributes {
    fn from(map: HashMap<String, String>) -> Self {
        Self {
            inner: RwLock::new(map),
        }
    }
}

impl Serialize for Attributes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.inner.read().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Attributes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        HashMap::<String, String>::deserialize(deserializer).map(Self::from)
    }
}
