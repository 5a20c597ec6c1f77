//! The `persistence` module provides the key/value storage every registry is
//! built on.
//!
//! [`Storage`] is the minimal contract a backend has to satisfy: point
//! reads and writes, deletes, and full or prefix scans. Two backends ship with
//! the crate:
//!
//! - [`MemoryStore`]: a process-local ordered map, the reference backend.
//! - [`SledStore`]: an embedded `sled` database for data that should survive
//!   a restart.
//!
//! Registries never talk to a backend directly; they go through [`Table`],
//! which binds a key prefix to one entity type and owns its encoding.

pub mod memory;
pub mod sled_store;
pub mod table;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{StorageBackend, StorageSettings};
use crate::utils::Result;

pub use memory::MemoryStore;
pub use sled_store::SledStore;
pub use table::Table;

/// Key/value contract shared by all storage backends.
///
/// Single calls are atomic with respect to each other. Anything spanning
/// several calls (read, decide, write) needs a lock above this layer.
pub trait Storage: Send + Sync + std::fmt::Debug {
    fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Removing an absent key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// Every entry, ordered by key.
    fn dump(&self) -> Result<BTreeMap<String, Vec<u8>>>;

    /// Entries whose key starts with `prefix`, ordered by key.
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(self
            .dump()?
            .into_iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .collect())
    }
}

/// Opens the backend selected in the configuration.
pub fn open(settings: &StorageSettings) -> Result<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match settings.backend {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::Sled => Arc::new(SledStore::open(&settings.path)?),
    };
    tracing::info!("Opened {:?} storage backend", settings.backend);
    Ok(storage)
}

#[cfg(test)]
mod tests;
