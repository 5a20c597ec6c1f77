//! Storage backend on top of an embedded `sled` database.
//!
//! Keys are stored as their UTF-8 bytes in the default tree, so sled's
//! lexicographic ordering matches the `String` ordering of [`MemoryStore`]
//! and prefix scans map onto `Tree::scan_prefix` directly.
//!
//! [`MemoryStore`]: super::MemoryStore

use std::collections::BTreeMap;
use std::path::Path;

use sled::Db;

use super::Storage;
use crate::utils::{Error, Result};

#[derive(Clone)]
pub struct SledStore {
    db: Db,
}

impl SledStore {
    /// Open or create a sled database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path)
            .map_err(|e| Error::storage("open", path.display().to_string(), e))?;
        Ok(Self { db })
    }

    /// Flush dirty pages to disk; sled also does this periodically on its own.
    pub fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map(|_| ())
            .map_err(|e| Error::storage("flush", "*", e))
    }

    fn decode_entry(key: &[u8], value: &[u8]) -> Result<(String, Vec<u8>)> {
        let key = std::str::from_utf8(key)
            .map_err(|e| Error::storage("scan", String::from_utf8_lossy(key), e))?;
        Ok((key.to_string(), value.to_vec()))
    }
}

impl Storage for SledStore {
    fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.db
            .insert(key.as_bytes(), value)
            .map(|_| ())
            .map_err(|e| Error::storage("set", key, e))
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.db
            .get(key.as_bytes())
            .map(|value| value.map(|v| v.to_vec()))
            .map_err(|e| Error::storage("get", key, e))
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.db
            .remove(key.as_bytes())
            .map(|_| ())
            .map_err(|e| Error::storage("delete", key, e))
    }

    fn dump(&self) -> Result<BTreeMap<String, Vec<u8>>> {
        let mut entries = BTreeMap::new();
        for entry in self.db.iter() {
            let (key, value) = entry.map_err(|e| Error::storage("dump", "*", e))?;
            let (key, value) = Self::decode_entry(&key, &value)?;
            entries.insert(key, value);
        }
        Ok(entries)
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        self.db
            .scan_prefix(prefix.as_bytes())
            .map(|entry| {
                let (key, value) = entry.map_err(|e| Error::storage("scan", prefix, e))?;
                Self::decode_entry(&key, &value)
            })
            .collect()
    }
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("db", &"sled::Db")
            .finish()
    }
}
