use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::Storage;
use crate::utils::{Error, Result};

/// Typed view over the part of a [`Storage`] whose keys start with `prefix`.
///
/// Each registry owns one table per entity kind, so a value read back is
/// always decoded as the type it was written as.
pub struct Table<T> {
    storage: Arc<dyn Storage>,
    prefix: &'static str,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Table<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(storage: Arc<dyn Storage>, prefix: &'static str) -> Self {
        Self {
            storage,
            prefix,
            _entity: PhantomData,
        }
    }

    fn key(&self, id: &str) -> String {
        format!("{}{}", self.prefix, id)
    }

    fn decode(key: &str, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|source| Error::Decode {
            key: key.to_string(),
            source,
        })
    }

    pub fn get(&self, id: &str) -> Result<Option<T>> {
        let key = self.key(id);
        match self.storage.get(&key)? {
            Some(bytes) => Self::decode(&key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    pub fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.storage.get(&self.key(id))?.is_some())
    }

    pub fn set(&self, id: &str, value: &T) -> Result<()> {
        let key = self.key(id);
        let bytes = serde_json::to_vec(value).map_err(|source| Error::Encode {
            key: key.clone(),
            source,
        })?;
        self.storage.set(&key, bytes)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.storage.delete(&self.key(id))
    }

    /// All entities, ordered by id.
    pub fn list(&self) -> Result<Vec<T>> {
        self.scan("")
    }

    /// Entities whose id starts with `id_prefix`, ordered by id.
    pub fn scan(&self, id_prefix: &str) -> Result<Vec<T>> {
        self.storage
            .scan_prefix(&self.key(id_prefix))?
            .iter()
            .map(|(key, bytes)| Self::decode(key, bytes))
            .collect()
    }
}

impl<T> std::fmt::Debug for Table<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("prefix", &self.prefix)
            .finish()
    }
}
