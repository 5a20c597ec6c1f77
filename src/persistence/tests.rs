use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tempfile::tempdir;

use super::{MemoryStore, SledStore, Storage, Table};
use crate::config::{StorageBackend, StorageSettings};
use crate::utils::{Error, ErrorKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Record {
    name: String,
    count: u32,
}

fn exercise_backend(storage: &dyn Storage) {
    storage.set("b/2", b"two".to_vec()).unwrap();
    storage.set("a/1", b"one".to_vec()).unwrap();
    storage.set("b/1", b"uno".to_vec()).unwrap();

    assert_eq!(storage.get("a/1").unwrap(), Some(b"one".to_vec()));
    assert_eq!(storage.get("missing").unwrap(), None);

    let keys: Vec<_> = storage.dump().unwrap().into_keys().collect();
    assert_eq!(keys, vec!["a/1", "b/1", "b/2"]);

    let scanned: Vec<_> = storage
        .scan_prefix("b/")
        .unwrap()
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(scanned, vec!["b/1", "b/2"]);

    storage.delete("b/1").unwrap();
    assert_eq!(storage.get("b/1").unwrap(), None);
    // deleting twice is fine
    storage.delete("b/1").unwrap();
}

#[test]
fn test_memory_store_contract() {
    let store = MemoryStore::new();
    exercise_backend(&store);
    assert_eq!(store.len(), 2);
}

#[test]
fn test_sled_store_contract() {
    let dir = tempdir().unwrap();
    let store = SledStore::open(dir.path()).unwrap();
    exercise_backend(&store);
}

#[test]
fn test_sled_store_survives_reopen() {
    let dir = tempdir().unwrap();
    {
        let store = SledStore::open(dir.path()).unwrap();
        store.set("k", b"v".to_vec()).unwrap();
        store.flush().unwrap();
    }
    let store = SledStore::open(dir.path()).unwrap();
    assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));
}

#[test]
fn test_scan_prefix_does_not_leak_neighbours() {
    let store = MemoryStore::new();
    store.set("statuses/s1-a", vec![]).unwrap();
    store.set("statuses/s10-a", vec![]).unwrap();
    store.set("statuses/s2-a", vec![]).unwrap();
    let keys: Vec<_> = store
        .scan_prefix("statuses/s1-")
        .unwrap()
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(keys, vec!["statuses/s1-a"]);
}

#[test]
fn test_table_roundtrip_and_listing() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStore::new());
    let table: Table<Record> = Table::new(storage.clone(), "records/");

    let b = Record {
        name: "b".into(),
        count: 2,
    };
    let a = Record {
        name: "a".into(),
        count: 1,
    };
    table.set("b", &b).unwrap();
    table.set("a", &a).unwrap();

    assert_eq!(table.get("a").unwrap(), Some(a.clone()));
    assert!(table.contains("b").unwrap());
    assert_eq!(table.list().unwrap(), vec![a, b]);

    table.delete("a").unwrap();
    assert_eq!(table.get("a").unwrap(), None);
    assert!(storage.get("records/b").unwrap().is_some());
}

#[test]
fn test_table_reports_decode_failures() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStore::new());
    storage.set("records/bad", b"not json".to_vec()).unwrap();
    let table: Table<Record> = Table::new(storage, "records/");

    let err = table.get("bad").unwrap_err();
    assert!(matches!(err, Error::Decode { ref key, .. } if key == "records/bad"));
    assert_eq!(err.kind(), ErrorKind::DataIntegrity);
    assert!(table.list().is_err());
}

#[test]
fn test_open_selects_backend() {
    let dir = tempdir().unwrap();
    let memory = super::open(&StorageSettings {
        backend: StorageBackend::Memory,
        path: String::new(),
    })
    .unwrap();
    memory.set("k", vec![1]).unwrap();

    let sled = super::open(&StorageSettings {
        backend: StorageBackend::Sled,
        path: dir.path().join("db").to_string_lossy().into_owned(),
    })
    .unwrap();
    sled.set("k", vec![2]).unwrap();
    assert_eq!(sled.get("k").unwrap(), Some(vec![2]));
}
