//! In-memory document client for tests.

use std::{
    collections::{BTreeMap, HashMap},
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::document::DocumentClient;
use crate::common::errors::{StoreError, StoreResult};

pub struct MemoryDocumentClient {
    collections: Mutex<HashMap<String, BTreeMap<String, Value>>>,
    /// When false, every call fails like an unreachable server.
    pub reachable: AtomicBool,
    /// When true, writes fail.
    pub fail_writes: AtomicBool,
}

impl MemoryDocumentClient {
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            reachable: AtomicBool::new(true),
            fail_writes: AtomicBool::new(false),
        }
    }

    fn check(&self) -> StoreResult<()> {
        if self.reachable.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(StoreError::Remote("connection refused".into()))
        }
    }
}

#[async_trait]
impl DocumentClient for MemoryDocumentClient {
    async fn ping(&self) -> StoreResult<()> {
        self.check()
    }

    async fn find_one(&self, collection: &str, id: &str) -> StoreResult<Option<Value>> {
        self.check()?;
        Ok(self
            .collections
            .lock()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn upsert(&self, collection: &str, id: &str, document: Value) -> StoreResult<()> {
        self.check()?;
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(StoreError::Remote("write rejected".into()));
        }
        self.collections
            .lock()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), document);
        Ok(())
    }

    async fn delete_one(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.check()?;
        if let Some(docs) = self.collections.lock().get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn find_all(&self, collection: &str) -> StoreResult<Vec<Value>> {
        self.check()?;
        Ok(self
            .collections
            .lock()
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }
}
