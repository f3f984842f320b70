//! crates/training_portal_core/src/memory.rs
//!
//! In-process implementations of the `RemoteStore` and `LocalCache` ports.
//! The service falls back to `MemoryRemote` when no database is configured.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::ports::{Collection, Filter, LocalCache, PortError, PortResult, RemoteStore};

//=========================================================================================
// MemoryRemote
//=========================================================================================

/// Records per collection, kept in insertion order.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    records: Mutex<HashMap<Collection, Vec<Value>>>,
    offline: AtomicBool,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call fails with `PortError::Unexpected`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// All records of a collection, for inspection.
    pub fn records(&self, collection: Collection) -> Vec<Value> {
        self.lock().get(&collection).cloned().unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Collection, Vec<Value>>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_online(&self) -> PortResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("remote service unreachable".to_string()));
        }
        Ok(())
    }
}

fn record_id(record: &Value) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn insert(&self, collection: Collection, record: Value) -> PortResult<Value> {
        self.check_online()?;
        if record_id(&record).is_none() {
            return Err(PortError::Unexpected(format!(
                "record for {} has no string id",
                collection
            )));
        }
        self.lock().entry(collection).or_default().push(record.clone());
        Ok(record)
    }

    async fn update(&self, collection: Collection, id: &str, patch: Value) -> PortResult<()> {
        self.check_online()?;
        let Value::Object(patch) = patch else {
            return Err(PortError::Unexpected("patch must be a JSON object".to_string()));
        };
        let mut records = self.lock();
        let record = records
            .get_mut(&collection)
            .and_then(|rows| rows.iter_mut().find(|r| record_id(r) == Some(id)))
            .ok_or_else(|| PortError::NotFound(format!("{} record {}", collection, id)))?;
        if let Value::Object(fields) = record {
            fields.extend(patch);
        }
        Ok(())
    }

    async fn select(&self, collection: Collection, filter: &Filter) -> PortResult<Vec<Value>> {
        self.check_online()?;
        Ok(self
            .lock()
            .get(&collection)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    async fn delete(&self, collection: Collection, id: &str) -> PortResult<()> {
        self.check_online()?;
        let mut records = self.lock();
        let rows = records
            .get_mut(&collection)
            .ok_or_else(|| PortError::NotFound(format!("{} record {}", collection, id)))?;
        let before = rows.len();
        rows.retain(|r| record_id(r) != Some(id));
        if rows.len() == before {
            return Err(PortError::NotFound(format!("{} record {}", collection, id)));
        }
        Ok(())
    }
}

//=========================================================================================
// MemoryCache
//=========================================================================================

/// A key/value cache with an optional byte quota per entry.
#[derive(Debug, Default)]
pub struct MemoryCache {
    slots: Mutex<HashMap<String, String>>,
    max_bytes: Option<usize>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(max_bytes: usize) -> Self {
        Self {
            slots: Mutex::default(),
            max_bytes: Some(max_bytes),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LocalCache for MemoryCache {
    fn save(&self, key: &str, snapshot: &str) -> PortResult<()> {
        if let Some(limit) = self.max_bytes {
            if snapshot.len() > limit {
                return Err(PortError::QuotaExceeded {
                    needed: snapshot.len(),
                    limit,
                });
            }
        }
        self.lock().insert(key.to_string(), snapshot.to_string());
        Ok(())
    }

    fn load(&self, key: &str) -> PortResult<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn remove(&self, key: &str) -> PortResult<()> {
        self.lock().remove(key);
        Ok(())
    }
}
