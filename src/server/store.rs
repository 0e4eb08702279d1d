//! Per-replica in-memory key-value map.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;

/// Key → value map of one replica. Cloning shares the same map; all access
/// is serialized by one mutex.
#[derive(Debug, Clone, Default)]
pub struct Store {
    map: Arc<Mutex<HashMap<Bytes, Bytes>>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value stored under `key`, if any.
    pub fn read(&self, key: &[u8]) -> Option<Bytes> {
        self.map
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Upserts `value` under `key`, returning the previous value.
    pub fn write(&self, key: Bytes, value: Bytes) -> Option<Bytes> {
        self.map
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value)
    }

    pub fn len(&self) -> usize {
        self.map.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
