//! Namespaced, versioned access to a local key/value substrate.
//!
//! Every physical key is `{namespace}:v{version}:{key}`. Reads never fail
//! outward: absent or corrupt content yields the caller's default. Writes
//! report failures so callers can surface them.

use log::warn;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
    #[error("Failed to create storage directory: {0}")]
    DirectoryError(String),
    #[error("Failed to serialize value for `{key}`: {source}")]
    SerializeError {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Storage quota exceeded writing `{key}`: {needed} bytes needed, {quota} allowed")]
    QuotaExceeded {
        key: String,
        needed: usize,
        quota: usize,
    },
}

/// Durable string key/value store shared by every adapter over it.
///
/// Implementations use interior mutability; the whole core is single-threaded.
pub trait KvSubstrate {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;
    /// Every physical key currently stored
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// In-memory substrate, optionally capped at a byte quota (keys plus values).
#[derive(Debug, Default)]
pub struct MemorySubstrate {
    entries: RefCell<BTreeMap<String, String>>,
    quota: Cell<Option<usize>>,
}

impl MemorySubstrate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        let substrate = Self::new();
        substrate.set_quota(Some(quota));
        substrate
    }

    pub fn set_quota(&self, quota: Option<usize>) {
        self.quota.set(quota);
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl KvSubstrate for MemorySubstrate {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.borrow_mut();
        if let Some(quota) = self.quota.get() {
            let others: usize = entries
                .iter()
                .filter(|(existing, _)| existing.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > quota {
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    quota,
                });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.borrow().keys().cloned().collect())
    }
}

/// Namespace + version scoped view over a substrate.
#[derive(Clone)]
pub struct StoreAdapter {
    substrate: Rc<dyn KvSubstrate>,
    prefix: String,
}

impl StoreAdapter {
    pub fn new(substrate: Rc<dyn KvSubstrate>, namespace: &str, version: u32) -> Self {
        Self {
            substrate,
            prefix: format!("{namespace}:v{version}:"),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn physical_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Deserialized value for `key`, or `default` when absent or unreadable.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let physical = self.physical_key(key);
        let raw = match self.substrate.read(&physical) {
            Ok(Some(raw)) => raw,
            Ok(None) => return default,
            Err(err) => {
                warn!("event=store_read_failed module=storage key={} error={}", physical, err);
                return default;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                warn!("event=store_corrupt_value module=storage key={} error={}", physical, err);
                default
            }
        }
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let physical = self.physical_key(key);
        let raw = serde_json::to_string(value).map_err(|source| StoreError::SerializeError {
            key: physical.clone(),
            source,
        })?;
        self.substrate.write(&physical, &raw)
    }

    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.substrate.delete(&self.physical_key(key))
    }

    pub fn has(&self, key: &str) -> bool {
        matches!(self.substrate.read(&self.physical_key(key)), Ok(Some(_)))
    }

    /// Logical keys under this namespace and version
    pub fn keys(&self) -> Vec<String> {
        match self.substrate.keys() {
            Ok(keys) => keys
                .into_iter()
                .filter_map(|key| key.strip_prefix(&self.prefix).map(str::to_string))
                .collect(),
            Err(err) => {
                warn!("event=store_keys_failed module=storage prefix={} error={}", self.prefix, err);
                Vec::new()
            }
        }
    }

    /// Every logical key with its value; corrupt entries read as null.
    pub fn get_all(&self) -> BTreeMap<String, serde_json::Value> {
        self.keys()
            .into_iter()
            .map(|key| {
                let value = self.get(&key, serde_json::Value::Null);
                (key, value)
            })
            .collect()
    }

    /// Remove every key under this namespace and version, and nothing else.
    pub fn clear(&self) -> Result<(), StoreError> {
        for key in self.keys() {
            self.remove(&key)?;
        }
        Ok(())
    }
}

impl fmt::Debug for StoreAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreAdapter")
            .field("prefix", &self.prefix)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shared() -> Rc<MemorySubstrate> {
        Rc::new(MemorySubstrate::new())
    }

    #[test]
    fn keys_are_namespaced_and_versioned() {
        let substrate = shared();
        let adapter = StoreAdapter::new(substrate.clone(), "test", 1);
        adapter.set("mykey", &json!({ "foo": "bar" })).expect("write should succeed");

        assert_eq!(substrate.keys().unwrap(), vec!["test:v1:mykey".to_string()]);
        assert_eq!(adapter.get("mykey", json!(null)), json!({ "foo": "bar" }));
        assert_eq!(adapter.prefix(), "test:v1:");
    }

    #[test]
    fn absent_key_yields_default() {
        let adapter = StoreAdapter::new(shared(), "todo", 1);
        assert_eq!(adapter.get("missing", 7_u32), 7);
        assert!(!adapter.has("missing"));
    }

    #[test]
    fn corrupt_value_yields_default() {
        let substrate = shared();
        substrate.write("todo:v1:items", "{not json").unwrap();
        let adapter = StoreAdapter::new(substrate, "todo", 1);

        let items: Vec<String> = adapter.get("items", vec!["fallback".to_string()]);
        assert_eq!(items, vec!["fallback".to_string()]);
        assert!(adapter.has("items"));
        assert_eq!(adapter.get_all().get("items"), Some(&serde_json::Value::Null));
    }

    #[test]
    fn wrong_shape_yields_default() {
        let substrate = shared();
        let adapter = StoreAdapter::new(substrate, "todo", 1);
        adapter.set("count", "seven").unwrap();
        assert_eq!(adapter.get("count", 0_u32), 0);
    }

    #[test]
    fn clear_only_touches_own_namespace_and_version() {
        let substrate = shared();
        let a = StoreAdapter::new(substrate.clone(), "ns-a", 1);
        let a2 = StoreAdapter::new(substrate.clone(), "ns-a", 2);
        let b = StoreAdapter::new(substrate.clone(), "ns-b", 1);
        a.set("key1", "aaa").unwrap();
        a2.set("key1", "aaa-v2").unwrap();
        b.set("key1", "bbb").unwrap();

        a.clear().unwrap();

        assert!(!a.has("key1"));
        assert!(a2.has("key1"));
        assert_eq!(b.get("key1", String::new()), "bbb");
        assert_eq!(substrate.len(), 2);
    }

    #[test]
    fn keys_and_get_all_strip_the_prefix() {
        let substrate = shared();
        let adapter = StoreAdapter::new(substrate.clone(), "todo", 1);
        let other = StoreAdapter::new(substrate, "todo", 2);
        adapter.set("a", &1).unwrap();
        adapter.set("b", &[1, 2]).unwrap();
        other.set("c", &true).unwrap();

        assert_eq!(adapter.keys(), vec!["a".to_string(), "b".to_string()]);
        let all = adapter.get_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all["b"], json!([1, 2]));
    }

    #[test]
    fn remove_deletes_single_key() {
        let adapter = StoreAdapter::new(shared(), "todo", 1);
        adapter.set("a", &1).unwrap();
        adapter.set("b", &2).unwrap();
        adapter.remove("a").unwrap();
        assert_eq!(adapter.keys(), vec!["b".to_string()]);
    }

    #[test]
    fn quota_rejects_oversized_writes() {
        let substrate = Rc::new(MemorySubstrate::with_quota(32));
        let adapter = StoreAdapter::new(substrate, "todo", 1);
        adapter.set("small", "ok").expect("fits in quota");

        let err = adapter
            .set("big", &"x".repeat(64))
            .expect_err("should exceed quota");
        assert!(matches!(err, StoreError::QuotaExceeded { .. }));
        assert!(!adapter.has("big"));
    }
}
