//! Per-owner attribute storage.
//!
//! Each instance owns one [`ValueStore`]; each type owns another for its
//! type-scoped attributes. Entries are created lazily (first default
//! materialization or first explicit write) and a final entry is locked the
//! moment it is stored.

use crate::error::AttrError;
use crate::value::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub value: Value,
    pub locked: bool,
}

/// Storage keyed by attribute storage key, in key order.
#[derive(Debug, Clone, Default)]
pub struct ValueStore {
    entries: BTreeMap<String, Entry>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    pub fn entry(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn is_locked(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|entry| entry.locked)
    }

    /// Store `value`, locking the entry when `final_` is set.
    ///
    /// Fails if the existing entry is already locked. The error can only
    /// name the key; `compiler::assign` reports the attribute name instead.
    pub fn set(&mut self, key: &str, value: Value, final_: bool) -> Result<(), AttrError> {
        if self.is_locked(key) {
            return Err(AttrError::reassigned(key));
        }
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                locked: final_,
            },
        );
        Ok(())
    }

    /// Return the stored value, computing and storing it on first use.
    ///
    /// A computed final value is locked as soon as it is stored.
    pub fn memoize<F>(&mut self, key: &str, final_: bool, compute: F) -> Result<Value, AttrError>
    where
        F: FnOnce() -> Result<Value, AttrError>,
    {
        if let Some(entry) = self.entries.get(key) {
            return Ok(entry.value.clone());
        }
        let value = compute()?;
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                locked: final_,
            },
        );
        Ok(value)
    }

    /// Install an entry as-is, lock flag included.
    ///
    /// Used by propagation, which must carry locks over to copies.
    pub(crate) fn insert_entry(&mut self, key: &str, entry: Entry) {
        self.entries.insert(key.to_string(), entry);
    }

    /// Drop an entry regardless of its lock.
    pub(crate) fn remove(&mut self, key: &str) -> Option<Entry> {
        self.entries.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
