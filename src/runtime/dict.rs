//! Insertion-ordered hash table, and the dict and set values built on it.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::error::EvalResult;
use super::{MutationGuard, Value};

/// Entries in insertion order plus a hash index. Removing an entry keeps
/// the relative order of the others.
#[derive(Clone, Default)]
pub struct HashTable {
    entries: Vec<(Value, Value)>,
    hashes: Vec<u32>,
    index: HashMap<u32, Vec<usize>>,
}

impl HashTable {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn find(&self, key: &Value, hash: u32) -> EvalResult<Option<usize>> {
        if let Some(slots) = self.index.get(&hash) {
            for &i in slots {
                if self.entries[i].0.equals(key)? {
                    return Ok(Some(i));
                }
            }
        }
        Ok(None)
    }

    pub fn get(&self, key: &Value, hash: u32) -> EvalResult<Option<Value>> {
        Ok(self.find(key, hash)?.map(|i| self.entries[i].1.clone()))
    }

    /// Inserts or replaces; returns the previous value.
    pub fn insert(&mut self, key: Value, hash: u32, value: Value) -> EvalResult<Option<Value>> {
        if let Some(i) = self.find(&key, hash)? {
            return Ok(Some(std::mem::replace(&mut self.entries[i].1, value)));
        }
        self.index.entry(hash).or_default().push(self.entries.len());
        self.entries.push((key, value));
        self.hashes.push(hash);
        Ok(None)
    }

    pub fn remove(&mut self, key: &Value, hash: u32) -> EvalResult<Option<Value>> {
        let Some(i) = self.find(key, hash)? else {
            return Ok(None);
        };
        Ok(Some(self.remove_at(i).1))
    }

    fn remove_at(&mut self, i: usize) -> (Value, Value) {
        let entry = self.entries.remove(i);
        self.hashes.remove(i);
        self.rebuild_index();
        entry
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (i, h) in self.hashes.iter().enumerate() {
            self.index.entry(*h).or_default().push(i);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.hashes.clear();
        self.index.clear();
    }

    pub fn entry_at(&self, i: usize) -> Option<(Value, Value)> {
        self.entries.get(i).cloned()
    }

    pub fn entries(&self) -> &[(Value, Value)] {
        &self.entries
    }

    pub fn hashes(&self) -> &[u32] {
        &self.hashes
    }

    pub fn pop_first(&mut self) -> Option<(Value, Value)> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.remove_at(0))
        }
    }
}

// ── Dict ────────────────────────────────────────────────────────────────

pub struct Dict {
    table: RwLock<HashTable>,
    guard: MutationGuard,
}

impl Default for Dict {
    fn default() -> Self {
        Self::new()
    }
}

impl Dict {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(HashTable::default()),
            guard: MutationGuard::default(),
        }
    }

    pub fn from_entries(entries: Vec<(Value, Value)>) -> EvalResult<Self> {
        let dict = Dict::new();
        for (k, v) in entries {
            dict.insert(k, v)?;
        }
        Ok(dict)
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    pub fn get(&self, key: &Value) -> EvalResult<Option<Value>> {
        let hash = key.hash()?;
        self.table.read().get(key, hash)
    }

    pub fn contains(&self, key: &Value) -> EvalResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    pub fn insert(&self, key: Value, value: Value) -> EvalResult<()> {
        self.guard.check("insert into", "dict")?;
        let hash = key.hash()?;
        self.table.write().insert(key, hash, value)?;
        Ok(())
    }

    pub fn remove(&self, key: &Value) -> EvalResult<Option<Value>> {
        self.guard.check("delete from", "dict")?;
        let hash = key.hash()?;
        self.table.write().remove(key, hash)
    }

    pub fn pop_first(&self) -> EvalResult<Option<(Value, Value)>> {
        self.guard.check("delete from", "dict")?;
        Ok(self.table.write().pop_first())
    }

    pub fn clear(&self) -> EvalResult<()> {
        self.guard.check("clear", "dict")?;
        self.table.write().clear();
        Ok(())
    }

    pub fn keys(&self) -> Vec<Value> {
        self.table.read().entries().iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.table.read().entries().iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn items(&self) -> Vec<(Value, Value)> {
        self.table.read().entries().to_vec()
    }

    pub fn entry_at(&self, i: usize) -> Option<(Value, Value)> {
        self.table.read().entry_at(i)
    }

    pub fn with_table<R>(&self, f: impl FnOnce(&HashTable) -> R) -> R {
        f(&self.table.read())
    }

    pub fn is_frozen(&self) -> bool {
        self.guard.is_frozen()
    }

    pub(crate) fn guard(&self) -> &MutationGuard {
        &self.guard
    }

    pub fn freeze(&self) {
        if self.guard.freeze() {
            for (k, v) in self.table.read().entries() {
                k.freeze();
                v.freeze();
            }
        }
    }
}

// ── Set ─────────────────────────────────────────────────────────────────

pub struct Set {
    table: RwLock<HashTable>,
    guard: MutationGuard,
}

impl Default for Set {
    fn default() -> Self {
        Self::new()
    }
}

impl Set {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(HashTable::default()),
            guard: MutationGuard::default(),
        }
    }

    pub fn from_elems(elems: Vec<Value>) -> EvalResult<Self> {
        let set = Set::new();
        for v in elems {
            set.insert(v)?;
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    pub fn contains(&self, v: &Value) -> EvalResult<bool> {
        let hash = v.hash()?;
        Ok(self.table.read().get(v, hash)?.is_some())
    }

    /// Returns whether the value was newly added.
    pub fn insert(&self, v: Value) -> EvalResult<bool> {
        self.guard.check("insert into", "set")?;
        let hash = v.hash()?;
        Ok(self.table.write().insert(v, hash, Value::None)?.is_none())
    }

    /// Returns whether the value was present.
    pub fn remove(&self, v: &Value) -> EvalResult<bool> {
        self.guard.check("delete from", "set")?;
        let hash = v.hash()?;
        Ok(self.table.write().remove(v, hash)?.is_some())
    }

    pub fn pop_first(&self) -> EvalResult<Option<Value>> {
        self.guard.check("pop from", "set")?;
        Ok(self.table.write().pop_first().map(|(k, _)| k))
    }

    pub fn clear(&self) -> EvalResult<()> {
        self.guard.check("clear", "set")?;
        self.table.write().clear();
        Ok(())
    }

    pub fn elems(&self) -> Vec<Value> {
        self.table.read().entries().iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn elem_at(&self, i: usize) -> Option<Value> {
        self.table.read().entry_at(i).map(|(k, _)| k)
    }

    pub fn with_table<R>(&self, f: impl FnOnce(&HashTable) -> R) -> R {
        f(&self.table.read())
    }

    pub fn is_frozen(&self) -> bool {
        self.guard.is_frozen()
    }

    pub(crate) fn guard(&self) -> &MutationGuard {
        &self.guard
    }

    pub fn freeze(&self) {
        if self.guard.freeze() {
            for (k, _) in self.table.read().entries() {
                k.freeze();
            }
        }
    }
}
