//! Persistence collaborator abstractions.
//!
//! The ledger only needs two shapes of storage: keyed collections with
//! per-entity upserts (stock entries, sales, layaways, orders, products) and
//! append-only logs (inventory log, payments). Backends implement these traits;
//! the in-memory versions here back tests and single-process deployments and can
//! be seeded from whole collections at startup.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};

/// Keyed collection with per-entity upserts.
pub trait KeyValueStore<K, V>: Send + Sync {
    fn get(&self, key: &K) -> DomainResult<Option<V>>;

    fn upsert(&self, key: K, value: V) -> DomainResult<()>;

    fn list(&self) -> DomainResult<Vec<V>>;

    /// Atomically mutate an existing value in place; returns the updated value,
    /// or `None` when the key is absent.
    fn modify(&self, key: &K, f: &mut dyn FnMut(&mut V)) -> DomainResult<Option<V>>;
}

impl<K, V, S> KeyValueStore<K, V> for Arc<S>
where
    S: KeyValueStore<K, V> + ?Sized,
{
    fn get(&self, key: &K) -> DomainResult<Option<V>> {
        (**self).get(key)
    }

    fn upsert(&self, key: K, value: V) -> DomainResult<()> {
        (**self).upsert(key, value)
    }

    fn list(&self) -> DomainResult<Vec<V>> {
        (**self).list()
    }

    fn modify(&self, key: &K, f: &mut dyn FnMut(&mut V)) -> DomainResult<Option<V>> {
        (**self).modify(key, f)
    }
}

/// Append-only, ordered collection. No update or delete exists.
pub trait AppendLog<V>: Send + Sync {
    fn append(&self, value: V) -> DomainResult<()>;

    /// All records matching `predicate`, in append order.
    fn filter(&self, predicate: &dyn Fn(&V) -> bool) -> DomainResult<Vec<V>>;

    fn len(&self) -> DomainResult<usize>;

    fn is_empty(&self) -> DomainResult<bool> {
        Ok(self.len()? == 0)
    }

    fn all(&self) -> DomainResult<Vec<V>> {
        self.filter(&|_| true)
    }
}

impl<V, S> AppendLog<V> for Arc<S>
where
    S: AppendLog<V> + ?Sized,
{
    fn append(&self, value: V) -> DomainResult<()> {
        (**self).append(value)
    }

    fn filter(&self, predicate: &dyn Fn(&V) -> bool) -> DomainResult<Vec<V>> {
        (**self).filter(predicate)
    }

    fn len(&self) -> DomainResult<usize> {
        (**self).len()
    }
}

fn poisoned() -> DomainError {
    DomainError::storage("lock poisoned")
}

/// In-memory keyed store for tests/dev.
#[derive(Debug)]
pub struct InMemoryStore<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> InMemoryStore<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Seed the store from a whole collection (startup load).
    pub fn from_entries(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            inner: RwLock::new(entries.into_iter().collect()),
        }
    }

    /// Seed from records keyed by their own identity.
    pub fn from_entities(records: impl IntoIterator<Item = V>) -> Self
    where
        K: Clone,
        V: Entity<Id = K>,
    {
        Self::from_entries(records.into_iter().map(|r| (r.id().clone(), r)))
    }
}

impl<K, V> Default for InMemoryStore<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> KeyValueStore<K, V> for InMemoryStore<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> DomainResult<Option<V>> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.get(key).cloned())
    }

    fn upsert(&self, key: K, value: V) -> DomainResult<()> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        map.insert(key, value);
        Ok(())
    }

    fn list(&self) -> DomainResult<Vec<V>> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.values().cloned().collect())
    }

    fn modify(&self, key: &K, f: &mut dyn FnMut(&mut V)) -> DomainResult<Option<V>> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        Ok(map.get_mut(key).map(|value| {
            f(value);
            value.clone()
        }))
    }
}

/// In-memory append-only log for tests/dev.
#[derive(Debug)]
pub struct InMemoryAppendLog<V> {
    records: RwLock<Vec<V>>,
}

impl<V> InMemoryAppendLog<V> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    /// Seed the log from a previously persisted collection (startup load).
    pub fn from_records(records: impl IntoIterator<Item = V>) -> Self {
        Self {
            records: RwLock::new(records.into_iter().collect()),
        }
    }
}

impl<V> Default for InMemoryAppendLog<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> AppendLog<V> for InMemoryAppendLog<V>
where
    V: Clone + Send + Sync,
{
    fn append(&self, value: V) -> DomainResult<()> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        records.push(value);
        Ok(())
    }

    fn filter(&self, predicate: &dyn Fn(&V) -> bool) -> DomainResult<Vec<V>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.iter().filter(|v| predicate(v)).cloned().collect())
    }

    fn len(&self) -> DomainResult<usize> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.len())
    }
}
