//! The cache and pending-load tables shared by every loader within one
//! tree scope.
//!
//! Both tables are cheap to clone handles onto the same underlying map,
//! such that a loader task that settles after the render which started it
//! has finished (e.g. after a collector timeout) may still write into
//! them safely.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
    sync::Arc,
};

use futures::future::{BoxFuture, Shared};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LoadError;

/// An in-flight load, shareable between every party waiting on it.
pub type PendingOp = Shared<BoxFuture<'static, Result<Value, LoadError>>>;

/// The resolved values, keyed by load name.
///
/// The presence of an entry implies the load for that name is settled.
#[derive(Clone, Debug, Default)]
pub struct CacheStore {
    inner: Arc<RwLock<HashMap<String, Value>>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().contains_key(name)
    }

    pub fn insert(&self, name: impl Into<String>, value: Value) {
        self.inner.write().insert(name.into(), value);
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.inner.write().remove(name)
    }

    pub fn names(&self) -> HashSet<String> {
        self.inner.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Copy every entry of `other` into this store, replacing entries of
    /// the same name.
    pub fn merge(&self, other: &CacheStore) {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return;
        }
        let entries = other.inner.read().clone();
        self.inner.write().extend(entries);
    }

    fn entries(&self) -> BTreeMap<String, Value> {
        self.inner
            .read()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

/// A load that has been triggered but not yet settled.
#[derive(Clone)]
pub struct PendingEntry {
    pub operation: PendingOp,
    /// Whether the load is left for the streamed output to resolve.
    pub streamed: bool,
}

impl fmt::Debug for PendingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingEntry")
            .field("settled", &self.operation.peek().is_some())
            .field("streamed", &self.streamed)
            .finish()
    }
}

/// The loads currently in flight, keyed by load name.
#[derive(Clone, Debug, Default)]
pub struct PendingTable {
    inner: Arc<RwLock<HashMap<String, PendingEntry>>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<PendingEntry> {
        self.inner.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().contains_key(name)
    }

    pub fn insert(&self, name: impl Into<String>, entry: PendingEntry) {
        self.inner.write().insert(name.into(), entry);
    }

    pub fn remove(&self, name: &str) -> Option<PendingEntry> {
        self.inner.write().remove(name)
    }

    pub fn names(&self) -> HashSet<String> {
        self.inner.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// The operations to wait on, leaving out the streamed ones when
    /// `skip_streamed` is set.
    pub fn operations(&self, skip_streamed: bool) -> Vec<(String, PendingOp)> {
        self.inner
            .read()
            .iter()
            .filter(|(_, entry)| !(skip_streamed && entry.streamed))
            .map(|(name, entry)| (name.clone(), entry.operation.clone()))
            .collect()
    }

    /// Copy every entry of `other` into this table without replacing an
    /// operation already registered under the same name.
    pub fn merge(&self, other: &PendingTable) {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return;
        }
        let entries = other.inner.read().clone();
        let mut inner = self.inner.write();
        for (name, entry) in entries {
            inner.entry(name).or_insert(entry);
        }
    }
}

/// The (cache, pending) pair scoped to one render pass, or to the whole
/// client once bootstrapped.
#[derive(Clone, Debug, Default)]
pub struct TreeContext {
    cache: CacheStore,
    pending: PendingTable,
}

impl TreeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn pending(&self) -> &PendingTable {
        &self.pending
    }

    /// Record the settled value for `name`, retiring its pending entry.
    pub fn settle(&self, name: &str, value: Value) {
        self.cache.insert(name, value);
        self.pending.remove(name);
    }

    /// Forget everything known about `name`.
    pub fn invalidate(&self, name: &str) {
        self.cache.remove(name);
        self.pending.remove(name);
    }

    /// Additively merge `other` into this context.
    pub fn merge(&self, other: &TreeContext) {
        self.cache.merge(&other.cache);
        self.pending.merge(&other.pending);
        // a name settled by the merge is no longer pending here
        for name in other.cache.names() {
            self.pending.remove(&name);
        }
    }

    /// Every name this context has seen, whether settled or pending.
    pub fn known_names(&self) -> HashSet<String> {
        let mut names = self.cache.names();
        names.extend(self.pending.names());
        names
    }

    /// The transportable part of this context.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            cache: self.cache.entries(),
        }
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let context = Self::new();
        for (name, value) in snapshot.cache {
            context.cache.insert(name, value);
        }
        context
    }
}

/// The serialized form of a [`TreeContext`] handed from the server to
/// the client's bootstrap.  Pending loads cannot cross the process
/// boundary, so only settled values are carried.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub cache: BTreeMap<String, Value>,
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
