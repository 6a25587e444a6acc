//! Client-side connection registry and single-flight guard.
//!
//! The registry records "this client issued a successful connect" per key.
//! It gates which operations are attempted; the bridge's status snapshot
//! stays the source of truth for what is actually reachable.
//!
//! `SingleFlight` keeps at most one connect/disconnect in flight per key.
//! A second caller for the same key is rejected with `Busy` instead of
//! racing the first one.

use std::collections::{BTreeMap, HashSet};
use std::fmt::Display;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::{IntegrationError, IntegrationResult};

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// At most one entry per key; `insert` replaces (last write wins).
pub struct ConnectionRegistry<K, V> {
    entries: Mutex<BTreeMap<K, V>>,
}

impl<K: Ord + Copy, V: Clone> ConnectionRegistry<K, V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the entry that was replaced, if any.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, value)
    }

    pub fn remove(&self, key: K) -> Option<V> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&key)
    }

    pub fn get(&self, key: K) -> Option<V> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .cloned()
    }

    pub fn contains(&self, key: K) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&key)
    }

    pub fn keys(&self) -> Vec<K> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Ord + Copy, V: Clone> Default for ConnectionRegistry<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Single-flight guard
// ---------------------------------------------------------------------------

pub struct SingleFlight<K: Eq + Hash> {
    in_flight: Arc<Mutex<HashSet<K>>>,
}

impl<K: Eq + Hash + Copy + Display> SingleFlight<K> {
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Claim `key`. The claim is released when the returned guard drops,
    /// including on early return and panic unwinding.
    pub fn begin(&self, key: K) -> IntegrationResult<FlightGuard<K>> {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(key) {
            debug!(key = %key, "single-flight: rejecting concurrent operation");
            return Err(IntegrationError::Busy(key.to_string()));
        }
        Ok(FlightGuard {
            key,
            in_flight: self.in_flight.clone(),
        })
    }

    pub fn is_in_flight(&self, key: K) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&key)
    }
}

impl<K: Eq + Hash + Copy + Display> Default for SingleFlight<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[must_use = "the key is released as soon as the guard is dropped"]
pub struct FlightGuard<K: Eq + Hash> {
    key: K,
    in_flight: Arc<Mutex<HashSet<K>>>,
}

impl<K: Eq + Hash> Drop for FlightGuard<K> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}
