//! Virtual-price observation cache
//!
//! Holds the last `(virtual_price, timestamp)` seen for each (chain, pool).
//! Owned by whoever composes the analytics and injected, so tests can start
//! from an empty or pre-seeded cache.

use alloy_primitives::{Address, U256};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::chains::Chain;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolKey {
    pub chain: Chain,
    pub pool: Address,
}

impl PoolKey {
    pub fn new(chain: Chain, pool: Address) -> Self {
        Self { chain, pool }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// 1e18-scaled
    pub virtual_price: U256,
    /// Unix seconds
    pub timestamp: u64,
}

#[derive(Debug, Default)]
pub struct ObservationCache {
    entries: RwLock<HashMap<PoolKey, Observation>>,
}

impl ObservationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache pre-populated with `entries`
    pub fn seeded(entries: impl IntoIterator<Item = (PoolKey, Observation)>) -> Self {
        Self {
            entries: RwLock::new(entries.into_iter().collect()),
        }
    }

    pub fn get(&self, key: &PoolKey) -> Option<Observation> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied()
    }

    pub fn set(&self, key: PoolKey, observation: Observation) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, observation);
    }

    /// Store `observation` and hand back the one it replaced.
    /// Read and replace happen under one write lock, so two pollers on the
    /// same key never both see the same predecessor.
    pub fn record(&self, key: PoolKey, observation: Observation) -> Option<Observation> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, observation)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
