//! Named monotonic counters shared by every connection of a source.
//!
//! Counters are keyed by dotted names (`accept.succeeded`,
//! `characters.received`, ...), mutated only through atomic increments, and
//! never decremented. They exist for observability; nothing reads them to
//! make control decisions.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A set of named atomic counters.
///
/// Counters spring into existence at zero the first time a name is touched.
/// All mutations are atomic per counter key; no cross-counter consistency is
/// guaranteed.
pub struct CounterGroup {
    counters: RwLock<HashMap<String, Arc<AtomicU64>>>,
}

impl CounterGroup {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<AtomicU64>>> {
        match self.counters.read() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<AtomicU64>>> {
        match self.counters.write() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        }
    }

    /// Fetch the counter for `name`, creating it at zero if absent.
    fn counter(&self, name: &str) -> Arc<AtomicU64> {
        if let Some(c) = self.read().get(name) {
            return c.clone();
        }
        self.write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone()
    }

    /// Atomically add one to `name` and return the new value.
    pub fn increment_and_get(&self, name: &str) -> u64 {
        self.add_and_get(name, 1)
    }

    /// Atomically add `delta` to `name` and return the new value.
    pub fn add_and_get(&self, name: &str, delta: u64) -> u64 {
        self.counter(name).fetch_add(delta, Ordering::Relaxed) + delta
    }

    /// Current value of `name`; zero for a counter never touched.
    pub fn get(&self, name: &str) -> u64 {
        self.read()
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Point-in-time copy of every counter, sorted by name.
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.read()
            .iter()
            .map(|(name, c)| (name.clone(), c.load(Ordering::Relaxed)))
            .collect()
    }
}

impl Default for CounterGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CounterGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ ")?;
        for (i, (name, value)) in self.snapshot().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        write!(f, " }}")
    }
}
