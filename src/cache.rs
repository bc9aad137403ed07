//! Keyed fingerprint cache with single-flight `getOrSet`, TTL expiry, and
//! batch get/set. In-memory reference backend with a periodic
//! cleanup task, guarded by `parking_lot::Mutex`.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// A `getOrSet` call in flight for a key. Concurrent callers for the same
/// key await the first caller's loader instead of each invoking it.
struct InFlight {
    notify: Arc<Notify>,
}

struct State {
    entries: HashMap<String, Entry>,
    in_flight: HashMap<String, InFlight>,
}

/// In-memory reference implementation of the cache capability.
#[derive(Clone)]
pub struct Cache {
    state: Arc<Mutex<State>>,
}

impl Cache {
    pub fn new() -> Self {
        Self { state: Arc::new(Mutex::new(State { entries: HashMap::new(), in_flight: HashMap::new() })) }
    }

    /// Spawn the periodic cleanup task that sweeps expired entries. Returns
    /// a handle the caller can abort on shutdown.
    pub fn spawn_cleanup(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let state = self.state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now = Instant::now();
                state.lock().entries.retain(|_, entry| !entry.is_expired(now));
            }
        })
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let mut state = self.state.lock();
        let now = Instant::now();
        let expired = state.entries.get(key).map(|e| e.is_expired(now)).unwrap_or(false);
        if expired {
            state.entries.remove(key);
            return None;
        }
        state.entries.get(key).map(|e| e.value.clone())
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>, ttl: Option<Duration>) {
        let expires_at = ttl.map(|d| Instant::now() + d);
        self.state.lock().entries.insert(key.into(), Entry { value: value.into(), expires_at });
    }

    pub fn mget(&self, keys: &[String]) -> Vec<Option<String>> {
        keys.iter().map(|k| self.get(k)).collect()
    }

    pub fn mset(&self, entries: Vec<(String, String)>, ttl: Option<Duration>) {
        for (key, value) in entries {
            self.set(key, value, ttl);
        }
    }

    pub fn del(&self, key: &str) -> bool {
        self.state.lock().entries.remove(key).is_some()
    }

    /// Remove every key matching a `*`-glob-style prefix/suffix pattern
    ///; only a single trailing or leading `*` is
    /// recognized, matching the engine's own key-naming convention rather
    /// than pulling in a full glob crate for this one call site.
    pub fn del_pattern(&self, pattern: &str) -> usize {
        let mut state = self.state.lock();
        let matches: Vec<String> = state.entries.keys().filter(|k| glob_matches(pattern, k)).cloned().collect();
        for key in &matches {
            state.entries.remove(key);
        }
        matches.len()
    }

    pub fn exists(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let state = self.state.lock();
        state.entries.get(key).and_then(|e| e.expires_at).map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn expire(&self, key: &str, ttl: Duration) -> bool {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
            true
        } else {
            false
        }
    }

    /// Atomically increment a numeric value stored at `key`, creating it
    /// at 0 first if absent.
    pub fn incr(&self, key: &str, by: i64) -> i64 {
        let mut state = self.state.lock();
        let entry = state.entries.entry(key.to_string()).or_insert(Entry { value: "0".to_string(), expires_at: None });
        let next = entry.value.parse::<i64>().unwrap_or(0) + by;
        entry.value = next.to_string();
        next
    }

    /// Single-flight get-or-populate: concurrent callers for the same key
    /// share one invocation of `loader`.
    pub async fn get_or_set<F, Fut>(&self, key: &str, ttl: Option<Duration>, loader: F) -> String
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = String>,
    {
        if let Some(hit) = self.get(key) {
            return hit;
        }

        let notify = {
            let mut state = self.state.lock();
            if let Some(hit) = state.entries.get(key) {
                if !hit.is_expired(Instant::now()) {
                    return hit.value.clone();
                }
            }
            match state.in_flight.get(key) {
                Some(existing) => Some(existing.notify.clone()),
                None => {
                    state.in_flight.insert(key.to_string(), InFlight { notify: Arc::new(Notify::new()) });
                    None
                }
            }
        };

        if let Some(notify) = notify {
            notify.notified().await;
            return self.get(key).unwrap_or_default();
        }

        let value = loader().await;
        self.set(key, value.clone(), ttl);
        let notify = self.state.lock().in_flight.remove(key).map(|f| f.notify);
        if let Some(notify) = notify {
            notify.notify_waiters();
        }
        value
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

fn glob_matches(pattern: &str, key: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        key.starts_with(prefix)
    } else if let Some(suffix) = pattern.strip_prefix('*') {
        key.ends_with(suffix)
    } else {
        pattern == key
    }
}
