use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chainsight_domain::{Arguments, ToolName};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Read-mostly response cache keyed by (tool name, canonical arguments).
/// Expired entries behave as misses and are removed lazily on access or by
/// [`ResponseCache::sweep`]; writes happen only after a successful remote
/// result.
pub struct ResponseCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
}

impl ResponseCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self { entries: RwLock::new(HashMap::new()), default_ttl }
    }

    pub fn get(&self, name: &ToolName, arguments: &Arguments) -> Option<Value> {
        self.get_at(name, arguments, Instant::now())
    }

    pub fn put(&self, name: &ToolName, arguments: &Arguments, value: Value, ttl: Option<Duration>) {
        self.put_at(name, arguments, value, ttl, Instant::now())
    }

    /// Removes every expired entry. Returns the number of entries dropped.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs [`ResponseCache::sweep`] on a fixed interval until the token is
    /// cancelled, bounding the memory held by expired entries.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so a fresh cache is
            // not swept at startup.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = cache.sweep();
                        if removed > 0 {
                            debug!(removed = %removed, "Swept expired cache entries");
                        }
                    }
                }
            }
        })
    }

    fn get_at(&self, name: &ToolName, arguments: &Arguments, now: Instant) -> Option<Value> {
        let key = cache_key(name, arguments);
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            match entries.get(&key) {
                Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Entry exists but expired: evict it lazily.
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.get(&key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(&key);
        }
        None
    }

    fn put_at(
        &self,
        name: &ToolName,
        arguments: &Arguments,
        value: Value,
        ttl: Option<Duration>,
        now: Instant,
    ) {
        let key = cache_key(name, arguments);
        let expires_at = now + ttl.unwrap_or(self.default_ttl);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key, CacheEntry { value, expires_at });
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }
}

/// Canonical cache key: tool name plus the arguments serialized with object
/// keys sorted recursively, so property insertion order never splits
/// entries.
pub fn cache_key(name: &ToolName, arguments: &Arguments) -> String {
    let mut out = String::new();
    out.push_str(name.as_str());
    out.push(':');
    write_canonical(&Value::Object(arguments.clone()), &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (index, key) in keys.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).unwrap_or_default());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar).unwrap_or_default()),
    }
}
