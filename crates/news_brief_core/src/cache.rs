//! crates/news_brief_core/src/cache.rs
//!
//! Per-session result cache keyed by normalized query text.
//!
//! Entries expire after a TTL, checked lazily on lookup. When the cache grows past
//! its capacity the earliest-written entry is evicted, regardless of how recently
//! it was read.

use crate::domain::ResultBundle;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_TTL_SECS: i64 = 5 * 60;
pub const DEFAULT_CAPACITY: usize = 20;

/// Trims and lowercases a query so that case and surrounding whitespace do not
/// produce separate cache entries.
pub fn normalize_query(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[derive(Debug, Clone)]
struct CacheEntry {
    bundle: Arc<ResultBundle>,
    stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SummaryCache {
    entries: HashMap<String, CacheEntry>,
    /// Keys in write order; the front is the next eviction candidate.
    order: VecDeque<String>,
    ttl: Duration,
    capacity: usize,
}

impl Default for SummaryCache {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_TTL_SECS), DEFAULT_CAPACITY)
    }
}

impl SummaryCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Returns the bundle if present and younger than the TTL. Expired entries
    /// stay where they are and simply read as a miss.
    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<Arc<ResultBundle>> {
        let entry = self.entries.get(key)?;
        if now - entry.stored_at < self.ttl {
            Some(entry.bundle.clone())
        } else {
            debug!("Cache entry for '{}' has expired.", key);
            None
        }
    }

    /// Stores a bundle stamped with `now`. Overwriting a key moves it to the back
    /// of the eviction order.
    pub fn put(&mut self, key: String, bundle: Arc<ResultBundle>, now: DateTime<Utc>) {
        if self.entries.contains_key(&key) {
            self.order.retain(|k| k != &key);
        }
        self.order.push_back(key.clone());
        self.entries.insert(
            key,
            CacheEntry {
                bundle,
                stored_at: now,
            },
        );

        if self.entries.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                debug!("Evicting cache entry '{}'.", oldest);
                self.entries.remove(&oldest);
            }
        }
    }

    /// Whether the key is physically held, expired or not.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
