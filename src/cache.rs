use crate::minecraft::common::StatusRecord;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;

struct CacheEntry {
    record: StatusRecord,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now <= self.expires_at
    }
}

/// Status records keyed by server name or direct-query key, each living for
/// the same fixed TTL. Reads never return an expired record.
pub struct TtlCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub hit_rate: f64,
    pub ttl_ms: u64,
}

impl TtlCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
        }
    }

    pub async fn get(&self, key: &str) -> Option<StatusRecord> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                Some(entry) if entry.is_live(Instant::now()) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.record.clone());
                }
                Some(_) => {}
            }
        }

        // Expired: evict, unless a fresh record replaced it while we waited.
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(key) {
            if entry.is_live(Instant::now()) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.record.clone());
            }
            entries.remove(key);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub async fn set(&self, key: String, record: StatusRecord) {
        let entry = CacheEntry {
            record,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.write().await.insert(key, entry);
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    /// Drops every entry and returns how many there were.
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.write().await;
        let removed = entries.len();
        entries.clear();
        removed
    }

    /// Drops expired entries and returns how many went.
    pub async fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    pub async fn stats(&self) -> CacheStats {
        let size = self.entries.read().await.len();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        CacheStats {
            size,
            hits,
            misses,
            sets: self.sets.load(Ordering::Relaxed),
            hit_rate: if lookups > 0 {
                hits as f64 / lookups as f64
            } else {
                0.0
            },
            ttl_ms: self.ttl.as_millis() as u64,
        }
    }
}

/// Sweeps expired entries every `every` until the handle is aborted.
pub fn spawn_sweeper(cache: Arc<TtlCache>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + every, every);

        loop {
            interval.tick().await;

            let removed = cache.cleanup().await;
            if removed > 0 {
                info!("Cache sweep removed {} expired entries", removed);
            }
        }
    })
}
