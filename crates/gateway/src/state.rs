use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use {relaydesk_routing::ChatRouter, sqlx::SqlitePool, tokio::sync::Mutex};

// ── Dedupe cache ─────────────────────────────────────────────────────────────

struct DedupeEntry {
    inserted_at: Instant,
}

/// TTL-bounded set of recently seen delivery ids.
pub struct DedupeCache {
    entries: HashMap<String, DedupeEntry>,
    ttl: Duration,
    max_entries: usize,
}

impl DedupeCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Returns true if the key is a duplicate (already seen within TTL).
    pub fn check_and_insert(&mut self, key: &str) -> bool {
        self.evict_expired();
        if self.entries.contains_key(key) {
            return true;
        }
        if self.entries.len() >= self.max_entries
            && let Some(oldest_key) = self
                .entries
                .iter()
                .min_by_key(|(_, v)| v.inserted_at)
                .map(|(k, _)| k.clone())
        {
            self.entries.remove(&oldest_key);
        }
        self.entries.insert(key.to_string(), DedupeEntry {
            inserted_at: Instant::now(),
        });
        false
    }

    /// Drop a key so the next delivery with it is processed again.
    pub fn forget(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_expired(&mut self) {
        let Some(cutoff) = Instant::now().checked_sub(self.ttl) else {
            return;
        };
        self.entries.retain(|_, v| v.inserted_at > cutoff);
    }
}

// ── Gateway state ────────────────────────────────────────────────────────────

/// Shared gateway runtime state, wrapped in Arc for use across handlers.
pub struct GatewayState {
    pub router: ChatRouter,
    /// Recently processed update ids.
    pub dedupe: Mutex<DedupeCache>,
    /// Database backing the stores, probed by the health check.
    pub pool: SqlitePool,
    /// Server version string.
    pub version: String,
}

impl GatewayState {
    pub fn new(router: ChatRouter, pool: SqlitePool, dedupe: DedupeCache) -> Arc<Self> {
        Arc::new(Self {
            router,
            dedupe: Mutex::new(dedupe),
            pool,
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }
}
