//! Process-wide response store used by the cache processor.
//!
//! Entries live in an `scc::HashMap` so concurrent requests can look up and
//! store without a global lock. Expired entries are dropped on read and by
//! [`ResponseCache::sweep`].
use std::time::Duration;

use scc::HashMap;
use tokio::time::Instant;

use crate::core::response::GatewayResponse;

#[derive(Clone)]
struct CachedResponse {
    response: GatewayResponse,
    expires_at: Instant,
}

#[derive(Default)]
pub struct ResponseCache {
    entries: HashMap<String, CachedResponse>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A live entry for `key`, if any.
    pub async fn get(&self, key: &str) -> Option<GatewayResponse> {
        let cached = self
            .entries
            .get_async(key)
            .await
            .map(|entry| entry.get().clone())?;

        if cached.expires_at <= Instant::now() {
            self.entries.remove_async(key).await;
            return None;
        }
        Some(cached.response)
    }

    /// Store (or replace) the entry for `key`.
    pub async fn store(&self, key: String, response: GatewayResponse, ttl: Duration) {
        let entry = CachedResponse {
            response,
            expires_at: Instant::now() + ttl,
        };
        self.entries.remove_async(&key).await;
        // a concurrent store for the same key may have won; either value is fresh
        let _ = self.entries.insert_async(key, entry).await;
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        let removed_ref = &mut removed;
        self.entries
            .retain_async(|_, entry| {
                let keep = entry.expires_at > now;
                if !keep {
                    *removed_ref += 1;
                }
                keep
            })
            .await;
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
