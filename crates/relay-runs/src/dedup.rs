//! Short-lived "seen recently" cache that suppresses duplicate deliveries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use relay_core::{is_expired_unix_ms, Clock};

/// Default time-to-live for dedup entries.
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(10 * 60);
/// Default upper bound on live entries before the soonest-expiring are evicted.
pub const DEFAULT_DEDUP_MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupConfig {
    pub ttl: Duration,
    pub max_entries: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_DEDUP_TTL,
            max_entries: DEFAULT_DEDUP_MAX_ENTRIES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupStatus {
    Processing,
    Done,
}

#[derive(Debug, Clone, Copy)]
struct DedupEntry {
    status: DedupStatus,
    expires_at_ms: u64,
}

/// Storage seam for delivery deduplication.
///
/// The in-process map suits one host; a shared key-value backend can implement the
/// same contract for horizontally scaled intake.
#[async_trait]
pub trait DedupCache: Send + Sync {
    /// Returns true when the caller owns processing for `key`, false for a duplicate.
    async fn try_start(&self, key: &str) -> bool;
    /// Keeps `key` suppressed for a fresh TTL after successful processing.
    async fn mark_done(&self, key: &str);
    /// Forgets `key` so a platform retry is processed again.
    async fn mark_failed(&self, key: &str);
}

/// Mutex-guarded map with lazy expiry on every `try_start`.
pub struct InMemoryDedupCache {
    config: DedupConfig,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, DedupEntry>>,
}

impl InMemoryDedupCache {
    pub fn new(config: DedupConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn status(&self, key: &str) -> Option<DedupStatus> {
        let now_ms = self.clock.now_unix_ms();
        self.lock_entries()
            .get(key)
            .filter(|entry| !is_expired_unix_ms(entry.expires_at_ms, now_ms))
            .map(|entry| entry.status)
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ttl_ms(&self) -> u64 {
        u64::try_from(self.config.ttl.as_millis()).unwrap_or(u64::MAX)
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, DedupEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(&self, key: &str) -> bool {
        let now_ms = self.clock.now_unix_ms();
        let expires_at_ms = now_ms.saturating_add(self.ttl_ms());
        let mut entries = self.lock_entries();
        entries.retain(|_, entry| !is_expired_unix_ms(entry.expires_at_ms, now_ms));

        if entries.contains_key(key) {
            return false;
        }

        let max_entries = self.config.max_entries.max(1);
        while entries.len() >= max_entries {
            let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at_ms)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            entries.remove(&oldest);
        }

        entries.insert(
            key.to_string(),
            DedupEntry {
                status: DedupStatus::Processing,
                expires_at_ms,
            },
        );
        true
    }
}

#[async_trait]
impl DedupCache for InMemoryDedupCache {
    async fn try_start(&self, key: &str) -> bool {
        self.start(key)
    }

    async fn mark_done(&self, key: &str) {
        let expires_at_ms = self.clock.now_unix_ms().saturating_add(self.ttl_ms());
        self.lock_entries().insert(
            key.to_string(),
            DedupEntry {
                status: DedupStatus::Done,
                expires_at_ms,
            },
        );
    }

    async fn mark_failed(&self, key: &str) {
        self.lock_entries().remove(key);
    }
}
