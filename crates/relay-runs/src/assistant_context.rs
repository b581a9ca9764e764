//! Remembers the channel an assistant thread was opened from, keyed by thread.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::assistant::AssistantContext;

/// Default number of assistant threads whose context is kept.
pub const DEFAULT_ASSISTANT_CONTEXT_ENTRIES: usize = 500;

#[derive(Debug, Default)]
struct ContextEntries {
    contexts: HashMap<String, AssistantContext>,
    /// Least recently remembered first.
    order: VecDeque<String>,
}

/// Bounded in-process map from `(channel, thread_ts)` to the thread's context.
///
/// Message events inside an assistant thread do not repeat the context Slack sent when
/// the thread started, so intake looks it up here.
#[derive(Debug)]
pub struct AssistantContextCache {
    max_entries: usize,
    entries: Mutex<ContextEntries>,
}

impl Default for AssistantContextCache {
    fn default() -> Self {
        Self::new(DEFAULT_ASSISTANT_CONTEXT_ENTRIES)
    }
}

impl AssistantContextCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            entries: Mutex::new(ContextEntries::default()),
        }
    }

    /// Stores `context` as the newest entry, evicting the oldest past the cap.
    pub fn remember(&self, channel_id: &str, thread_ts: &str, context: AssistantContext) {
        let key = thread_key(channel_id, thread_ts);
        let mut entries = self.lock_entries();
        if entries.contexts.insert(key.clone(), context).is_some() {
            entries.order.retain(|existing| existing != &key);
        }
        entries.order.push_back(key);
        while entries.order.len() > self.max_entries {
            let Some(oldest) = entries.order.pop_front() else {
                break;
            };
            entries.contexts.remove(&oldest);
        }
    }

    pub fn get(&self, channel_id: &str, thread_ts: &str) -> Option<AssistantContext> {
        self.lock_entries()
            .contexts
            .get(&thread_key(channel_id, thread_ts))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.lock_entries().contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_entries(&self) -> MutexGuard<'_, ContextEntries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn thread_key(channel_id: &str, thread_ts: &str) -> String {
    format!("{channel_id}:{thread_ts}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(channel: &str) -> AssistantContext {
        AssistantContext {
            source_channel_id: Some(channel.to_string()),
            team_id: Some("T1".to_string()),
        }
    }

    #[test]
    fn unit_remember_then_get_by_thread() {
        let cache = AssistantContextCache::default();
        cache.remember("D1", "1.1", context("C5"));
        assert_eq!(cache.get("D1", "1.1"), Some(context("C5")));
        assert_eq!(cache.get("D1", "1.2"), None);

        cache.remember("D1", "1.1", context("C6"));
        assert_eq!(cache.get("D1", "1.1"), Some(context("C6")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn regression_oldest_threads_are_evicted_past_the_cap() {
        let cache = AssistantContextCache::new(2);
        cache.remember("D1", "1.1", context("C1"));
        cache.remember("D1", "1.2", context("C2"));
        cache.remember("D1", "1.1", context("C3"));
        cache.remember("D1", "1.3", context("C4"));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("D1", "1.2"), None);
        assert_eq!(cache.get("D1", "1.1"), Some(context("C3")));
        assert_eq!(cache.get("D1", "1.3"), Some(context("C4")));
    }

    #[test]
    fn unit_default_cap_holds_five_hundred_threads() {
        let cache = AssistantContextCache::default();
        for index in 0..=DEFAULT_ASSISTANT_CONTEXT_ENTRIES {
            cache.remember("D1", &index.to_string(), context("C1"));
        }
        assert_eq!(cache.len(), DEFAULT_ASSISTANT_CONTEXT_ENTRIES);
        assert_eq!(cache.get("D1", "0"), None);
    }
}
