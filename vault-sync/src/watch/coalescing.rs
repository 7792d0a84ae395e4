//! Event coalescing for rapid-fire filesystem events
//!
//! Editors typically emit several create/modify events per save. Events are
//! grouped per path within a short window before the engine handles them.

use super::{ChangeEvent, ChangeKind};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Configuration for event coalescing
#[derive(Debug, Clone)]
pub struct CoalescerConfig {
    /// Debounce duration: wait this long after the last event for a path before flushing (default: 250ms)
    pub debounce_ms: u64,
    /// Maximum wait time: flush after this long regardless of new events (default: 2000ms)
    pub max_wait_ms: u64,
    /// Whether coalescing is enabled; when disabled events pass straight through
    pub enabled: bool,
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 250,
            max_wait_ms: 2000,
            enabled: true,
        }
    }
}

/// A pending event for one path
#[derive(Debug)]
struct PendingEvent {
    event: ChangeEvent,
    /// When the first event for this path arrived
    first_seen_at: Instant,
    /// When the most recent event for this path arrived
    last_seen_at: Instant,
}

/// Coalesces events per path before they are dispatched to the engine
pub struct EventCoalescer {
    config: CoalescerConfig,
    /// Pending events indexed by path
    pending: Arc<DashMap<PathBuf, PendingEvent>>,
}

impl EventCoalescer {
    pub fn new(config: CoalescerConfig) -> Self {
        Self {
            config,
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Add an event. Returns the event if it is ready to handle now (coalescing
    /// disabled or max_wait exceeded), or None if still accumulating.
    pub fn add_event(&self, event: ChangeEvent) -> Option<ChangeEvent> {
        if !self.config.enabled {
            return Some(event); // Pass through immediately
        }

        let now = Instant::now();
        let key = event.path.clone();

        let mut entry = self.pending.entry(key.clone()).or_insert_with(|| PendingEvent {
            event: event.clone(),
            first_seen_at: now,
            last_seen_at: now,
        });

        // An add followed by modifies is still an add
        if entry.event.kind != ChangeKind::Added {
            entry.event.kind = event.kind;
        }
        entry.last_seen_at = now;

        if now.duration_since(entry.first_seen_at) >= Duration::from_millis(self.config.max_wait_ms) {
            drop(entry);
            return self.flush_key(&key);
        }

        None
    }

    /// Flush every path that has been quiet for the debounce window or has hit
    /// max_wait, oldest first
    pub fn check_timeouts(&self) -> Vec<ChangeEvent> {
        let now = Instant::now();
        let debounce = Duration::from_millis(self.config.debounce_ms);
        let max_wait = Duration::from_millis(self.config.max_wait_ms);

        let ready: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|entry| {
                now.duration_since(entry.last_seen_at) >= debounce
                    || now.duration_since(entry.first_seen_at) >= max_wait
            })
            .map(|entry| entry.key().clone())
            .collect();

        self.flush_keys(ready)
    }

    /// Flush all pending events (used on shutdown), oldest first
    pub fn flush_all(&self) -> Vec<ChangeEvent> {
        let keys: Vec<PathBuf> = self.pending.iter().map(|e| e.key().clone()).collect();
        self.flush_keys(keys)
    }

    fn flush_keys(&self, keys: Vec<PathBuf>) -> Vec<ChangeEvent> {
        let mut flushed: Vec<PendingEvent> = keys
            .iter()
            .filter_map(|key| self.pending.remove(key).map(|(_, pending)| pending))
            .collect();
        flushed.sort_by_key(|p| p.first_seen_at);
        flushed.into_iter().map(|p| p.event).collect()
    }

    fn flush_key(&self, key: &Path) -> Option<ChangeEvent> {
        self.pending.remove(key).map(|(_, pending)| pending.event)
    }

    /// Get the number of pending paths
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn config(&self) -> &CoalescerConfig {
        &self.config
    }
}
