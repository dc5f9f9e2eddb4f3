//! Per-session conversational memory.
//!
//! Each session gets a `MemoryWindow` holding its last few exchanges. The
//! windows live only in process memory. `SessionMemoryStore` is owned by
//! the orchestrator and evicts windows that sit idle too long or that are
//! least recently used once the session cap is reached.
//!
//! Every window sits behind its own async mutex. The orchestrator holds
//! that lock for a whole turn, so turns on one session run one after the
//! other while different sessions proceed independently.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::error::ChatError;

/// One user utterance and the assistant's reply to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub user: String,
    pub assistant: String,
}

/// Bounded, oldest-first history of exchanges for one session.
#[derive(Debug, Clone)]
pub struct MemoryWindow {
    capacity: usize,
    exchanges: VecDeque<Exchange>,
}

impl MemoryWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            exchanges: VecDeque::with_capacity(capacity),
        }
    }

    /// Append an exchange, dropping the oldest once over capacity.
    pub fn push(&mut self, user: &str, assistant: &str) {
        self.exchanges.push_back(Exchange {
            user: user.to_string(),
            assistant: assistant.to_string(),
        });
        while self.exchanges.len() > self.capacity {
            self.exchanges.pop_front();
        }
    }

    /// Exchanges in chronological order.
    pub fn exchanges(&self) -> Vec<Exchange> {
        self.exchanges.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.exchanges.clear();
    }
}

/// Shared handle to one session's window.
pub type WindowHandle = Arc<tokio::sync::Mutex<MemoryWindow>>;

struct Slot {
    window: WindowHandle,
    last_used: Instant,
}

impl Slot {
    /// A slot whose window is locked or held by a running turn.
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.window) > 1
    }
}

/// Store of memory windows keyed by session id.
pub struct SessionMemoryStore {
    window_size: usize,
    max_sessions: usize,
    idle_ttl: Duration,
    slots: Mutex<HashMap<String, Slot>>,
}

impl SessionMemoryStore {
    pub fn new(window_size: usize, max_sessions: usize, idle_ttl: Duration) -> Self {
        Self {
            window_size: window_size.max(1),
            max_sessions: max_sessions.max(1),
            idle_ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the session's window, creating an empty one if needed.
    ///
    /// Creation first drops idle windows and then, if the store is still
    /// full, the least recently used window that no turn is holding.
    pub fn get_or_create(&self, session_id: &str) -> Result<WindowHandle, ChatError> {
        let mut slots = self.lock_slots()?;
        let now = Instant::now();

        if let Some(slot) = slots.get_mut(session_id) {
            slot.last_used = now;
            return Ok(slot.window.clone());
        }

        Self::drop_idle(&mut slots, now, self.idle_ttl);
        while slots.len() >= self.max_sessions {
            let victim = slots
                .iter()
                .filter(|(_, slot)| !slot.in_use())
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(id, _)| id.clone());
            match victim {
                Some(id) => {
                    slots.remove(&id);
                    debug!(session_id = %id, "Evicted least recently used memory window");
                }
                // Every window is mid-turn; allow a temporary overshoot.
                None => break,
            }
        }

        let window: WindowHandle = Arc::new(tokio::sync::Mutex::new(MemoryWindow::new(self.window_size)));
        slots.insert(
            session_id.to_string(),
            Slot {
                window: window.clone(),
                last_used: now,
            },
        );
        debug!(session_id, live = slots.len(), "Created memory window");
        Ok(window)
    }

    /// Empty a session's window. Returns whether one existed.
    ///
    /// Waits for a running turn to release the window, then clears it in
    /// place. The slot itself is dropped only when no other turn holds or
    /// waits on the window, so a queued turn keeps the same lock and the
    /// session stays serialised.
    pub async fn forget(&self, session_id: &str) -> Result<bool, ChatError> {
        let window = {
            let slots = self.lock_slots()?;
            match slots.get(session_id) {
                Some(slot) => slot.window.clone(),
                None => return Ok(false),
            }
        };

        let mut guard = window.lock().await;
        guard.clear();

        let mut slots = self.lock_slots()?;
        // Only the slot and `window` point at it when nobody is queued.
        let idle = slots
            .get(session_id)
            .is_some_and(|slot| Arc::ptr_eq(&slot.window, &window) && Arc::strong_count(&window) <= 2);
        if idle {
            slots.remove(session_id);
        }
        debug!(session_id, dropped = idle, "Memory window cleared");
        Ok(true)
    }

    /// Drop every window idle for longer than the configured timeout.
    /// Returns how many were removed.
    pub fn evict_expired(&self) -> Result<usize, ChatError> {
        let mut slots = self.lock_slots()?;
        Ok(Self::drop_idle(&mut slots, Instant::now(), self.idle_ttl))
    }

    pub fn len(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.slots
            .lock()
            .map(|s| s.contains_key(session_id))
            .unwrap_or(false)
    }

    fn drop_idle(slots: &mut HashMap<String, Slot>, now: Instant, ttl: Duration) -> usize {
        let before = slots.len();
        slots.retain(|_, slot| slot.in_use() || now.duration_since(slot.last_used) <= ttl);
        let removed = before - slots.len();
        if removed > 0 {
            debug!(removed, "Evicted idle memory windows");
        }
        removed
    }

    fn lock_slots(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Slot>>, ChatError> {
        self.slots
            .lock()
            .map_err(|e| ChatError::Storage(format!("memory lock poisoned: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(window: usize, max: usize) -> SessionMemoryStore {
        SessionMemoryStore::new(window, max, Duration::from_secs(60))
    }

    // ---- MemoryWindow ----

    #[test]
    fn test_window_never_exceeds_capacity() {
        let mut window = MemoryWindow::new(3);
        for i in 0..10 {
            window.push(&format!("q{}", i), &format!("a{}", i));
            assert!(window.len() <= 3);
        }
        let users: Vec<String> = window.exchanges().into_iter().map(|e| e.user).collect();
        assert_eq!(users, vec!["q7", "q8", "q9"]);
    }

    #[test]
    fn test_window_zero_capacity_clamped() {
        let mut window = MemoryWindow::new(0);
        window.push("a", "b");
        window.push("c", "d");
        assert_eq!(window.capacity(), 1);
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_window_clear() {
        let mut window = MemoryWindow::new(2);
        window.push("a", "b");
        window.clear();
        assert!(window.is_empty());
    }

    // ---- SessionMemoryStore ----

    #[tokio::test]
    async fn test_get_or_create_returns_same_window() {
        let store = store(5, 10);
        let first = store.get_or_create("s1").unwrap();
        first.lock().await.push("hi", "hello");

        let second = store.get_or_create("s1").unwrap();
        assert_eq!(second.lock().await.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = store(5, 10);
        store.get_or_create("a").unwrap().lock().await.push("x", "y");
        assert!(store.get_or_create("b").unwrap().lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_forget() {
        let store = store(5, 10);
        store.get_or_create("s1").unwrap();
        assert!(store.forget("s1").await.unwrap());
        assert!(!store.forget("s1").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_forget_during_turn_keeps_session_serialised() {
        let store = Arc::new(store(5, 10));
        let running = store.get_or_create("s1").unwrap();
        let mut guard = running.lock().await;
        guard.push("q1", "a1");

        let forgetter = {
            let store = store.clone();
            tokio::spawn(async move { store.forget("s1").await.unwrap() })
        };
        tokio::task::yield_now().await;
        assert!(!forgetter.is_finished());

        // A turn arriving now queues on the same window, not a fresh one.
        let queued = store.get_or_create("s1").unwrap();
        assert!(Arc::ptr_eq(&running, &queued));

        guard.push("q2", "a2");
        drop(guard);
        assert!(forgetter.await.unwrap());

        assert!(queued.lock().await.is_empty());
        assert!(store.contains("s1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lru_eviction_at_capacity() {
        let store = store(5, 2);
        drop(store.get_or_create("a").unwrap());
        tokio::time::advance(Duration::from_secs(1)).await;
        drop(store.get_or_create("b").unwrap());
        tokio::time::advance(Duration::from_secs(1)).await;
        // Touch "a" so "b" becomes least recently used.
        drop(store.get_or_create("a").unwrap());
        tokio::time::advance(Duration::from_secs(1)).await;
        drop(store.get_or_create("c").unwrap());

        assert_eq!(store.len(), 2);
        assert!(store.contains("a"));
        assert!(!store.contains("b"));
        assert!(store.contains("c"));
    }

    #[test]
    fn test_lru_skips_windows_in_use() {
        let store = store(5, 1);
        let held = store.get_or_create("busy").unwrap();
        drop(store.get_or_create("other").unwrap());

        assert!(store.contains("busy"));
        assert!(store.contains("other"));
        drop(held);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_windows_expire() {
        let store = SessionMemoryStore::new(5, 10, Duration::from_secs(120));
        drop(store.get_or_create("old").unwrap());
        tokio::time::advance(Duration::from_secs(100)).await;
        drop(store.get_or_create("fresh").unwrap());
        tokio::time::advance(Duration::from_secs(60)).await;

        assert_eq!(store.evict_expired().unwrap(), 1);
        assert!(!store.contains("old"));
        assert!(store.contains("fresh"));
    }

    #[tokio::test]
    async fn test_turns_on_one_session_are_serialized() {
        let store = Arc::new(store(5, 10));
        let handle = store.get_or_create("s1").unwrap();
        let guard = handle.lock().await;

        let store2 = store.clone();
        let waiter = tokio::spawn(async move {
            let h = store2.get_or_create("s1").unwrap();
            let mut w = h.lock().await;
            w.push("second", "turn");
            w.len()
        });

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        drop(guard);
        assert_eq!(waiter.await.unwrap(), 1);
    }
}
