//! Per-chat session storage.

use crate::search::Track;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Search state for one chat.
#[derive(Debug, Clone)]
pub struct Session {
    pub query: String,
    pub results: Vec<Track>,
    /// 1-based
    pub page: usize,
    /// Assigned by the store on insert; distinguishes successive searches
    pub generation: u64,
    /// Telegram message carrying this session's menu, once sent
    pub menu_message_id: Option<i64>,
}

impl Session {
    pub fn new(query: impl Into<String>, results: Vec<Track>) -> Self {
        Self {
            query: query.into(),
            results,
            page: 1,
            generation: 0,
            menu_message_id: None,
        }
    }

    /// Number of pages for `page_size`, at least 1.
    pub fn total_pages(&self, page_size: usize) -> usize {
        self.results.len().div_ceil(page_size.max(1)).max(1)
    }
}

/// A stored session plus its last-activity timestamp.
///
/// The mutex serializes reads and writes for one chat.
#[derive(Debug)]
pub struct SessionSlot {
    state: Mutex<Session>,
    last_active_ms: AtomicI64,
}

impl SessionSlot {
    fn new(session: Session) -> Self {
        Self {
            state: Mutex::new(session),
            last_active_ms: AtomicI64::new(now_ms()),
        }
    }

    /// Lock the session, marking it as active.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, Session> {
        self.touch();
        self.state.lock().await
    }

    fn touch(&self) {
        self.last_active_ms.store(now_ms(), Ordering::Relaxed);
    }

    fn idle_ms(&self, now: i64) -> i64 {
        now - self.last_active_ms.load(Ordering::Relaxed)
    }
}

/// Session table keyed by chat ID.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<SessionSlot>>,
    next_generation: AtomicU64,
    ttl_ms: i64,
}

impl SessionStore {
    /// Create a store evicting sessions idle longer than `ttl_ms`.
    pub fn new(ttl_ms: i64) -> Self {
        Self {
            sessions: DashMap::new(),
            next_generation: AtomicU64::new(1),
            ttl_ms,
        }
    }

    /// Create or overwrite the session for `chat_id`, returning its generation.
    pub fn replace(&self, chat_id: &str, mut session: Session) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        session.generation = generation;
        session.menu_message_id = None;
        self.sessions
            .insert(chat_id.to_string(), Arc::new(SessionSlot::new(session)));
        generation
    }

    /// Get the session slot for `chat_id`.
    ///
    /// The map guard is released before returning, so callers may hold the
    /// slot lock across awaits.
    pub fn get(&self, chat_id: &str) -> Option<Arc<SessionSlot>> {
        self.sessions.get(chat_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove sessions idle longer than the TTL. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let now = now_ms();
        let before = self.sessions.len();
        self.sessions.retain(|_, slot| slot.idle_ms(now) < self.ttl_ms);
        let removed = before.saturating_sub(self.sessions.len());

        if removed > 0 {
            tracing::info!(removed = removed, remaining = self.sessions.len(), "Evicted idle sessions");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
