use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::info;

use crate::{error::Result, session::Session};

/// A session shared between the registry and the turn currently working on it.
///
/// The mutex makes each session single-writer: two concurrent turns for the same user are
/// serialized instead of racing on the entity state.
pub type SharedSession = Arc<Mutex<Session>>;

/// Trait for storing and retrieving conversation sessions, keyed by user id
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Return the user's session, creating a fresh one when none exists or `force_new` is set.
    /// The flag in the result tells whether a new session was created.
    async fn get_or_create(&self, user_id: &str, force_new: bool) -> Result<(SharedSession, bool)>;

    /// Return the user's session without creating one
    async fn get(&self, user_id: &str) -> Result<Option<SharedSession>>;

    /// Replace the user's session wholesale with a fresh one
    async fn reset(&self, user_id: &str) -> Result<SharedSession> {
        let (session, _) = self.get_or_create(user_id, true).await?;
        Ok(session)
    }

    /// Drop sessions that have not been accessed for longer than `max_idle`.
    /// Returns how many were removed.
    async fn evict_idle(&self, max_idle: Duration) -> Result<usize>;
}

struct Slot {
    session: SharedSession,
    last_access: Instant,
}

impl Slot {
    fn fresh(user_id: &str) -> Self {
        Self {
            session: Arc::new(Mutex::new(Session::new(user_id))),
            last_access: Instant::now(),
        }
    }
}

/// In-memory implementation of SessionStore.
///
/// Map guards are only held for the map operation itself, never across an `.await`.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Arc<DashMap<String, Slot>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_or_create(&self, user_id: &str, force_new: bool) -> Result<(SharedSession, bool)> {
        if force_new {
            let slot = Slot::fresh(user_id);
            let session = slot.session.clone();
            if self.sessions.insert(user_id.to_string(), slot).is_some() {
                info!(user_id = %user_id, "Replaced existing session");
            }
            return Ok((session, true));
        }

        match self.sessions.entry(user_id.to_string()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().last_access = Instant::now();
                Ok((entry.get().session.clone(), false))
            }
            Entry::Vacant(entry) => {
                let slot = Slot::fresh(user_id);
                let session = slot.session.clone();
                entry.insert(slot);
                Ok((session, true))
            }
        }
    }

    async fn get(&self, user_id: &str) -> Result<Option<SharedSession>> {
        Ok(self.sessions.get_mut(user_id).map(|mut slot| {
            slot.last_access = Instant::now();
            slot.session.clone()
        }))
    }

    async fn evict_idle(&self, max_idle: Duration) -> Result<usize> {
        let before = self.sessions.len();
        // a session locked by a running turn is in use, whatever its timestamp says
        self.sessions.retain(|_, slot| {
            slot.last_access.elapsed() <= max_idle || slot.session.try_lock().is_err()
        });
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            info!(evicted, remaining = self.sessions.len(), "Evicted idle sessions");
        }
        Ok(evicted)
    }
}
