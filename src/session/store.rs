//! Live chat sessions.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::SessionContext;
use crate::ui::SessionChannel;

/// A single chat session held by the host.
///
/// Cheap to clone; clones share state. The [`SessionContext`] sits behind an
/// async mutex so that events for the same session are handled one at a time.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    id: String,
    context: Mutex<SessionContext>,
    channel: SessionChannel,
    created_at: DateTime<Utc>,
    last_activity: RwLock<DateTime<Utc>>,
}

impl Session {
    fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            inner: Arc::new(SessionInner {
                context: Mutex::new(SessionContext::new(id.clone())),
                id,
                channel: SessionChannel::new(),
                created_at: now,
                last_activity: RwLock::new(now),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Exclusive access to the session context for the duration of one event.
    ///
    /// Activity is recorded both when the event starts and when the guard is
    /// released.
    pub async fn lock(&self) -> SessionGuard<'_> {
        self.touch();
        SessionGuard {
            context: self.inner.context.lock().await,
            session: self,
        }
    }

    /// The thread id without waiting on an in-flight event.
    #[must_use]
    pub fn try_thread_id(&self) -> Option<String> {
        self.inner
            .context
            .try_lock()
            .ok()
            .and_then(|ctx| ctx.thread_id().map(ToString::to_string))
    }

    /// The rendered chat of this session.
    #[must_use]
    pub fn channel(&self) -> &SessionChannel {
        &self.inner.channel
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        *self
            .inner
            .last_activity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Record activity on the session.
    pub fn touch(&self) {
        let mut guard = self
            .inner
            .last_activity
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Utc::now();
    }

    /// Whether the session has been idle longer than `timeout`.
    ///
    /// A session with an event in progress or a live event subscriber is
    /// never idle.
    #[must_use]
    pub fn is_expired_with_timeout(&self, timeout: Duration) -> bool {
        if self.inner.context.try_lock().is_err() || self.inner.channel.subscriber_count() > 0 {
            return false;
        }
        match (Utc::now() - self.last_activity()).to_std() {
            Ok(idle) => idle > timeout,
            // Last activity in the future means clock skew.
            Err(_) => false,
        }
    }
}

/// Held context of a [`Session`]; touches the session again on release.
#[derive(Debug)]
pub struct SessionGuard<'a> {
    context: MutexGuard<'a, SessionContext>,
    session: &'a Session,
}

impl Deref for SessionGuard<'_> {
    type Target = SessionContext;

    fn deref(&self) -> &SessionContext {
        &self.context
    }
}

impl DerefMut for SessionGuard<'_> {
    fn deref_mut(&mut self) -> &mut SessionContext {
        &mut self.context
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.session.touch();
    }
}

/// Thread-safe store of live sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session with a fresh id.
    #[must_use]
    pub fn create(&self) -> Session {
        let session = Session::new(Uuid::new_v4().to_string());
        self.write()
            .insert(session.id().to_string(), session.clone());
        session
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Session> {
        self.read().get(id).cloned()
    }

    /// End a session.
    pub fn remove(&self, id: &str) -> Option<Session> {
        self.write().remove(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All live sessions, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.read().values().cloned().collect();
        sessions.sort_by_key(Session::created_at);
        sessions
    }

    /// Drop sessions idle longer than `timeout`; returns how many were removed.
    pub fn cleanup_expired_with_timeout(&self, timeout: Duration) -> usize {
        let mut guard = self.write();
        let before = guard.len();
        guard.retain(|_, session| !session.is_expired_with_timeout(timeout));
        before - guard.len()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Session>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Session>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
