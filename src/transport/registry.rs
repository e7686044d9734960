//! # Session Registry
//!
//! Process-wide lookup index from session id to [`Session`].
//!
//! ## Features
//! - **Sharded**: backed by `DashMap`, so readers only contend with writers on the
//!   same shard
//! - **Index only**: removing a session never closes it; the server removes a session
//!   after it has closed
//!
//! Callbacks passed to [`SessionRegistry::for_each`] run while a shard lock is held and
//! must not add or remove sessions. Use [`SessionRegistry::snapshot`] to act on sessions
//! without holding any lock.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::trace;

use crate::transport::session::{Session, SessionId};

/// Concurrent map of live sessions.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<SessionId, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `session` under its current id, returning any session it displaced
    pub fn add(&self, session: Arc<Session>) -> Option<Arc<Session>> {
        let id = session.id();
        let previous = self.sessions.insert(id, session);
        trace!(session_id = id, count = self.sessions.len(), "Session registered");
        previous
    }

    pub fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.remove(&id).map(|(_, session)| session)
    }

    /// Remove exactly this session, even if its id was changed after registration
    pub fn remove_session(&self, session: &Arc<Session>) -> bool {
        if self
            .sessions
            .remove_if(&session.id(), |_, s| Arc::ptr_eq(s, session))
            .is_some()
        {
            return true;
        }

        let before = self.sessions.len();
        self.sessions.retain(|_, s| !Arc::ptr_eq(s, session));
        self.sessions.len() < before
    }

    /// Move the session registered as `old` to `new`, updating its id.
    ///
    /// Returns `false` if nothing is registered under `old` or `new` is taken.
    pub fn rekey(&self, old: SessionId, new: SessionId) -> bool {
        if old == new {
            return self.sessions.contains_key(&old);
        }
        if self.sessions.contains_key(&new) {
            return false;
        }
        match self.sessions.remove(&old) {
            Some((_, session)) => {
                session.set_id(new);
                self.sessions.insert(new, session);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Visit sessions until `f` returns `false`
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(SessionId, &Arc<Session>) -> bool,
    {
        for entry in self.sessions.iter() {
            if !f(*entry.key(), entry.value()) {
                break;
            }
        }
    }

    /// Clone out every registered session
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::core::packet::DefaultPacker;

    fn session() -> Arc<Session> {
        Session::new(Arc::new(DefaultPacker::new()), None, 1, None)
    }

    #[test]
    fn add_get_remove() {
        let registry = SessionRegistry::new();
        let s = session();
        registry.add(Arc::clone(&s));

        assert!(Arc::ptr_eq(&registry.get(s.id()).unwrap(), &s));
        assert_eq!(registry.len(), 1);

        let removed = registry.remove(s.id()).unwrap();
        assert!(Arc::ptr_eq(&removed, &s));
        assert!(registry.is_empty());
        assert!(!s.is_closed(), "removal must not close the session");
    }

    #[test]
    fn rekey_moves_entry_and_updates_id() {
        let registry = SessionRegistry::new();
        let s = session();
        let old = s.id();
        registry.add(Arc::clone(&s));

        assert!(registry.rekey(old, 900_001));
        assert_eq!(s.id(), 900_001);
        assert!(registry.get(old).is_none());
        assert!(registry.contains(900_001));
    }

    #[test]
    fn remove_session_finds_renamed_session() {
        let registry = SessionRegistry::new();
        let s = session();
        registry.add(Arc::clone(&s));
        s.set_id(900_002);

        assert!(registry.remove_session(&s));
        assert!(registry.is_empty());
    }

    #[test]
    fn for_each_stops_early() {
        let registry = SessionRegistry::new();
        for _ in 0..5 {
            registry.add(session());
        }
        let mut visited = 0;
        registry.for_each(|_, _| {
            visited += 1;
            visited < 2
        });
        assert_eq!(visited, 2);
        assert_eq!(registry.snapshot().len(), 5);
    }
}
