//! In-memory cache of derived credentials, one per live session.

use crate::crypto::DerivedKey;
use crate::session::SessionId;
use std::collections::HashMap;
use std::fmt;

/// Keeps the credential derived at open time so a session can be reloaded
/// without asking for the password again.
///
/// Never derives keys and never touches the disk. Keys are zeroed when
/// removed or replaced.
#[derive(Default)]
pub struct CredentialCache {
    keys: HashMap<SessionId, DerivedKey>,
}

impl CredentialCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the credential for a session, replacing any previous one.
    pub fn store(&mut self, session: SessionId, key: DerivedKey) {
        if self.keys.insert(session, key).is_some() {
            tracing::debug!(%session, "replaced cached credential");
        }
    }

    pub fn fetch(&self, session: SessionId) -> Option<&DerivedKey> {
        self.keys.get(&session)
    }

    /// Drop the credential of a session. Returns whether one was cached.
    pub fn remove(&mut self, session: SessionId) -> bool {
        self.keys.remove(&session).is_some()
    }

    pub fn contains(&self, session: SessionId) -> bool {
        self.keys.contains_key(&session)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }
}

impl fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sessions: Vec<&SessionId> = self.keys.keys().collect();
        sessions.sort();
        f.debug_struct("CredentialCache")
            .field("sessions", &sessions)
            .finish()
    }
}
