//! Keyed per-session mutual exclusion.
//!
//! Indexing and uploading must each run at most once per session at a time,
//! but unrelated sessions must not serialize behind each other. A
//! [`SessionLocks`] set is a keyed try-lock: acquiring an already-held key
//! fails immediately instead of blocking, so a duplicate background task just
//! skips its turn.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// A set of held session ids. Cheap to clone the `Arc` into background tasks.
#[derive(Default)]
pub struct SessionLocks {
    held: Mutex<HashSet<String>>,
}

impl SessionLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Try to acquire the token for `session_id`. Returns `None` if another
    /// task already holds it. The token is released when the guard drops.
    pub fn try_acquire(self: &Arc<Self>, session_id: &str) -> Option<SessionGuard> {
        let mut held = self.held.lock().expect("lock set poisoned");
        if held.insert(session_id.to_string()) {
            Some(SessionGuard {
                locks: Arc::clone(self),
                session_id: session_id.to_string(),
            })
        } else {
            None
        }
    }
}

/// RAII token for one session; dropping it releases the key.
pub struct SessionGuard {
    locks: Arc<SessionLocks>,
    session_id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let mut held = self.locks.held.lock().expect("lock set poisoned");
        held.remove(&self.session_id);
    }
}
