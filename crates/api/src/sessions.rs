//! Per-session lists of uploaded document collections.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Active document collections per session, in upload order.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Vec<String>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collections uploaded in `session_id`, oldest first.
    pub fn active(&self, session_id: &str) -> Vec<String> {
        self.sessions
            .read()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Append `collection` to the session unless already present.
    ///
    /// Returns the session's list after the call.
    pub fn register(&self, session_id: &str, collection: &str) -> Vec<String> {
        let mut sessions = self.sessions.write();
        let list = sessions.entry(session_id.to_string()).or_default();
        if !list.iter().any(|c| c == collection) {
            list.push(collection.to_string());
        }
        list.clone()
    }

    /// Forget the session, returning the collections it had.
    pub fn clear(&self, session_id: &str) -> Vec<String> {
        self.sessions
            .write()
            .remove(session_id)
            .unwrap_or_default()
    }
}
