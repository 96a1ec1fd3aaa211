//! Session registry: bidirectional map between transport sessions and users.
//!
//! A binding is created only after the upgrade handshake has validated both
//! identity headers, and is removed on disconnect. The reverse (user →
//! session) view is a secondary index kept in step with the primary map, so
//! addressed delivery never scans all sessions.

use dashmap::DashMap;

/// One live transport session.
#[derive(Debug, Clone)]
pub struct SessionBinding {
    pub user_id: String,
    pub nickname: String,
}

/// Concurrent session/user registry.
///
/// Last-bind-wins: when a user reconnects before their old session sends a
/// disconnect (network drop without a close frame), the newer binding owns
/// the reverse index and an eventual stale unbind must not knock it out.
#[derive(Default)]
pub struct SessionRegistry {
    /// session id → binding
    sessions: DashMap<String, SessionBinding>,
    /// user id → most recently bound session id
    by_user: DashMap<String, String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a binding for a validated connection.
    pub fn bind(&self, session_id: &str, user_id: &str, nickname: &str) {
        self.sessions.insert(
            session_id.to_string(),
            SessionBinding {
                user_id: user_id.to_string(),
                nickname: nickname.to_string(),
            },
        );
        self.by_user
            .insert(user_id.to_string(), session_id.to_string());

        tracing::info!(session_id = %session_id, user_id = %user_id, nickname = %nickname, "Session bound");
    }

    /// Remove a binding on disconnect. Returns the user that was bound.
    pub fn unbind(&self, session_id: &str) -> Option<String> {
        let (_, binding) = self.sessions.remove(session_id)?;

        // Only clear the reverse entry while it still points at this session;
        // the user may have already rebound from a newer connection.
        self.by_user
            .remove_if(&binding.user_id, |_, bound| bound == session_id);

        tracing::info!(
            session_id = %session_id,
            user_id = %binding.user_id,
            nickname = %binding.nickname,
            "Session unbound"
        );
        Some(binding.user_id)
    }

    /// Most recently bound session for a user, if any.
    pub fn session_for(&self, user_id: &str) -> Option<String> {
        self.by_user.get(user_id).map(|entry| entry.value().clone())
    }

    /// User bound to a session, if any.
    pub fn user_for(&self, session_id: &str) -> Option<String> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().user_id.clone())
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
