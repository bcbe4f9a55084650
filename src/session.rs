use std::{collections::HashMap, fmt};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::hasher::sha256_hash;

/// Sessions live for two weeks unless configured otherwise
pub const DEFAULT_SESSION_MAX_AGE_SECS: i64 = 60 * 60 * 24 * 14;

struct Session {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

impl Session {
    fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Server-side sessions of the session auth backend.
///
/// Session ids are handed out to clients in cookies, the store keeps only their sha256 hashes.
/// Expired sessions are rejected on lookup and evicted whenever a new session is opened
pub struct SessionStore {
    max_age: TimeDelta,
    sessions: RwLock<HashMap<String, Session>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(TimeDelta::seconds(DEFAULT_SESSION_MAX_AGE_SECS))
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("max_age", &self.max_age)
            .finish()
    }
}

impl SessionStore {
    pub fn new(max_age: TimeDelta) -> Self {
        SessionStore {
            max_age,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn max_age(&self) -> TimeDelta {
        self.max_age
    }

    /// Opens a session for the user and returns its id
    pub async fn create(&self, user_id: Uuid) -> String {
        let session_id = Uuid::new_v4().simple().to_string();
        let now = Utc::now();
        let session = Session {
            user_id,
            expires_at: now.checked_add_signed(self.max_age).unwrap_or(DateTime::<Utc>::MAX_UTC),
        };

        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, session| session.is_valid(now));
        sessions.insert(sha256_hash(&session_id), session);

        session_id
    }

    /// Returns the user of a session which hasn't expired yet
    pub async fn get(&self, session_id: &str) -> Option<Uuid> {
        self.sessions
            .read()
            .await
            .get(&sha256_hash(session_id))
            .filter(|session| session.is_valid(Utc::now()))
            .map(|session| session.user_id)
    }

    /// Drops a session, returns `false` if it didn't exist
    pub async fn remove(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(&sha256_hash(session_id)).is_some()
    }

    /// Drops every session of the user, e.g. after a password change
    pub async fn remove_user_sessions(&self, user_id: Uuid) {
        self.sessions.write().await.retain(|_, session| session.user_id != user_id);
    }
}
