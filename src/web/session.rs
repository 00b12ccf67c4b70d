//! In-process session store keyed by opaque bearer tokens.
//!
//! Sessions expire `ttl` after login. Expired tokens are dropped when looked up,
//! and every new login prunes whatever else has expired.

use rand::{Rng, distributions::Alphanumeric};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;
use tracing::debug;

const TOKEN_LENGTH: usize = 48;

/// What a login leaves behind for later requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Logged-in user
    pub user_id: i64,
    /// Phone used for a phone login; re-derives the sibling group
    pub phone: Option<String>,
    /// When the login happened
    pub issued_at: Instant,
}

impl Session {
    /// A session issued now.
    #[must_use]
    pub fn new(user_id: i64, phone: Option<String>) -> Self {
        Self {
            user_id,
            phone,
            issued_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.issued_at.elapsed() >= ttl
    }
}

/// Token to session map shared by all request handlers.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Duration,
}

impl SessionStore {
    /// Creates an empty store whose sessions live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::default(),
            ttl,
        }
    }

    /// Stores `session` under a fresh random token and returns the token.
    pub async fn create(&self, session: Session) -> String {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(self.ttl));
        if sessions.len() < before {
            debug!(pruned = before - sessions.len(), "Pruned expired sessions");
        }
        sessions.insert(token.clone(), session);
        token
    }

    /// Looks up a token. An expired token is removed and reported as absent.
    pub async fn get(&self, token: &str) -> Option<Session> {
        let session = self.sessions.read().await.get(token).cloned()?;
        if session.is_expired(self.ttl) {
            self.sessions.write().await.remove(token);
            return None;
        }
        Some(session)
    }

    /// Forgets a token. Returns whether it existed.
    pub async fn remove(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }
}
