// src/auth.rs
//! Identity collaborator. Handlers only see the `IdentityProvider` trait; the
//! in-memory implementation backs local runs and tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// Registration payload as the client sends it.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    #[serde(rename = "userName")]
    pub username: String,
    pub password: String,
    #[serde(rename = "firstName", default)]
    pub first_name: String,
    #[serde(rename = "lastName", default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}

/// Opaque session token handed to the client in a cookie.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("Already Registered")]
    AlreadyRegistered,
    #[error("username must not be empty")]
    EmptyUsername,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(&self, username: &str, password: &str) -> Option<Identity>;
    async fn create_user(&self, user: NewUser) -> Result<Identity, AuthError>;
    async fn login(&self, identity: &Identity) -> SessionToken;
    async fn logout(&self, token: &SessionToken);
    /// Identity behind a live session, if any.
    async fn identity_for(&self, token: &SessionToken) -> Option<Identity>;
}

struct StoredUser {
    identity: Identity,
    salt: String,
    password_hash: String,
}

struct Session {
    username: String,
    expires_at: DateTime<Utc>,
}

pub struct InMemoryIdentityProvider {
    users: RwLock<HashMap<String, StoredUser>>,
    sessions: RwLock<HashMap<SessionToken, Session>>,
    session_ttl: chrono::Duration,
}

impl InMemoryIdentityProvider {
    pub fn new(session_ttl: Duration) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            session_ttl: chrono::Duration::from_std(session_ttl)
                .unwrap_or_else(|_| chrono::Duration::days(14)),
        }
    }
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn authenticate(&self, username: &str, password: &str) -> Option<Identity> {
        // same normalization as `create_user`
        let username = username.trim();
        let users = self.users.read().await;
        let stored = users.get(username)?;
        if hash_password(&stored.salt, password) == stored.password_hash {
            Some(stored.identity.clone())
        } else {
            debug!(username, "password mismatch");
            None
        }
    }

    async fn create_user(&self, user: NewUser) -> Result<Identity, AuthError> {
        let username = user.username.trim().to_string();
        if username.is_empty() {
            return Err(AuthError::EmptyUsername);
        }

        let mut users = self.users.write().await;
        if users.contains_key(&username) {
            return Err(AuthError::AlreadyRegistered);
        }

        let salt = uuid::Uuid::new_v4().simple().to_string();
        let identity = Identity {
            username: username.clone(),
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
        };
        users.insert(
            username.clone(),
            StoredUser {
                identity: identity.clone(),
                password_hash: hash_password(&salt, &user.password),
                salt,
            },
        );
        info!(username = %username, "user registered");
        Ok(identity)
    }

    async fn login(&self, identity: &Identity) -> SessionToken {
        let token = SessionToken(uuid::Uuid::new_v4().simple().to_string());
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(
            token.clone(),
            Session {
                username: identity.username.clone(),
                expires_at: now + self.session_ttl,
            },
        );
        info!(username = %identity.username, "session opened");
        token
    }

    async fn logout(&self, token: &SessionToken) {
        if let Some(s) = self.sessions.write().await.remove(token) {
            info!(username = %s.username, "session closed");
        }
    }

    async fn identity_for(&self, token: &SessionToken) -> Option<Identity> {
        let username = {
            let sessions = self.sessions.read().await;
            let session = sessions.get(token)?;
            if session.expires_at <= Utc::now() {
                return None;
            }
            session.username.clone()
        };
        self.users
            .read()
            .await
            .get(&username)
            .map(|u| u.identity.clone())
    }
}
