use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Source of per-user upstream credentials, injected into actions.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn access_token(&self, user_id: &str) -> Option<AccessToken>;
}

#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    tokens: RwLock<HashMap<String, AccessToken>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user_id: impl Into<String>, token: AccessToken) {
        self.tokens.write().await.insert(user_id.into(), token);
    }

    pub async fn remove(&self, user_id: &str) -> Option<AccessToken> {
        self.tokens.write().await.remove(user_id)
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn access_token(&self, user_id: &str) -> Option<AccessToken> {
        self.tokens.read().await.get(user_id).cloned()
    }
}
