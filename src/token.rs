use crate::error::{EnvoyError, EnvoyResult};
use async_trait::async_trait;
use base64::engine::general_purpose;
use base64::Engine;
use chrono::{DateTime, Utc};
use rocket::serde::json::serde_json;
use rocket::serde::Deserialize;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Async view of a credential store. The relay keeps tokens in memory; other hosts may
/// back this with platform secure storage.
#[async_trait]
pub trait TokenStorage: Send + Sync {
    async fn get_token(&self) -> Option<String>;
    async fn set_token(&self, token: &str) -> EnvoyResult<()>;
    async fn has_valid_token(&self) -> bool;
    async fn clear_token(&self);
}

#[derive(Debug, Clone, PartialEq)]
pub struct BearerToken {
    pub value: String,
    pub last_updated: DateTime<Utc>,
}

impl BearerToken {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Claims::from_token(&self.value)?.expires_at()
    }
}

/// Holds the current bearer credential. The lock guards only the credential fields
/// and is never held across an await point.
#[derive(Debug, Default)]
pub struct TokenStore {
    token: Mutex<Option<BearerToken>>,
}

impl TokenStore {
    pub fn new() -> Self {
        TokenStore::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<BearerToken>> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_token(&self, value: impl Into<String>) -> EnvoyResult<()> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(EnvoyError::InvalidArgument(
                "Token cannot be null or empty".to_string(),
            ));
        }

        *self.lock() = Some(BearerToken {
            value,
            last_updated: Utc::now(),
        });
        Ok(())
    }

    pub fn get_token(&self) -> Option<String> {
        self.lock().as_ref().map(|t| t.value.clone())
    }

    pub fn has_valid_token(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|t| !t.value.trim().is_empty())
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.lock().as_ref().map(|t| t.last_updated)
    }

    pub fn clear_token(&self) {
        *self.lock() = None;
    }

    /// The stored credential as one consistent view, read under a single lock.
    pub fn snapshot(&self) -> Option<BearerToken> {
        self.lock().clone()
    }

    /// Expiry of the stored token, if it is a JWT carrying an `exp` claim.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot()?.expires_at()
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at().is_some_and(|exp| exp < Utc::now())
    }
}

#[async_trait]
impl TokenStorage for TokenStore {
    async fn get_token(&self) -> Option<String> {
        TokenStore::get_token(self)
    }

    async fn set_token(&self, token: &str) -> EnvoyResult<()> {
        TokenStore::set_token(self, token)
    }

    async fn has_valid_token(&self) -> bool {
        TokenStore::has_valid_token(self)
    }

    async fn clear_token(&self) {
        TokenStore::clear_token(self)
    }
}

/// Unverified JWT payload. Only used to report expiry, never to trust the token.
#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct Claims {
    exp: i64,
}

impl Claims {
    pub fn from_token(token: &str) -> Option<Self> {
        let mut parts = token.split('.');
        let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => return None,
        };
        let decoded = general_purpose::URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .ok()?;
        serde_json::from_slice(&decoded).ok()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

/// Shortened form of a token that is safe to put in logs.
pub fn token_preview(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.is_empty() {
        "NONE".to_string()
    } else if chars.len() > 10 {
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        "short".to_string()
    }
}
