use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(crate = "rocket::serde")]
pub struct TokenRequest {
    #[serde(default, alias = "Token")]
    pub token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(crate = "rocket::serde")]
pub struct TokenResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TokenResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        TokenResponse {
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        TokenResponse {
            success: false,
            message: Some(message.into()),
        }
    }
}

pub const STATUS_READY: &str = "Ready";
pub const STATUS_WAITING: &str = "Waiting for token";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(crate = "rocket::serde", rename_all = "camelCase")]
pub struct ProxyStatusResponse {
    pub has_token: bool,
    pub last_token_update: Option<DateTime<Utc>>,
    pub status: String,
    #[serde(default)]
    pub token_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub token_expired: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(crate = "rocket::serde")]
pub struct ConnectionResponse {
    pub connected: bool,
}
