//! Persisted record model and the backend key layout.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Global key holding the serialized set of every known handle.
pub const INDEX_KEY: &str = "INDEX_HANDLES";

/// Per-handle record kinds and their backend key suffixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    AccessTokenResponse,
    ServiceConfiguration,
    LastUsed,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [
        RecordKind::AccessTokenResponse,
        RecordKind::ServiceConfiguration,
        RecordKind::LastUsed,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            RecordKind::AccessTokenResponse => "AccessTokenResponse",
            RecordKind::ServiceConfiguration => "ServiceConfiguration",
            RecordKind::LastUsed => "LastUsed",
        }
    }

    /// Backend key for this kind under `handle`, e.g. `h1.LastUsed`.
    pub fn key(self, handle: &str) -> String {
        format!("{handle}.{}", self.suffix())
    }
}

/// A structured record stored against a handle.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    const KIND: RecordKind;
}

/// Access/refresh token pair plus the metadata of the token response.
///
/// `access_token` and `refresh_token` hold ciphertext at rest whenever a cipher
/// was active at save time.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TokenRecord {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    /// Lifetime of the access token in seconds, counted from `created_on`.
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub created_on: Option<DateTime<Utc>>,
}

impl TokenRecord {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token: Some(refresh_token.into()),
            token_type: Some("Bearer".to_string()),
            created_on: Some(Utc::now()),
            ..Self::default()
        }
    }
}

// Secrets stay out of logs.
impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("state", &self.state)
            .field("created_on", &self.created_on)
            .finish()
    }
}

impl Record for TokenRecord {
    const KIND: RecordKind = RecordKind::AccessTokenResponse;
}

/// Service configuration persisted alongside a handle. Stored unencrypted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PersistedParams {
    pub handle: String,
    pub token_url: String,
    pub authorization_url: Option<String>,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
    pub supports_basic_auth: bool,
    pub state: Option<String>,
    pub redirect_uri: Option<String>,
    pub token_expires_in_seconds: i64,
}

impl Default for PersistedParams {
    fn default() -> Self {
        Self {
            handle: String::new(),
            token_url: String::new(),
            authorization_url: None,
            client_id: String::new(),
            client_secret: None,
            scope: None,
            supports_basic_auth: false,
            state: None,
            redirect_uri: None,
            token_expires_in_seconds: 60,
        }
    }
}

impl Record for PersistedParams {
    const KIND: RecordKind = RecordKind::ServiceConfiguration;
}
