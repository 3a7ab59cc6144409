// Authentication types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Lifetime assumed when the token endpoint omits `expires_in`
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// In-memory token state owned by the token manager
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenState {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// `None` means the token never expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenState {
    /// True when an access token is present and `now` is before its expiry
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match (&self.access_token, self.expires_at) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(_), Some(exp)) => exp > now,
        }
    }

    /// Projection written to the token store
    pub fn to_persisted(&self) -> Option<PersistedToken> {
        self.access_token.as_ref().map(|access_token| PersistedToken {
            access_token: access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expires_at: self.expires_at,
        })
    }
}

impl From<PersistedToken> for TokenState {
    fn from(token: PersistedToken) -> Self {
        Self {
            access_token: Some(token.access_token),
            refresh_token: token.refresh_token,
            expires_at: token.expires_at,
        }
    }
}

/// Durable token representation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// OAuth2 grant used to obtain a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    Password,
    ClientCredentials,
    RefreshToken,
}

impl GrantType {
    /// Value sent in the `grant_type` form field
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::Password => "password",
            GrantType::ClientCredentials => "client_credentials",
            GrantType::RefreshToken => "refresh_token",
        }
    }
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default, deserialize_with = "deserialize_expires_in")]
    pub expires_in: Option<i64>,
}

impl TokenResponse {
    /// Expiry instant relative to `now`, saturating at the far future
    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let expires_in = self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        Duration::try_seconds(expires_in)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Accepts `3600`, `"3600"` or `null`
fn deserialize_expires_in<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Str(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Int(secs)) => Ok(Some(secs)),
        Some(Raw::Str(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("expires_in is not numeric: {}", s))),
    }
}
