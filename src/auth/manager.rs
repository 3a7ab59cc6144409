use chrono::Utc;
use reqwest::header::HeaderValue;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::grant;
use super::store::TokenStore;
use super::types::TokenState;
use crate::config::{AuthMode, ClientConfig};
use crate::error::{AuthError, Error, Result};
use crate::http::{join_url, with_cancellation, HttpSend};

/// Token state and the Authorization header derived from it
///
/// Both live behind one lock so no reader sees one without the other.
#[derive(Debug, Default)]
struct Inner {
    state: TokenState,
    authorization: Option<HeaderValue>,
    /// Set once the store has been consulted
    store_loaded: bool,
}

/// Authentication manager
/// Owns the OAuth2 token lifecycle: lazy load from the store, acquisition,
/// refresh and persistence. The whole check-and-acquire path runs under a
/// single lock, so concurrent callers facing an expired token share one
/// token endpoint call.
pub struct TokenManager {
    config: ClientConfig,

    /// Absolute URL of the token endpoint
    token_url: String,

    /// Shared HTTP primitive, also used by the transport
    http: Arc<dyn HttpSend>,

    /// Optional durable copy of the token
    store: Option<Arc<dyn TokenStore>>,

    inner: Mutex<Inner>,
}

impl TokenManager {
    /// Create a manager for the given configuration
    ///
    /// A configured static access token seeds the state with no expiry.
    pub fn new(
        config: ClientConfig,
        http: Arc<dyn HttpSend>,
        store: Option<Arc<dyn TokenStore>>,
    ) -> Self {
        let token_url = join_url(&config.base_url, &config.token_path);

        let state = TokenState {
            access_token: config.access_token.clone(),
            refresh_token: None,
            expires_at: None,
        };
        let authorization = state.access_token.as_deref().and_then(|t| bearer(t).ok());

        Self {
            config,
            token_url,
            http,
            store,
            inner: Mutex::new(Inner {
                state,
                authorization,
                store_loaded: false,
            }),
        }
    }

    /// Replace the initial in-memory state
    pub fn with_state(self, state: TokenState) -> Self {
        let authorization = state.access_token.as_deref().and_then(|t| bearer(t).ok());
        Self {
            inner: Mutex::new(Inner {
                state,
                authorization,
                store_loaded: false,
            }),
            ..self
        }
    }

    pub fn auth_mode(&self) -> &AuthMode {
        &self.config.auth_mode
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Make sure a non-expired bearer token is attached
    ///
    /// No-op outside OAuth2 mode. Makes no network call while the current
    /// token is valid.
    pub async fn ensure_token(&self, cancel: &CancellationToken) -> Result<()> {
        self.ensure_authorization(cancel).await.map(|_| ())
    }

    /// Same as [`ensure_token`](Self::ensure_token), returning the header to attach
    ///
    /// `None` in Basic mode, where the transport attaches its own header.
    pub async fn ensure_authorization(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<HeaderValue>> {
        if self.config.auth_mode != AuthMode::OAuth2 {
            return Ok(None);
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut inner = with_cancellation(cancel, self.inner.lock()).await?;

        if inner.state.access_token.is_none() && !inner.store_loaded {
            if let Some(store) = &self.store {
                let loaded = with_cancellation(cancel, store.load())
                    .await?
                    .map_err(AuthError::Store)?;

                if let Some(persisted) = loaded {
                    tracing::debug!("Adopting token from store");
                    let state = TokenState::from(persisted);
                    inner.authorization = match state.access_token.as_deref() {
                        Some(token) => Some(bearer(token)?),
                        None => None,
                    };
                    inner.state = state;
                }
            }
            inner.store_loaded = true;
        }

        // Fast path
        if inner.state.is_valid_at(Utc::now()) {
            return match inner.authorization.clone() {
                Some(authorization) => Ok(Some(authorization)),
                None => Err(Error::Config(
                    "Access token cannot be sent as an Authorization header".to_string(),
                )),
            };
        }

        let previous_refresh = inner.state.refresh_token.clone();
        if previous_refresh.is_some() {
            tracing::debug!("Access token missing or expired, refreshing...");
        } else {
            tracing::debug!("No usable access token, acquiring...");
        }

        let request = grant::select_grant(&self.config, previous_refresh.as_deref())?;
        let data =
            grant::request_token(self.http.as_ref(), &self.token_url, &request, cancel).await?;

        let access_token = data.access_token.clone().unwrap_or_default();
        let authorization = bearer(&access_token)?;
        let state = TokenState {
            access_token: Some(access_token),
            refresh_token: data
                .refresh_token
                .clone()
                .filter(|t| !t.is_empty())
                .or(previous_refresh),
            expires_at: Some(data.expires_at(Utc::now())),
        };

        tracing::info!(
            grant_type = request.grant.as_str(),
            token = %token_prefix(state.access_token.as_deref().unwrap_or_default()),
            expires = %state
                .expires_at
                .map(|e| e.to_rfc3339())
                .unwrap_or_default(),
            "Access token acquired"
        );

        let persisted = state.to_persisted();
        inner.state = state;
        inner.authorization = Some(authorization.clone());

        // The new token is held even if saving it fails
        if let (Some(store), Some(persisted)) = (&self.store, persisted) {
            with_cancellation(cancel, store.save(&persisted))
                .await?
                .map_err(AuthError::Store)?;
        }

        Ok(Some(authorization))
    }

    /// Current Authorization header, if any token is held
    pub async fn authorization_header(&self) -> Option<HeaderValue> {
        self.inner.lock().await.authorization.clone()
    }

    /// Snapshot of the in-memory token state
    pub async fn token_state(&self) -> TokenState {
        self.inner.lock().await.state.clone()
    }

    /// Drop the access token so the next call refreshes or re-acquires
    ///
    /// The refresh token is kept. The store is not consulted again.
    pub async fn invalidate(&self) {
        let mut inner = self.inner.lock().await;
        inner.store_loaded = true;
        inner.state.access_token = None;
        inner.state.expires_at = None;
        inner.authorization = None;
        tracing::debug!("Access token invalidated");
    }
}

fn bearer(token: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|_| Error::Protocol("Access token contains invalid header characters".to_string()))?;
    value.set_sensitive(true);
    Ok(value)
}

fn token_prefix(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("{}...", prefix)
}
