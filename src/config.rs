use anyhow::{Context, Result};
use std::path::PathBuf;

/// Default OAuth2 token endpoint path
pub const DEFAULT_TOKEN_PATH: &str = "/oauth_token.do";

/// How the client authenticates outbound calls
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthMode {
    /// Static `Authorization: Basic` header from username/password
    Basic,
    /// Bearer token obtained and refreshed through the token endpoint
    OAuth2,
}

/// Client configuration, immutable for the lifetime of a client
#[derive(Clone)]
pub struct ClientConfig {
    // Instance
    pub base_url: String,
    pub auth_mode: AuthMode,

    // Credentials
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub token_path: String,
    pub access_token: Option<String>,
    pub token_file: Option<PathBuf>,

    // HTTP client
    pub http_max_connections: usize,
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    // Logging
    pub log_level: String,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn redact(value: &Option<String>) -> Option<&'static str> {
            value.as_ref().map(|_| "***")
        }

        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("auth_mode", &self.auth_mode)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("token_path", &self.token_path)
            .field("access_token", &redact(&self.access_token))
            .field("token_file", &self.token_file)
            .field("http_max_connections", &self.http_max_connections)
            .field("http_connect_timeout", &self.http_connect_timeout)
            .field("http_request_timeout", &self.http_request_timeout)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl ClientConfig {
    /// Basic-auth configuration with default HTTP settings
    pub fn basic(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            auth_mode: AuthMode::Basic,
            username: Some(username.into()),
            password: Some(password.into()),
            ..Self::empty(base_url.into())
        }
    }

    /// OAuth2 configuration with no credentials filled in yet
    pub fn oauth2(base_url: impl Into<String>) -> Self {
        Self {
            auth_mode: AuthMode::OAuth2,
            ..Self::empty(base_url.into())
        }
    }

    fn empty(base_url: String) -> Self {
        Self {
            base_url,
            auth_mode: AuthMode::Basic,
            username: None,
            password: None,
            client_id: None,
            client_secret: None,
            token_path: DEFAULT_TOKEN_PATH.to_string(),
            access_token: None,
            token_file: None,
            http_max_connections: 20,
            http_connect_timeout: 30,
            http_request_timeout: 300,
            log_level: "info".to_string(),
        }
    }

    pub fn with_client_credentials(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.client_id = Some(client_id.into());
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn with_user(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_token_path(mut self, token_path: impl Into<String>) -> Self {
        self.token_path = token_path.into();
        self
    }

    pub fn with_access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = Some(access_token.into());
        self
    }

    pub fn with_token_file(mut self, token_file: impl Into<PathBuf>) -> Self {
        self.token_file = Some(token_file.into());
        self
    }

    /// Load configuration from `.env` and the process environment
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let base_url = get("RECORD_API_BASE_URL")
            .context("RECORD_API_BASE_URL is required")?;

        let config = ClientConfig {
            base_url,

            auth_mode: parse_auth_mode(&get("RECORD_API_AUTH_MODE").unwrap_or_default())?,

            username: get("RECORD_API_USERNAME"),
            password: get("RECORD_API_PASSWORD"),
            client_id: get("RECORD_API_CLIENT_ID"),
            client_secret: get("RECORD_API_CLIENT_SECRET"),

            token_path: get("RECORD_API_TOKEN_PATH")
                .unwrap_or_else(|| DEFAULT_TOKEN_PATH.to_string()),

            access_token: get("RECORD_API_ACCESS_TOKEN"),

            token_file: get("RECORD_API_TOKEN_FILE").map(|s| expand_tilde(&s)),

            http_max_connections: get("HTTP_MAX_CONNECTIONS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(20),

            http_connect_timeout: get("HTTP_CONNECT_TIMEOUT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),

            http_request_timeout: get("HTTP_REQUEST_TIMEOUT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),

            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.base_url)
            .with_context(|| format!("Invalid base URL: {}", self.base_url))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            anyhow::bail!("Base URL must use http or https: {}", self.base_url);
        }

        if let Some(token) = &self.access_token {
            reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
                .context("Access token contains characters not allowed in a header")?;
        }

        let has_user = self.username.is_some() && self.password.is_some();

        match self.auth_mode {
            AuthMode::Basic => {
                if !has_user {
                    anyhow::bail!("Basic authentication requires a username and password");
                }
            }
            AuthMode::OAuth2 => {
                let has_client = self.client_id.is_some() && self.client_secret.is_some();
                if self.access_token.is_none() && !has_client && !has_user {
                    anyhow::bail!(
                        "OAuth2 requires an access token, a client id and secret, or a username and password"
                    );
                }
            }
        }

        Ok(())
    }
}

/// Parse auth mode from string (empty means Basic)
fn parse_auth_mode(s: &str) -> Result<AuthMode> {
    match s.trim().to_lowercase().as_str() {
        "" | "basic" => Ok(AuthMode::Basic),
        "oauth" | "oauth2" => Ok(AuthMode::OAuth2),
        other => anyhow::bail!("Unknown auth mode: {}", other),
    }
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
