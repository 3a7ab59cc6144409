// Token endpoint requests

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use tokio_util::sync::CancellationToken;

use super::types::{GrantType, TokenResponse};
use crate::config::ClientConfig;
use crate::error::{ApiError, AuthError, Error, Result};
use crate::http::{with_cancellation, HttpRequest, HttpSend};

/// Form fields for one token endpoint call
#[derive(Debug, Clone)]
pub struct GrantRequest {
    pub grant: GrantType,
    pub form: Vec<(&'static str, String)>,
}

impl GrantRequest {
    /// `application/x-www-form-urlencoded` body
    pub fn encode(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.form.iter().map(|(k, v)| (*k, v.as_str())))
            .finish()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Pick the grant for the next token call
///
/// A refresh token always means a refresh grant. Otherwise client
/// credentials are used only when no username is configured; any username
/// selects the password grant and client id/secret ride along.
pub fn select_grant(config: &ClientConfig, refresh_token: Option<&str>) -> Result<GrantRequest> {
    let client_id = non_empty(&config.client_id);
    let client_secret = non_empty(&config.client_secret);
    let username = non_empty(&config.username);

    let mut form: Vec<(&'static str, String)> = Vec::new();

    let grant = if let Some(refresh_token) = refresh_token {
        form.push(("grant_type", GrantType::RefreshToken.as_str().to_string()));
        form.push(("refresh_token", refresh_token.to_string()));
        GrantType::RefreshToken
    } else if let (None, Some(_), Some(_)) = (username, client_id, client_secret) {
        form.push(("grant_type", GrantType::ClientCredentials.as_str().to_string()));
        GrantType::ClientCredentials
    } else {
        let username = username.ok_or_else(|| {
            AuthError::MissingCredentials("password grant requires a username".to_string())
        })?;
        let password = config.password.clone().unwrap_or_default();

        form.push(("grant_type", GrantType::Password.as_str().to_string()));
        form.push(("username", username.to_string()));
        form.push(("password", password));
        GrantType::Password
    };

    if let Some(client_id) = client_id {
        form.push(("client_id", client_id.to_string()));
    }
    if let Some(client_secret) = client_secret {
        form.push(("client_secret", client_secret.to_string()));
    }

    Ok(GrantRequest { grant, form })
}

/// Call the token endpoint and parse its response
///
/// Non-2xx answers become [`AuthError::Rejected`]; a response without an
/// access token is a protocol error.
pub async fn request_token(
    http: &dyn HttpSend,
    url: &str,
    request: &GrantRequest,
    cancel: &CancellationToken,
) -> Result<TokenResponse> {
    tracing::info!(grant_type = request.grant.as_str(), url = %url, "Requesting access token");

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/x-www-form-urlencoded"),
    );
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    let http_request = HttpRequest {
        method: Method::POST,
        url: url.to_string(),
        headers,
        body: Some(Bytes::from(request.encode())),
    };

    let response = with_cancellation(cancel, http.send(http_request))
        .await?
        .map_err(AuthError::Transport)?;

    if !response.is_success() {
        let error = ApiError::from_status(response.status, response.text());
        tracing::error!(
            grant_type = request.grant.as_str(),
            status = error.status(),
            body = %error.body(),
            "Token request failed"
        );
        return Err(AuthError::Rejected(error).into());
    }

    let data: TokenResponse = response
        .json()
        .map_err(|e| Error::Protocol(format!("Failed to parse token response: {}", e)))?;

    if data.access_token.as_deref().map_or(true, str::is_empty) {
        return Err(Error::Protocol(
            "Token response does not contain access_token".to_string(),
        ));
    }

    Ok(data)
}
