use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::auth::TokenManager;
use crate::config::{AuthMode, ClientConfig};
use crate::error::{Error, Result};
use crate::http::{join_url, with_cancellation, HttpRequest, HttpResponse, HttpSend};

/// Single egress point for API calls
///
/// Attaches Basic or Bearer credentials and sends the request. Responses are
/// returned raw; resource clients classify them with
/// [`ensure_success`](crate::error::ensure_success).
pub struct AuthenticatedTransport {
    /// Shared HTTP primitive with connection pooling
    http: Arc<dyn HttpSend>,

    /// Token lifecycle (no-op in Basic mode)
    token_manager: Arc<TokenManager>,

    base_url: String,

    /// Headers sent on every call; carries the Basic credential
    default_headers: HeaderMap,
}

impl AuthenticatedTransport {
    /// Create a transport for the given configuration
    ///
    /// In Basic mode the Authorization header is fixed here and never refreshed.
    pub fn new(
        config: &ClientConfig,
        http: Arc<dyn HttpSend>,
        token_manager: Arc<TokenManager>,
    ) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if config.auth_mode == AuthMode::Basic {
            let username = config
                .username
                .as_deref()
                .ok_or_else(|| Error::Config("Basic authentication requires a username".into()))?;
            let password = config.password.as_deref().unwrap_or_default();
            default_headers.insert(AUTHORIZATION, basic_auth(username, password)?);
        }

        Ok(Self {
            http,
            token_manager,
            base_url: config.base_url.clone(),
            default_headers,
        })
    }

    pub fn token_manager(&self) -> &Arc<TokenManager> {
        &self.token_manager
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get(&self, path: &str, cancel: &CancellationToken) -> Result<HttpResponse> {
        self.execute(Method::GET, path, None, cancel).await
    }

    pub async fn post<T>(
        &self,
        path: &str,
        payload: &T,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse>
    where
        T: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(payload)?;
        self.execute(Method::POST, path, Some(Bytes::from(body)), cancel)
            .await
    }

    pub async fn put<T>(
        &self,
        path: &str,
        payload: &T,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse>
    where
        T: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(payload)?;
        self.execute(Method::PUT, path, Some(Bytes::from(body)), cancel)
            .await
    }

    pub async fn delete(&self, path: &str, cancel: &CancellationToken) -> Result<HttpResponse> {
        self.execute(Method::DELETE, path, None, cancel).await
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut headers = self.default_headers.clone();
        if let Some(authorization) = self.token_manager.ensure_authorization(cancel).await? {
            headers.insert(AUTHORIZATION, authorization);
        }
        if body.is_some() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        let url = join_url(&self.base_url, path);
        let request_id = uuid::Uuid::new_v4().to_string()[..8].to_string();

        tracing::debug!(
            request_id = %request_id,
            method = %method,
            url = %url,
            "Sending HTTP request"
        );

        let request = HttpRequest {
            method,
            url,
            headers,
            body,
        };

        let response = with_cancellation(cancel, self.http.send(request))
            .await?
            .map_err(Error::Transport)?;

        tracing::debug!(
            request_id = %request_id,
            status = response.status,
            "Received HTTP response"
        );

        Ok(response)
    }
}

fn basic_auth(username: &str, password: &str) -> Result<HeaderValue> {
    let encoded = STANDARD.encode(format!("{}:{}", username, password));
    let mut value = HeaderValue::from_str(&format!("Basic {}", encoded))
        .map_err(|e| Error::Config(format!("Invalid Basic credentials: {}", e)))?;
    value.set_sensitive(true);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenState;
    use crate::testutil::MockSender;
    use chrono::{Duration, Utc};
    use serde_json::json;

    const BASE: &str = "https://example.test/";

    fn transport(config: ClientConfig, http: &Arc<MockSender>) -> AuthenticatedTransport {
        let manager = Arc::new(TokenManager::new(config.clone(), http.clone(), None));
        AuthenticatedTransport::new(&config, http.clone(), manager).unwrap()
    }

    #[tokio::test]
    async fn test_basic_header_attached() {
        let http = Arc::new(MockSender::new());
        let transport = transport(ClientConfig::basic(BASE, "admin", "pw"), &http);

        transport
            .get("/api/now/table/incident", &CancellationToken::new())
            .await
            .unwrap();

        let request = &http.requests()[0];
        assert_eq!(request.url, "https://example.test/api/now/table/incident");
        assert_eq!(request.method, Method::GET);
        // base64("admin:pw")
        assert_eq!(
            request.headers.get(AUTHORIZATION).unwrap(),
            "Basic YWRtaW46cHc="
        );
        assert_eq!(request.headers.get(ACCEPT).unwrap(), "application/json");
        assert!(request.body.is_none());
    }

    #[tokio::test]
    async fn test_bearer_header_after_acquisition() {
        let http = Arc::new(MockSender::new());
        http.push_json(200, json!({"access_token": "tok", "expires_in": 3600}));
        http.push_json(200, json!({"result": []}));
        let config = ClientConfig::oauth2(BASE).with_client_credentials("cid", "csecret");
        let transport = transport(config, &http);

        let cancel = CancellationToken::new();
        transport.get("/api/now/table/incident", &cancel).await.unwrap();
        transport.get("/api/now/table/problem", &cancel).await.unwrap();

        let requests = http.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].url.ends_with("/oauth_token.do"));
        assert_eq!(requests[1].headers.get(AUTHORIZATION).unwrap(), "Bearer tok");
        assert_eq!(requests[2].headers.get(AUTHORIZATION).unwrap(), "Bearer tok");
    }

    #[tokio::test]
    async fn test_post_serializes_json() {
        #[derive(Serialize)]
        struct NewIncident<'a> {
            short_description: &'a str,
            #[serde(rename = "u_priority")]
            priority: u8,
        }

        let http = Arc::new(MockSender::new());
        let transport = transport(ClientConfig::basic(BASE, "admin", "pw"), &http);

        transport
            .post(
                "/api/now/table/incident",
                &NewIncident {
                    short_description: "disk full",
                    priority: 2,
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let request = &http.requests()[0];
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.headers.get(CONTENT_TYPE).unwrap(), "application/json");
        let body: serde_json::Value =
            serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
        assert_eq!(body, json!({"short_description": "disk full", "u_priority": 2}));
    }

    #[tokio::test]
    async fn test_put_and_delete_methods() {
        let http = Arc::new(MockSender::new());
        let transport = transport(ClientConfig::basic(BASE, "admin", "pw"), &http);
        let cancel = CancellationToken::new();

        transport
            .put("/api/now/table/incident/1", &json!({"state": "2"}), &cancel)
            .await
            .unwrap();
        transport.delete("/api/now/table/incident/1", &cancel).await.unwrap();

        let requests = http.requests();
        assert_eq!(requests[0].method, Method::PUT);
        assert_eq!(requests[1].method, Method::DELETE);
        assert!(requests[1].body.is_none());
    }

    #[tokio::test]
    async fn test_non_success_returned_raw() {
        let http = Arc::new(MockSender::new());
        http.push_response(404, "not found");
        let transport = transport(ClientConfig::basic(BASE, "admin", "pw"), &http);

        let response = transport
            .get("/api/now/table/incident/missing", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.status, 404);
        assert_eq!(response.text(), "not found");
    }

    #[tokio::test]
    async fn test_already_cancelled_performs_no_io() {
        let http = Arc::new(MockSender::new());
        let transport = transport(ClientConfig::basic(BASE, "admin", "pw"), &http);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = transport.get("/api/now/table/incident", &cancel).await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(http.request_count(), 0);
    }

    #[tokio::test]
    async fn test_network_failure_is_transport_error() {
        let http = Arc::new(MockSender::new());
        http.push_failure("connection reset");
        let transport = transport(ClientConfig::basic(BASE, "admin", "pw"), &http);

        let result = transport
            .get("/api/now/table/incident", &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn test_token_failure_short_circuits_request() {
        let http = Arc::new(MockSender::new());
        http.push_response(400, r#"{"error":"invalid_client"}"#);
        let config = ClientConfig::oauth2(BASE).with_client_credentials("cid", "bad");
        let transport = transport(config, &http);

        let result = transport
            .get("/api/now/table/incident", &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(Error::Auth(_))));
        // Only the token call went out
        assert_eq!(http.request_count(), 1);
    }

    #[tokio::test]
    async fn test_valid_token_skips_token_endpoint() {
        let http = Arc::new(MockSender::new());
        let config = ClientConfig::oauth2(BASE).with_client_credentials("cid", "csecret");
        let manager = Arc::new(
            TokenManager::new(config.clone(), http.clone(), None).with_state(TokenState {
                access_token: Some("cached".to_string()),
                refresh_token: None,
                expires_at: Some(Utc::now() + Duration::minutes(10)),
            }),
        );
        let transport = AuthenticatedTransport::new(&config, http.clone(), manager).unwrap();

        transport
            .get("/api/now/table/incident", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(http.request_count(), 1);
        assert!(http.requests_to("/oauth_token.do").is_empty());
        assert_eq!(
            http.requests()[0].headers.get(AUTHORIZATION).unwrap(),
            "Bearer cached"
        );
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_request() {
        let http = Arc::new(MockSender::new().with_delay(std::time::Duration::from_millis(500)));
        http.push_json(200, json!({"result": []}));
        let transport = transport(ClientConfig::basic(BASE, "admin", "pw"), &http);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let result = transport.get("/api/now/table/incident", &cancel).await;

        assert!(matches!(result, Err(Error::Cancelled)));
        // The send had started before the token fired
        assert_eq!(http.request_count(), 1);
        assert!(started.elapsed() < std::time::Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_unsendable_token_never_goes_out_unauthenticated() {
        let http = Arc::new(MockSender::new());
        let transport = transport(
            ClientConfig::oauth2(BASE).with_access_token("bad\ntoken"),
            &http,
        );

        let result = transport
            .get("/api/now/table/incident", &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(http.request_count(), 0);
    }
}
