//! Client facade
//!
//! Wires configuration, the pooled HTTP sender, the token store, the token
//! manager and the transport together. Every resource client handed out by
//! one [`RecordClient`] shares the same connection pool and token state.

use std::sync::Arc;

use crate::auth::{FileTokenStore, TokenManager, TokenStore};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::http::{HttpSend, ReqwestSender};
use crate::resources::TableClient;
use crate::transport::AuthenticatedTransport;

/// Entry point for talking to one API instance
#[derive(Clone)]
pub struct RecordClient {
    transport: Arc<AuthenticatedTransport>,
}

impl RecordClient {
    /// Build a client with a reqwest sender and, when configured, a file token store
    pub fn new(config: ClientConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::Config(format!("{:#}", e)))?;

        let http: Arc<dyn HttpSend> = Arc::new(
            ReqwestSender::new(
                config.http_max_connections,
                config.http_connect_timeout,
                config.http_request_timeout,
            )
            .map_err(|e| Error::Config(format!("{:#}", e)))?,
        );

        let store = config
            .token_file
            .as_ref()
            .map(|path| Arc::new(FileTokenStore::new(path)) as Arc<dyn TokenStore>);

        Self::with_parts(config, http, store)
    }

    /// Build a client from configuration in the environment
    pub fn from_env() -> Result<Self> {
        let config = ClientConfig::from_env().map_err(|e| Error::Config(format!("{:#}", e)))?;
        Self::new(config)
    }

    /// Build a client over a caller-supplied HTTP primitive and token store
    pub fn with_parts(
        config: ClientConfig,
        http: Arc<dyn HttpSend>,
        store: Option<Arc<dyn TokenStore>>,
    ) -> Result<Self> {
        tracing::debug!(
            base_url = %config.base_url,
            auth_mode = ?config.auth_mode,
            persisted = store.is_some(),
            "Creating API client"
        );

        let token_manager = Arc::new(TokenManager::new(config.clone(), http.clone(), store));
        let transport = Arc::new(AuthenticatedTransport::new(&config, http, token_manager)?);

        Ok(Self { transport })
    }

    /// Client for one table
    pub fn table(&self, name: impl Into<String>) -> TableClient {
        TableClient::new(self.transport.clone(), name)
    }

    /// Shared transport, for resource clients outside this crate
    pub fn transport(&self) -> &Arc<AuthenticatedTransport> {
        &self.transport
    }

    pub fn token_manager(&self) -> &Arc<TokenManager> {
        self.transport.token_manager()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryTokenStore;
    use crate::testutil::MockSender;
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_new_rejects_invalid_config() {
        let result = RecordClient::new(ClientConfig::oauth2("https://example.test"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_new_builds_with_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::oauth2("https://example.test")
            .with_client_credentials("cid", "csecret")
            .with_token_file(dir.path().join("token.json"));
        assert!(RecordClient::new(config).is_ok());
    }

    #[tokio::test]
    async fn test_tables_share_token_state() {
        let http = Arc::new(MockSender::new());
        http.push_json(200, json!({"access_token": "shared"}));
        http.push_json(200, json!({"result": []}));
        http.push_json(200, json!({"result": []}));
        let store = Arc::new(MemoryTokenStore::new());
        let config =
            ClientConfig::oauth2("https://example.test").with_client_credentials("cid", "csecret");
        let client = RecordClient::with_parts(config, http.clone(), Some(store.clone())).unwrap();
        let cancel = CancellationToken::new();

        let _: Vec<Value> = client
            .table("incident")
            .list_records(&Default::default(), &cancel)
            .await
            .unwrap();
        let _: Vec<Value> = client
            .table("problem")
            .list_records(&Default::default(), &cancel)
            .await
            .unwrap();

        assert_eq!(http.requests_to("/oauth_token.do").len(), 1);
        assert_eq!(
            store.load().await.unwrap().map(|t| t.access_token).as_deref(),
            Some("shared")
        );
    }
}
