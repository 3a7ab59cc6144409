use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::decode_result;
use crate::error::{ensure_success, Result};
use crate::transport::AuthenticatedTransport;

const TABLE_API: &str = "/api/now/table";

/// How reference and choice fields are rendered
///
/// Serialized with its wire name, not its variant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayValue {
    /// Display values only
    #[serde(rename = "true")]
    Display,
    /// Stored values only
    #[serde(rename = "false")]
    Stored,
    /// Both, as `{value, display_value}` objects
    #[serde(rename = "all")]
    Both,
}

impl DisplayValue {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayValue::Display => "true",
            DisplayValue::Stored => "false",
            DisplayValue::Both => "all",
        }
    }
}

/// Query parameters for listing records
///
/// `query` is passed through verbatim as `sysparm_query`.
#[derive(Debug, Clone, Default)]
pub struct TableQuery {
    pub query: Option<String>,
    pub fields: Vec<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub display_value: Option<DisplayValue>,
}

impl TableQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn display_value(mut self, display_value: DisplayValue) -> Self {
        self.display_value = Some(display_value);
        self
    }

    /// Encoded query string, empty when nothing is set
    pub fn to_query_string(&self) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());

        if let Some(query) = &self.query {
            serializer.append_pair("sysparm_query", query);
        }
        if !self.fields.is_empty() {
            serializer.append_pair("sysparm_fields", &self.fields.join(","));
        }
        if let Some(limit) = self.limit {
            serializer.append_pair("sysparm_limit", &limit.to_string());
        }
        if let Some(offset) = self.offset {
            serializer.append_pair("sysparm_offset", &offset.to_string());
        }
        if let Some(display_value) = self.display_value {
            serializer.append_pair("sysparm_display_value", display_value.as_str());
        }

        serializer.finish()
    }
}

/// CRUD client for one table
#[derive(Clone)]
pub struct TableClient {
    transport: Arc<AuthenticatedTransport>,
    table: String,
}

impl TableClient {
    pub fn new(transport: Arc<AuthenticatedTransport>, table: impl Into<String>) -> Self {
        Self {
            transport,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn collection_path(&self) -> String {
        format!("{}/{}", TABLE_API, self.table)
    }

    fn record_path(&self, sys_id: &str) -> String {
        format!("{}/{}/{}", TABLE_API, self.table, sys_id)
    }

    /// Fetch one record by sys_id
    pub async fn get_record<T: DeserializeOwned>(
        &self,
        sys_id: &str,
        cancel: &CancellationToken,
    ) -> Result<T> {
        let response = self.transport.get(&self.record_path(sys_id), cancel).await?;
        decode_result(response)
    }

    /// List records matching the query
    pub async fn list_records<T: DeserializeOwned>(
        &self,
        query: &TableQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>> {
        let mut path = self.collection_path();
        let query_string = query.to_query_string();
        if !query_string.is_empty() {
            path.push('?');
            path.push_str(&query_string);
        }

        let response = self.transport.get(&path, cancel).await?;
        decode_result(response)
    }

    /// Insert a record and return it as stored
    pub async fn create_record<P, T>(&self, payload: &P, cancel: &CancellationToken) -> Result<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .transport
            .post(&self.collection_path(), payload, cancel)
            .await?;
        decode_result(response)
    }

    /// Update a record and return it as stored
    pub async fn update_record<P, T>(
        &self,
        sys_id: &str,
        payload: &P,
        cancel: &CancellationToken,
    ) -> Result<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .transport
            .put(&self.record_path(sys_id), payload, cancel)
            .await?;
        decode_result(response)
    }

    pub async fn delete_record(&self, sys_id: &str, cancel: &CancellationToken) -> Result<()> {
        let response = self
            .transport
            .delete(&self.record_path(sys_id), cancel)
            .await?;
        ensure_success(response)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenManager;
    use crate::config::ClientConfig;
    use crate::error::{ApiError, Error};
    use crate::testutil::MockSender;
    use serde_json::{json, Value};

    fn table(http: &Arc<MockSender>, name: &str) -> TableClient {
        let config = ClientConfig::basic("https://example.test", "admin", "pw");
        let manager = Arc::new(TokenManager::new(config.clone(), http.clone(), None));
        let transport =
            Arc::new(AuthenticatedTransport::new(&config, http.clone(), manager).unwrap());
        TableClient::new(transport, name)
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Incident {
        sys_id: String,
        number: String,
    }

    #[test]
    fn test_display_value_wire_names() {
        assert_eq!(serde_json::to_string(&DisplayValue::Both).unwrap(), r#""all""#);
        assert_eq!(serde_json::to_string(&DisplayValue::Display).unwrap(), r#""true""#);
        let parsed: DisplayValue = serde_json::from_str(r#""false""#).unwrap();
        assert_eq!(parsed, DisplayValue::Stored);
    }

    #[test]
    fn test_query_string() {
        assert_eq!(TableQuery::new().to_query_string(), "");

        let query = TableQuery::new()
            .query("active=true^priority=1")
            .fields(["number", "short_description"])
            .limit(10)
            .offset(20)
            .display_value(DisplayValue::Both);
        assert_eq!(
            query.to_query_string(),
            "sysparm_query=active%3Dtrue%5Epriority%3D1\
             &sysparm_fields=number%2Cshort_description\
             &sysparm_limit=10&sysparm_offset=20&sysparm_display_value=all"
        );
    }

    #[tokio::test]
    async fn test_get_record() {
        let http = Arc::new(MockSender::new());
        http.push_json(200, json!({"result": {"sys_id": "abc", "number": "INC0001"}}));

        let record: Incident = table(&http, "incident")
            .get_record("abc", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            record,
            Incident {
                sys_id: "abc".to_string(),
                number: "INC0001".to_string()
            }
        );
        assert_eq!(
            http.requests()[0].url,
            "https://example.test/api/now/table/incident/abc"
        );
    }

    #[tokio::test]
    async fn test_list_records_with_query() {
        let http = Arc::new(MockSender::new());
        http.push_json(200, json!({"result": [{"number": "INC1"}, {"number": "INC2"}]}));

        let records: Vec<Value> = table(&http, "incident")
            .list_records(&TableQuery::new().limit(2), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(
            http.requests()[0].url,
            "https://example.test/api/now/table/incident?sysparm_limit=2"
        );
    }

    #[tokio::test]
    async fn test_missing_record_is_not_found() {
        let http = Arc::new(MockSender::new());
        http.push_response(404, "not found");

        let err = table(&http, "incident")
            .get_record::<Value>("nope", &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            Error::Api(ApiError::NotFound { status, body }) => {
                assert_eq!(status, 404);
                assert_eq!(body, "not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_update_delete() {
        let http = Arc::new(MockSender::new());
        http.push_json(201, json!({"result": {"sys_id": "new1", "number": "INC9"}}));
        http.push_json(200, json!({"result": {"sys_id": "new1", "number": "INC9"}}));
        http.push_response(204, "");
        let client = table(&http, "incident");
        let cancel = CancellationToken::new();

        let created: Incident = client
            .create_record(&json!({"short_description": "printer on fire"}), &cancel)
            .await
            .unwrap();
        assert_eq!(created.sys_id, "new1");

        let updated: Incident = client
            .update_record("new1", &json!({"state": "6"}), &cancel)
            .await
            .unwrap();
        assert_eq!(updated.number, "INC9");

        client.delete_record("new1", &cancel).await.unwrap();

        let requests = http.requests();
        assert_eq!(requests[0].method, reqwest::Method::POST);
        assert!(requests[0].url.ends_with("/api/now/table/incident"));
        assert_eq!(requests[1].method, reqwest::Method::PUT);
        assert!(requests[1].url.ends_with("/api/now/table/incident/new1"));
        assert_eq!(requests[2].method, reqwest::Method::DELETE);
    }

    #[tokio::test]
    async fn test_delete_rate_limited() {
        let http = Arc::new(MockSender::new());
        http.push_response(429, "slow down");

        let err = table(&http, "incident")
            .delete_record("x", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Api(ApiError::RateLimit { status: 429, .. })));
        // No automatic retry
        assert_eq!(http.request_count(), 1);
    }
}
