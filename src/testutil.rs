//! Test doubles for the HTTP primitive
//!
//! Compiled for unit tests and behind the `test-utils` feature.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::http::{HttpRequest, HttpResponse, HttpSend};

/// Scripted response for [`MockSender`]
enum Scripted {
    Response(HttpResponse),
    Failure(String),
}

/// HTTP sender that records requests and replays scripted responses in order
///
/// When the script runs out it answers `200 {}`.
#[derive(Default)]
pub struct MockSender {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<HttpRequest>>,
    delay: Option<Duration>,
}

impl MockSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response, to widen race windows in concurrency tests
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a response with the given status and body
    pub fn push_response(&self, status: u16, body: impl Into<String>) -> &Self {
        let body: String = body.into();
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Response(HttpResponse {
                status,
                headers: HeaderMap::new(),
                body: Bytes::from(body),
            }));
        self
    }

    /// Queue a JSON response
    pub fn push_json(&self, status: u16, body: serde_json::Value) -> &Self {
        self.push_response(status, body.to_string())
    }

    /// Queue a network-level failure
    pub fn push_failure(&self, message: impl Into<String>) -> &Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Failure(message.into()));
        self
    }

    /// Every request sent so far
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Requests whose URL ends with `suffix`
    pub fn requests_to(&self, suffix: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.ends_with(suffix))
            .collect()
    }

    /// Decoded form fields of a request body
    pub fn form_fields(request: &HttpRequest) -> Vec<(String, String)> {
        let body = request.body.clone().unwrap_or_default();
        url::form_urlencoded::parse(&body).into_owned().collect()
    }

    /// Value of one form field in a request body
    pub fn form_field(request: &HttpRequest, name: &str) -> Option<String> {
        Self::form_fields(request)
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }
}

#[async_trait]
impl HttpSend for MockSender {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();

        match next {
            Some(Scripted::Response(response)) => Ok(response),
            Some(Scripted::Failure(message)) => Err(anyhow::anyhow!(message)),
            None => Ok(HttpResponse {
                status: 200,
                headers: HeaderMap::new(),
                body: Bytes::from_static(b"{}"),
            }),
        }
    }
}
