// Record API client - library root

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod resources;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod testutil;

pub use auth::{FileTokenStore, MemoryTokenStore, PersistedToken, TokenManager, TokenStore};
pub use client::RecordClient;
pub use config::{AuthMode, ClientConfig};
pub use error::{ensure_success, ApiError, AuthError, Error, Result, StoreError};
pub use http::{HttpRequest, HttpResponse, HttpSend, ReqwestSender};
pub use resources::{DisplayValue, TableClient, TableQuery};
pub use transport::AuthenticatedTransport;
pub use tokio_util::sync::CancellationToken;
