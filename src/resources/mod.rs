// Resource clients built on the authenticated transport

mod table;

pub use table::{DisplayValue, TableClient, TableQuery};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ensure_success, Error, Result};
use crate::http::HttpResponse;

/// `{"result": ...}` wrapper the API puts around every payload
#[derive(Debug, Deserialize)]
pub struct ResultEnvelope<T> {
    pub result: T,
}

/// Classify a response and decode its `result` member
pub fn decode_result<T: DeserializeOwned>(response: HttpResponse) -> Result<T> {
    let response = ensure_success(response)?;
    let envelope: ResultEnvelope<T> = response
        .json()
        .map_err(|e| Error::Protocol(format!("Failed to parse API response: {}", e)))?;
    Ok(envelope.result)
}
