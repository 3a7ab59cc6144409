use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::types::PersistedToken;
use crate::error::StoreError;

/// Durable storage for the current token
///
/// Implementations surface I/O failures instead of swallowing them.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Loads the stored token, `None` when nothing was saved yet
    async fn load(&self) -> Result<Option<PersistedToken>, StoreError>;

    /// Replaces the stored token
    async fn save(&self, token: &PersistedToken) -> Result<(), StoreError>;
}

/// Token store kept in process memory
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<PersistedToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a token
    pub fn with_token(token: PersistedToken) -> Self {
        Self {
            token: Mutex::new(Some(token)),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<PersistedToken>, StoreError> {
        Ok(self.token.lock().await.clone())
    }

    async fn save(&self, token: &PersistedToken) -> Result<(), StoreError> {
        *self.token.lock().await = Some(token.clone());
        Ok(())
    }
}

/// Token store backed by a JSON file
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "token.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<PersistedToken>, StoreError> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No token file at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let token: PersistedToken = serde_json::from_slice(&data)?;
        tracing::debug!("Loaded token from {}", self.path.display());
        Ok(Some(token))
    }

    async fn save(&self, token: &PersistedToken) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let data = serde_json::to_vec_pretty(token)?;

        // Readers only ever see a complete file
        let temp_path = self.temp_path();
        tokio::fs::write(&temp_path, &data).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        tracing::debug!("Saved token to {}", self.path.display());
        Ok(())
    }
}
