//! Token Store
//!
//! Durable storage for token bindings. The registry loads every record at
//! construction and writes the full set back after each mutation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// On-disk format version
pub const STORE_VERSION: u32 = 1;

/// One persisted token binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Opaque credential
    pub token: String,

    /// Owning account's email
    pub email: String,

    /// Requests left in the current window
    pub remaining: u32,

    /// Requests granted per window
    pub limit: u32,

    /// Registration timestamp
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    tokens: Vec<TokenRecord>,
}

/// Token store failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Token store I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Token store at {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Token store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence backend for the token registry
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Load every persisted record
    async fn load(&self) -> Result<Vec<TokenRecord>, StoreError>;

    /// Replace the persisted records with `records`
    async fn save(&self, records: &[TokenRecord]) -> Result<(), StoreError>;
}

/// JSON file store with atomic replace-on-write
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

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Vec<TokenRecord>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Token store not found at {:?}, starting empty", self.path);
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.io_error(e)),
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let file: StoreFile = serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;

        if file.version != STORE_VERSION {
            return Err(StoreError::Corrupt {
                path: self.path.display().to_string(),
                reason: format!("unsupported version {}", file.version),
            });
        }

        Ok(file.tokens)
    }

    async fn save(&self, records: &[TokenRecord]) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(&StoreFile {
            version: STORE_VERSION,
            tokens: records.to_vec(),
        })
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let path = self.path.clone();
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        // Sibling temp file, then rename over the target
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std::fs::create_dir_all(&dir)?;
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&body)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
        .map_err(|e| self.io_error(e))
    }
}

/// In-memory store, used for tests and ephemeral runs
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    records: Mutex<Vec<TokenRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the store
    pub fn with_records(records: Vec<TokenRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    /// Last saved records
    pub fn snapshot(&self) -> Vec<TokenRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Vec<TokenRecord>, StoreError> {
        Ok(self.snapshot())
    }

    async fn save(&self, records: &[TokenRecord]) -> Result<(), StoreError> {
        let mut stored = self
            .records
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("store lock poisoned: {}", e)))?;
        *stored = records.to_vec();
        Ok(())
    }
}
