//! File storage interface for original invoice documents.
//!
//! The pipeline never reads files directly: it asks the store for a
//! time-bounded download reference first, then fetches through it. The
//! local implementation mirrors what a bucket with signed URLs provides.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors from the file store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("download reference expired at {0}")]
    Expired(DateTime<Utc>),

    #[error("malformed download reference: {0}")]
    InvalidUrl(String),

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A short-lived, authenticated download reference.
#[derive(Debug, Clone)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Opaque file storage capability.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Store content, returning the storage key.
    async fn put(&self, content: &[u8], extension: &str) -> Result<String, StorageError>;

    /// Mint a time-bounded download reference for a stored file.
    async fn download_url(&self, file_ref: &str) -> Result<SignedUrl, StorageError>;

    /// Fetch content through a previously minted reference.
    async fn fetch(&self, url: &SignedUrl) -> Result<Vec<u8>, StorageError>;
}

/// Filesystem-backed store with signed pseudo-URLs.
///
/// Content lives under a two-level directory keyed by hash prefix:
/// `{data_dir}/{hash[0..2]}/{hash[0..16]}.{extension}`.
pub struct LocalFileStore {
    data_dir: PathBuf,
    url_ttl: Duration,
    /// Per-process signing secret; references do not survive restarts.
    secret: String,
}

impl LocalFileStore {
    pub fn new(data_dir: &Path, url_ttl_secs: i64) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            url_ttl: Duration::seconds(url_ttl_secs),
            secret: uuid::Uuid::new_v4().to_string(),
        }
    }

    fn sign(&self, file_ref: &str, expires_at: DateTime<Utc>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(file_ref.as_bytes());
        hasher.update(expires_at.timestamp().to_be_bytes());
        hasher.update(self.secret.as_bytes());
        hex::encode(&hasher.finalize()[..16])
    }

    fn path_for(&self, file_ref: &str) -> PathBuf {
        self.data_dir.join(file_ref)
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn put(&self, content: &[u8], extension: &str) -> Result<String, StorageError> {
        let mut hasher = Sha256::new();
        hasher.update(content);
        let hash = hex::encode(hasher.finalize());

        let file_ref = format!("{}/{}.{}", &hash[..2], &hash[..16], extension);
        let path = self.path_for(&file_ref);
        tokio::fs::create_dir_all(path.parent().expect("hash prefix parent")).await?;
        tokio::fs::write(&path, content).await?;
        Ok(file_ref)
    }

    async fn download_url(&self, file_ref: &str) -> Result<SignedUrl, StorageError> {
        if !self.path_for(file_ref).exists() {
            return Err(StorageError::NotFound(file_ref.to_string()));
        }
        let expires_at = Utc::now() + self.url_ttl;
        let token = self.sign(file_ref, expires_at);
        Ok(SignedUrl {
            url: format!(
                "local://{}?expires={}&token={}",
                file_ref,
                expires_at.timestamp(),
                token
            ),
            expires_at,
        })
    }

    async fn fetch(&self, url: &SignedUrl) -> Result<Vec<u8>, StorageError> {
        let rest = url
            .url
            .strip_prefix("local://")
            .ok_or_else(|| StorageError::InvalidUrl(url.url.clone()))?;
        let (file_ref, query) = rest
            .split_once('?')
            .ok_or_else(|| StorageError::InvalidUrl(url.url.clone()))?;

        let mut expires = None;
        let mut token = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("expires", v)) => expires = v.parse::<i64>().ok(),
                Some(("token", v)) => token = Some(v.to_string()),
                _ => {}
            }
        }
        let expires = expires.ok_or_else(|| StorageError::InvalidUrl(url.url.clone()))?;
        let expires_at = DateTime::from_timestamp(expires, 0)
            .ok_or_else(|| StorageError::InvalidUrl(url.url.clone()))?;

        if Utc::now() > expires_at {
            return Err(StorageError::Expired(expires_at));
        }
        if token.as_deref() != Some(self.sign(file_ref, expires_at).as_str()) {
            return Err(StorageError::InvalidUrl(url.url.clone()));
        }

        match tokio::fs::read(self.path_for(file_ref)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(file_ref.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
