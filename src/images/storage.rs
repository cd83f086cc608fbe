use super::*;
use crate::types::StorageId;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Stored image bytes
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBlob {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// Durable storage for generated images
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Persist bytes and return their storage id
    async fn store(&self, data: Vec<u8>, content_type: String) -> ImageResult<StorageId>;

    /// Download an image and persist it
    async fn fetch_and_store(&self, url: &str) -> ImageResult<StorageId>;

    /// Retrievable URL for a stored image, None when it doesn't exist
    async fn url(&self, id: &str) -> Option<String>;

    /// The stored bytes, for serving them back
    async fn load(&self, id: &str) -> Option<StoredBlob>;
}

/// Keeps images in process memory and serves them under `base_url`
pub struct MemoryBlobStorage {
    blobs: RwLock<HashMap<StorageId, StoredBlob>>,
    base_url: String,
    client: reqwest::Client,
}

impl MemoryBlobStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

impl Default for MemoryBlobStorage {
    fn default() -> Self {
        Self::new("/images")
    }
}

#[async_trait]
impl BlobStorage for MemoryBlobStorage {
    async fn store(&self, data: Vec<u8>, content_type: String) -> ImageResult<StorageId> {
        if data.is_empty() {
            return Err(ImageError::Storage("empty image".to_string()));
        }
        let id = ulid::Ulid::new().to_string();
        tracing::debug!("Storing {} bytes of {} as {}", data.len(), content_type, id);
        self.blobs
            .write()
            .await
            .insert(id.clone(), StoredBlob { data, content_type });
        Ok(id)
    }

    async fn fetch_and_store(&self, url: &str) -> ImageResult<StorageId> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ImageError::Download(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ImageError::Download(response.status().to_string()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("image/png")
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ImageError::Download(e.to_string()))?;

        self.store(bytes.to_vec(), content_type).await
    }

    async fn url(&self, id: &str) -> Option<String> {
        self.blobs
            .read()
            .await
            .contains_key(id)
            .then(|| format!("{}/{}", self.base_url, id))
    }

    async fn load(&self, id: &str) -> Option<StoredBlob> {
        self.blobs.read().await.get(id).cloned()
    }
}
