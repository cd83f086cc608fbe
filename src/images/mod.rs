mod openai;
mod scripted;
mod storage;

use async_trait::async_trait;
use std::time::Duration;

pub use openai::OpenAiImageProvider;
pub use scripted::ScriptedImageProvider;
pub use storage::{BlobStorage, MemoryBlobStorage, StoredBlob};

/// Result type for image provider and storage operations
pub type ImageResult<T> = Result<T, ImageError>;

/// Errors from the external image collaborators
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("No image returned from provider")]
    NoImage,

    #[error("failed to download: {0}")]
    Download(String),

    #[error("failed to store image: {0}")]
    Storage(String),

    #[error("invalid image data: {0}")]
    Decode(String),
}

/// Outcome of a content moderation check
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Moderation {
    pub flagged: bool,
    /// Names of the categories that were flagged
    pub categories: Vec<String>,
}

impl Moderation {
    /// Player-facing rejection text
    pub fn reason(&self) -> String {
        format!("Your prompt was flagged: {}", self.categories.join(", "))
    }
}

/// Request to generate an image
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub prompt: String,
    /// Provider size string, e.g. "512x512"
    pub size: String,
    pub timeout: Duration,
}

/// What a provider hands back: a link to fetch, or the bytes themselves
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedImage {
    Url(String),
    Bytes { data: Vec<u8>, content_type: String },
}

/// Text-to-image provider with a moderation check
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Check whether a prompt is acceptable
    async fn moderate(&self, text: &str) -> ImageResult<Moderation>;

    /// Generate one image for the prompt
    async fn generate(&self, request: ImageRequest) -> ImageResult<GeneratedImage>;

    /// Get the name of this provider
    fn name(&self) -> &str;
}

/// Configuration for the OpenAI image provider
#[derive(Debug, Clone)]
pub struct ImageConfig {
    /// OpenAI API key (None = image generation unavailable)
    pub openai_api_key: Option<String>,
    pub openai_image_model: String,
    pub request_timeout: Duration,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_image_model: "dall-e-2".to_string(),
            request_timeout: Duration::from_secs(25),
        }
    }
}

impl ImageConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok().and_then(|key| {
            let trimmed = key.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        });

        let openai_image_model = std::env::var("OPENAI_IMAGE_MODEL")
            .ok()
            .and_then(|model| {
                let trimmed = model.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .unwrap_or_else(|| "dall-e-2".to_string());

        Self {
            openai_api_key,
            openai_image_model,
            request_timeout: std::env::var("IMAGE_REQUEST_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(25)),
        }
    }

    pub fn build_provider(&self) -> ImageResult<OpenAiImageProvider> {
        let api_key = self.openai_api_key.clone().ok_or_else(|| {
            ImageError::ConfigError(
                "No image provider configured. Set OPENAI_API_KEY".to_string(),
            )
        })?;
        Ok(OpenAiImageProvider::new(
            api_key,
            self.openai_image_model.clone(),
            self.request_timeout,
        ))
    }
}
