use super::*;
use async_openai::{
    config::OpenAIConfig,
    types::{
        CreateImageRequestArgs, CreateModerationRequestArgs, Image, ImageModel,
        ImageResponseFormat, ImageSize,
    },
    Client,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::time::Instant;

/// OpenAI moderation + image generation
pub struct OpenAiImageProvider {
    client: Client<OpenAIConfig>,
    model: String,
    /// Upper bound for a single API call
    request_timeout: Duration,
}

impl OpenAiImageProvider {
    /// Create a new OpenAI provider with the given API key, image model and per-call timeout
    pub fn new(api_key: String, model: String, request_timeout: Duration) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        let client = Client::with_config(config);

        Self {
            client,
            model,
            request_timeout,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    fn image_model(&self) -> ImageModel {
        match self.model.as_str() {
            "dall-e-2" => ImageModel::DallE2,
            "dall-e-3" => ImageModel::DallE3,
            other => ImageModel::Other(other.to_string()),
        }
    }
}

fn image_size(size: &str) -> ImageResult<ImageSize> {
    match size {
        "256x256" => Ok(ImageSize::S256x256),
        "512x512" => Ok(ImageSize::S512x512),
        "1024x1024" => Ok(ImageSize::S1024x1024),
        "1792x1024" => Ok(ImageSize::S1792x1024),
        "1024x1792" => Ok(ImageSize::S1024x1792),
        other => Err(ImageError::ConfigError(format!(
            "Unsupported image size {}",
            other
        ))),
    }
}

/// Names of the categories set to `true` in a moderation result
fn flagged_categories(categories: &serde_json::Value) -> Vec<String> {
    categories
        .as_object()
        .map(|map| {
            map.iter()
                .filter(|(_, flagged)| flagged.as_bool().unwrap_or(false))
                .map(|(category, _)| category.clone())
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl ImageProvider for OpenAiImageProvider {
    async fn moderate(&self, text: &str) -> ImageResult<Moderation> {
        let request = CreateModerationRequestArgs::default()
            .input(text.to_string())
            .build()
            .map_err(|e| ImageError::ApiError(e.to_string()))?;

        let response =
            tokio::time::timeout(self.request_timeout, self.client.moderations().create(request))
                .await
                .map_err(|_| ImageError::Timeout(self.request_timeout))?
                .map_err(|e| ImageError::ApiError(e.to_string()))?;

        let result = response
            .results
            .first()
            .ok_or_else(|| ImageError::ApiError("Empty moderation response".to_string()))?;

        let categories = serde_json::to_value(&result.categories)
            .map(|value| flagged_categories(&value))
            .unwrap_or_default();

        Ok(Moderation {
            flagged: result.flagged,
            categories,
        })
    }

    async fn generate(&self, request: ImageRequest) -> ImageResult<GeneratedImage> {
        let start = Instant::now();

        let image_request = CreateImageRequestArgs::default()
            .prompt(request.prompt.clone())
            .model(self.image_model())
            .n(1)
            .size(image_size(&request.size)?)
            .response_format(ImageResponseFormat::Url)
            .build()
            .map_err(|e| ImageError::ApiError(e.to_string()))?;

        // The submission deadline caps the call when it is shorter than the provider's own
        let timeout = request.timeout.min(self.request_timeout);
        let response = tokio::time::timeout(timeout, self.client.images().create(image_request))
            .await
            .map_err(|_| ImageError::Timeout(timeout))?
        .map_err(|e| ImageError::ApiError(e.to_string()))?;

        let image = response.data.first().ok_or(ImageError::NoImage)?;
        let generated = match image.as_ref() {
            Image::Url { url, .. } => GeneratedImage::Url(url.clone()),
            Image::B64Json { b64_json, .. } => GeneratedImage::Bytes {
                data: STANDARD
                    .decode(b64_json.as_bytes())
                    .map_err(|e| ImageError::Decode(e.to_string()))?,
                content_type: "image/png".to_string(),
            },
        };

        tracing::info!(
            "OpenAI generated an image with {} in {}ms",
            self.model,
            start.elapsed().as_millis()
        );
        Ok(generated)
    }

    fn name(&self) -> &str {
        "openai"
    }
}
