use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Offline provider with canned behavior, for tests and local play without an API key
#[derive(Debug, Default)]
pub struct ScriptedImageProvider {
    /// Prompts containing any of these words are flagged as "harassment"
    flagged_words: Vec<String>,
    /// When set, generation fails with this message
    failure: Option<String>,
    generated: AtomicUsize,
}

impl ScriptedImageProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flagging(mut self, words: &[&str]) -> Self {
        self.flagged_words = words.iter().map(|w| w.to_lowercase()).collect();
        self
    }

    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// How many images were generated so far
    pub fn generated(&self) -> usize {
        self.generated.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageProvider for ScriptedImageProvider {
    async fn moderate(&self, text: &str) -> ImageResult<Moderation> {
        let lower = text.to_lowercase();
        let flagged = self.flagged_words.iter().any(|w| lower.contains(w));
        Ok(Moderation {
            flagged,
            categories: if flagged {
                vec!["harassment".to_string()]
            } else {
                vec![]
            },
        })
    }

    async fn generate(&self, request: ImageRequest) -> ImageResult<GeneratedImage> {
        if let Some(message) = &self.failure {
            return Err(ImageError::ApiError(message.clone()));
        }
        self.generated.fetch_add(1, Ordering::SeqCst);
        Ok(GeneratedImage::Bytes {
            data: request.prompt.into_bytes(),
            content_type: "image/png".to_string(),
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
