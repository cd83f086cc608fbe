use super::{new_id, AppState};
use crate::clock::millis;
use crate::error::{GameError, GameResult};
use crate::images::{GeneratedImage, ImageRequest};
use crate::protocol::ServerMessage;
use crate::scheduler::ScheduledTask;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Submission status as its owner sees it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SubmissionView {
    Generating { details: String },
    Failed { reason: String, elapsed_ms: Millis },
    Saved { url: String, elapsed_ms: Millis },
}

/// Recent generation performance, shown before a player submits
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SubmissionHealth {
    pub avg_elapsed_ms: f64,
    pub success_ratio: f64,
}

impl Default for SubmissionHealth {
    fn default() -> Self {
        Self {
            avg_elapsed_ms: 5000.0,
            success_ratio: 1.0,
        }
    }
}

impl AppState {
    /// Record a prompt and kick off image generation for it
    pub async fn start_submission(&self, caller: &Caller, prompt: &str) -> GameResult<SubmissionId> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(GameError::PromptEmpty);
        }
        if prompt.chars().count() > self.config.max_prompt_length {
            return Err(GameError::PromptTooLong);
        }

        let submission = Submission {
            id: new_id(),
            prompt: prompt.to_string(),
            author_id: caller.user_id.clone(),
            result: SubmissionResult::Generating {
                details: "Starting...".to_string(),
            },
            last_used: None,
            created_at: self.now(),
            seq: self.next_seq(),
        };
        let submission_id = submission.id.clone();
        self.submissions
            .write()
            .await
            .insert(submission_id.clone(), submission);
        self.track_submission(&caller.session_id, &submission_id)
            .await;

        self.scheduler.run_after(
            Duration::ZERO,
            ScheduledTask::GenerateImage {
                submission_id: submission_id.clone(),
            },
        );
        self.scheduler.run_after(
            self.config.image_timeout,
            ScheduledTask::SubmissionTimeout {
                submission_id: submission_id.clone(),
            },
        );

        tracing::info!("Submission {} started by {}", submission_id, caller.user_id);
        Ok(submission_id)
    }

    /// Replace the result of a submission that is still generating.
    ///
    /// Returns false when the submission had already finished.
    pub async fn update_submission(
        &self,
        submission_id: &str,
        result: SubmissionResult,
    ) -> GameResult<bool> {
        let mut submissions = self.submissions.write().await;
        let submission = submissions
            .get_mut(submission_id)
            .ok_or_else(|| GameError::SubmissionNotFound(submission_id.to_string()))?;

        if submission.result.is_terminal() {
            tracing::debug!(
                "Ignoring update for finished submission {} ({})",
                submission_id,
                submission.result.status()
            );
            return Ok(false);
        }

        let status = result.status();
        submission.result = result;
        drop(submissions);

        self.broadcast_to_all(ServerMessage::SubmissionChanged {
            submission_id: submission_id.to_string(),
            status: status.to_string(),
        });
        Ok(true)
    }

    async fn set_details(&self, submission_id: &str, details: &str) -> GameResult<bool> {
        self.update_submission(
            submission_id,
            SubmissionResult::Generating {
                details: details.to_string(),
            },
        )
        .await
    }

    /// Moderate, generate and store the image for a submission.
    ///
    /// Every failure ends up persisted on the submission.
    pub async fn generate_image(&self, submission_id: &str) {
        let Some((prompt, created_at)) = self
            .submissions
            .read()
            .await
            .get(submission_id)
            .map(|s| (s.prompt.clone(), s.created_at))
        else {
            tracing::warn!("Generate requested for unknown submission {}", submission_id);
            return;
        };

        let outcome = self.image_pipeline(submission_id, &prompt).await;
        let elapsed_ms = self.now() - created_at;
        let result = match outcome {
            Ok(image_storage_id) => {
                tracing::info!("Submission {} saved after {}ms", submission_id, elapsed_ms);
                SubmissionResult::Saved {
                    image_storage_id,
                    elapsed_ms,
                }
            }
            Err(reason) => {
                tracing::warn!("Submission {} failed: {}", submission_id, reason);
                SubmissionResult::Failed { reason, elapsed_ms }
            }
        };

        if let Err(e) = self.update_submission(submission_id, result).await {
            tracing::error!("Failed to record result for {}: {}", submission_id, e);
        }
    }

    async fn image_pipeline(&self, submission_id: &str, prompt: &str) -> Result<StorageId, String> {
        let images = self
            .images
            .clone()
            .ok_or_else(|| "Image generation is not configured".to_string())?;

        self.progress_details(submission_id, "Moderating prompt...")
            .await?;
        let moderation = images.moderate(prompt).await.map_err(|e| e.to_string())?;
        if moderation.flagged {
            return Err(moderation.reason());
        }

        self.progress_details(submission_id, "Generating image...")
            .await?;
        let image = images
            .generate(ImageRequest {
                prompt: prompt.to_string(),
                size: self.config.image_size.clone(),
                timeout: self.config.image_timeout,
            })
            .await
            .map_err(|e| e.to_string())?;

        self.progress_details(submission_id, "Storing image...")
            .await?;
        let stored = match image {
            GeneratedImage::Url(url) => self.storage.fetch_and_store(&url).await,
            GeneratedImage::Bytes { data, content_type } => {
                self.storage.store(data, content_type).await
            }
        };
        stored.map_err(|e| e.to_string())
    }

    /// Publish a progress step, stopping the pipeline if the submission already finished
    async fn progress_details(&self, submission_id: &str, details: &str) -> Result<(), String> {
        match self.set_details(submission_id, details).await {
            Ok(true) => Ok(()),
            Ok(false) => Err("Submission already finished".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    /// Watchdog: fail a submission that is still generating
    pub async fn timeout_submission(&self, submission_id: &str) -> GameResult<()> {
        let updated = self
            .update_submission(
                submission_id,
                SubmissionResult::Failed {
                    reason: "Timed out".to_string(),
                    elapsed_ms: millis(self.config.image_timeout),
                },
            )
            .await?;
        if updated {
            tracing::warn!("Submission {} timed out", submission_id);
        }
        Ok(())
    }

    /// Owner-only view of a submission
    pub async fn get_submission(&self, user_id: &str, submission_id: &str) -> GameResult<SubmissionView> {
        let submission = self
            .submissions
            .read()
            .await
            .get(submission_id)
            .cloned()
            .ok_or_else(|| GameError::SubmissionNotFound(submission_id.to_string()))?;
        if submission.author_id != user_id {
            return Err(GameError::NotYourSubmission);
        }

        Ok(match submission.result {
            SubmissionResult::Generating { details } => SubmissionView::Generating { details },
            SubmissionResult::Failed { reason, elapsed_ms } => {
                SubmissionView::Failed { reason, elapsed_ms }
            }
            SubmissionResult::Saved {
                image_storage_id,
                elapsed_ms,
            } => {
                let url = self
                    .storage
                    .url(&image_storage_id)
                    .await
                    .ok_or_else(|| GameError::SubmissionNotFound(submission_id.to_string()))?;
                SubmissionView::Saved { url, elapsed_ms }
            }
        })
    }

    /// Average time and success ratio over the most recent finished submissions
    pub async fn submission_health(&self) -> SubmissionHealth {
        let submissions = self.submissions.read().await;
        let mut finished: Vec<&Submission> = submissions
            .values()
            .filter(|s| s.result.is_terminal())
            .collect();
        finished.sort_by(|a, b| b.seq.cmp(&a.seq));
        finished.truncate(self.config.health_sample);

        if finished.is_empty() {
            return SubmissionHealth::default();
        }

        let n = finished.len() as f64;
        let total_ms: Millis = finished.iter().filter_map(|s| s.result.elapsed_ms()).sum();
        let successes = finished
            .iter()
            .filter(|s| matches!(s.result, SubmissionResult::Saved { .. }))
            .count();

        SubmissionHealth {
            avg_elapsed_ms: total_ms as f64 / n,
            success_ratio: successes as f64 / n,
        }
    }
}
