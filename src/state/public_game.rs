//! The hostless public game.
//!
//! A single pointer to the round currently on show. The loop only moves
//! between guess and reveal; every reveal -> guess step creates a new round
//! from the least recently shown saved submission.

use super::{new_id, AppState};
use crate::clock::millis;
use crate::error::{GameError, GameResult};
use crate::protocol::ServerMessage;
use crate::scheduler::ScheduledTask;
use crate::types::*;
use rand::seq::SliceRandom;
use std::collections::HashMap;

/// Pick the saved submission the rotation used least recently.
///
/// Never-used submissions come first, ties go to the oldest.
fn least_recently_used(submissions: &HashMap<SubmissionId, Submission>) -> Option<&Submission> {
    submissions
        .values()
        .filter(|s| matches!(s.result, SubmissionResult::Saved { .. }))
        .min_by_key(|s| (s.last_used, s.seq))
}

impl AppState {
    /// Advance the public game if `from_stage` is still current and its window is over.
    ///
    /// Returns the id of a newly created round, if this call created one.
    pub async fn progress_public_game(&self, from_stage: RoundStage) -> GameResult<Option<RoundId>> {
        let mut public_game = self.public_game.write().await;
        let mut rounds = self.rounds.write().await;
        let now = self.now();

        let Some(current_round_id) = public_game.as_ref().map(|p| p.round_id.clone()) else {
            let round_id = self.rotate_public_round(&mut rounds).await?;
            *public_game = Some(PublicGame {
                id: new_id(),
                round_id: round_id.clone(),
            });
            tracing::info!("Public game started with round {}", round_id);
            drop(rounds);
            drop(public_game);
            self.broadcast_to_all(ServerMessage::PublicGameChanged {
                round_id: round_id.clone(),
            });
            return Ok(Some(round_id));
        };

        let round = rounds
            .get_mut(&current_round_id)
            .ok_or_else(|| GameError::RoundNotFound(current_round_id.clone()))?;

        let stage = round.stage;
        if stage != from_stage || round.stage_end > now {
            return Ok(None);
        }

        match stage {
            RoundStage::Label => Ok(None),
            RoundStage::Guess if !round.has_interaction() => {
                // Nobody engaged yet, keep the round up a while longer
                round.stage_end = now + millis(self.config.public_guess_duration);
                self.scheduler.run_after(
                    self.config.public_guess_duration,
                    ScheduledTask::PublicGameProgress {
                        from_stage: RoundStage::Guess,
                    },
                );
                Ok(None)
            }
            RoundStage::Guess => {
                self.begin_reveal(round, self.config.public_reveal_duration);
                self.scheduler.run_after(
                    self.config.public_reveal_duration,
                    ScheduledTask::PublicGameProgress {
                        from_stage: RoundStage::Reveal,
                    },
                );
                let round_id = round.id.clone();
                drop(rounds);
                drop(public_game);
                self.broadcast_to_all(ServerMessage::RoundChanged {
                    round_id,
                    stage: RoundStage::Reveal,
                });
                Ok(None)
            }
            RoundStage::Reveal => {
                let round_id = self.rotate_public_round(&mut rounds).await?;
                if let Some(public_game) = public_game.as_mut() {
                    public_game.round_id = round_id.clone();
                }
                drop(rounds);
                drop(public_game);
                self.broadcast_to_all(ServerMessage::PublicGameChanged {
                    round_id: round_id.clone(),
                });
                Ok(Some(round_id))
            }
        }
    }

    /// Create the next public round in guess stage and schedule its reveal.
    ///
    /// Decoys are carried over from the latest revealed round on the same image.
    async fn rotate_public_round(&self, rounds: &mut HashMap<RoundId, Round>) -> GameResult<RoundId> {
        let mut submissions = self.submissions.write().await;
        let submission = least_recently_used(&submissions)
            .cloned()
            .ok_or(GameError::NoPublicSubmission)?;
        let SubmissionResult::Saved {
            image_storage_id, ..
        } = &submission.result
        else {
            return Err(GameError::NoPublicSubmission);
        };

        let mut round = self.new_round(&submission.author_id, image_storage_id, &submission.prompt);
        let decoys: Vec<RoundOption> = rounds
            .values()
            .filter(|r| r.image_storage_id == *image_storage_id && r.stage == RoundStage::Reveal)
            .max_by(|a, b| (a.stage_start, &a.id).cmp(&(b.stage_start, &b.id)))
            .map(|previous| {
                previous
                    .options
                    .iter()
                    .filter(|o| o.author_id != submission.author_id)
                    .map(|o| RoundOption::new(o.author_id.clone(), o.prompt.clone()))
                    .collect()
            })
            .unwrap_or_default();
        round.options.extend(decoys);
        round.options.truncate(self.config.max_options);
        round.options.shuffle(&mut rand::rng());

        let now = self.now();
        round.stage = RoundStage::Guess;
        round.stage_start = now;
        round.stage_end = now + millis(self.config.public_guess_duration);
        round.is_public_rotation = true;

        if let Some(used) = submissions.get_mut(&submission.id) {
            used.last_used = Some(now);
        }
        self.scheduler.run_after(
            self.config.public_guess_duration,
            ScheduledTask::PublicGameProgress {
                from_stage: RoundStage::Guess,
            },
        );

        tracing::info!(
            "Public round {} shows submission {} with {} options",
            round.id,
            submission.id,
            round.options.len()
        );
        let round_id = round.id.clone();
        rounds.insert(round_id.clone(), round);
        Ok(round_id)
    }

    /// Poke the public game with whatever stage it is in now
    pub async fn tick_public_game(&self) -> GameResult<Option<RoundId>> {
        let stage = match self.public_game.read().await.as_ref() {
            Some(public_game) => self
                .rounds
                .read()
                .await
                .get(&public_game.round_id)
                .map(|round| round.stage)
                .unwrap_or(RoundStage::Reveal),
            None => RoundStage::Reveal,
        };
        self.progress_public_game(stage).await
    }

    pub async fn get_public_game(&self) -> GameResult<RoundId> {
        self.public_game
            .read()
            .await
            .as_ref()
            .map(|public_game| public_game.round_id.clone())
            .ok_or(GameError::NoPublicGame)
    }
}
