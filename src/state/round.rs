use super::score::score_deltas;
use super::similarity::is_near_duplicate;
use super::{new_id, AppState};
use crate::clock::millis;
use crate::error::{GameError, GameResult};
use crate::protocol::ServerMessage;
use crate::scheduler::ScheduledTask;
use crate::types::*;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Someone shown in a progress list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerBadge {
    pub me: bool,
    pub name: String,
    pub picture_url: String,
}

/// Identity lookup entry for the reveal screen
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserInfo {
    pub user_id: UserId,
    pub me: bool,
    pub name: String,
    pub picture_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabelView {
    /// Whether the caller authored the image
    pub mine: bool,
    pub image_url: String,
    pub stage_start: Millis,
    pub stage_end: Millis,
    /// Players who have submitted an option so far
    pub submitted: Vec<PlayerBadge>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuessView {
    pub mine: bool,
    pub image_url: String,
    pub stage_start: Millis,
    pub stage_end: Millis,
    /// The caller's own option, if any
    pub my_prompt: Option<String>,
    /// The option the caller currently votes for
    pub my_guess: Option<String>,
    /// Players who have voted so far
    pub submitted: Vec<PlayerBadge>,
    /// Prompt texts in their shuffled order, authors hidden
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreDelta {
    pub user_id: UserId,
    pub score: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptionResult {
    pub author_id: UserId,
    pub prompt: String,
    pub votes: Vec<UserId>,
    pub likes: Vec<UserId>,
    pub score_deltas: Vec<ScoreDelta>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevealView {
    pub me: UserId,
    pub author_id: UserId,
    pub image_url: String,
    pub stage_start: Millis,
    pub stage_end: Millis,
    /// Every user referenced by the results
    pub users: Vec<UserInfo>,
    pub results: Vec<OptionResult>,
}

/// Stage-shaped projection of a round for one caller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "stage", rename_all = "lowercase")]
pub enum RoundView {
    Label(LabelView),
    Guess(GuessView),
    Reveal(RevealView),
}

impl AppState {
    /// Build a fresh label-stage round whose first option is the author's real prompt
    pub fn new_round(&self, author_id: &str, image_storage_id: &str, prompt: &str) -> Round {
        let now = self.now();
        Round {
            id: new_id(),
            author_id: author_id.to_string(),
            image_storage_id: image_storage_id.to_string(),
            stage: RoundStage::Label,
            stage_start: now,
            stage_end: now + millis(self.config.label_duration),
            options: vec![RoundOption::new(author_id.to_string(), prompt.to_string())],
            is_public_rotation: false,
        }
    }

    /// Number of players in a game, if the round is played inside one
    async fn game_player_count(&self, game_id: Option<&str>) -> GameResult<Option<usize>> {
        match game_id {
            Some(game_id) => {
                let games = self.games.read().await;
                let game = games
                    .get(game_id)
                    .ok_or_else(|| GameError::GameNotFound(game_id.to_string()))?;
                Ok(Some(game.player_ids.len()))
            }
            None => Ok(None),
        }
    }

    /// Restart the label window, with a fallback in case not everybody submits
    pub(crate) fn restart_label(&self, round: &mut Round) {
        let now = self.now();
        round.stage = RoundStage::Label;
        round.stage_start = now;
        round.stage_end = now + millis(self.config.label_duration);
        self.scheduler.run_after(
            self.config.label_duration,
            ScheduledTask::RoundProgress {
                round_id: round.id.clone(),
                from_stage: RoundStage::Label,
            },
        );
    }

    /// label -> guess. The only place options are shuffled.
    fn begin_guess(&self, round: &mut Round) {
        let now = self.now();
        round.options.shuffle(&mut rand::rng());
        round.stage = RoundStage::Guess;
        round.stage_start = now;
        round.stage_end = now + millis(self.config.guess_duration);
        self.scheduler.run_after(
            self.config.guess_duration,
            ScheduledTask::RoundProgress {
                round_id: round.id.clone(),
                from_stage: RoundStage::Guess,
            },
        );
        tracing::info!(
            "Round {} moved to guessing with {} options",
            round.id,
            round.options.len()
        );
    }

    pub(crate) fn begin_reveal(&self, round: &mut Round, duration: Duration) {
        let now = self.now();
        round.stage = RoundStage::Reveal;
        round.stage_start = now;
        round.stage_end = now + millis(duration);
        tracing::info!(
            "Round {} revealed after {} votes",
            round.id,
            round.voter_count()
        );
    }

    fn notify_round(&self, round: &Round) {
        self.broadcast_to_all(ServerMessage::RoundChanged {
            round_id: round.id.clone(),
            stage: round.stage,
        });
    }

    /// Submit a decoy prompt for someone else's image
    pub async fn add_option(
        &self,
        user_id: &str,
        round_id: &str,
        prompt: String,
        game_id: Option<&str>,
    ) -> GameResult<ActionResult> {
        let prompt = prompt.trim().to_string();
        if prompt.is_empty() {
            return Ok(ActionResult::rejected("Your prompt is empty.", true));
        }
        if prompt.chars().count() > self.config.max_prompt_length {
            return Ok(ActionResult::rejected("Your prompt is too long.", true));
        }

        // Moderation is an external call and runs before any lock is taken
        if let Some(images) = &self.images {
            match images.moderate(&prompt).await {
                Ok(moderation) if moderation.flagged => {
                    tracing::info!("Decoy prompt flagged for round {}", round_id);
                    return Ok(ActionResult::rejected(moderation.reason(), false));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Moderation failed for round {}: {}", round_id, e);
                    return Ok(ActionResult::rejected(
                        "Couldn't check your prompt, try again.",
                        true,
                    ));
                }
            }
        }

        let target = self
            .game_player_count(game_id)
            .await?
            .unwrap_or(self.config.max_options);

        let mut rounds = self.rounds.write().await;
        let round = rounds
            .get_mut(round_id)
            .ok_or_else(|| GameError::RoundNotFound(round_id.to_string()))?;

        if round.stage != RoundStage::Label {
            return Ok(ActionResult::too_late("Too late to add a prompt."));
        }
        if round.author_id == user_id {
            return Err(GameError::OwnImage);
        }
        if round.option_by_author(user_id).is_some() {
            return Ok(ActionResult::rejected("You already added a prompt.", false));
        }
        if round.options.len() >= target {
            return Ok(ActionResult::rejected("This round is full.", false));
        }
        if round
            .options
            .iter()
            .any(|option| is_near_duplicate(&option.prompt, &prompt))
        {
            return Ok(ActionResult::rejected(
                "This prompt is too similar to existing prompt(s).",
                true,
            ));
        }

        round
            .options
            .push(RoundOption::new(user_id.to_string(), prompt));
        tracing::debug!(
            "Round {} has {}/{} options",
            round.id,
            round.options.len(),
            target
        );

        if round.options.len() >= target {
            self.begin_guess(round);
        }

        self.notify_round(round);
        Ok(ActionResult::ok())
    }

    /// Vote for the option believed to be the real prompt
    pub async fn guess(
        &self,
        user_id: &str,
        round_id: &str,
        prompt: &str,
        game_id: Option<&str>,
    ) -> GameResult<ActionResult> {
        let players = self.game_player_count(game_id).await?;

        let mut rounds = self.rounds.write().await;
        let round = rounds
            .get_mut(round_id)
            .ok_or_else(|| GameError::RoundNotFound(round_id.to_string()))?;

        if round.stage != RoundStage::Guess {
            return Ok(ActionResult::too_late("Too late to vote."));
        }
        if round.author_id == user_id {
            return Ok(ActionResult::rejected(
                "You can't vote on your own image.",
                false,
            ));
        }
        let Some(index) = round.options.iter().position(|o| o.prompt == prompt) else {
            return Ok(ActionResult::rejected("This prompt does not exist.", true));
        };
        let chosen = &round.options[index];
        if chosen.author_id == user_id {
            return Ok(ActionResult::rejected(
                "You can't vote for your own prompt.",
                true,
            ));
        }
        if chosen.votes.contains(user_id) {
            return Ok(ActionResult::rejected(
                "You already voted for this option.",
                true,
            ));
        }

        // One active vote per user: retract any earlier vote in this round
        for option in round.options.iter_mut() {
            option.votes.remove(user_id);
        }
        round.options[index].votes.insert(user_id.to_string());

        // Everybody except the image author votes
        let expected_votes = players
            .unwrap_or(round.options.len())
            .saturating_sub(1);
        if !round.is_public_rotation && round.voter_count() >= expected_votes {
            self.begin_reveal(round, self.config.reveal_duration);
        }

        self.notify_round(round);
        Ok(ActionResult::ok())
    }

    /// Like another player's option. Has no effect on scores or stages.
    pub async fn like(&self, user_id: &str, round_id: &str, prompt: &str) -> GameResult<ActionResult> {
        let mut rounds = self.rounds.write().await;
        let round = rounds
            .get_mut(round_id)
            .ok_or_else(|| GameError::RoundNotFound(round_id.to_string()))?;

        if round.stage != RoundStage::Guess {
            return Ok(ActionResult::too_late("Too late to like."));
        }
        let Some(option) = round.options.iter_mut().find(|o| o.prompt == prompt) else {
            return Ok(ActionResult::rejected("This prompt does not exist.", true));
        };
        if option.author_id == user_id {
            return Ok(ActionResult::rejected(
                "You can't like your own prompt.",
                true,
            ));
        }
        if !option.likes.insert(user_id.to_string()) {
            return Ok(ActionResult::rejected("You already liked this prompt.", true));
        }

        self.notify_round(round);
        Ok(ActionResult::ok())
    }

    /// Force the next stage unless the round already left `from_stage`.
    ///
    /// Also the target of the scheduled fallbacks, so a stale call is a no-op.
    pub async fn progress_round(&self, round_id: &str, from_stage: RoundStage) -> GameResult<()> {
        let mut rounds = self.rounds.write().await;
        let round = rounds
            .get_mut(round_id)
            .ok_or_else(|| GameError::RoundNotFound(round_id.to_string()))?;

        if round.stage != from_stage {
            tracing::debug!(
                "Round {} already left {:?}, now {:?}",
                round_id,
                from_stage,
                round.stage
            );
            return Ok(());
        }

        match round.stage {
            RoundStage::Label => self.begin_guess(round),
            RoundStage::Guess => self.begin_reveal(round, self.config.reveal_duration),
            RoundStage::Reveal => return Ok(()),
        }

        self.notify_round(round);
        Ok(())
    }

    /// Stage-dependent read model of a round
    pub async fn get_round(&self, user_id: &str, round_id: &str) -> GameResult<RoundView> {
        let round = self
            .rounds
            .read()
            .await
            .get(round_id)
            .cloned()
            .ok_or_else(|| GameError::RoundNotFound(round_id.to_string()))?;

        let image_url = self
            .storage
            .url(&round.image_storage_id)
            .await
            .ok_or_else(|| GameError::ImageNotFound(round.id.clone()))?;

        let mut referenced: BTreeSet<UserId> = BTreeSet::new();
        for option in &round.options {
            referenced.insert(option.author_id.clone());
            referenced.extend(option.votes.iter().cloned());
            referenced.extend(option.likes.iter().cloned());
        }
        let users = self.profiles(referenced.iter()).await?;
        let badge = |id: &UserId| -> PlayerBadge {
            let user = &users[id];
            PlayerBadge {
                me: user.id == user_id,
                name: user.name.clone(),
                picture_url: user.picture_url.clone(),
            }
        };

        let mine = round.author_id == user_id;
        let view = match round.stage {
            RoundStage::Label => RoundView::Label(LabelView {
                mine,
                image_url,
                stage_start: round.stage_start,
                stage_end: round.stage_end,
                submitted: round.options.iter().map(|o| badge(&o.author_id)).collect(),
            }),
            RoundStage::Guess => RoundView::Guess(GuessView {
                mine,
                image_url,
                stage_start: round.stage_start,
                stage_end: round.stage_end,
                my_prompt: round.option_by_author(user_id).map(|o| o.prompt.clone()),
                my_guess: round
                    .options
                    .iter()
                    .find(|o| o.votes.contains(user_id))
                    .map(|o| o.prompt.clone()),
                submitted: round
                    .options
                    .iter()
                    .flat_map(|o| o.votes.iter())
                    .map(&badge)
                    .collect(),
                options: round.options.iter().map(|o| o.prompt.clone()).collect(),
            }),
            RoundStage::Reveal => RoundView::Reveal(RevealView {
                me: user_id.to_string(),
                author_id: round.author_id.clone(),
                image_url,
                stage_start: round.stage_start,
                stage_end: round.stage_end,
                users: referenced
                    .iter()
                    .map(|id| {
                        let user = &users[id];
                        UserInfo {
                            user_id: id.clone(),
                            me: user.id == user_id,
                            name: user.name.clone(),
                            picture_url: user.picture_url.clone(),
                        }
                    })
                    .collect(),
                results: round
                    .options
                    .iter()
                    .map(|option| OptionResult {
                        author_id: option.author_id.clone(),
                        prompt: option.prompt.clone(),
                        votes: option.votes.iter().cloned().collect(),
                        likes: option.likes.iter().cloned().collect(),
                        score_deltas: score_deltas(option.author_id == round.author_id, option)
                            .into_iter()
                            .map(|(user_id, score)| ScoreDelta { user_id, score })
                            .collect(),
                    })
                    .collect(),
            }),
        };

        Ok(view)
    }
}
