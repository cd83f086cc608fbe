use super::score::{accumulate, score_deltas};
use super::{new_id, AppState};
use crate::error::{GameError, GameResult};
use crate::protocol::ServerMessage;
use crate::scheduler::ScheduledTask;
use crate::types::*;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Join code alphabet without look-alike characters (no 0/O, 1/I, vowels)
const SLUG_CHARS: &[u8] = b"BCDFGHJKLMNPQRSTVWXZ2569";
const SLUG_LENGTH: usize = 4;

pub fn generate_slug() -> String {
    let mut rng = rand::rng();
    (0..SLUG_LENGTH)
        .map(|_| SLUG_CHARS[rng.random_range(0..SLUG_CHARS.len())] as char)
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerSummary {
    pub user_id: UserId,
    pub me: bool,
    pub name: String,
    pub picture_url: String,
    /// Whether the player already has a round in this game
    pub submitted: bool,
    pub score: i64,
    /// Likes received across revealed rounds
    pub likes: usize,
}

/// Game as shown to one caller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameView {
    pub game_code: String,
    pub hosting: bool,
    pub playing: bool,
    pub players: Vec<PlayerSummary>,
    pub state: GameState,
    pub next_game_id: Option<GameId>,
}

/// Deterministic successor of a game state
fn next_state(game: &Game) -> GameResult<GameState> {
    match &game.state {
        GameState::Lobby => Ok(GameState::Generate),
        GameState::Generate => game
            .round_ids
            .first()
            .map(|round_id| GameState::Rounds {
                round_id: round_id.clone(),
            })
            .ok_or_else(|| GameError::NoRounds(game.id.clone())),
        GameState::Rounds { round_id } => {
            let index = game
                .round_ids
                .iter()
                .position(|id| id == round_id)
                .ok_or_else(|| GameError::RoundNotInGame {
                    game_id: game.id.clone(),
                    round_id: round_id.clone(),
                })?;
            Ok(match game.round_ids.get(index + 1) {
                Some(next) => GameState::Rounds {
                    round_id: next.clone(),
                },
                None => GameState::Recap,
            })
        }
        GameState::Recap => Ok(GameState::Recap),
    }
}

impl AppState {
    fn notify_game(&self, game_id: &str, stage: GameStage) {
        self.broadcast_to_all(ServerMessage::GameChanged {
            game_id: game_id.to_string(),
            stage,
        });
    }

    fn lobby_game(&self, host_id: &str, player_ids: Vec<UserId>, slug: String) -> Game {
        Game {
            id: new_id(),
            host_id: host_id.to_string(),
            player_ids,
            slug,
            round_ids: vec![],
            state: GameState::Lobby,
            next_game_id: None,
            created_at: self.now(),
            seq: self.next_seq(),
        }
    }

    /// Host a new game; the host is also its first player
    pub async fn create_game(&self, caller: &Caller) -> GameResult<GameId> {
        let game = self.lobby_game(
            &caller.user_id,
            vec![caller.user_id.clone()],
            generate_slug(),
        );
        let game_id = game.id.clone();
        tracing::info!("Game {} created with code {}", game_id, game.slug);
        self.games.write().await.insert(game_id.clone(), game);
        self.track_game(&caller.session_id, &game_id).await;
        Ok(game_id)
    }

    /// Clone a finished game's roster and code into a fresh lobby.
    ///
    /// Repeated calls return the game created by the first one.
    pub async fn play_again(&self, caller: &Caller, old_game_id: &str) -> GameResult<GameId> {
        let mut games = self.games.write().await;
        let old = games
            .get(old_game_id)
            .ok_or_else(|| GameError::GameNotFound(old_game_id.to_string()))?;
        if !old.has_player(&caller.user_id) {
            return Err(GameError::NotAPlayer(old_game_id.to_string()));
        }
        if old.state != GameState::Recap {
            return Err(GameError::StageMismatch {
                game_id: old_game_id.to_string(),
                expected: GameStage::Recap,
                actual: old.state.stage(),
            });
        }

        let game_id = match old.next_game_id.clone() {
            Some(existing) => existing,
            None => {
                let (player_ids, slug) = (old.player_ids.clone(), old.slug.clone());
                let game = self.lobby_game(&caller.user_id, player_ids, slug);
                let game_id = game.id.clone();
                games.insert(game_id.clone(), game);
                if let Some(old) = games.get_mut(old_game_id) {
                    old.next_game_id = Some(game_id.clone());
                }
                tracing::info!("Game {} continues as {}", old_game_id, game_id);
                game_id
            }
        };
        drop(games);

        self.track_game(&caller.session_id, &game_id).await;
        self.notify_game(old_game_id, GameStage::Recap);
        Ok(game_id)
    }

    /// Join the most recently created game with this code
    pub async fn join_game(&self, caller: &Caller, game_code: &str) -> GameResult<GameId> {
        let code = game_code.trim().to_uppercase();
        let mut games = self.games.write().await;
        let game = games
            .values_mut()
            .filter(|g| g.slug == code)
            .max_by_key(|g| (g.created_at, g.seq))
            .ok_or_else(|| GameError::GameNotFound(code.clone()))?;

        if game.player_ids.len() >= self.config.max_players {
            return Err(GameError::GameFull);
        }
        if game.state != GameState::Lobby {
            return Err(GameError::GameStarted);
        }

        if game.has_player(&caller.user_id) {
            tracing::warn!("User {} joining game {} they're already in", caller.user_id, game.id);
        } else {
            game.player_ids.push(caller.user_id.clone());
            tracing::info!(
                "User {} joined game {} ({} players)",
                caller.user_id,
                game.id,
                game.player_ids.len()
            );
        }
        let game_id = game.id.clone();
        drop(games);

        self.track_game(&caller.session_id, &game_id).await;
        self.notify_game(&game_id, GameStage::Lobby);
        Ok(game_id)
    }

    /// Enter a saved submission as the caller's round
    pub async fn submit_to_game(
        &self,
        caller: &Caller,
        game_id: &str,
        submission_id: &str,
    ) -> GameResult<()> {
        let submission = self
            .submissions
            .read()
            .await
            .get(submission_id)
            .cloned()
            .ok_or_else(|| GameError::SubmissionNotFound(submission_id.to_string()))?;

        let mut games = self.games.write().await;
        let mut rounds = self.rounds.write().await;
        let game = games
            .get_mut(game_id)
            .ok_or_else(|| GameError::GameNotFound(game_id.to_string()))?;

        if !game.has_player(&caller.user_id) {
            return Err(GameError::NotAPlayer(game_id.to_string()));
        }
        let SubmissionResult::Saved {
            image_storage_id, ..
        } = &submission.result
        else {
            return Err(GameError::SubmissionNotReady(submission.result.status()));
        };
        if submission.author_id != caller.user_id {
            return Err(GameError::NotYourSubmission);
        }
        let already_submitted = game
            .round_ids
            .iter()
            .filter_map(|id| rounds.get(id))
            .any(|round| round.author_id == submission.author_id);
        if already_submitted {
            return Err(GameError::AlreadySubmitted);
        }

        let round = self.new_round(&submission.author_id, image_storage_id, &submission.prompt);
        game.round_ids.push(round.id.clone());
        rounds.insert(round.id.clone(), round);
        tracing::info!(
            "Game {} has {}/{} rounds",
            game_id,
            game.round_ids.len(),
            game.player_ids.len()
        );

        let everyone_submitted = game.player_ids.iter().all(|player| {
            game.round_ids
                .iter()
                .filter_map(|id| rounds.get(id))
                .any(|round| &round.author_id == player)
        });
        if game.state == GameState::Generate && everyone_submitted {
            let first = game.round_ids[0].clone();
            if let Some(round) = rounds.get_mut(&first) {
                self.restart_label(round);
            }
            game.state = GameState::Rounds { round_id: first };
            tracing::info!("Game {} starts its rounds", game_id);
        }

        let stage = game.state.stage();
        drop(rounds);
        drop(games);
        self.notify_game(game_id, stage);
        Ok(())
    }

    /// Host-driven advance, also the target of the generate-stage fallback
    pub async fn progress_game(
        &self,
        host_user_id: &str,
        game_id: &str,
        from_stage: GameStage,
    ) -> GameResult<()> {
        let mut games = self.games.write().await;
        let game = games
            .get_mut(game_id)
            .ok_or_else(|| GameError::GameNotFound(game_id.to_string()))?;
        if game.host_id != host_user_id {
            return Err(GameError::NotHost);
        }

        let current = game.state.stage();
        if current != from_stage {
            if from_stage < current {
                tracing::debug!(
                    "Game {} already left {:?}, now {:?}",
                    game_id,
                    from_stage,
                    current
                );
                return Ok(());
            }
            return Err(GameError::StageMismatch {
                game_id: game_id.to_string(),
                expected: from_stage,
                actual: current,
            });
        }

        let state = next_state(game)?;
        if let GameState::Rounds { round_id } = &state {
            let mut rounds = self.rounds.write().await;
            let round = rounds
                .get_mut(round_id)
                .ok_or_else(|| GameError::RoundNotFound(round_id.clone()))?;
            self.restart_label(round);
        }
        if state == GameState::Generate {
            self.scheduler.run_after(
                self.config.generate_duration,
                ScheduledTask::GameProgress {
                    game_id: game_id.to_string(),
                    host_id: game.host_id.clone(),
                    from_stage: GameStage::Generate,
                },
            );
        }

        tracing::info!("Game {} moved {:?} -> {:?}", game_id, game.state, state);
        let stage = state.stage();
        game.state = state;
        drop(games);

        self.notify_game(game_id, stage);
        Ok(())
    }

    /// Roster with scores summed over revealed rounds
    pub async fn get_game(&self, user_id: &str, game_id: &str) -> GameResult<GameView> {
        let game = self
            .games
            .read()
            .await
            .get(game_id)
            .cloned()
            .ok_or_else(|| GameError::GameNotFound(game_id.to_string()))?;
        let rounds: Vec<Round> = {
            let rounds = self.rounds.read().await;
            game.round_ids
                .iter()
                .filter_map(|id| rounds.get(id).cloned())
                .collect()
        };

        let mut scores: BTreeMap<UserId, i64> = BTreeMap::new();
        let mut likes: HashMap<UserId, usize> = HashMap::new();
        for round in rounds.iter().filter(|r| r.stage == RoundStage::Reveal) {
            for option in &round.options {
                *likes.entry(option.author_id.clone()).or_default() += option.likes.len();
                accumulate(
                    &mut scores,
                    score_deltas(option.author_id == round.author_id, option),
                );
            }
        }

        let profiles = self.profiles(game.player_ids.iter()).await?;
        let players = game
            .player_ids
            .iter()
            .map(|player_id| {
                let user = &profiles[player_id];
                PlayerSummary {
                    user_id: player_id.clone(),
                    me: player_id == user_id,
                    name: user.name.clone(),
                    picture_url: user.picture_url.clone(),
                    submitted: rounds.iter().any(|r| &r.author_id == player_id),
                    score: scores.get(player_id).copied().unwrap_or(0),
                    likes: likes.get(player_id).copied().unwrap_or(0),
                }
            })
            .collect();

        Ok(GameView {
            game_code: game.slug.clone(),
            hosting: game.host_id == user_id,
            playing: game.has_player(user_id),
            players,
            state: game.state,
            next_game_id: game.next_game_id,
        })
    }
}
