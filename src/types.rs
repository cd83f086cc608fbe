use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Opaque ID types for type safety
pub type UserId = String;
pub type SessionId = String;
pub type SubmissionId = String;
pub type RoundId = String;
pub type GameId = String;
pub type StorageId = String;

/// Milliseconds since the unix epoch
pub type Millis = i64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub picture_url: String,
    /// External identity token, absent for anonymous users
    pub token_identifier: Option<String>,
    /// Set once an anonymous user has been claimed by a logged-in user
    pub claimed_by_user_id: Option<UserId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub submission_ids: Vec<SubmissionId>,
    pub game_ids: Vec<GameId>,
}

/// The identity an operation is performed on behalf of.
///
/// `user_id` is always the resolved (unclaimed) user of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct Caller {
    pub session_id: SessionId,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SubmissionResult {
    Generating {
        details: String,
    },
    Failed {
        reason: String,
        elapsed_ms: Millis,
    },
    Saved {
        image_storage_id: StorageId,
        elapsed_ms: Millis,
    },
}

impl SubmissionResult {
    pub fn status(&self) -> &'static str {
        match self {
            SubmissionResult::Generating { .. } => "generating",
            SubmissionResult::Failed { .. } => "failed",
            SubmissionResult::Saved { .. } => "saved",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SubmissionResult::Generating { .. })
    }

    pub fn elapsed_ms(&self) -> Option<Millis> {
        match self {
            SubmissionResult::Generating { .. } => None,
            SubmissionResult::Failed { elapsed_ms, .. }
            | SubmissionResult::Saved { elapsed_ms, .. } => Some(*elapsed_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Submission {
    pub id: SubmissionId,
    pub prompt: String,
    pub author_id: UserId,
    pub result: SubmissionResult,
    /// When the public rotation last picked this submission
    pub last_used: Option<Millis>,
    pub created_at: Millis,
    /// Insertion order, used to break ties between equal timestamps
    pub seq: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RoundStage {
    Label,
    Guess,
    Reveal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundOption {
    pub author_id: UserId,
    pub prompt: String,
    pub votes: BTreeSet<UserId>,
    pub likes: BTreeSet<UserId>,
}

impl RoundOption {
    pub fn new(author_id: UserId, prompt: String) -> Self {
        Self {
            author_id,
            prompt,
            votes: BTreeSet::new(),
            likes: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Round {
    pub id: RoundId,
    /// Owner of the source image, whose prompt is the correct answer
    pub author_id: UserId,
    pub image_storage_id: StorageId,
    pub stage: RoundStage,
    pub stage_start: Millis,
    pub stage_end: Millis,
    pub options: Vec<RoundOption>,
    /// Rounds created by the public game loop
    #[serde(default)]
    pub is_public_rotation: bool,
}

impl Round {
    pub fn option_by_author(&self, user_id: &str) -> Option<&RoundOption> {
        self.options.iter().find(|o| o.author_id == user_id)
    }

    /// Distinct voters other than the image author
    pub fn voter_count(&self) -> usize {
        self.options
            .iter()
            .flat_map(|o| o.votes.iter())
            .filter(|voter| **voter != self.author_id)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// True once anybody voted for or liked any option
    pub fn has_interaction(&self) -> bool {
        self.options
            .iter()
            .any(|o| !o.votes.is_empty() || !o.likes.is_empty())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GameStage {
    Lobby,
    Generate,
    Rounds,
    Recap,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "stage", rename_all = "lowercase")]
pub enum GameState {
    Lobby,
    Generate,
    Rounds { round_id: RoundId },
    Recap,
}

impl GameState {
    pub fn stage(&self) -> GameStage {
        match self {
            GameState::Lobby => GameStage::Lobby,
            GameState::Generate => GameStage::Generate,
            GameState::Rounds { .. } => GameStage::Rounds,
            GameState::Recap => GameStage::Recap,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Game {
    pub id: GameId,
    pub host_id: UserId,
    /// Join order
    pub player_ids: Vec<UserId>,
    /// Four character join code, not unique over time
    pub slug: String,
    /// Append-only, at most one round per player
    pub round_ids: Vec<RoundId>,
    pub state: GameState,
    /// Set once, when the game is cloned by "play again"
    pub next_game_id: Option<GameId>,
    pub created_at: Millis,
    pub seq: u64,
}

impl Game {
    pub fn has_player(&self, user_id: &str) -> bool {
        self.player_ids.iter().any(|id| id == user_id)
    }
}

/// Singleton pointer to the round the public game is currently showing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublicGame {
    pub id: String,
    pub round_id: RoundId,
}

/// What one session last reported about itself while looking at a game
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Presence {
    pub session_id: SessionId,
    pub game: String,
    /// Opaque client data, e.g. cursor position or typing state
    pub data: serde_json::Value,
    pub created: Millis,
    pub updated: Millis,
}

/// Structured outcome of a game-rule check that the player may see and retry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ActionResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            retry: None,
            reason: None,
        }
    }

    /// The stage moved on; nothing the player can do about it
    pub fn too_late(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            retry: None,
            reason: Some(reason.into()),
        }
    }

    pub fn rejected(reason: impl Into<String>, retry: bool) -> Self {
        Self {
            success: false,
            retry: Some(retry),
            reason: Some(reason.into()),
        }
    }
}
