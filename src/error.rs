use crate::types::{GameId, GameStage, RoundId, SessionId, SubmissionId, UserId};

/// Result type for state operations
pub type GameResult<T> = Result<T, GameError>;

/// Integrity and authorization faults.
///
/// These mean the client is out of sync with the server or is bypassing its
/// own UI. Expected game-rule rejections are returned as
/// [`ActionResult`](crate::types::ActionResult) values instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Game not found: {0}")]
    GameNotFound(String),

    #[error("Round not found: {0}")]
    RoundNotFound(RoundId),

    #[error("Submission not found: {0}")]
    SubmissionNotFound(SubmissionId),

    #[error("Image not found for round {0}")]
    ImageNotFound(RoundId),

    #[error("You are not the host")]
    NotHost,

    #[error("You aren't part of game {0}")]
    NotAPlayer(GameId),

    #[error("Game is full")]
    GameFull,

    #[error("Game has started")]
    GameStarted,

    #[error("Game {game_id} ({actual:?}) is no longer in stage {expected:?}")]
    StageMismatch {
        game_id: GameId,
        expected: GameStage,
        actual: GameStage,
    },

    #[error("Game {0} has no rounds")]
    NoRounds(GameId),

    #[error("Round {round_id} is not part of game {game_id}")]
    RoundNotInGame { game_id: GameId, round_id: RoundId },

    #[error("You can't submit a prompt for your own image.")]
    OwnImage,

    #[error("Can't add {0} submissions.")]
    SubmissionNotReady(&'static str),

    #[error("This is not your submission.")]
    NotYourSubmission,

    #[error("You already submitted.")]
    AlreadySubmitted,

    #[error("Prompt too long")]
    PromptTooLong,

    #[error("Prompt is empty")]
    PromptEmpty,

    #[error("Invalid name")]
    InvalidName,

    #[error("No public game currently.")]
    NoPublicGame,

    #[error("No submission available for the public game")]
    NoPublicSubmission,
}

impl GameError {
    /// Stable error code for the wire protocol
    pub fn code(&self) -> &'static str {
        match self {
            GameError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            GameError::UserNotFound(_) => "USER_NOT_FOUND",
            GameError::GameNotFound(_) => "GAME_NOT_FOUND",
            GameError::RoundNotFound(_) => "ROUND_NOT_FOUND",
            GameError::SubmissionNotFound(_) => "SUBMISSION_NOT_FOUND",
            GameError::ImageNotFound(_) => "IMAGE_NOT_FOUND",
            GameError::NotHost => "NOT_HOST",
            GameError::NotAPlayer(_) => "NOT_A_PLAYER",
            GameError::GameFull => "GAME_FULL",
            GameError::GameStarted => "GAME_STARTED",
            GameError::StageMismatch { .. } => "STAGE_MISMATCH",
            GameError::NoRounds(_) => "NO_ROUNDS",
            GameError::RoundNotInGame { .. } => "ROUND_NOT_IN_GAME",
            GameError::OwnImage => "OWN_IMAGE",
            GameError::SubmissionNotReady(_) => "SUBMISSION_NOT_READY",
            GameError::NotYourSubmission => "NOT_YOUR_SUBMISSION",
            GameError::AlreadySubmitted => "ALREADY_SUBMITTED",
            GameError::PromptTooLong => "PROMPT_TOO_LONG",
            GameError::PromptEmpty => "PROMPT_EMPTY",
            GameError::InvalidName => "INVALID_NAME",
            GameError::NoPublicGame => "NO_PUBLIC_GAME",
            GameError::NoPublicSubmission => "NO_PUBLIC_SUBMISSION",
        }
    }
}
