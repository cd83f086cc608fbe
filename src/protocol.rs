use crate::error::GameError;
use crate::state::{GameView, PresenceEntry, RoundView, SubmissionHealth, SubmissionView};
use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    // Games
    CreateGame,
    JoinGame {
        game_code: String,
    },
    PlayAgain {
        old_game_id: GameId,
    },
    SubmitToGame {
        game_id: GameId,
        submission_id: SubmissionId,
    },
    ProgressGame {
        game_id: GameId,
        from_stage: GameStage,
    },
    GetGame {
        game_id: GameId,
    },

    // Rounds
    AddOption {
        round_id: RoundId,
        prompt: String,
        /// Set when the round belongs to a game, sizes the round to its players
        #[serde(default)]
        game_id: Option<GameId>,
    },
    Guess {
        round_id: RoundId,
        prompt: String,
        #[serde(default)]
        game_id: Option<GameId>,
    },
    Like {
        round_id: RoundId,
        prompt: String,
    },
    ProgressRound {
        round_id: RoundId,
        from_stage: RoundStage,
    },
    GetRound {
        round_id: RoundId,
    },

    // Submissions
    StartSubmission {
        prompt: String,
    },
    GetSubmission {
        submission_id: SubmissionId,
    },
    SubmissionHealth,

    // Public game
    ProgressPublicGame {
        from_stage: RoundStage,
    },
    GetPublicGame,

    // Session and profile
    ServerNow,
    SetName {
        name: String,
    },
    /// Use a saved image of one's own as profile picture
    SetPicture {
        submission_id: SubmissionId,
    },
    LoggedIn {
        token_identifier: String,
        name: String,
        #[serde(default)]
        picture_url: Option<String>,
        #[serde(default)]
        email: Option<String>,
    },
    LoggedOut,
    GetProfile,

    // Presence
    UpdatePresence {
        game: String,
        #[serde(default)]
        data: serde_json::Value,
    },
    PresenceHeartbeat {
        game: String,
    },
    ListPresence {
        game: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        session_id: SessionId,
        user_id: UserId,
        server_now: Millis,
    },
    GameCreated {
        game_id: GameId,
    },
    GameJoined {
        game_id: GameId,
    },
    Game {
        game_id: GameId,
        game: GameView,
    },
    Round {
        round_id: RoundId,
        round: RoundView,
    },
    /// Outcome of a rule-checked round action
    Action {
        result: ActionResult,
    },
    Ack,
    SubmissionStarted {
        submission_id: SubmissionId,
    },
    Submission {
        submission_id: SubmissionId,
        submission: SubmissionView,
    },
    Health {
        health: SubmissionHealth,
    },
    PublicGame {
        round_id: RoundId,
    },
    ServerNow {
        server_now: Millis,
    },
    Profile {
        user_id: UserId,
        name: String,
        picture_url: String,
    },
    /// Sent after login or logout re-pointed the session
    SessionUser {
        user_id: UserId,
    },
    Presence {
        game: String,
        entries: Vec<PresenceEntry>,
    },

    // Broadcast to every connection; clients refetch what they are watching
    GameChanged {
        game_id: GameId,
        stage: GameStage,
    },
    RoundChanged {
        round_id: RoundId,
        stage: RoundStage,
    },
    SubmissionChanged {
        submission_id: SubmissionId,
        status: String,
    },
    PublicGameChanged {
        round_id: RoundId,
    },
    PresenceChanged {
        game: String,
    },

    Error {
        code: String,
        msg: String,
    },
}

impl From<GameError> for ServerMessage {
    fn from(e: GameError) -> Self {
        ServerMessage::Error {
            code: e.code().to_string(),
            msg: e.to_string(),
        }
    }
}
