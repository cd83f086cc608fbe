//! WebSocket message dispatch
//!
//! Every message acts on behalf of the connection's session. The caller is
//! resolved once here and handed explicitly to the area-specific handlers.

use crate::error::GameResult;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use std::sync::Arc;

use super::{game, presence, round, session, submission};

/// Turn an operation result into a reply, faults become error messages
pub(super) fn respond<T>(
    result: GameResult<T>,
    ok: impl FnOnce(T) -> ServerMessage,
) -> Option<ServerMessage> {
    Some(match result {
        Ok(value) => ok(value),
        Err(e) => {
            tracing::warn!("Request failed: {}", e);
            e.into()
        }
    })
}

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    session_id: &str,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    let caller = match state.caller(session_id).await {
        Ok(caller) => caller,
        Err(e) => return Some(e.into()),
    };

    match msg {
        // Games
        ClientMessage::CreateGame => game::handle_create(state, &caller).await,
        ClientMessage::JoinGame { game_code } => {
            game::handle_join(state, &caller, &game_code).await
        }
        ClientMessage::PlayAgain { old_game_id } => {
            game::handle_play_again(state, &caller, &old_game_id).await
        }
        ClientMessage::SubmitToGame {
            game_id,
            submission_id,
        } => game::handle_submit(state, &caller, &game_id, &submission_id).await,
        ClientMessage::ProgressGame {
            game_id,
            from_stage,
        } => game::handle_progress(state, &caller, &game_id, from_stage).await,
        ClientMessage::GetGame { game_id } => game::handle_get(state, &caller, game_id).await,

        // Rounds
        ClientMessage::AddOption {
            round_id,
            prompt,
            game_id,
        } => round::handle_add_option(state, &caller, &round_id, prompt, game_id).await,
        ClientMessage::Guess {
            round_id,
            prompt,
            game_id,
        } => round::handle_guess(state, &caller, &round_id, &prompt, game_id).await,
        ClientMessage::Like { round_id, prompt } => {
            round::handle_like(state, &caller, &round_id, &prompt).await
        }
        ClientMessage::ProgressRound {
            round_id,
            from_stage,
        } => round::handle_progress(state, &round_id, from_stage).await,
        ClientMessage::GetRound { round_id } => round::handle_get(state, &caller, round_id).await,

        // Submissions
        ClientMessage::StartSubmission { prompt } => {
            submission::handle_start(state, &caller, &prompt).await
        }
        ClientMessage::GetSubmission { submission_id } => {
            submission::handle_get(state, &caller, submission_id).await
        }
        ClientMessage::SubmissionHealth => submission::handle_health(state).await,

        // Public game
        ClientMessage::ProgressPublicGame { from_stage } => {
            round::handle_progress_public(state, from_stage).await
        }
        ClientMessage::GetPublicGame => round::handle_get_public(state).await,

        // Session and profile
        ClientMessage::ServerNow => Some(ServerMessage::ServerNow {
            server_now: state.now(),
        }),
        ClientMessage::SetName { name } => session::handle_set_name(state, &caller, &name).await,
        ClientMessage::SetPicture { submission_id } => {
            session::handle_set_picture(state, &caller, &submission_id).await
        }
        ClientMessage::LoggedIn {
            token_identifier,
            name,
            picture_url,
            email,
        } => {
            session::handle_logged_in(state, &caller, token_identifier, name, picture_url, email)
                .await
        }
        ClientMessage::LoggedOut => session::handle_logged_out(state, &caller).await,
        ClientMessage::GetProfile => session::handle_get_profile(state, &caller).await,

        // Presence
        ClientMessage::UpdatePresence { game, data } => {
            presence::handle_update(state, &caller, &game, data).await
        }
        ClientMessage::PresenceHeartbeat { game } => {
            presence::handle_heartbeat(state, &caller, &game).await
        }
        ClientMessage::ListPresence { game } => presence::handle_list(state, game).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GameStage;

    async fn session(state: &Arc<AppState>) -> String {
        state.create_session().await.id
    }

    #[tokio::test]
    async fn test_unknown_session_is_error() {
        let state = Arc::new(AppState::new());

        let result = handle_message(ClientMessage::CreateGame, "missing", &state).await;

        if let Some(ServerMessage::Error { code, .. }) = result {
            assert_eq!(code, "SESSION_NOT_FOUND");
        } else {
            panic!("Expected Error message");
        }
    }

    #[tokio::test]
    async fn test_create_and_get_game() {
        let state = Arc::new(AppState::new());
        let session_id = session(&state).await;

        let Some(ServerMessage::GameCreated { game_id }) =
            handle_message(ClientMessage::CreateGame, &session_id, &state).await
        else {
            panic!("Expected GameCreated message");
        };

        let result = handle_message(
            ClientMessage::GetGame {
                game_id: game_id.clone(),
            },
            &session_id,
            &state,
        )
        .await;
        if let Some(ServerMessage::Game { game, .. }) = result {
            assert!(game.hosting);
            assert_eq!(game.players.len(), 1);
            assert_eq!(game.game_code.len(), 4);
        } else {
            panic!("Expected Game message");
        }
    }

    #[tokio::test]
    async fn test_non_host_progress_is_error() {
        let state = Arc::new(AppState::new());
        let host = session(&state).await;
        let guest = session(&state).await;

        let Some(ServerMessage::GameCreated { game_id }) =
            handle_message(ClientMessage::CreateGame, &host, &state).await
        else {
            panic!("Expected GameCreated message");
        };
        let code = state.games.read().await[&game_id].slug.clone();
        handle_message(ClientMessage::JoinGame { game_code: code }, &guest, &state).await;

        let result = handle_message(
            ClientMessage::ProgressGame {
                game_id,
                from_stage: GameStage::Lobby,
            },
            &guest,
            &state,
        )
        .await;
        if let Some(ServerMessage::Error { code, .. }) = result {
            assert_eq!(code, "NOT_HOST");
        } else {
            panic!("Expected Error message");
        }
    }

    #[tokio::test]
    async fn test_public_game_missing() {
        let state = Arc::new(AppState::new());
        let session_id = session(&state).await;

        let result = handle_message(ClientMessage::GetPublicGame, &session_id, &state).await;
        if let Some(ServerMessage::Error { code, .. }) = result {
            assert_eq!(code, "NO_PUBLIC_GAME");
        } else {
            panic!("Expected Error message");
        }
    }

    #[tokio::test]
    async fn test_presence_roundtrip() {
        let state = Arc::new(AppState::new());
        let session_id = session(&state).await;
        let user_id = state.caller(&session_id).await.unwrap().user_id;

        let result = handle_message(
            ClientMessage::UpdatePresence {
                game: "game-1".to_string(),
                data: serde_json::json!({ "emoji": "wave" }),
            },
            &session_id,
            &state,
        )
        .await;
        assert!(matches!(result, Some(ServerMessage::Ack)));

        let result = handle_message(
            ClientMessage::ListPresence {
                game: "game-1".to_string(),
            },
            &session_id,
            &state,
        )
        .await;
        if let Some(ServerMessage::Presence { entries, .. }) = result {
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].user_id, user_id);
        } else {
            panic!("Expected Presence message");
        }
    }

    #[tokio::test]
    async fn test_server_now() {
        let state = Arc::new(AppState::new());
        let session_id = session(&state).await;

        let result = handle_message(ClientMessage::ServerNow, &session_id, &state).await;
        assert!(matches!(result, Some(ServerMessage::ServerNow { server_now }) if server_now > 0));
    }
}
