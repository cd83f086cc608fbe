//! Game message handlers

use super::handlers::respond;
use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::{Caller, GameId, GameStage};
use std::sync::Arc;

pub async fn handle_create(state: &Arc<AppState>, caller: &Caller) -> Option<ServerMessage> {
    respond(state.create_game(caller).await, |game_id| {
        ServerMessage::GameCreated { game_id }
    })
}

pub async fn handle_join(
    state: &Arc<AppState>,
    caller: &Caller,
    game_code: &str,
) -> Option<ServerMessage> {
    tracing::info!("Join request for code {}", game_code);
    respond(state.join_game(caller, game_code).await, |game_id| {
        ServerMessage::GameJoined { game_id }
    })
}

pub async fn handle_play_again(
    state: &Arc<AppState>,
    caller: &Caller,
    old_game_id: &str,
) -> Option<ServerMessage> {
    respond(state.play_again(caller, old_game_id).await, |game_id| {
        ServerMessage::GameJoined { game_id }
    })
}

pub async fn handle_submit(
    state: &Arc<AppState>,
    caller: &Caller,
    game_id: &str,
    submission_id: &str,
) -> Option<ServerMessage> {
    respond(
        state.submit_to_game(caller, game_id, submission_id).await,
        |_| ServerMessage::Ack,
    )
}

pub async fn handle_progress(
    state: &Arc<AppState>,
    caller: &Caller,
    game_id: &str,
    from_stage: GameStage,
) -> Option<ServerMessage> {
    respond(
        state
            .progress_game(&caller.user_id, game_id, from_stage)
            .await,
        |_| ServerMessage::Ack,
    )
}

pub async fn handle_get(
    state: &Arc<AppState>,
    caller: &Caller,
    game_id: GameId,
) -> Option<ServerMessage> {
    respond(state.get_game(&caller.user_id, &game_id).await, |game| {
        ServerMessage::Game { game_id, game }
    })
}
