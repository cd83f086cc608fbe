//! Round and public game message handlers

use super::handlers::respond;
use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::{Caller, GameId, RoundId, RoundStage};
use std::sync::Arc;

pub async fn handle_add_option(
    state: &Arc<AppState>,
    caller: &Caller,
    round_id: &str,
    prompt: String,
    game_id: Option<GameId>,
) -> Option<ServerMessage> {
    respond(
        state
            .add_option(&caller.user_id, round_id, prompt, game_id.as_deref())
            .await,
        |result| ServerMessage::Action { result },
    )
}

pub async fn handle_guess(
    state: &Arc<AppState>,
    caller: &Caller,
    round_id: &str,
    prompt: &str,
    game_id: Option<GameId>,
) -> Option<ServerMessage> {
    respond(
        state
            .guess(&caller.user_id, round_id, prompt, game_id.as_deref())
            .await,
        |result| ServerMessage::Action { result },
    )
}

pub async fn handle_like(
    state: &Arc<AppState>,
    caller: &Caller,
    round_id: &str,
    prompt: &str,
) -> Option<ServerMessage> {
    respond(
        state.like(&caller.user_id, round_id, prompt).await,
        |result| ServerMessage::Action { result },
    )
}

pub async fn handle_progress(
    state: &Arc<AppState>,
    round_id: &str,
    from_stage: RoundStage,
) -> Option<ServerMessage> {
    respond(state.progress_round(round_id, from_stage).await, |_| {
        ServerMessage::Ack
    })
}

pub async fn handle_get(
    state: &Arc<AppState>,
    caller: &Caller,
    round_id: RoundId,
) -> Option<ServerMessage> {
    respond(state.get_round(&caller.user_id, &round_id).await, |round| {
        ServerMessage::Round { round_id, round }
    })
}

pub async fn handle_progress_public(
    state: &Arc<AppState>,
    from_stage: RoundStage,
) -> Option<ServerMessage> {
    respond(state.progress_public_game(from_stage).await, |_| {
        ServerMessage::Ack
    })
}

pub async fn handle_get_public(state: &Arc<AppState>) -> Option<ServerMessage> {
    respond(state.get_public_game().await, |round_id| {
        ServerMessage::PublicGame { round_id }
    })
}
