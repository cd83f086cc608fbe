//! Presence handlers

use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::Caller;
use std::sync::Arc;

pub async fn handle_update(
    state: &Arc<AppState>,
    caller: &Caller,
    game: &str,
    data: serde_json::Value,
) -> Option<ServerMessage> {
    state.update_presence(&caller.session_id, game, data).await;
    Some(ServerMessage::Ack)
}

pub async fn handle_heartbeat(
    state: &Arc<AppState>,
    caller: &Caller,
    game: &str,
) -> Option<ServerMessage> {
    state.presence_heartbeat(&caller.session_id, game).await;
    Some(ServerMessage::Ack)
}

pub async fn handle_list(state: &Arc<AppState>, game: String) -> Option<ServerMessage> {
    let entries = state.list_presence(&game).await;
    Some(ServerMessage::Presence { game, entries })
}
