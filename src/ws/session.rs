//! Identity and profile handlers

use super::handlers::respond;
use crate::protocol::ServerMessage;
use crate::state::{AppState, Identity};
use crate::types::Caller;
use std::sync::Arc;

pub async fn handle_set_name(
    state: &Arc<AppState>,
    caller: &Caller,
    name: &str,
) -> Option<ServerMessage> {
    respond(state.set_name(caller, name).await, |_| ServerMessage::Ack)
}

pub async fn handle_set_picture(
    state: &Arc<AppState>,
    caller: &Caller,
    submission_id: &str,
) -> Option<ServerMessage> {
    respond(state.set_picture(caller, submission_id).await, |_| {
        ServerMessage::Ack
    })
}

pub async fn handle_logged_in(
    state: &Arc<AppState>,
    caller: &Caller,
    token_identifier: String,
    name: String,
    picture_url: Option<String>,
    email: Option<String>,
) -> Option<ServerMessage> {
    // TODO: verify the token against the identity provider before trusting it
    let identity = Identity {
        token_identifier,
        name,
        picture_url,
        email,
    };
    respond(
        state.logged_in(&caller.session_id, &identity).await,
        |caller| ServerMessage::SessionUser {
            user_id: caller.user_id,
        },
    )
}

pub async fn handle_logged_out(state: &Arc<AppState>, caller: &Caller) -> Option<ServerMessage> {
    respond(state.logged_out(&caller.session_id).await, |caller| {
        ServerMessage::SessionUser {
            user_id: caller.user_id,
        }
    })
}

pub async fn handle_get_profile(state: &Arc<AppState>, caller: &Caller) -> Option<ServerMessage> {
    respond(state.resolve_user(&caller.user_id).await, |user| {
        ServerMessage::Profile {
            user_id: user.id,
            name: user.name,
            picture_url: user.picture_url,
        }
    })
}
