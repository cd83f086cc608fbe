use super::handlers::respond;
use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::{Caller, SubmissionId};
use std::sync::Arc;

pub async fn handle_start(
    state: &Arc<AppState>,
    caller: &Caller,
    prompt: &str,
) -> Option<ServerMessage> {
    respond(state.start_submission(caller, prompt).await, |submission_id| {
        ServerMessage::SubmissionStarted { submission_id }
    })
}

pub async fn handle_get(
    state: &Arc<AppState>,
    caller: &Caller,
    submission_id: SubmissionId,
) -> Option<ServerMessage> {
    respond(
        state.get_submission(&caller.user_id, &submission_id).await,
        |submission| ServerMessage::Submission {
            submission_id,
            submission,
        },
    )
}

pub async fn handle_health(state: &Arc<AppState>) -> Option<ServerMessage> {
    Some(ServerMessage::Health {
        health: state.submission_health().await,
    })
}
