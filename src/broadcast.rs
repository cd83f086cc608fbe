use crate::error::GameError;
use crate::state::AppState;
use std::sync::Arc;

/// Spawn the fixed-interval trigger that keeps the public game moving.
///
/// The game also reschedules itself; this ticker only guarantees at least one
/// call per window, e.g. after a restart or while the pool was still empty.
pub fn spawn_public_game_ticker(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.public_tick);

        loop {
            interval.tick().await;

            match state.tick_public_game().await {
                Ok(Some(round_id)) => {
                    tracing::debug!("Public game ticker started round {}", round_id);
                }
                Ok(None) => {}
                // Nothing has been generated yet
                Err(GameError::NoPublicSubmission) => {}
                Err(e) => tracing::warn!("Public game tick failed: {}", e),
            }
        }
    });
}
