//! Who is looking at a game right now.
//!
//! One record per (session, game). Clients overwrite their data whenever it
//! changes and send heartbeats in between; readers decide what counts as
//! stale from `updated`.

use super::AppState;
use crate::protocol::ServerMessage;
use crate::types::*;
use serde::{Deserialize, Serialize};

/// Most recent entries returned per game
const LIST_LIMIT: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PresenceEntry {
    pub created: Millis,
    pub updated: Millis,
    pub user_id: UserId,
    pub data: serde_json::Value,
}

impl AppState {
    async fn session_exists(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    /// Overwrite a session's presence data for `game`, creating the record if needed
    pub async fn update_presence(&self, session_id: &str, game: &str, data: serde_json::Value) {
        if !self.session_exists(session_id).await {
            tracing::error!("Presence update for unknown session {}", session_id);
            return;
        }

        let now = self.now();
        let key = (session_id.to_string(), game.to_string());
        let mut presence = self.presence.write().await;
        match presence.get_mut(&key) {
            Some(existing) => {
                existing.data = data;
                existing.updated = now;
            }
            None => {
                presence.insert(
                    key,
                    Presence {
                        session_id: session_id.to_string(),
                        game: game.to_string(),
                        data,
                        created: now,
                        updated: now,
                    },
                );
            }
        }
        drop(presence);

        self.broadcast_to_all(ServerMessage::PresenceChanged {
            game: game.to_string(),
        });
    }

    /// Refresh `updated` of an existing record, never creates one
    pub async fn presence_heartbeat(&self, session_id: &str, game: &str) {
        if !self.session_exists(session_id).await {
            tracing::warn!("Presence heartbeat for unknown session {}", session_id);
            return;
        }

        let now = self.now();
        let key = (session_id.to_string(), game.to_string());
        let bumped = match self.presence.write().await.get_mut(&key) {
            Some(existing) => {
                existing.updated = now;
                true
            }
            None => false,
        };
        if bumped {
            self.broadcast_to_all(ServerMessage::PresenceChanged {
                game: game.to_string(),
            });
        }
    }

    /// The most recently updated entries for `game`, newest first
    pub async fn list_presence(&self, game: &str) -> Vec<PresenceEntry> {
        let sessions = self.sessions.read().await;
        let presence = self.presence.read().await;

        let mut records: Vec<&Presence> = presence.values().filter(|p| p.game == game).collect();
        records.sort_by(|a, b| {
            b.updated
                .cmp(&a.updated)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });

        records
            .into_iter()
            .filter_map(|p| {
                sessions.get(&p.session_id).map(|session| PresenceEntry {
                    created: p.created,
                    updated: p.updated,
                    user_id: session.user_id.clone(),
                    data: p.data.clone(),
                })
            })
            .take(LIST_LIMIT)
            .collect()
    }
}
