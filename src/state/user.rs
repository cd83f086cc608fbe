use super::{new_id, AppState};
use crate::error::{GameError, GameResult};
use crate::types::*;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

const MAX_NAME_LENGTH: usize = 100;

/// Identity asserted by an external login provider
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub token_identifier: String,
    pub name: String,
    pub picture_url: Option<String>,
    pub email: Option<String>,
}

/// Avatar URL that falls back to a generated monster picture
fn gravatar_url(key: &str) -> String {
    let hash = Sha256::digest(key.trim().to_lowercase().as_bytes());
    format!(
        "https://www.gravatar.com/avatar/{}?d=monsterid",
        hex::encode(hash)
    )
}

/// Follow the claim chain to the user currently in charge of `user_id`
fn resolve_in<'a>(users: &'a HashMap<UserId, User>, user_id: &str) -> Option<&'a User> {
    let mut user = users.get(user_id)?;
    // Claims form a chain, the hop limit only guards against a corrupt cycle
    for _ in 0..users.len() {
        match &user.claimed_by_user_id {
            Some(next) => user = users.get(next)?,
            None => return Some(user),
        }
    }
    None
}

/// Move `old`'s votes and likes in a round to `new`.
///
/// If both ids voted, the vote `new` cast stays and the other is dropped.
/// Nobody keeps a vote or like on an option that is now their own.
fn carry_over_votes(round: &mut Round, old: &str, new: &str) {
    let new_has_vote = round.options.iter().any(|o| o.votes.contains(new));
    for option in round.options.iter_mut() {
        if option.votes.remove(old) && !new_has_vote {
            option.votes.insert(new.to_string());
        }
        if option.likes.remove(old) {
            option.likes.insert(new.to_string());
        }
        if option.author_id == new {
            option.votes.remove(new);
            option.likes.remove(new);
        }
    }
}

impl AppState {
    pub async fn create_anonymous_user(&self) -> User {
        let name = petname::petname(2, "-").unwrap_or_else(|| "anonymous".to_string());
        let user = User {
            id: new_id(),
            picture_url: gravatar_url(&new_id()),
            name,
            token_identifier: None,
            claimed_by_user_id: None,
        };
        self.users
            .write()
            .await
            .insert(user.id.clone(), user.clone());
        user
    }

    /// New session bound to a fresh anonymous user
    pub async fn create_session(&self) -> Session {
        let user = self.create_anonymous_user().await;
        let session = Session {
            id: new_id(),
            user_id: user.id,
            submission_ids: vec![],
            game_ids: vec![],
        };
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        tracing::info!("Session {} created for {}", session.id, session.user_id);
        session
    }

    /// Resolve a session to the identity its operations act as
    pub async fn caller(&self, session_id: &str) -> GameResult<Caller> {
        let user_id = self
            .sessions
            .read()
            .await
            .get(session_id)
            .map(|s| s.user_id.clone())
            .ok_or_else(|| GameError::SessionNotFound(session_id.to_string()))?;
        let user = self.resolve_user(&user_id).await?;
        Ok(Caller {
            session_id: session_id.to_string(),
            user_id: user.id,
        })
    }

    pub async fn resolve_user(&self, user_id: &str) -> GameResult<User> {
        let users = self.users.read().await;
        resolve_in(&users, user_id)
            .cloned()
            .ok_or_else(|| GameError::UserNotFound(user_id.to_string()))
    }

    /// Resolved users for a set of ids, keyed by the requested id
    pub async fn profiles<'a>(
        &self,
        user_ids: impl IntoIterator<Item = &'a UserId>,
    ) -> GameResult<HashMap<UserId, User>> {
        let users = self.users.read().await;
        user_ids
            .into_iter()
            .map(|id| {
                resolve_in(&users, id)
                    .cloned()
                    .map(|user| (id.clone(), user))
                    .ok_or_else(|| GameError::UserNotFound(id.clone()))
            })
            .collect()
    }

    pub async fn get_or_create_user(&self, identity: &Identity) -> UserId {
        let mut users = self.users.write().await;
        if let Some(existing) = users
            .values()
            .find(|u| u.token_identifier.as_deref() == Some(identity.token_identifier.as_str()))
        {
            return existing.id.clone();
        }

        let picture_url = identity.picture_url.clone().unwrap_or_else(|| {
            gravatar_url(
                identity
                    .email
                    .as_deref()
                    .unwrap_or(&identity.token_identifier),
            )
        });
        let user = User {
            id: new_id(),
            name: identity.name.clone(),
            picture_url,
            token_identifier: Some(identity.token_identifier.clone()),
            claimed_by_user_id: None,
        };
        let id = user.id.clone();
        users.insert(id.clone(), user);
        tracing::info!("Created user {} for login", id);
        id
    }

    /// Bind a session to a logged-in identity, carrying over everything the
    /// session's anonymous user created.
    pub async fn logged_in(&self, session_id: &str, identity: &Identity) -> GameResult<Caller> {
        let user_id = self.get_or_create_user(identity).await;

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| GameError::SessionNotFound(session_id.to_string()))?;
        if session.user_id == user_id {
            return Ok(Caller {
                session_id: session_id.to_string(),
                user_id,
            });
        }

        let old_user_id = std::mem::replace(&mut session.user_id, user_id.clone());
        let session = session.clone();
        drop(sessions);

        let mut users = self.users.write().await;
        let mut games = self.games.write().await;
        let mut rounds = self.rounds.write().await;
        let mut submissions = self.submissions.write().await;

        if let Some(old) = users.get_mut(&old_user_id) {
            if old.token_identifier.is_none() {
                old.claimed_by_user_id = Some(user_id.clone());
            }
        }

        let reassign = |id: &mut UserId| {
            if *id == old_user_id {
                *id = user_id.clone();
            }
        };

        for submission_id in &session.submission_ids {
            if let Some(submission) = submissions.get_mut(submission_id) {
                reassign(&mut submission.author_id);
            }
        }
        for game_id in &session.game_ids {
            let Some(game) = games.get_mut(game_id) else {
                continue;
            };
            reassign(&mut game.host_id);
            game.player_ids.iter_mut().for_each(reassign);
            for round_id in &game.round_ids {
                if let Some(round) = rounds.get_mut(round_id) {
                    reassign(&mut round.author_id);
                    for option in round.options.iter_mut() {
                        reassign(&mut option.author_id);
                    }
                }
            }
        }

        // Votes and likes can sit on rounds outside the session's games (public rounds)
        for round in rounds.values_mut() {
            carry_over_votes(round, &old_user_id, &user_id);
        }

        tracing::info!(
            "Session {} claimed: {} -> {}",
            session_id,
            old_user_id,
            user_id
        );
        Ok(Caller {
            session_id: session_id.to_string(),
            user_id,
        })
    }

    /// Reset the session to a brand new anonymous user with no history
    pub async fn logged_out(&self, session_id: &str) -> GameResult<Caller> {
        if !self.sessions.read().await.contains_key(session_id) {
            return Err(GameError::SessionNotFound(session_id.to_string()));
        }
        let user = self.create_anonymous_user().await;

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| GameError::SessionNotFound(session_id.to_string()))?;
        *session = Session {
            id: session_id.to_string(),
            user_id: user.id.clone(),
            submission_ids: vec![],
            game_ids: vec![],
        };

        Ok(Caller {
            session_id: session_id.to_string(),
            user_id: user.id,
        })
    }

    pub async fn set_name(&self, caller: &Caller, name: &str) -> GameResult<()> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_NAME_LENGTH {
            return Err(GameError::InvalidName);
        }
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&caller.user_id)
            .ok_or_else(|| GameError::UserNotFound(caller.user_id.clone()))?;
        user.name = name.to_string();
        Ok(())
    }

    /// Use one of the caller's own saved images as their picture
    pub async fn set_picture(&self, caller: &Caller, submission_id: &str) -> GameResult<()> {
        let submission = self
            .submissions
            .read()
            .await
            .get(submission_id)
            .cloned()
            .ok_or_else(|| GameError::SubmissionNotFound(submission_id.to_string()))?;
        if submission.author_id != caller.user_id {
            return Err(GameError::NotYourSubmission);
        }
        let SubmissionResult::Saved {
            image_storage_id, ..
        } = &submission.result
        else {
            return Err(GameError::SubmissionNotReady(submission.result.status()));
        };
        let picture_url = self
            .storage
            .url(image_storage_id)
            .await
            .ok_or_else(|| GameError::SubmissionNotFound(submission_id.to_string()))?;

        let mut users = self.users.write().await;
        let user = users
            .get_mut(&caller.user_id)
            .ok_or_else(|| GameError::UserNotFound(caller.user_id.clone()))?;
        user.picture_url = picture_url;
        Ok(())
    }

    pub(crate) async fn track_game(&self, session_id: &str, game_id: &str) {
        if let Some(session) = self.sessions.write().await.get_mut(session_id) {
            if !session.game_ids.iter().any(|id| id == game_id) {
                session.game_ids.push(game_id.to_string());
            }
        }
    }

    pub(crate) async fn track_submission(&self, session_id: &str, submission_id: &str) {
        if let Some(session) = self.sessions.write().await.get_mut(session_id) {
            session.submission_ids.push(submission_id.to_string());
        }
    }
}
