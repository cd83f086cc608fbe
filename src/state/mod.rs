mod game;
mod presence;
mod public_game;
mod round;
pub mod score;
pub mod similarity;
mod submission;
mod user;

pub use game::{generate_slug, GameView, PlayerSummary};
pub use presence::PresenceEntry;
pub use round::{
    GuessView, LabelView, OptionResult, PlayerBadge, RevealView, RoundView, ScoreDelta, UserInfo,
};
pub use submission::{SubmissionHealth, SubmissionView};
pub use user::Identity;

use crate::clock::{Clock, SystemClock};
use crate::config::GameConfig;
use crate::error::GameResult;
use crate::images::{BlobStorage, ImageProvider, MemoryBlobStorage};
use crate::protocol::ServerMessage;
use crate::scheduler::{ManualScheduler, ScheduledTask, Scheduler};
use crate::types::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// External collaborators the state machines depend on
#[derive(Clone)]
pub struct Services {
    pub clock: Arc<dyn Clock>,
    pub scheduler: Arc<dyn Scheduler>,
    /// None = image generation and moderation unavailable
    pub images: Option<Arc<dyn ImageProvider>>,
    pub storage: Arc<dyn BlobStorage>,
}

impl Default for Services {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            scheduler: Arc::new(ManualScheduler::new()),
            images: None,
            storage: Arc::new(MemoryBlobStorage::default()),
        }
    }
}

/// Shared application state.
///
/// Every mutating operation holds the write lock of the tables it touches for
/// its whole read-modify-write, which makes each state transition atomic.
/// Locks are always taken in this order: sessions, users, games, public_game,
/// rounds, submissions, presence.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<RwLock<HashMap<UserId, User>>>,
    pub sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
    pub games: Arc<RwLock<HashMap<GameId, Game>>>,
    pub public_game: Arc<RwLock<Option<PublicGame>>>,
    pub rounds: Arc<RwLock<HashMap<RoundId, Round>>>,
    pub submissions: Arc<RwLock<HashMap<SubmissionId, Submission>>>,
    /// Keyed by (session, game)
    pub presence: Arc<RwLock<HashMap<(SessionId, String), Presence>>>,
    pub config: Arc<GameConfig>,
    pub clock: Arc<dyn Clock>,
    pub scheduler: Arc<dyn Scheduler>,
    pub images: Option<Arc<dyn ImageProvider>>,
    pub storage: Arc<dyn BlobStorage>,
    /// Change notices for all connected clients
    pub broadcast: broadcast::Sender<ServerMessage>,
    seq: Arc<AtomicU64>,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_services(GameConfig::default(), Services::default())
    }

    pub fn with_services(config: GameConfig, services: Services) -> Self {
        let (tx, _rx) = broadcast::channel(100);
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            games: Arc::new(RwLock::new(HashMap::new())),
            public_game: Arc::new(RwLock::new(None)),
            rounds: Arc::new(RwLock::new(HashMap::new())),
            submissions: Arc::new(RwLock::new(HashMap::new())),
            presence: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
            clock: services.clock,
            scheduler: services.scheduler,
            images: services.images,
            storage: services.storage,
            broadcast: tx,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn now(&self) -> Millis {
        self.clock.now_ms()
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Send to every connected client, ignoring the no-receiver case
    pub fn broadcast_to_all(&self, msg: ServerMessage) {
        let _ = self.broadcast.send(msg);
    }

    /// Execute a task previously handed to the scheduler
    pub async fn run_scheduled(&self, task: ScheduledTask) -> GameResult<()> {
        match task {
            ScheduledTask::RoundProgress {
                round_id,
                from_stage,
            } => self.progress_round(&round_id, from_stage).await,
            ScheduledTask::GameProgress {
                game_id,
                host_id,
                from_stage,
            } => self.progress_game(&host_id, &game_id, from_stage).await,
            ScheduledTask::PublicGameProgress { from_stage } => self
                .progress_public_game(from_stage)
                .await
                .map(|_| ()),
            ScheduledTask::GenerateImage { submission_id } => {
                self.generate_image(&submission_id).await;
                Ok(())
            }
            ScheduledTask::SubmissionTimeout { submission_id } => {
                self.timeout_submission(&submission_id).await
            }
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

fn new_id() -> String {
    ulid::Ulid::new().to_string()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::clock::ManualClock;
    use crate::images::ScriptedImageProvider;

    pub const START: Millis = 1_700_000_000_000;

    pub struct Harness {
        pub state: AppState,
        pub clock: Arc<ManualClock>,
        pub scheduler: Arc<ManualScheduler>,
    }

    pub fn harness() -> Harness {
        harness_with(GameConfig::default(), Some(Arc::new(ScriptedImageProvider::new())))
    }

    pub fn harness_with(config: GameConfig, images: Option<Arc<dyn ImageProvider>>) -> Harness {
        let clock = Arc::new(ManualClock::new(START));
        let scheduler = Arc::new(ManualScheduler::new());
        let state = AppState::with_services(
            config,
            Services {
                clock: clock.clone(),
                scheduler: scheduler.clone(),
                images,
                storage: Arc::new(MemoryBlobStorage::default()),
            },
        );
        Harness {
            state,
            clock,
            scheduler,
        }
    }

    /// Insert a saved submission with a stored image for `user_id`
    pub async fn saved_submission(state: &AppState, user_id: &str, prompt: &str) -> SubmissionId {
        let storage_id = state
            .storage
            .store(prompt.as_bytes().to_vec(), "image/png".to_string())
            .await
            .unwrap();
        let submission = Submission {
            id: new_id(),
            prompt: prompt.to_string(),
            author_id: user_id.to_string(),
            result: SubmissionResult::Saved {
                image_storage_id: storage_id,
                elapsed_ms: 1200,
            },
            last_used: None,
            created_at: state.now(),
            seq: state.next_seq(),
        };
        let id = submission.id.clone();
        state.submissions.write().await.insert(id.clone(), submission);
        id
    }

    /// Insert a label-stage round owned by `author_id`
    pub async fn label_round(state: &AppState, author_id: &str, prompt: &str) -> RoundId {
        let storage_id = state
            .storage
            .store(prompt.as_bytes().to_vec(), "image/png".to_string())
            .await
            .unwrap();
        let round = state.new_round(author_id, &storage_id, prompt);
        let id = round.id.clone();
        state.rounds.write().await.insert(id.clone(), round);
        id
    }

    /// Insert a game in generate stage hosted by the first of `player_ids`
    pub async fn game_with_players(state: &AppState, player_ids: &[UserId]) -> GameId {
        let game = Game {
            id: new_id(),
            host_id: player_ids[0].clone(),
            player_ids: player_ids.to_vec(),
            slug: "BCDF".to_string(),
            round_ids: vec![],
            state: GameState::Generate,
            next_game_id: None,
            created_at: state.now(),
            seq: state.next_seq(),
        };
        let id = game.id.clone();
        state.games.write().await.insert(id.clone(), game);
        id
    }

    /// A fresh anonymous user with a session, as a connection would get
    pub async fn anonymous_caller(state: &AppState) -> Caller {
        let session = state.create_session().await;
        state.caller(&session.id).await.unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_new_state_is_empty() {
        let state = AppState::new();
        assert!(state.games.read().await.is_empty());
        assert!(state.public_game.read().await.is_none());
        assert!(state.images.is_none());
    }

    #[tokio::test]
    async fn test_run_scheduled_round_progress() {
        let h = harness();
        let round_id = label_round(&h.state, "author", "A cat in space").await;

        h.state
            .run_scheduled(ScheduledTask::RoundProgress {
                round_id: round_id.clone(),
                from_stage: RoundStage::Label,
            })
            .await
            .unwrap();

        let round = h.state.rounds.read().await.get(&round_id).cloned().unwrap();
        assert_eq!(round.stage, RoundStage::Guess);
    }

    #[tokio::test]
    async fn test_run_scheduled_unknown_round_is_error() {
        let h = harness();
        let result = h
            .state
            .run_scheduled(ScheduledTask::RoundProgress {
                round_id: "missing".to_string(),
                from_stage: RoundStage::Label,
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_transitions_notify_clients() {
        let h = harness();
        let round_id = label_round(&h.state, "author", "A cat in space").await;
        let mut rx = h.state.broadcast.subscribe();

        h.state
            .progress_round(&round_id, RoundStage::Label)
            .await
            .unwrap();

        match rx.try_recv().unwrap() {
            ServerMessage::RoundChanged { round_id: id, stage } => {
                assert_eq!(id, round_id);
                assert_eq!(stage, RoundStage::Guess);
            }
            other => panic!("Expected RoundChanged, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_broadcast_without_receivers_is_fine() {
        let state = AppState::new();
        state.broadcast_to_all(ServerMessage::PublicGameChanged {
            round_id: "r".to_string(),
        });
    }
}
