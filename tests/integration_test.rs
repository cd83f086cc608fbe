use axum::body::Body;
use axum::http::{Request, StatusCode};
use promptguess::clock::ManualClock;
use promptguess::config::GameConfig;
use promptguess::images::{ImageProvider, MemoryBlobStorage, ScriptedImageProvider};
use promptguess::protocol::{ClientMessage, ServerMessage};
use promptguess::scheduler::{ManualScheduler, ScheduledTask};
use promptguess::state::{AppState, RoundView, Services, SubmissionView};
use promptguess::types::{GameId, GameStage, GameState, Millis, RoundId, RoundStage, SubmissionId};
use promptguess::ws::handlers::handle_message;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const START: Millis = 1_700_000_000_000;

struct TestServer {
    state: Arc<AppState>,
    clock: Arc<ManualClock>,
    scheduler: Arc<ManualScheduler>,
}

fn server_with(images: Arc<dyn ImageProvider>) -> TestServer {
    let clock = Arc::new(ManualClock::new(START));
    let scheduler = Arc::new(ManualScheduler::new());
    let state = AppState::with_services(
        GameConfig::default(),
        Services {
            clock: clock.clone(),
            scheduler: scheduler.clone(),
            images: Some(images),
            storage: Arc::new(MemoryBlobStorage::default()),
        },
    );
    TestServer {
        state: Arc::new(state),
        clock,
        scheduler,
    }
}

fn server() -> TestServer {
    server_with(Arc::new(ScriptedImageProvider::new()))
}

impl TestServer {
    async fn session(&self) -> String {
        self.state.create_session().await.id
    }

    async fn send(&self, session_id: &str, msg: ClientMessage) -> ServerMessage {
        handle_message(msg, session_id, &self.state)
            .await
            .expect("every client message gets a reply")
    }

    /// Run queued jobs the way the task runner would, keeping only those `keep` accepts
    async fn run_jobs(&self, keep: impl Fn(&ScheduledTask) -> bool) {
        for job in self.scheduler.take() {
            if keep(&job.task) {
                let _ = self.state.run_scheduled(job.task).await;
            }
        }
    }

    async fn run_generation(&self) {
        self.run_jobs(|task| matches!(task, ScheduledTask::GenerateImage { .. }))
            .await;
    }

    async fn start_submission(&self, session_id: &str, prompt: &str) -> SubmissionId {
        match self
            .send(
                session_id,
                ClientMessage::StartSubmission {
                    prompt: prompt.to_string(),
                },
            )
            .await
        {
            ServerMessage::SubmissionStarted { submission_id } => submission_id,
            other => panic!("Expected SubmissionStarted, got {:?}", other),
        }
    }

    async fn submission(&self, session_id: &str, submission_id: &str) -> SubmissionView {
        match self
            .send(
                session_id,
                ClientMessage::GetSubmission {
                    submission_id: submission_id.to_string(),
                },
            )
            .await
        {
            ServerMessage::Submission { submission, .. } => submission,
            other => panic!("Expected Submission, got {:?}", other),
        }
    }

    async fn round(&self, session_id: &str, round_id: &str) -> RoundView {
        match self
            .send(
                session_id,
                ClientMessage::GetRound {
                    round_id: round_id.to_string(),
                },
            )
            .await
        {
            ServerMessage::Round { round, .. } => round,
            other => panic!("Expected Round, got {:?}", other),
        }
    }

    async fn game_state(&self, game_id: &str) -> GameState {
        self.state.games.read().await[game_id].state.clone()
    }

    async fn user_id(&self, session_id: &str) -> String {
        self.state.caller(session_id).await.unwrap().user_id
    }
}

fn assert_ack(msg: ServerMessage) {
    assert!(matches!(msg, ServerMessage::Ack), "Expected Ack, got {:?}", msg);
}

fn assert_action_ok(msg: ServerMessage) {
    match msg {
        ServerMessage::Action { result } => assert!(result.success, "{:?}", result),
        other => panic!("Expected Action, got {:?}", other),
    }
}

/// Create a game hosted by the first session and join everyone else
async fn lobby(server: &TestServer, sessions: &[String]) -> GameId {
    let game_id = match server.send(&sessions[0], ClientMessage::CreateGame).await {
        ServerMessage::GameCreated { game_id } => game_id,
        other => panic!("Expected GameCreated, got {:?}", other),
    };
    let code = server.state.games.read().await[&game_id].slug.clone();
    for session_id in &sessions[1..] {
        let joined = server
            .send(
                session_id,
                ClientMessage::JoinGame {
                    game_code: code.to_lowercase(),
                },
            )
            .await;
        assert!(
            matches!(&joined, ServerMessage::GameJoined { game_id: id } if id == &game_id),
            "Expected GameJoined, got {:?}",
            joined
        );
    }
    game_id
}

/// End-to-end game: lobby, generation, one played round, recap, play again
#[tokio::test]
async fn test_full_game_flow() {
    let server = server();
    let sessions = vec![
        server.session().await,
        server.session().await,
        server.session().await,
    ];
    let host = server.user_id(&sessions[0]).await;
    let second = server.user_id(&sessions[1]).await;
    let third = server.user_id(&sessions[2]).await;

    let game_id = lobby(&server, &sessions).await;
    assert_ack(
        server
            .send(
                &sessions[0],
                ClientMessage::ProgressGame {
                    game_id: game_id.clone(),
                    from_stage: GameStage::Lobby,
                },
            )
            .await,
    );
    assert_eq!(server.game_state(&game_id).await, GameState::Generate);

    // Everyone generates an image and submits it
    let prompts = ["a cat in space", "a dog on the moon", "robots playing chess"];
    let mut submission_ids = vec![];
    for (session_id, prompt) in sessions.iter().zip(prompts) {
        submission_ids.push(server.start_submission(session_id, prompt).await);
    }
    server.run_generation().await;
    for (session_id, submission_id) in sessions.iter().zip(&submission_ids) {
        assert!(matches!(
            server.submission(session_id, submission_id).await,
            SubmissionView::Saved { .. }
        ));
        assert_ack(
            server
                .send(
                    session_id,
                    ClientMessage::SubmitToGame {
                        game_id: game_id.clone(),
                        submission_id: submission_id.clone(),
                    },
                )
                .await,
        );
    }

    let round_ids = server.state.games.read().await[&game_id].round_ids.clone();
    assert_eq!(round_ids.len(), 3);
    assert_eq!(
        server.game_state(&game_id).await,
        GameState::Rounds {
            round_id: round_ids[0].clone()
        }
    );
    let first_round = round_ids[0].clone();
    assert!(matches!(
        server.round(&sessions[0], &first_round).await,
        RoundView::Label(view) if view.mine
    ));

    // Label: the two other players add decoys, the round fills up
    for (session_id, decoy) in sessions[1..].iter().zip(["a lighthouse at dusk", "pancakes on mars"]) {
        assert_action_ok(
            server
                .send(
                    session_id,
                    ClientMessage::AddOption {
                        round_id: first_round.clone(),
                        prompt: decoy.to_string(),
                        game_id: Some(game_id.clone()),
                    },
                )
                .await,
        );
    }
    let RoundView::Guess(guess) = server.round(&sessions[1], &first_round).await else {
        panic!("Round should be in guess stage once full");
    };
    assert_eq!(guess.options.len(), 3);
    assert_eq!(guess.my_prompt.as_deref(), Some("a lighthouse at dusk"));

    // Guess: second finds the real prompt, third falls for second's decoy
    assert_action_ok(
        server
            .send(
                &sessions[1],
                ClientMessage::Guess {
                    round_id: first_round.clone(),
                    prompt: "a cat in space".to_string(),
                    game_id: Some(game_id.clone()),
                },
            )
            .await,
    );
    assert_action_ok(
        server
            .send(
                &sessions[2],
                ClientMessage::Guess {
                    round_id: first_round.clone(),
                    prompt: "a lighthouse at dusk".to_string(),
                    game_id: Some(game_id.clone()),
                },
            )
            .await,
    );

    // All votes in, the round reveals itself
    let RoundView::Reveal(reveal) = server.round(&sessions[2], &first_round).await else {
        panic!("Round should reveal once everyone voted");
    };
    assert_eq!(reveal.author_id, host);
    assert_eq!(reveal.results.len(), 3);

    let game = match server
        .send(
            &sessions[0],
            ClientMessage::GetGame {
                game_id: game_id.clone(),
            },
        )
        .await
    {
        ServerMessage::Game { game, .. } => game,
        other => panic!("Expected Game, got {:?}", other),
    };
    assert!(game.hosting);
    let score_of = |user_id: &str| {
        game.players
            .iter()
            .find(|p| p.user_id == user_id)
            .map(|p| p.score)
            .unwrap()
    };
    assert_eq!(score_of(&host), 1000);
    assert_eq!(score_of(&second), 700);
    assert_eq!(score_of(&third), 0);

    // The host walks through the remaining rounds to the recap
    for _ in 0..3 {
        assert_ack(
            server
                .send(
                    &sessions[0],
                    ClientMessage::ProgressGame {
                        game_id: game_id.clone(),
                        from_stage: GameStage::Rounds,
                    },
                )
                .await,
        );
    }
    assert_eq!(server.game_state(&game_id).await, GameState::Recap);

    // Play again from two players lands both in the same new lobby
    let mut next_ids = vec![];
    for session_id in &sessions[1..] {
        match server
            .send(
                session_id,
                ClientMessage::PlayAgain {
                    old_game_id: game_id.clone(),
                },
            )
            .await
        {
            ServerMessage::GameJoined { game_id } => next_ids.push(game_id),
            other => panic!("Expected GameJoined, got {:?}", other),
        }
    }
    assert_eq!(next_ids[0], next_ids[1]);
    let next = server.state.games.read().await[&next_ids[0]].clone();
    assert_eq!(next.state, GameState::Lobby);
    assert_eq!(next.host_id, second);
    assert!(next.has_player(&third));
}

#[tokio::test]
async fn test_stale_and_foreign_progress() {
    let server = server();
    let sessions = vec![server.session().await, server.session().await];
    let game_id = lobby(&server, &sessions).await;

    let progress = |from_stage| ClientMessage::ProgressGame {
        game_id: game_id.clone(),
        from_stage,
    };

    match server.send(&sessions[1], progress(GameStage::Lobby)).await {
        ServerMessage::Error { code, .. } => assert_eq!(code, "NOT_HOST"),
        other => panic!("Expected Error, got {:?}", other),
    }
    assert_ack(server.send(&sessions[0], progress(GameStage::Lobby)).await);
    // A second click on the same button is absorbed
    assert_ack(server.send(&sessions[0], progress(GameStage::Lobby)).await);
    assert_eq!(server.game_state(&game_id).await, GameState::Generate);

    // Nobody submitted, the generate fallback cannot start rounds
    match server.send(&sessions[0], progress(GameStage::Generate)).await {
        ServerMessage::Error { code, .. } => assert_eq!(code, "NO_ROUNDS"),
        other => panic!("Expected Error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_generate_fallback_is_scheduled_for_the_host() {
    let server = server();
    let sessions = vec![server.session().await, server.session().await];
    let game_id = lobby(&server, &sessions).await;
    let submission_id = server.start_submission(&sessions[0], "a cat in space").await;
    server.run_generation().await;

    server
        .send(
            &sessions[0],
            ClientMessage::ProgressGame {
                game_id: game_id.clone(),
                from_stage: GameStage::Lobby,
            },
        )
        .await;
    // Only the host submits, the fallback moves on without waiting for the rest
    server
        .send(
            &sessions[0],
            ClientMessage::SubmitToGame {
                game_id: game_id.clone(),
                submission_id,
            },
        )
        .await;
    assert_eq!(server.game_state(&game_id).await, GameState::Generate);

    server
        .run_jobs(|task| matches!(task, ScheduledTask::GameProgress { .. }))
        .await;
    assert!(matches!(
        server.game_state(&game_id).await,
        GameState::Rounds { .. }
    ));
}

#[tokio::test]
async fn test_flagged_prompt_fails_submission() {
    let server = server_with(Arc::new(ScriptedImageProvider::new().flagging(&["gore"])));
    let session_id = server.session().await;

    let submission_id = server.start_submission(&session_id, "so much gore").await;
    assert!(matches!(
        server.submission(&session_id, &submission_id).await,
        SubmissionView::Generating { .. }
    ));
    server.run_generation().await;

    match server.submission(&session_id, &submission_id).await {
        SubmissionView::Failed { reason, .. } => {
            assert_eq!(reason, "Your prompt was flagged: harassment")
        }
        other => panic!("Expected Failed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_timeout_watchdog_wins_over_late_image() {
    let server = server();
    let session_id = server.session().await;
    let submission_id = server.start_submission(&session_id, "a cat in space").await;

    let jobs = server.scheduler.take();
    assert_eq!(jobs.len(), 2);
    let (generate, timeout): (Vec<_>, Vec<_>) = jobs
        .into_iter()
        .partition(|job| matches!(job.task, ScheduledTask::GenerateImage { .. }));
    assert_eq!(timeout[0].delay, server.state.config.image_timeout);

    server.clock.advance(server.state.config.image_timeout);
    server
        .state
        .run_scheduled(timeout[0].task.clone())
        .await
        .unwrap();
    // The provider answers after the deadline
    let _ = server.state.run_scheduled(generate[0].task.clone()).await;

    match server.submission(&session_id, &submission_id).await {
        SubmissionView::Failed { reason, .. } => assert_eq!(reason, "Timed out"),
        other => panic!("Expected Failed, got {:?}", other),
    }

    let health = match server.send(&session_id, ClientMessage::SubmissionHealth).await {
        ServerMessage::Health { health } => health,
        other => panic!("Expected Health, got {:?}", other),
    };
    assert_eq!(health.success_ratio, 0.0);
}

#[tokio::test]
async fn test_submissions_are_private() {
    let server = server();
    let owner = server.session().await;
    let stranger = server.session().await;
    let submission_id = server.start_submission(&owner, "a cat in space").await;

    match server
        .send(&stranger, ClientMessage::GetSubmission { submission_id })
        .await
    {
        ServerMessage::Error { code, .. } => assert_eq!(code, "NOT_YOUR_SUBMISSION"),
        other => panic!("Expected Error, got {:?}", other),
    }
}

/// Drive the public loop one window at a time
async fn public_step(server: &TestServer, session_id: &str, from_stage: RoundStage, wait: Duration) {
    server.clock.advance(wait + Duration::from_millis(1));
    assert_ack(
        server
            .send(session_id, ClientMessage::ProgressPublicGame { from_stage })
            .await,
    );
}

async fn public_round(server: &TestServer, session_id: &str) -> RoundId {
    match server.send(session_id, ClientMessage::GetPublicGame).await {
        ServerMessage::PublicGame { round_id } => round_id,
        other => panic!("Expected PublicGame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_public_game_rotates_least_recently_used() {
    let server = server();
    let author = server.session().await;
    let viewer = server.session().await;
    server.start_submission(&author, "a cat in space").await;
    server.clock.advance(Duration::from_millis(10));
    server.start_submission(&author, "a dog on the moon").await;
    server.run_generation().await;

    let config = server.state.config.clone();
    let mut images = vec![];
    for _ in 0..3 {
        if server.state.public_game.read().await.is_none() {
            public_step(&server, &viewer, RoundStage::Reveal, Duration::ZERO).await;
        } else {
            public_step(&server, &viewer, RoundStage::Reveal, config.public_reveal_duration).await;
        }
        let round_id = public_round(&server, &viewer).await;
        let round = server.state.rounds.read().await[&round_id].clone();
        assert_eq!(round.stage, RoundStage::Guess);
        images.push(round.image_storage_id.clone());

        // A duplicate trigger for a stage that already passed changes nothing
        public_step(&server, &viewer, RoundStage::Reveal, Duration::ZERO).await;
        assert_eq!(public_round(&server, &viewer).await, round_id);

        assert_action_ok(
            server
                .send(
                    &viewer,
                    ClientMessage::Guess {
                        round_id: round_id.clone(),
                        prompt: round.options[0].prompt.clone(),
                        game_id: None,
                    },
                )
                .await,
        );
        public_step(&server, &viewer, RoundStage::Guess, config.public_guess_duration).await;
        assert!(matches!(
            server.round(&viewer, &round_id).await,
            RoundView::Reveal(_)
        ));
    }

    assert_ne!(images[0], images[1]);
    assert_eq!(images[0], images[2]);
}

#[tokio::test]
async fn test_login_keeps_anonymous_games() {
    let server = server();
    let session_id = server.session().await;
    let anonymous = server.user_id(&session_id).await;
    let game_id = match server.send(&session_id, ClientMessage::CreateGame).await {
        ServerMessage::GameCreated { game_id } => game_id,
        other => panic!("Expected GameCreated, got {:?}", other),
    };

    let user_id = match server
        .send(
            &session_id,
            ClientMessage::LoggedIn {
                token_identifier: "issuer|alice".to_string(),
                name: "Alice".to_string(),
                picture_url: None,
                email: Some("alice@example.com".to_string()),
            },
        )
        .await
    {
        ServerMessage::SessionUser { user_id } => user_id,
        other => panic!("Expected SessionUser, got {:?}", other),
    };
    assert_ne!(user_id, anonymous);

    match server.send(&session_id, ClientMessage::GetGame { game_id }).await {
        ServerMessage::Game { game, .. } => {
            assert!(game.hosting);
            assert_eq!(game.players[0].name, "Alice");
        }
        other => panic!("Expected Game, got {:?}", other),
    }

    match server.send(&session_id, ClientMessage::LoggedOut).await {
        ServerMessage::SessionUser { user_id: fresh } => {
            assert_ne!(fresh, user_id);
            assert_ne!(fresh, anonymous);
        }
        other => panic!("Expected SessionUser, got {:?}", other),
    }
}

#[tokio::test]
async fn test_http_routes() {
    let server = server();
    let session_id = server.session().await;
    let submission_id = server.start_submission(&session_id, "a cat in space").await;
    server.run_generation().await;
    let url = match server.submission(&session_id, &submission_id).await {
        SubmissionView::Saved { url, .. } => url,
        other => panic!("Expected Saved, got {:?}", other),
    };

    let app = promptguess::api::router(server.state.clone());

    let response = app
        .clone()
        .oneshot(Request::builder().uri(&url).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/public-game")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
