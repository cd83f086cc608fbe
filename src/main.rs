use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use promptguess::{
    api, broadcast,
    clock::SystemClock,
    config::GameConfig,
    images::{ImageConfig, ImageProvider, MemoryBlobStorage},
    scheduler::{spawn_task_runner, TokioScheduler},
    state::{AppState, Services},
};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "promptguess=debug,tower_http=debug,axum=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting promptguess...");

    let config = GameConfig::from_env();

    let image_config = ImageConfig::from_env();
    let images: Option<Arc<dyn ImageProvider>> = match image_config.build_provider() {
        Ok(provider) => {
            tracing::info!("Image provider initialized: {}", provider.name());
            Some(Arc::new(provider))
        }
        Err(e) => {
            tracing::warn!(
                "Failed to initialize image provider: {}. Submissions will fail.",
                e
            );
            None
        }
    };

    let (scheduler, jobs) = TokioScheduler::new();
    let state = Arc::new(AppState::with_services(
        config.clone(),
        Services {
            clock: Arc::new(SystemClock),
            scheduler: Arc::new(scheduler),
            images,
            storage: Arc::new(MemoryBlobStorage::new("/images")),
        },
    ));

    spawn_task_runner(state.clone(), jobs);
    broadcast::spawn_public_game_ticker(state.clone());

    let app = api::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}
