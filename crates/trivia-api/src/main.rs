//! Trivia session orchestrator API server entry point.

use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;
use trivia_api::publisher::BroadcastPublisher;
use trivia_api::state::AppState;
use trivia_api::storage::LocalStorage;
use trivia_core::backoff::BackoffPolicy;
use trivia_core::clock::SystemClock;
use trivia_core::repository::ConfigRepository;
use trivia_core::rng::SystemRng;
use trivia_lobby::application::driver::{Driver, DriverIntervals};
use trivia_lobby::application::lobby::{Lobby, LobbyDeps};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting trivia session orchestrator");

    // Read configuration from environment.
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .map_err(|e| format!("PORT must be a valid u16: {e}"))?;
    let config_path = std::env::var("GAME_CONFIG_PATH").ok().map(PathBuf::from);
    let questions_path = std::env::var("QUESTIONS_PATH").ok().map(PathBuf::from);

    // Seed storage and build the orchestrator.
    let storage = Arc::new(LocalStorage::from_files(
        config_path.as_deref(),
        questions_path.as_deref(),
    )?);
    let initial_config = storage.load_game_config().await?;
    let publisher = BroadcastPublisher::new(1024);
    spawn_event_log(&publisher);

    let deps = LobbyDeps {
        clock: Arc::new(SystemClock),
        publisher: Arc::new(publisher),
        configs: storage.clone(),
        questions: storage.clone(),
        progress: storage,
        backoff: BackoffPolicy::default(),
        config_rng: Box::new(SystemRng::new()),
        write_rng: Box::new(SystemRng::new()),
    };
    let lobby = Arc::new(Lobby::new(deps, &initial_config));
    lobby.bootstrap().await?;
    let _driver = Driver::spawn(&lobby, DriverIntervals::default());

    let app = trivia_api::app(AppState::new(lobby.clone()));

    // Start server.
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| format!("invalid HOST:PORT combination: {e}"))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    lobby.shutdown().await;

    Ok(())
}

/// Mirrors every published event into the log until a transport front end
/// subscribes to the publisher.
fn spawn_event_log(publisher: &BroadcastPublisher) {
    let mut rx = publisher.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(published) => tracing::debug!(
                    channel = ?published.channel,
                    event = published.event.name(),
                    "event published"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event log lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}
