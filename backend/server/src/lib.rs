//! Documentation of the MindBloom admin backend.
//!
//! MindBloom is a mental-wellness site. Pages, games, the chat assistant and the journal all
//! live in the frontend. This server owns one thing: turning a pre-shared admin activation code
//! into admin privilege for exactly one account.
//!
//!
//!
//! # General Infrastructure
//! - User hits the gateway, which authenticates the session
//! - Gateway forwards to this server with the verified account in `x-account-id` /
//!   `x-account-email` and the shared secret in `x-gateway-token`
//! - Several server instances may run at once, they only share Redis
//! - The admin code registry is a single Redis key holding one JSON document
//!
//!
//!
//! # Claiming
//!
//! **Goal**: a code can never end up granted to two accounts, even when both submit it in the
//! same instant on different instances.
//!
//! - `POST /admin/claim` with `{"code": "..."}`
//! - The claim runs as an optimistic transaction against the registry key, see [`claims`]
//! - Same account submitting again (refresh, double click) is granted again
//! - `200 {"granted": false}` covers unknown and already claimed codes alike, the UI shows one
//!   generic denial
//! - `503` means the outcome is unknown and the UI asks the user to try again
//!
//!
//!
//! # Notes
//!
//! ## Why not a lock
//! An in-process mutex only serializes claims on one instance. `WATCH` / `MULTI` / `EXEC` makes
//! Redis itself reject the second writer, wherever it runs.
//!
//! ## Why one document
//! The registry is tiny and read whole on every claim. Keeping it as one key makes seeding and
//! claiming the same transaction, so the registry cannot be half seeded.
//!
//!
//!
//! # Setup
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
//!
//! Run locally without Redis.
//! ```sh
//! mkdir -p secrets && echo dev-token > secrets/GATEWAY_TOKEN
//! STORE_BACKEND=memory SECRETS_DIR=secrets RUST_LOG=info cargo run -p mindbloom
//! ```
//!
//! Inspect the registry.
//! ```sh
//! REDIS_URL=redis://127.0.0.1:6379 cargo run -p inspect
//! ```
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::{get, post},
};
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tokio::{net::TcpListener, signal::ctrl_c};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod claims;
pub mod config;
pub mod database;
pub mod error;
pub mod memory;
pub mod routes;
pub mod state;
pub mod utils;

use config::Config;
use error::AppError;
use routes::{claim_handler, health_handler, status_handler};
use state::AppState;

pub async fn start_server() -> Result<(), AppError> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load()?;

    info!("Initializing state...");
    let state = AppState::new(config).await?;

    info!("Starting server...");
    let app = router(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down...");
    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/admin/claim", post(claim_handler))
        .route("/admin/status", get(status_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
