//! medbot - conversational medical record assistant
//!
//! Operators register patients and author prescriptions through a guided
//! dialogue. Each operator's dialogue is a state machine driven by its own
//! runtime task, backed by a shared SQLite record store.

mod api;
mod config;
mod db;
mod menu;
mod parser;
mod replies;
mod runtime;
mod state_machine;

use api::{create_router, AppState};
use config::Config;
use db::Database;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medbot=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env();

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening record store");
    let db = Database::open(&config.db_path)?;

    tracing::info!(
        patient_choices = config.limits.patient_choices,
        patient_list = config.limits.patient_list,
        prescription_list = config.limits.prescription_list,
        "Listing limits"
    );
    let state = AppState::new(db, config.limits);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .layer(compression),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "medbot listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
