//! Dice client
//!
//! Off-chain service that submits dice rolls for one player and hands each
//! caller the outcome of its own roll once the oracle fulfills it. Runs two
//! concurrent subsystems:
//!
//! - **Listener**: WebSocket subscription to `DiceLanded` events + catch-up
//!   re-reads of awaited rolls after every reconnect.
//! - **HTTP server**: `POST /roll` submits a roll and waits for its outcome;
//!   liveness (`/health`) and status (`/status`) checks.

use actix_web::{web, App, HttpResponse, HttpServer};
use serde::Serialize;
use solana_sdk::signature::Signer;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

mod accounts;
mod config;
mod correlator;
mod events;
mod listener;
mod metrics;
mod submitter;

use config::AppConfig;
use correlator::{RequestCorrelator, RollError};
use metrics::Metrics;
use submitter::{DiceClient, SolanaDispatcher};

/// Shared application state accessible from HTTP handlers.
struct AppState {
    client: DiceClient<SolanaDispatcher>,
    correlator: RequestCorrelator,
    metrics: Arc<Metrics>,
    roll_timeout: Option<Duration>,
}

/// Body of a successful `POST /roll`.
#[derive(Serialize)]
struct RollResponse {
    request_id: u64,
    player: String,
    result: u8,
}

/// Liveness check: returns 200 if the process is running.
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}

/// Status check: reports in-flight waits and counters.
async fn status(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "running",
        "pending_rolls": data.correlator.pending_count(),
        "metrics": data.metrics.to_json(),
    }))
}

/// Submit a roll and wait for its outcome.
///
/// If the HTTP request is dropped, the handler future is dropped with it and
/// the wait is cancelled.
async fn roll(data: web::Data<AppState>) -> HttpResponse {
    let pending = match data.client.submit_roll().await {
        Ok(pending) => pending,
        Err(e) => {
            return HttpResponse::BadGateway().json(serde_json::json!({"error": e.to_string()}));
        }
    };
    let request_id = pending.request_id();

    let outcome = match data.roll_timeout {
        Some(timeout) => pending.wait_timeout(timeout).await,
        None => pending.wait().await,
    };

    match outcome {
        Ok(outcome) => HttpResponse::Ok().json(RollResponse {
            request_id: outcome.request_id,
            player: outcome.player.to_string(),
            result: outcome.result,
        }),
        Err(e @ RollError::TimedOut(_)) => {
            warn!(request_id, "Roll outcome not observed in time");
            HttpResponse::GatewayTimeout().json(serde_json::json!({
                "request_id": request_id,
                "error": e.to_string(),
            }))
        }
        Err(e) => HttpResponse::InternalServerError().json(serde_json::json!({
            "request_id": request_id,
            "error": e.to_string(),
        })),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,solana_client=warn,solana_rpc_client=warn,hyper=warn")
            }),
        )
        .with_target(true)
        .with_ansi(true)
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Invalid configuration");
            return Err(std::io::Error::other(e.to_string()));
        }
    };

    info!(
        program = %config.game_program_id,
        player = %config.player_keypair.pubkey(),
        "Starting dice client"
    );
    info!(rpc = %config.rpc_url, ws = %config.ws_url, "Endpoints configured");

    let metrics = Arc::new(Metrics::new());
    let correlator = RequestCorrelator::new(config.outcome_cache_capacity, metrics.clone());
    let rpc_client = submitter::rpc_client(&config);

    // Background: stream outcomes into the correlator.
    let listener_config = config.clone();
    let listener_rpc = rpc_client.clone();
    let listener_correlator = correlator.clone();
    tokio::spawn(async move {
        listener::listen_for_outcomes(listener_config, listener_rpc, listener_correlator).await;
    });

    let state = web::Data::new(AppState {
        client: DiceClient::new(
            SolanaDispatcher::new(rpc_client, config.clone()),
            correlator.clone(),
            metrics.clone(),
        ),
        correlator,
        metrics,
        roll_timeout: config.roll_timeout,
    });

    let addr = format!("0.0.0.0:{}", config.http_port);
    info!(addr = %addr, "Starting HTTP server");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/health", web::get().to(health))
            .route("/status", web::get().to(status))
            .route("/roll", web::post().to(roll))
    })
    .bind(addr)?
    .run()
    .await
}
