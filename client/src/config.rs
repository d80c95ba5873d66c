//! Application configuration loaded from environment variables.
//!
//! Required: `GAME_PROGRAM_ID`
//! Optional: `RPC_URL`, `WS_URL`, `PLAYER_KEYPAIR_PATH`, `CLUSTER`,
//!           `HTTP_PORT`, `MAX_RETRIES`, `INITIAL_RETRY_DELAY_MS`,
//!           `ROLL_TIMEOUT_SECS`, `OUTCOME_CACHE_CAPACITY`

use anyhow::{Context, Result};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{read_keypair_file, Keypair};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Application configuration for the dice client.
#[derive(Clone)]
pub struct AppConfig {
    /// Solana JSON-RPC endpoint (HTTP).
    pub rpc_url: String,
    /// Solana PubSub endpoint (WebSocket) for log subscriptions.
    pub ws_url: String,
    /// Player keypair; signs and pays for `roll_dice`.
    pub player_keypair: Arc<Keypair>,
    /// The deployed roll-dice program ID.
    pub game_program_id: Pubkey,
    /// Cluster name for explorer URLs.
    pub cluster: String,
    /// HTTP server port.
    pub http_port: u16,
    /// Maximum send attempts per roll.
    pub max_retries: u32,
    /// Initial retry delay in milliseconds.
    pub initial_retry_delay_ms: u64,
    /// Deadline for `POST /roll`; `None` waits indefinitely.
    pub roll_timeout: Option<Duration>,
    /// How many unmatched or settled request ids the correlator remembers.
    pub outcome_cache_capacity: usize,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let rpc_url = std::env::var("RPC_URL").unwrap_or_else(|_| "http://127.0.0.1:8899".into());
        let ws_url = std::env::var("WS_URL").unwrap_or_else(|_| "ws://127.0.0.1:8900".into());

        let keypair_path = std::env::var("PLAYER_KEYPAIR_PATH")
            .unwrap_or_else(|_| "~/.config/solana/id.json".into());
        let keypair_path = shellexpand::tilde(&keypair_path).to_string();
        let player_keypair = read_keypair_file(&keypair_path)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("failed to read keypair from {keypair_path}"))?;

        let program_id_str =
            std::env::var("GAME_PROGRAM_ID").context("GAME_PROGRAM_ID env var must be set")?;
        let game_program_id = Pubkey::from_str(&program_id_str)
            .with_context(|| format!("invalid GAME_PROGRAM_ID: {program_id_str}"))?;

        let cluster = std::env::var("CLUSTER").unwrap_or_else(|_| "devnet".into());

        // 0 disables the deadline.
        let roll_timeout = match env_or("ROLL_TIMEOUT_SECS", 120u64) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            rpc_url,
            ws_url,
            player_keypair: Arc::new(player_keypair),
            game_program_id,
            cluster,
            http_port: env_or("HTTP_PORT", 8080),
            max_retries: env_or("MAX_RETRIES", 5u32).max(1),
            initial_retry_delay_ms: env_or("INITIAL_RETRY_DELAY_MS", 500),
            roll_timeout,
            outcome_cache_capacity: env_or("OUTCOME_CACHE_CAPACITY", 1024),
        })
    }

    /// Return the Solscan explorer URL for a given transaction signature.
    pub fn explorer_url(&self, signature: &str) -> String {
        match self.cluster.as_str() {
            "mainnet-beta" => format!("https://solscan.io/tx/{signature}"),
            cluster => format!("https://solscan.io/tx/{signature}?cluster={cluster}"),
        }
    }
}
