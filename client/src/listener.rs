//! Outcome listener for the roll-dice program.
//!
//! Two complementary strategies ensure no awaited outcome is missed:
//!
//! 1. **Live stream** ([`listen_for_outcomes`]): subscribes to the game
//!    program's logs via WebSocket, decodes `DiceLanded` events and feeds
//!    them to the correlator. Auto-reconnects on disconnection.
//!
//! 2. **Catch-up** ([`catch_up`]): after every (re)connect, re-reads the
//!    `DiceRoll` account of each awaited request and resolves the ones
//!    published while the stream was down.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcTransactionLogsConfig, RpcTransactionLogsFilter};
use solana_commitment_config::CommitmentConfig;
use solana_sdk::signature::Signer;
use tracing::{debug, error, info, warn};

use crate::accounts::{dice_roll_address, parse_dice_roll};
use crate::config::AppConfig;
use crate::correlator::{Observation, RequestCorrelator, RollOutcome};
use crate::events::dice_landed_events;

/// Delay before reconnecting to the WebSocket after a disconnect or error.
const WS_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Resolve awaited rolls whose accounts already show a published outcome.
pub async fn catch_up(rpc_client: &RpcClient, config: &AppConfig, correlator: &RequestCorrelator) {
    let awaited = correlator.awaited_ids();
    if awaited.is_empty() {
        return;
    }
    info!(count = awaited.len(), "Re-reading awaited rolls");

    for request_id in awaited {
        let address = dice_roll_address(&config.game_program_id, request_id);
        let data = match rpc_client.get_account_data(&address).await {
            Ok(data) => data,
            Err(e) => {
                warn!(request_id, error = %e, "Failed to fetch dice roll account");
                continue;
            }
        };

        let Some(roll) = parse_dice_roll(&data) else {
            warn!(request_id, account = %address, "Malformed dice roll account, skipping");
            continue;
        };

        if roll.is_published() {
            deliver(
                correlator,
                RollOutcome {
                    request_id: roll.request_id,
                    player: roll.player,
                    result: roll.result,
                },
            );
        }
    }
}

/// Subscribe to the game program's logs and feed `DiceLanded` events to the
/// correlator. Automatically reconnects on disconnection.
pub async fn listen_for_outcomes(
    config: AppConfig,
    rpc_client: Arc<RpcClient>,
    correlator: RequestCorrelator,
) {
    let player = config.player_keypair.pubkey();

    loop {
        info!(url = %config.ws_url, "Connecting to WebSocket");

        match PubsubClient::new(&config.ws_url).await {
            Ok(pubsub) => {
                info!("WebSocket connected");

                let filter =
                    RpcTransactionLogsFilter::Mentions(vec![config.game_program_id.to_string()]);
                let logs_config = RpcTransactionLogsConfig {
                    commitment: Some(CommitmentConfig::confirmed()),
                };

                match pubsub.logs_subscribe(filter, logs_config).await {
                    Ok((mut stream, _unsub)) => {
                        catch_up(&rpc_client, &config, &correlator).await;

                        while let Some(log_result) = stream.next().await {
                            if log_result.value.err.is_some() {
                                continue;
                            }
                            // Only this client's player is tracked.
                            for outcome in
                                dice_landed_events(&log_result.value.logs, &config.game_program_id)
                                    .into_iter()
                                    .filter(|outcome| outcome.player == player)
                            {
                                deliver(&correlator, outcome);
                            }
                        }
                        warn!("WebSocket stream ended, reconnecting");
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to subscribe to logs");
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to connect to WebSocket");
            }
        }

        info!(delay = ?WS_RECONNECT_DELAY, "Reconnecting");
        tokio::time::sleep(WS_RECONNECT_DELAY).await;
    }
}

fn deliver(correlator: &RequestCorrelator, outcome: RollOutcome) {
    match correlator.observe(&outcome) {
        Observation::Resolved => info!(
            request_id = outcome.request_id,
            player = %outcome.player,
            result = outcome.result,
            "Dice landed"
        ),
        Observation::Unclaimed => debug!(
            request_id = outcome.request_id,
            "Outcome for a roll nobody is waiting on"
        ),
        Observation::Dropped => debug!(request_id = outcome.request_id, "Dropped repeated outcome"),
    }
}
