//! Roll submission: sends `roll_dice` and registers the wait for its outcome.
//!
//! The coordinator assigns request ids from a global counter, so the id is
//! predicted from that counter to derive the roll and request PDAs. The
//! program rejects a stale prediction with `RequestIdMismatch` (or the
//! coordinator with a seeds violation, or the system program when a roll
//! already sits at the predicted PDA) and the submission is retried with a
//! fresh counter. Once confirmed, the created `DiceRoll` account is read back
//! and its id, not the prediction, is what gets registered.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_commitment_config::CommitmentConfig;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signer;
use solana_sdk::transaction::Transaction;
use tracing::{info, instrument, warn};

use crate::accounts::{
    dice_roll_address, game_config_address, parse_bridge_route, parse_dice_roll, parse_game_bridge,
    parse_request_counter, DiceRollView, RollRoute, BRIDGE_CONFIG_SEED,
};
use crate::config::AppConfig;
use crate::correlator::{PendingRoll, RequestCorrelator, RollError, RollOutcome};
use crate::events::instruction_discriminator;
use crate::metrics::Metrics;

/// `DiceError::RequestIdMismatch` (6005).
const ERROR_REQUEST_ID_MISMATCH: u32 = 6005;
/// Anchor `ConstraintSeeds` (2006), raised by the coordinator on a stale request PDA.
const ERROR_CONSTRAINT_SEEDS: u32 = 2006;
/// System program `AccountAlreadyInUse` (0): the predicted roll PDA is already a roll.
const ACCOUNT_ALREADY_IN_USE: &str = "custom program error: 0x0";

/// Errors worth another attempt with a fresh blockhash and id prediction.
fn is_retryable(err_str: &str) -> bool {
    let retryable_codes = [
        format!("0x{:x}", ERROR_REQUEST_ID_MISMATCH),
        format!("0x{:x}", ERROR_CONSTRAINT_SEEDS),
    ];
    retryable_codes.iter().any(|code| err_str.contains(code))
        || err_str.contains(ACCOUNT_ALREADY_IN_USE)
        || err_str.contains("RequestIdMismatch")
        || err_str.contains("BlockhashNotFound")
}

/// `roll_dice` instruction data: discriminator, predicted request id, client seed.
fn roll_dice_data(request_id: u64, seed: &[u8; 32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(8 + 8 + 32);
    data.extend_from_slice(&instruction_discriminator("roll_dice"));
    data.extend_from_slice(&request_id.to_le_bytes());
    data.extend_from_slice(seed);
    data
}

/// A confirmed `roll_dice` transaction.
#[derive(Debug, Clone)]
pub struct DispatchedRoll {
    pub request_id: u64,
    pub player: Pubkey,
    pub signature: String,
    /// Set when the roll was already published by the time it was read back.
    pub landed: Option<u8>,
}

/// Sends a roll and reports the request id the transaction actually created.
pub trait RollDispatcher: Send + Sync {
    fn dispatch_roll(&self) -> impl Future<Output = Result<DispatchedRoll>> + Send;
}

/// Submits rolls and hands back a wait for each.
pub struct DiceClient<D> {
    dispatcher: D,
    correlator: RequestCorrelator,
    metrics: Arc<Metrics>,
}

impl<D: RollDispatcher> DiceClient<D> {
    pub fn new(dispatcher: D, correlator: RequestCorrelator, metrics: Arc<Metrics>) -> Self {
        Self {
            dispatcher,
            correlator,
            metrics,
        }
    }

    /// Submit one roll. Nothing is registered when the submission fails.
    pub async fn submit_roll(&self) -> Result<PendingRoll, RollError> {
        self.metrics.record_submission();

        let dispatched = match self.dispatcher.dispatch_roll().await {
            Ok(dispatched) => dispatched,
            Err(e) => {
                self.metrics.record_submission_failure();
                warn!(error = %format!("{e:#}"), "Roll submission failed");
                return Err(RollError::Submission(e));
            }
        };

        let pending = self.correlator.register(dispatched.request_id)?;
        if let Some(result) = dispatched.landed {
            self.correlator.observe(&RollOutcome {
                request_id: dispatched.request_id,
                player: dispatched.player,
                result,
            });
        }

        info!(
            request_id = dispatched.request_id,
            player = %dispatched.player,
            signature = %dispatched.signature,
            "Roll submitted"
        );
        Ok(pending)
    }
}

/// [`RollDispatcher`] that talks to a Solana cluster over JSON-RPC.
pub struct SolanaDispatcher {
    rpc_client: Arc<RpcClient>,
    config: AppConfig,
}

impl SolanaDispatcher {
    pub fn new(rpc_client: Arc<RpcClient>, config: AppConfig) -> Self {
        Self { rpc_client, config }
    }

    async fn account_data(&self, address: &Pubkey, what: &str) -> Result<Vec<u8>> {
        self.rpc_client
            .get_account_data(address)
            .await
            .with_context(|| format!("failed to fetch {what} account {address}"))
    }

    /// Resolve the bridge and coordinator accounts from the game's config.
    async fn fetch_route(&self) -> Result<RollRoute> {
        let game_program = self.config.game_program_id;

        let data = self
            .account_data(&game_config_address(&game_program), "game config")
            .await?;
        let oracle_bridge = parse_game_bridge(&data).context("malformed game config account")?;

        let bridge_config = Pubkey::find_program_address(&[BRIDGE_CONFIG_SEED], &oracle_bridge).0;
        let data = self.account_data(&bridge_config, "bridge config").await?;
        let (coordinator_program, subscription_id) =
            parse_bridge_route(&data).context("malformed bridge config account")?;

        Ok(RollRoute::new(
            game_program,
            oracle_bridge,
            coordinator_program,
            subscription_id,
        ))
    }

    async fn next_request_id(&self, route: &RollRoute) -> Result<u64> {
        let data = self
            .account_data(&route.coordinator_config, "coordinator config")
            .await?;
        parse_request_counter(&data).context("malformed coordinator config account")
    }

    async fn read_roll(&self, request_id: u64) -> Result<DiceRollView> {
        let address = dice_roll_address(&self.config.game_program_id, request_id);
        let data = self.account_data(&address, "dice roll").await?;
        parse_dice_roll(&data).context("malformed dice roll account")
    }

    fn roll_instruction(&self, route: &RollRoute, request_id: u64) -> Instruction {
        let seed: [u8; 32] = rand::random();

        Instruction {
            program_id: route.game_program,
            accounts: route.roll_accounts(&self.config.player_keypair.pubkey(), request_id),
            data: roll_dice_data(request_id, &seed),
        }
    }

    /// Send `roll_dice` with exponential backoff; returns the signature and the predicted id.
    async fn send_with_retries(&self, route: &RollRoute) -> Result<(String, u64)> {
        let config = &self.config;
        let mut retry_delay = Duration::from_millis(config.initial_retry_delay_ms);

        for attempt in 0..config.max_retries {
            let request_id = self.next_request_id(route).await?;
            let instruction = self.roll_instruction(route, request_id);

            let blockhash = self
                .rpc_client
                .get_latest_blockhash()
                .await
                .context("failed to fetch latest blockhash")?;

            let tx = Transaction::new_signed_with_payer(
                &[instruction],
                Some(&config.player_keypair.pubkey()),
                &[config.player_keypair.as_ref()],
                blockhash,
            );

            match self.rpc_client.send_and_confirm_transaction(&tx).await {
                Ok(sig) => return Ok((sig.to_string(), request_id)),
                Err(e) if is_retryable(&e.to_string()) && attempt + 1 < config.max_retries => {
                    warn!(
                        attempt = attempt + 1,
                        request_id,
                        delay = ?retry_delay,
                        error = %e,
                        "Roll not accepted, retrying"
                    );
                    tokio::time::sleep(retry_delay).await;
                    retry_delay = retry_delay.saturating_mul(2).min(Duration::from_secs(60));
                }
                Err(e) => return Err(e).context("send_and_confirm_transaction failed"),
            }
        }

        anyhow::bail!("max retries ({}) exceeded for roll_dice", config.max_retries)
    }
}

impl RollDispatcher for SolanaDispatcher {
    #[instrument(skip_all, fields(player = %self.config.player_keypair.pubkey()))]
    async fn dispatch_roll(&self) -> Result<DispatchedRoll> {
        let route = self.fetch_route().await?;
        let (signature, predicted_id) = self.send_with_retries(&route).await?;

        let roll = self.read_roll(predicted_id).await?;
        let player = self.config.player_keypair.pubkey();
        anyhow::ensure!(
            roll.request_id == predicted_id && roll.player == player,
            "dice roll {} does not belong to this submission",
            predicted_id
        );

        info!(
            request_id = roll.request_id,
            subscription_id = route.subscription_id,
            signature = %signature,
            explorer = %self.config.explorer_url(&signature),
            "Roll confirmed"
        );

        Ok(DispatchedRoll {
            request_id: roll.request_id,
            player: roll.player,
            signature,
            landed: roll.is_published().then_some(roll.result),
        })
    }
}

/// JSON-RPC client at confirmed commitment, shared by the dispatcher and listener.
pub fn rpc_client(config: &AppConfig) -> Arc<RpcClient> {
    Arc::new(RpcClient::new_with_commitment(
        config.rpc_url.clone(),
        CommitmentConfig::confirmed(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeDispatcher {
        rolls: Mutex<Vec<Result<DispatchedRoll>>>,
    }

    impl FakeDispatcher {
        fn new(rolls: Vec<Result<DispatchedRoll>>) -> Self {
            Self {
                rolls: Mutex::new(rolls),
            }
        }
    }

    impl RollDispatcher for FakeDispatcher {
        async fn dispatch_roll(&self) -> Result<DispatchedRoll> {
            self.rolls.lock().unwrap().remove(0)
        }
    }

    fn dispatched(request_id: u64, player: Pubkey, landed: Option<u8>) -> Result<DispatchedRoll> {
        Ok(DispatchedRoll {
            request_id,
            player,
            signature: format!("sig-{request_id}"),
            landed,
        })
    }

    fn client(rolls: Vec<Result<DispatchedRoll>>) -> DiceClient<FakeDispatcher> {
        let metrics = Arc::new(Metrics::new());
        let correlator = RequestCorrelator::new(64, metrics.clone());
        DiceClient::new(FakeDispatcher::new(rolls), correlator, metrics)
    }

    #[tokio::test]
    async fn submitted_roll_resolves_on_its_outcome() {
        let player = Pubkey::new_unique();
        let client = client(vec![dispatched(42, player, None)]);

        let pending = client.submit_roll().await.unwrap();
        assert_eq!(pending.request_id(), 42);

        client.correlator.observe(&RollOutcome {
            request_id: 42,
            player,
            result: 6,
        });
        let outcome = pending.wait().await.unwrap();
        assert_eq!(outcome.result, 6);
        assert_eq!(outcome.player, player);
    }

    #[tokio::test]
    async fn failed_submission_registers_nothing() {
        let client = client(vec![Err(anyhow::anyhow!("unfunded subscription"))]);

        let Err(err) = client.submit_roll().await else {
            panic!("submission should fail");
        };
        assert!(matches!(err, RollError::Submission(_)));
        assert!(err.to_string().contains("unfunded subscription"));
        assert_eq!(client.correlator.pending_count(), 0);
        assert_eq!(
            client
                .metrics
                .submission_failures
                .load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }

    #[tokio::test]
    async fn already_published_roll_resolves_immediately() {
        let player = Pubkey::new_unique();
        let client = client(vec![dispatched(9, player, Some(3))]);

        let pending = client.submit_roll().await.unwrap();
        assert_eq!(pending.wait().await.unwrap().result, 3);
        assert_eq!(client.correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn two_players_resolve_independently() {
        let alice = Pubkey::new_unique();
        let bob = Pubkey::new_unique();
        let client = client(vec![dispatched(1, alice, None), dispatched(2, bob, None)]);

        let first = client.submit_roll().await.unwrap();
        let second = client.submit_roll().await.unwrap();

        client.correlator.observe(&RollOutcome {
            request_id: 2,
            player: bob,
            result: 3,
        });
        assert_eq!(client.correlator.pending_count(), 1);
        client.correlator.observe(&RollOutcome {
            request_id: 1,
            player: alice,
            result: 6,
        });

        assert_eq!(second.wait().await.unwrap().result, 3);
        assert_eq!(first.wait().await.unwrap().result, 6);
    }

    #[test]
    fn retries_only_on_stale_predictions_and_blockhashes() {
        assert!(is_retryable(
            "Error processing Instruction 0: custom program error: 0x1775"
        ));
        assert!(is_retryable(
            "Error processing Instruction 0: custom program error: 0x7d6"
        ));
        assert!(is_retryable(
            "Error processing Instruction 0: custom program error: 0x0"
        ));
        assert!(is_retryable("BlockhashNotFound"));
        // UnfundedSubscription from the bridge
        assert!(!is_retryable(
            "Error processing Instruction 0: custom program error: 0x1777"
        ));
    }

    #[test]
    fn roll_data_carries_the_predicted_id_before_the_seed() {
        let seed = [5u8; 32];
        let data = roll_dice_data(77, &seed);

        assert_eq!(data.len(), 8 + 8 + 32);
        assert_eq!(data[..8], instruction_discriminator("roll_dice"));
        assert_eq!(data[8..16], 77u64.to_le_bytes());
        assert_eq!(data[16..], seed);
    }
}
