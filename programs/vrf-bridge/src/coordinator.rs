//! Views of the VRF coordinator's accounts and the wire format of its
//! `request_random_words` instruction.
//!
//! The coordinator is an external program: the bridge only knows its account
//! layouts and Anchor discriminators, never its crate.

use anchor_lang::prelude::*;
use sha2::{Digest, Sha256};

use crate::errors::BridgeError;

/// Account name of the coordinator's configuration singleton.
pub const COORDINATOR_CONFIG_ACCOUNT: &str = "CoordinatorConfig";
/// Account name of a coordinator subscription.
pub const SUBSCRIPTION_ACCOUNT: &str = "Subscription";

/// Anchor discriminator: `sha256("<namespace>:<name>")[..8]`.
pub fn discriminator(namespace: &str, name: &str) -> [u8; 8] {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b":");
    hasher.update(name.as_bytes());
    let hash = hasher.finalize();
    let mut disc = [0u8; 8];
    disc.copy_from_slice(&hash[..8]);
    disc
}

/// The coordinator's `CoordinatorConfig` account body.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct CoordinatorConfigView {
    pub admin: Pubkey,
    pub authority: Pubkey,
    /// Fee (in lamports) charged per random word requested.
    pub fee_per_word: u64,
    pub max_num_words: u32,
    /// Id the coordinator will assign to the next request.
    pub request_counter: u64,
    pub subscription_counter: u64,
    pub bump: u8,
}

/// The coordinator's `Subscription` account body.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionView {
    pub id: u64,
    pub owner: Pubkey,
    /// Lamports available for VRF fees.
    pub balance: u64,
    pub req_count: u64,
    pub consumer_count: u32,
    pub bump: u8,
}

impl SubscriptionView {
    /// Fail fast when the coordinator would reject the request for lack of funds.
    pub fn ensure_funded(&self, fee_per_word: u64, num_words: u32) -> Result<()> {
        let fee = fee_per_word
            .checked_mul(num_words as u64)
            .ok_or(BridgeError::CounterOverflow)?;
        if self.balance < fee {
            msg!(
                "Subscription {} underfunded: balance={} fee={}",
                self.id,
                self.balance,
                fee
            );
            return err!(BridgeError::UnfundedSubscription);
        }
        Ok(())
    }
}

/// Decode an Anchor account body after checking its discriminator.
pub fn decode_account<T: AnchorDeserialize>(name: &str, data: &[u8]) -> Result<T> {
    require!(
        data.len() >= 8 && data[..8] == discriminator("account", name),
        BridgeError::InvalidCoordinatorAccount
    );
    T::deserialize(&mut &data[8..]).map_err(|_| error!(BridgeError::InvalidCoordinatorAccount))
}

/// Load a coordinator-owned account. The data borrow ends before returning so
/// the account can be handed to a CPI afterwards.
pub fn load_view<T: AnchorDeserialize>(
    info: &AccountInfo,
    coordinator_program: &Pubkey,
    name: &str,
) -> Result<T> {
    require_keys_eq!(
        *info.owner,
        *coordinator_program,
        BridgeError::InvalidCoordinatorAccount
    );
    let data = info.try_borrow_data()?;
    decode_account(name, &data)
}

/// Instruction data for `request_random_words(num_words, seed, callback_compute_limit)`.
pub fn request_random_words_data(
    num_words: u32,
    seed: &[u8; 32],
    callback_compute_limit: u32,
) -> Vec<u8> {
    let mut data = Vec::with_capacity(8 + 4 + 32 + 4);
    data.extend_from_slice(&discriminator("global", "request_random_words"));
    data.extend_from_slice(&num_words.to_le_bytes());
    data.extend_from_slice(seed);
    data.extend_from_slice(&callback_compute_limit.to_le_bytes());
    data
}
