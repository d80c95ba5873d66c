use anchor_lang::prelude::*;

/// Emitted once when the bridge configuration is created.
#[event]
pub struct BridgeInitialized {
    pub owner: Pubkey,
    pub coordinator_program: Pubkey,
    pub subscription_id: u64,
}

/// Emitted when the owner replaces the subscription configuration.
#[event]
pub struct SubscriptionReconfigured {
    pub coordinator_program: Pubkey,
    pub subscription_id: u64,
    pub key_hash: [u8; 32],
    pub callback_compute_limit: u32,
    pub request_confirmations: u16,
    pub num_words: u32,
}

/// Emitted when the owner binds (or rebinds) the game that receives fulfillments.
#[event]
pub struct CoordinatorBound {
    pub previous: Pubkey,
    pub game_program: Pubkey,
}

/// Emitted after the coordinator accepted a request on behalf of a player.
///
/// Carries the key hash and confirmation count so the oracle side can honor them.
#[event]
pub struct RandomnessRequested {
    pub request_id: u64,
    pub on_behalf_of: Pubkey,
    pub game_program: Pubkey,
    pub subscription_id: u64,
    pub key_hash: [u8; 32],
    pub request_confirmations: u16,
    pub num_words: u32,
}

/// Emitted after the bound game accepted a forwarded fulfillment.
#[event]
pub struct FulfillmentForwarded {
    pub request_id: u64,
    pub game_program: Pubkey,
    pub num_words: u32,
}
