use anchor_lang::prelude::*;

pub mod coordinator;
pub mod errors;
pub mod events;
pub mod instructions;
pub mod state;

use instructions::*;
use state::SubscriptionParams;

declare_id!("Do3wBV2axiXw5EjEnRwvzctUetUU5oWPSN1GnMhYEb5x");

/// VRF bridge program.
///
/// Owns the funded subscription to the VRF coordinator and is the only
/// gateway a game uses to obtain randomness. The game and the bridge are
/// deployed independently and wired together afterwards with
/// `bind_coordinator` here and `set_oracle_bridge` on the game.
///
/// ## Request lifecycle
///
/// 1. **Request**: the bound game CPIs `request_randomness`; the bridge
///    checks the subscription balance, CPIs the coordinator's
///    `request_random_words` and returns the assigned request id.
/// 2. **Callback**: the oracle fulfills on the coordinator, which CPIs
///    `fulfill_random_words` here signed by its config PDA.
/// 3. **Forward**: the bridge verifies that signer and CPIs the bound game's
///    `handle_fulfillment`, signed by the bridge config PDA.
#[program]
pub mod vrf_bridge {
    use super::*;

    /// Create the singleton bridge configuration PDA.
    ///
    /// Must be called exactly once; a repeated call fails with `AlreadyInitialized`.
    /// Fails with `MissingSubscription` when no subscription id is given.
    pub fn initialize(ctx: Context<Initialize>, params: SubscriptionParams) -> Result<()> {
        instructions::initialize::handler(ctx, params)
    }

    /// Replace the subscription configuration (owner-only).
    pub fn reconfigure(ctx: Context<Reconfigure>, params: SubscriptionParams) -> Result<()> {
        instructions::reconfigure::handler(ctx, params)
    }

    /// Bind or rebind the game program that receives fulfillments (owner-only).
    pub fn bind_coordinator(ctx: Context<BindCoordinator>, game_program: Pubkey) -> Result<()> {
        instructions::bind_coordinator::handler(ctx, game_program)
    }

    /// Request randomness for `on_behalf_of`. Only callable by the bound game.
    ///
    /// Returns the coordinator-assigned request id.
    pub fn request_randomness(
        ctx: Context<RequestRandomness>,
        on_behalf_of: Pubkey,
        seed: [u8; 32],
    ) -> Result<u64> {
        instructions::request_randomness::handler(ctx, on_behalf_of, seed)
    }

    /// Coordinator callback. Only accepted when signed by the coordinator's
    /// config PDA; forwards the words to the bound game.
    pub fn fulfill_random_words<'info>(
        ctx: Context<'_, '_, '_, 'info, FulfillRandomWords<'info>>,
        request_id: u64,
        random_words: Vec<[u8; 32]>,
    ) -> Result<()> {
        instructions::fulfill_random_words::handler(ctx, request_id, random_words)
    }
}
