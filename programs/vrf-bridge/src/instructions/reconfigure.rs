use anchor_lang::prelude::*;

use crate::events::SubscriptionReconfigured;
use crate::state::{BridgeConfig, SubscriptionParams, BRIDGE_CONFIG_SEED};

/// Accounts required to replace the subscription configuration.
#[derive(Accounts)]
pub struct Reconfigure<'info> {
    /// Current owner; must sign.
    pub owner: Signer<'info>,

    /// Bridge configuration PDA to update.
    #[account(
        mut,
        seeds = [BRIDGE_CONFIG_SEED],
        bump = config.bump,
    )]
    pub config: Account<'info, BridgeConfig>,
}

/// Replace every subscription field at once.
///
/// The new parameters are validated in full before any field is written, so a
/// rejected call leaves the previous configuration in place.
pub fn handler(ctx: Context<Reconfigure>, params: SubscriptionParams) -> Result<()> {
    let owner = ctx.accounts.owner.key();
    let config = &mut ctx.accounts.config;
    config.reconfigure(&owner, &params)?;

    emit!(SubscriptionReconfigured {
        coordinator_program: config.coordinator_program,
        subscription_id: config.subscription_id,
        key_hash: config.key_hash,
        callback_compute_limit: config.callback_compute_limit,
        request_confirmations: config.request_confirmations,
        num_words: config.num_words,
    });

    Ok(())
}
