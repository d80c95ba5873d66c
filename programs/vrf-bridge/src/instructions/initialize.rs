use anchor_lang::prelude::*;

use crate::events::BridgeInitialized;
use crate::state::{BridgeConfig, SubscriptionParams, BRIDGE_CONFIG_SEED};

/// Accounts required to initialize the bridge configuration singleton.
#[derive(Accounts)]
pub struct Initialize<'info> {
    /// The initial owner who pays for account creation.
    #[account(mut)]
    pub owner: Signer<'info>,

    /// Singleton configuration PDA. Seeds: `["bridge-config"]`.
    ///
    /// `init_if_needed` lets a repeated call reach the handler, which rejects
    /// it with `AlreadyInitialized`.
    #[account(
        init_if_needed,
        payer = owner,
        space = 8 + BridgeConfig::INIT_SPACE,
        seeds = [BRIDGE_CONFIG_SEED],
        bump,
    )]
    pub config: Account<'info, BridgeConfig>,

    pub system_program: Program<'info, System>,
}

/// Initialize the bridge configuration.
pub fn handler(ctx: Context<Initialize>, params: SubscriptionParams) -> Result<()> {
    let owner = ctx.accounts.owner.key();
    let config = &mut ctx.accounts.config;
    config.initialize(owner, &params, ctx.bumps.config)?;

    emit!(BridgeInitialized {
        owner,
        coordinator_program: config.coordinator_program,
        subscription_id: config.subscription_id,
    });

    msg!("Bridge initialized, subscription_id={}", config.subscription_id);
    Ok(())
}
