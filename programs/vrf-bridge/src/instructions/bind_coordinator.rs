use anchor_lang::prelude::*;

use crate::events::CoordinatorBound;
use crate::state::{BridgeConfig, BRIDGE_CONFIG_SEED};

/// Accounts required to bind the game program that receives fulfillments.
#[derive(Accounts)]
pub struct BindCoordinator<'info> {
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

/// Bind (or rebind) the game program. Owner only.
pub fn handler(ctx: Context<BindCoordinator>, game_program: Pubkey) -> Result<()> {
    let owner = ctx.accounts.owner.key();
    let previous = ctx.accounts.config.bind_game(&owner, game_program)?;

    emit!(CoordinatorBound {
        previous,
        game_program,
    });

    msg!("Bridge bound to game {}", game_program);
    Ok(())
}
