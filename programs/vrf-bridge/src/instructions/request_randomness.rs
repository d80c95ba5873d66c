use anchor_lang::prelude::*;
use anchor_lang::solana_program::instruction::{AccountMeta, Instruction};
use anchor_lang::solana_program::program::invoke;

use crate::coordinator::{
    load_view, request_random_words_data, CoordinatorConfigView, SubscriptionView,
    COORDINATOR_CONFIG_ACCOUNT, SUBSCRIPTION_ACCOUNT,
};
use crate::errors::BridgeError;
use crate::events::RandomnessRequested;
use crate::state::{BridgeConfig, BRIDGE_CONFIG_SEED};

/// Accounts required to request randomness on behalf of a player.
///
/// Called via CPI from the bound game program, which signs with its
/// `["game-config"]` PDA.
#[derive(Accounts)]
pub struct RequestRandomness<'info> {
    /// Signer PDA of the calling game; must be the bound game's authority.
    /// CHECK: Signer flag and address validated in the handler.
    pub game_authority: UncheckedAccount<'info>,

    /// The player; pays rent for the coordinator's request account.
    #[account(mut)]
    pub payer: Signer<'info>,

    /// Bridge configuration PDA (mutated to count forwarded requests).
    #[account(
        mut,
        seeds = [BRIDGE_CONFIG_SEED],
        bump = config.bump,
    )]
    pub config: Account<'info, BridgeConfig>,

    /// This program, handed to the coordinator as the registered consumer.
    /// CHECK: Address constraint below.
    #[account(address = crate::ID)]
    pub bridge_program: UncheckedAccount<'info>,

    /// CHECK: Must be the configured coordinator.
    #[account(address = config.coordinator_program @ BridgeError::InvalidCoordinatorAccount)]
    pub coordinator_program: UncheckedAccount<'info>,

    /// Coordinator configuration (read for the fee and the next request id).
    /// CHECK: Owner and discriminator validated in the handler.
    #[account(mut)]
    pub coordinator_config: UncheckedAccount<'info>,

    /// Subscription billed for the request.
    /// CHECK: Owner, discriminator and id validated in the handler.
    #[account(mut)]
    pub subscription: UncheckedAccount<'info>,

    /// Consumer registration of this bridge under the subscription.
    /// CHECK: Validated by the coordinator during CPI.
    pub consumer_registration: UncheckedAccount<'info>,

    /// Request account created by the coordinator.
    /// CHECK: Created and validated by the coordinator during CPI.
    #[account(mut)]
    pub vrf_request: UncheckedAccount<'info>,

    pub system_program: Program<'info, System>,
}

/// Forward a randomness request to the coordinator.
///
/// 1. Rejects callers other than the bound game.
/// 2. Checks the subscription can pay before touching the coordinator.
/// 3. CPIs `request_random_words` with the stored subscription settings.
/// 4. Returns the coordinator-assigned request id as return data.
pub fn handler(
    ctx: Context<RequestRandomness>,
    on_behalf_of: Pubkey,
    seed: [u8; 32],
) -> Result<u64> {
    let game_authority = &ctx.accounts.game_authority;
    ctx.accounts
        .config
        .ensure_game_caller(game_authority.key, game_authority.is_signer)?;

    let config = &ctx.accounts.config;
    let coordinator_program = config.coordinator_program;
    let subscription_id = config.subscription_id;
    let num_words = config.num_words;

    let coordinator_config: CoordinatorConfigView = load_view(
        &ctx.accounts.coordinator_config,
        &coordinator_program,
        COORDINATOR_CONFIG_ACCOUNT,
    )?;
    let subscription: SubscriptionView = load_view(
        &ctx.accounts.subscription,
        &coordinator_program,
        SUBSCRIPTION_ACCOUNT,
    )?;
    require!(
        subscription.id == subscription_id,
        BridgeError::SubscriptionMismatch
    );
    subscription.ensure_funded(coordinator_config.fee_per_word, num_words)?;

    // The coordinator assigns ids from its counter; read it before the CPI bumps it.
    let request_id = coordinator_config.request_counter;

    let ix = Instruction {
        program_id: coordinator_program,
        accounts: vec![
            AccountMeta::new(ctx.accounts.payer.key(), true),
            AccountMeta::new(ctx.accounts.coordinator_config.key(), false),
            AccountMeta::new(ctx.accounts.subscription.key(), false),
            AccountMeta::new_readonly(ctx.accounts.consumer_registration.key(), false),
            AccountMeta::new_readonly(crate::ID, false),
            AccountMeta::new(ctx.accounts.vrf_request.key(), false),
            AccountMeta::new_readonly(ctx.accounts.system_program.key(), false),
        ],
        data: request_random_words_data(num_words, &seed, config.callback_compute_limit),
    };

    invoke(
        &ix,
        &[
            ctx.accounts.payer.to_account_info(),
            ctx.accounts.coordinator_config.to_account_info(),
            ctx.accounts.subscription.to_account_info(),
            ctx.accounts.consumer_registration.to_account_info(),
            ctx.accounts.bridge_program.to_account_info(),
            ctx.accounts.vrf_request.to_account_info(),
            ctx.accounts.system_program.to_account_info(),
            ctx.accounts.coordinator_program.to_account_info(),
        ],
    )
    .map_err(|_| error!(BridgeError::CoordinatorRequestFailed))?;

    let config = &mut ctx.accounts.config;
    config.requests_forwarded = config
        .requests_forwarded
        .checked_add(1)
        .ok_or(BridgeError::CounterOverflow)?;

    emit!(RandomnessRequested {
        request_id,
        on_behalf_of,
        game_program: config.game_program,
        subscription_id,
        key_hash: config.key_hash,
        request_confirmations: config.request_confirmations,
        num_words,
    });

    msg!("Randomness requested, request_id={}", request_id);
    Ok(request_id)
}
