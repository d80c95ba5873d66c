use anchor_lang::prelude::*;
use anchor_lang::solana_program::instruction::{AccountMeta, Instruction};
use anchor_lang::solana_program::program::invoke_signed;

use crate::coordinator::discriminator;
use crate::errors::BridgeError;
use crate::events::FulfillmentForwarded;
use crate::state::{BridgeConfig, BRIDGE_CONFIG_SEED};

/// Accounts for the coordinator's callback into the bridge.
///
/// The coordinator signs with its `["coordinator-config"]` PDA and passes the
/// transaction's remaining accounts through. Everything after `game_program`
/// is forwarded verbatim to the game's `handle_fulfillment`.
#[derive(Accounts)]
pub struct FulfillRandomWords<'info> {
    /// Coordinator config PDA delivering the callback.
    /// CHECK: Signer flag and address validated in the handler.
    pub oracle: UncheckedAccount<'info>,

    /// Bridge configuration PDA (mutated to count forwarded fulfillments; signs the forward).
    #[account(
        mut,
        seeds = [BRIDGE_CONFIG_SEED],
        bump = config.bump,
    )]
    pub config: Account<'info, BridgeConfig>,

    /// The game program receiving the fulfillment.
    /// CHECK: Compared against `config.game_program` in the handler.
    pub game_program: UncheckedAccount<'info>,
    // remaining_accounts: game-specific accounts for `handle_fulfillment`
}

/// Instruction data for the game's `handle_fulfillment(request_id, random_words)`.
fn handle_fulfillment_data(request_id: u64, random_words: &[[u8; 32]]) -> Vec<u8> {
    let mut data = Vec::with_capacity(8 + 8 + 4 + 32 * random_words.len());
    data.extend_from_slice(&discriminator("global", "handle_fulfillment"));
    data.extend_from_slice(&request_id.to_le_bytes());
    // Borsh Vec encoding: length as u32 LE, then each [u8; 32] element
    data.extend_from_slice(&(random_words.len() as u32).to_le_bytes());
    for word in random_words {
        data.extend_from_slice(word);
    }
    data
}

/// Verify the oracle and forward the fulfillment to the bound game.
///
/// The bridge does not retry: if the game rejects the forward the whole
/// transaction fails, no counter moves, and redelivery is up to the oracle.
pub fn handler<'info>(
    ctx: Context<'_, '_, '_, 'info, FulfillRandomWords<'info>>,
    request_id: u64,
    random_words: Vec<[u8; 32]>,
) -> Result<()> {
    let oracle = &ctx.accounts.oracle;
    let config = &ctx.accounts.config;
    config.ensure_oracle(oracle.key, oracle.is_signer)?;

    let game_program = ctx.accounts.game_program.key();
    config.ensure_bound_game(&game_program)?;
    config.ensure_word_count(random_words.len())?;

    let config_info = config.to_account_info();
    let signer_seeds: &[&[u8]] = &[BRIDGE_CONFIG_SEED, &[config.bump]];

    // The bridge config PDA goes first as the signer the game checks; the
    // remaining accounts keep their writable/signer flags.
    let mut accounts = Vec::with_capacity(1 + ctx.remaining_accounts.len());
    accounts.push(AccountMeta::new_readonly(config_info.key(), true));
    for account in ctx.remaining_accounts {
        if account.is_writable {
            accounts.push(AccountMeta::new(*account.key, account.is_signer));
        } else {
            accounts.push(AccountMeta::new_readonly(*account.key, account.is_signer));
        }
    }

    let forward_ix = Instruction {
        program_id: game_program,
        accounts,
        data: handle_fulfillment_data(request_id, &random_words),
    };

    let mut account_infos = Vec::with_capacity(2 + ctx.remaining_accounts.len());
    account_infos.push(config_info);
    account_infos.extend(ctx.remaining_accounts.iter().cloned());
    account_infos.push(ctx.accounts.game_program.to_account_info());

    invoke_signed(&forward_ix, &account_infos, &[signer_seeds])
        .map_err(|_| error!(BridgeError::ForwardFailed))?;

    let config = &mut ctx.accounts.config;
    config.fulfillments_forwarded = config
        .fulfillments_forwarded
        .checked_add(1)
        .ok_or(BridgeError::CounterOverflow)?;

    emit!(FulfillmentForwarded {
        request_id,
        game_program,
        num_words: random_words.len() as u32,
    });

    Ok(())
}
