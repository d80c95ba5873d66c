use anchor_lang::prelude::*;
use anchor_lang::solana_program::instruction::{AccountMeta, Instruction};
use anchor_lang::solana_program::program::{get_return_data, invoke_signed};
use sha2::{Digest, Sha256};

pub mod state;

use state::{DiceRoll, GameConfig, DICE_ROLL_SEED, GAME_CONFIG_SEED};

declare_id!("5DmAoWKFDtL5EncSNxGRq2ieuJoLbtQeWyZrddEFnteX");

/// Error codes for the roll-dice program.
#[error_code]
pub enum DiceError {
    /// `initialize` was called on a game that is already configured.
    #[msg("Game is already initialized")]
    AlreadyInitialized,
    /// A public key argument was the zero address.
    #[msg("Zero address not allowed")]
    ZeroAddressNotAllowed,
    /// Signer is not the game authority.
    #[msg("Unauthorized")]
    Unauthorized,
    /// The bridge program passed in is not the bound bridge.
    #[msg("Oracle bridge does not match the game config")]
    BridgeMismatch,
    /// The bridge call failed or returned no request id.
    #[msg("Randomness request dispatch failed")]
    RequestDispatchFailed,
    /// The dice roll account is not the PDA for the assigned request id.
    #[msg("Dice roll account does not match the assigned request id")]
    RequestIdMismatch,
    /// The fulfillment was not signed by the bound bridge.
    #[msg("Caller is not the bound oracle bridge")]
    UnauthorizedCaller,
    /// No roll exists for the fulfilled request id.
    #[msg("Unknown request id")]
    UnknownRequest,
    /// The roll was already fulfilled.
    #[msg("Request has already been fulfilled")]
    DuplicateFulfillment,
    /// The fulfillment carried no random words.
    #[msg("Fulfillment carried no random words")]
    EmptyRandomWords,
    /// A status transition would skip a state.
    #[msg("Invalid dice roll state transition")]
    InvalidStateTransition,
    /// A bookkeeping counter would overflow u64 (practically unreachable).
    #[msg("Counter overflow")]
    CounterOverflow,
}

/// Emitted once when the game is initialized.
#[event]
pub struct GameInitialized {
    pub authority: Pubkey,
    pub oracle_bridge: Pubkey,
}

/// Emitted when the authority rewires the game to another bridge.
#[event]
pub struct OracleBridgeUpdated {
    pub previous: Pubkey,
    pub oracle_bridge: Pubkey,
}

/// Emitted when a player requests a new dice roll.
#[event]
pub struct DiceRollRequested {
    pub request_id: u64,
    pub player: Pubkey,
}

/// Emitted when a dice roll is settled with its final result.
#[event]
pub struct DiceLanded {
    pub request_id: u64,
    pub player: Pubkey,
    pub result: u8,
}

/// Anchor instruction discriminator: `sha256("global:<name>")[..8]`.
fn instruction_discriminator(name: &str) -> [u8; 8] {
    let mut hasher = Sha256::new();
    hasher.update(format!("global:{name}"));
    let hash = hasher.finalize();
    let mut disc = [0u8; 8];
    disc.copy_from_slice(&hash[..8]);
    disc
}

/// Read the request id the bridge returned from `request_randomness`.
fn returned_request_id(oracle_bridge: &Pubkey) -> Result<u64> {
    let (program_id, data) = get_return_data().ok_or(DiceError::RequestDispatchFailed)?;
    require_keys_eq!(program_id, *oracle_bridge, DiceError::RequestDispatchFailed);
    let bytes: [u8; 8] = data
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .ok_or(DiceError::RequestDispatchFailed)?;
    Ok(u64::from_le_bytes(bytes))
}

/// Load a roll; an account this program does not own means no roll was issued.
fn load_roll(info: &AccountInfo) -> Result<DiceRoll> {
    if info.owner != &crate::ID || info.data_is_empty() {
        msg!("Unknown dice roll account {}", info.key);
        return err!(DiceError::UnknownRequest);
    }
    let data = info.try_borrow_data()?;
    DiceRoll::try_deserialize(&mut &data[..])
}

fn store_roll(info: &AccountInfo, roll: &DiceRoll) -> Result<()> {
    let mut data = info.try_borrow_mut_data()?;
    let mut writer: &mut [u8] = &mut data;
    roll.try_serialize(&mut writer)
}

/// On-chain dice game powered by the VRF bridge.
///
/// 1. **Roll**: `roll_dice` CPIs the bound bridge's `request_randomness`
///    and opens a `DiceRoll` keyed by the returned request id.
/// 2. **Wait**: the oracle fulfills on the coordinator at some later slot.
/// 3. **Land**: the bridge CPIs `handle_fulfillment`; the roll gets its face
///    (1-6) and `DiceLanded` is emitted.
#[program]
pub mod roll_dice {
    use super::*;

    /// One-shot initializer binding the game to its bridge.
    pub fn initialize(ctx: Context<InitializeGame>, oracle_bridge: Pubkey) -> Result<()> {
        let authority = ctx.accounts.authority.key();
        let config = &mut ctx.accounts.config;
        config.initialize(authority, oracle_bridge, ctx.bumps.config)?;

        emit!(GameInitialized {
            authority,
            oracle_bridge,
        });

        msg!("Game initialized, oracle_bridge={}", oracle_bridge);
        Ok(())
    }

    /// Rewire the game to another bridge (authority-only).
    pub fn set_oracle_bridge(ctx: Context<SetOracleBridge>, oracle_bridge: Pubkey) -> Result<()> {
        let authority = ctx.accounts.authority.key();
        let previous = ctx
            .accounts
            .config
            .set_oracle_bridge(&authority, oracle_bridge)?;

        emit!(OracleBridgeUpdated {
            previous,
            oracle_bridge,
        });

        msg!("Oracle bridge updated: {} -> {}", previous, oracle_bridge);
        Ok(())
    }

    /// Request a dice roll through the bound bridge.
    ///
    /// The remaining accounts are forwarded verbatim to the bridge's
    /// `request_randomness` after the game signer and the player. The roll is
    /// opened at the PDA for `request_id`, which must be the id the bridge
    /// returns.
    pub fn roll_dice<'info>(
        ctx: Context<'_, '_, '_, 'info, RollDice<'info>>,
        request_id: u64,
        seed: [u8; 32],
    ) -> Result<()> {
        let oracle_bridge = ctx.accounts.oracle_bridge.key();
        ctx.accounts.config.ensure_bridge(&oracle_bridge)?;
        let player = ctx.accounts.player.key();

        let mut data = Vec::with_capacity(8 + 32 + 32);
        data.extend_from_slice(&instruction_discriminator("request_randomness"));
        data.extend_from_slice(player.as_ref());
        data.extend_from_slice(&seed);

        let config_info = ctx.accounts.config.to_account_info();
        let player_info = ctx.accounts.player.to_account_info();

        let mut accounts = Vec::with_capacity(3 + ctx.remaining_accounts.len());
        accounts.push(AccountMeta::new_readonly(config_info.key(), true));
        accounts.push(AccountMeta::new(player, true));
        for account in ctx.remaining_accounts {
            if account.is_writable {
                accounts.push(AccountMeta::new(*account.key, account.is_signer));
            } else {
                accounts.push(AccountMeta::new_readonly(*account.key, account.is_signer));
            }
        }
        accounts.push(AccountMeta::new_readonly(ctx.accounts.system_program.key(), false));

        let request_ix = Instruction {
            program_id: oracle_bridge,
            accounts,
            data,
        };

        let mut account_infos = Vec::with_capacity(4 + ctx.remaining_accounts.len());
        account_infos.push(config_info);
        account_infos.push(player_info);
        account_infos.extend(ctx.remaining_accounts.iter().cloned());
        account_infos.push(ctx.accounts.system_program.to_account_info());
        account_infos.push(ctx.accounts.oracle_bridge.to_account_info());

        let signer_seeds: &[&[u8]] = &[GAME_CONFIG_SEED, &[ctx.accounts.config.bump]];
        invoke_signed(&request_ix, &account_infos, &[signer_seeds])
            .map_err(|_| error!(DiceError::RequestDispatchFailed))?;

        let assigned = returned_request_id(&oracle_bridge)?;
        require_eq!(assigned, request_id, DiceError::RequestIdMismatch);

        let bump = ctx.bumps.dice_roll;
        ctx.accounts.dice_roll.set_inner(DiceRoll::requested(
            player,
            request_id,
            Clock::get()?.slot,
            bump,
        ));

        let config = &mut ctx.accounts.config;
        config.rolls_requested = config
            .rolls_requested
            .checked_add(1)
            .ok_or(DiceError::CounterOverflow)?;

        emit!(DiceRollRequested { request_id, player });

        msg!("Dice roll requested, request_id={}", request_id);
        Ok(())
    }

    /// Accept the bridge's fulfillment for `request_id` and publish the face.
    ///
    /// Only the bound bridge's config PDA may call this. Each roll accepts
    /// exactly one fulfillment; later ones fail with `DuplicateFulfillment`.
    pub fn handle_fulfillment(
        ctx: Context<HandleFulfillment>,
        request_id: u64,
        random_words: Vec<[u8; 32]>,
    ) -> Result<()> {
        let bridge = &ctx.accounts.bridge_authority;
        ctx.accounts
            .config
            .ensure_bridge_caller(bridge.key, bridge.is_signer)?;

        let id_bytes = request_id.to_le_bytes();
        let (expected, _) = Pubkey::find_program_address(&[DICE_ROLL_SEED, &id_bytes], &crate::ID);
        if ctx.accounts.dice_roll.key() != expected {
            msg!("Dice roll account is not the PDA for request_id={}", request_id);
            return err!(DiceError::UnknownRequest);
        }

        let mut roll = load_roll(&ctx.accounts.dice_roll)?;
        require_eq!(roll.request_id, request_id, DiceError::UnknownRequest);
        roll.ensure_awaiting_fulfillment()?;

        let result = roll.fulfill(&random_words, Clock::get()?.slot)?;
        roll.publish()?;
        store_roll(&ctx.accounts.dice_roll, &roll)?;

        let config = &mut ctx.accounts.config;
        config.rolls_published = config
            .rolls_published
            .checked_add(1)
            .ok_or(DiceError::CounterOverflow)?;

        emit!(DiceLanded {
            request_id,
            player: roll.player,
            result,
        });

        msg!("Dice landed: {} (request_id={})", result, request_id);
        Ok(())
    }
}

/// Accounts for [`roll_dice::initialize`].
#[derive(Accounts)]
pub struct InitializeGame<'info> {
    /// Becomes the game authority; pays for the config account.
    #[account(mut)]
    pub authority: Signer<'info>,

    /// Game config PDA. Seeds: `["game-config"]`.
    #[account(
        init_if_needed,
        payer = authority,
        space = 8 + GameConfig::INIT_SPACE,
        seeds = [GAME_CONFIG_SEED],
        bump,
    )]
    pub config: Account<'info, GameConfig>,

    pub system_program: Program<'info, System>,
}

/// Accounts for [`roll_dice::set_oracle_bridge`].
#[derive(Accounts)]
pub struct SetOracleBridge<'info> {
    pub authority: Signer<'info>,

    #[account(
        mut,
        seeds = [GAME_CONFIG_SEED],
        bump = config.bump,
    )]
    pub config: Account<'info, GameConfig>,
}

/// Accounts for [`roll_dice::roll_dice`].
#[derive(Accounts)]
#[instruction(request_id: u64)]
pub struct RollDice<'info> {
    /// The player requesting the roll; pays for accounts and the VRF request.
    #[account(mut)]
    pub player: Signer<'info>,

    /// Game config PDA; signs the request to the bridge.
    #[account(
        mut,
        seeds = [GAME_CONFIG_SEED],
        bump = config.bump,
    )]
    pub config: Account<'info, GameConfig>,

    /// Dice roll PDA for the request id the bridge is about to assign.
    /// An account already holding lamports is topped up and taken over.
    #[account(
        init,
        payer = player,
        space = 8 + DiceRoll::INIT_SPACE,
        seeds = [DICE_ROLL_SEED, request_id.to_le_bytes().as_ref()],
        bump,
    )]
    pub dice_roll: Account<'info, DiceRoll>,

    /// CHECK: Compared against `config.oracle_bridge` in the handler.
    pub oracle_bridge: UncheckedAccount<'info>,

    pub system_program: Program<'info, System>,
    // remaining_accounts: the bridge's `request_randomness` accounts after the
    // game signer and payer, minus the system program
}

/// Accounts for [`roll_dice::handle_fulfillment`].
#[derive(Accounts)]
pub struct HandleFulfillment<'info> {
    /// Bridge config PDA signing the forwarded fulfillment.
    /// CHECK: Signer flag and address validated in the handler.
    pub bridge_authority: UncheckedAccount<'info>,

    #[account(
        mut,
        seeds = [GAME_CONFIG_SEED],
        bump = config.bump,
    )]
    pub config: Account<'info, GameConfig>,

    /// Dice roll PDA for `request_id`; may not exist if the id was never issued.
    /// CHECK: Address, ownership and contents validated in the handler after
    /// the caller check.
    #[account(mut)]
    pub dice_roll: UncheckedAccount<'info>,
}
