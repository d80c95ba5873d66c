//! PDA derivations and account layouts the client reads and passes to `roll_dice`.
//!
//! A roll touches three programs: the game, the bridge it is bound to, and
//! the coordinator behind the bridge. The client resolves the route from the
//! game's config account, so only `GAME_PROGRAM_ID` needs configuring.

use solana_sdk::instruction::AccountMeta;
use solana_sdk::pubkey::Pubkey;

use crate::events::account_discriminator;

pub const GAME_CONFIG_SEED: &[u8] = b"game-config";
pub const DICE_ROLL_SEED: &[u8] = b"dice-roll";
pub const BRIDGE_CONFIG_SEED: &[u8] = b"bridge-config";
pub const COORDINATOR_CONFIG_SEED: &[u8] = b"coordinator-config";
pub const SUBSCRIPTION_SEED: &[u8] = b"subscription";
pub const CONSUMER_SEED: &[u8] = b"consumer";
pub const REQUEST_SEED: &[u8] = b"request";

/// `11111111111111111111111111111111`
pub const SYSTEM_PROGRAM_ID: Pubkey = Pubkey::new_from_array([0u8; 32]);

pub const STATUS_PUBLISHED: u8 = 3;

pub fn game_config_address(game_program: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[GAME_CONFIG_SEED], game_program).0
}

pub fn dice_roll_address(game_program: &Pubkey, request_id: u64) -> Pubkey {
    Pubkey::find_program_address(&[DICE_ROLL_SEED, &request_id.to_le_bytes()], game_program).0
}

fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    Some(u64::from_le_bytes(data.get(offset..offset + 8)?.try_into().ok()?))
}

fn read_pubkey(data: &[u8], offset: usize) -> Option<Pubkey> {
    Pubkey::try_from(data.get(offset..offset + 32)?).ok()
}

fn has_discriminator(data: &[u8], account_name: &str) -> bool {
    data.len() >= 8 && data[..8] == account_discriminator(account_name)
}

/// Every account `roll_dice` needs besides the player and the roll PDA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollRoute {
    pub game_program: Pubkey,
    pub game_config: Pubkey,
    pub oracle_bridge: Pubkey,
    pub bridge_config: Pubkey,
    pub coordinator_program: Pubkey,
    pub coordinator_config: Pubkey,
    pub subscription_id: u64,
    pub subscription: Pubkey,
    pub consumer_registration: Pubkey,
}

impl RollRoute {
    /// Build the route from the game's bound bridge and the bridge's coordinator settings.
    pub fn new(
        game_program: Pubkey,
        oracle_bridge: Pubkey,
        coordinator_program: Pubkey,
        subscription_id: u64,
    ) -> Self {
        let sub_bytes = subscription_id.to_le_bytes();
        Self {
            game_program,
            game_config: game_config_address(&game_program),
            oracle_bridge,
            bridge_config: Pubkey::find_program_address(&[BRIDGE_CONFIG_SEED], &oracle_bridge).0,
            coordinator_program,
            coordinator_config: Pubkey::find_program_address(
                &[COORDINATOR_CONFIG_SEED],
                &coordinator_program,
            )
            .0,
            subscription_id,
            subscription: Pubkey::find_program_address(
                &[SUBSCRIPTION_SEED, &sub_bytes],
                &coordinator_program,
            )
            .0,
            consumer_registration: Pubkey::find_program_address(
                &[CONSUMER_SEED, &sub_bytes, oracle_bridge.as_ref()],
                &coordinator_program,
            )
            .0,
        }
    }

    /// Coordinator request PDA for `request_id`.
    pub fn vrf_request(&self, request_id: u64) -> Pubkey {
        Pubkey::find_program_address(
            &[REQUEST_SEED, &request_id.to_le_bytes()],
            &self.coordinator_program,
        )
        .0
    }

    /// Account list for `roll_dice`, assuming the coordinator assigns `request_id`.
    ///
    /// The trailing accounts are what the bridge's `request_randomness` needs
    /// after the game signer and payer; the game appends the system program.
    pub fn roll_accounts(&self, player: &Pubkey, request_id: u64) -> Vec<AccountMeta> {
        vec![
            AccountMeta::new(*player, true),
            AccountMeta::new(self.game_config, false),
            AccountMeta::new(dice_roll_address(&self.game_program, request_id), false),
            AccountMeta::new_readonly(self.oracle_bridge, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            // remaining accounts, forwarded to the bridge
            AccountMeta::new(self.bridge_config, false),
            AccountMeta::new_readonly(self.oracle_bridge, false),
            AccountMeta::new_readonly(self.coordinator_program, false),
            AccountMeta::new(self.coordinator_config, false),
            AccountMeta::new(self.subscription, false),
            AccountMeta::new_readonly(self.consumer_registration, false),
            AccountMeta::new(self.vrf_request(request_id), false),
        ]
    }
}

/// Bridge program bound in the game's `GameConfig`.
///
/// Layout: disc (8) + authority (32) + oracle_bridge (32) + ...
pub fn parse_game_bridge(data: &[u8]) -> Option<Pubkey> {
    if !has_discriminator(data, "GameConfig") {
        return None;
    }
    read_pubkey(data, 40)
}

/// `(coordinator_program, subscription_id)` from the bridge's `BridgeConfig`.
///
/// Layout: disc (8) + owner (32) + coordinator_program (32) + oracle (32) +
/// subscription_id (8) + ...
pub fn parse_bridge_route(data: &[u8]) -> Option<(Pubkey, u64)> {
    if !has_discriminator(data, "BridgeConfig") {
        return None;
    }
    Some((read_pubkey(data, 40)?, read_u64(data, 104)?))
}

/// Id the coordinator will assign to its next request.
///
/// Layout: disc (8) + admin (32) + authority (32) + fee_per_word (8) +
/// max_num_words (4) + request_counter (8) + ...
pub fn parse_request_counter(data: &[u8]) -> Option<u64> {
    if !has_discriminator(data, "CoordinatorConfig") {
        return None;
    }
    read_u64(data, 84)
}

/// The fields of a `DiceRoll` account the client cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiceRollView {
    pub player: Pubkey,
    pub request_id: u64,
    pub status: u8,
    pub result: u8,
}

impl DiceRollView {
    pub fn is_published(&self) -> bool {
        self.status == STATUS_PUBLISHED
    }
}

/// Layout: disc (8) + player (32) + request_id (8) + status (1) + result (1) + ...
pub fn parse_dice_roll(data: &[u8]) -> Option<DiceRollView> {
    if !has_discriminator(data, "DiceRoll") || data.len() < 50 {
        return None;
    }
    Some(DiceRollView {
        player: read_pubkey(data, 8)?,
        request_id: read_u64(data, 40)?,
        status: data[48],
        result: data[49],
    })
}
