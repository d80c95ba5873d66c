use anchor_lang::prelude::*;

use crate::DiceError;

/// Seed of the game configuration PDA, which also signs requests to the bridge.
pub const GAME_CONFIG_SEED: &[u8] = b"game-config";
/// Seed prefix of a dice roll PDA: `["dice-roll", request_id.to_le_bytes()]`.
pub const DICE_ROLL_SEED: &[u8] = b"dice-roll";
/// Seed of the bridge configuration PDA, which signs forwarded fulfillments.
pub const BRIDGE_CONFIG_SEED: &[u8] = b"bridge-config";

/// Game configuration, stored as a singleton PDA.
///
/// Seeds: `["game-config"]`
///
/// The bridge is referenced by program id only; `bridge_authority` is the
/// PDA that bridge signs fulfillments with.
#[account]
#[derive(InitSpace, Debug, PartialEq)]
pub struct GameConfig {
    /// Key allowed to rewire the bridge.
    pub authority: Pubkey,
    /// Program id of the bound VRF bridge.
    pub oracle_bridge: Pubkey,
    /// `["bridge-config"]` PDA of `oracle_bridge`.
    pub bridge_authority: Pubkey,
    /// Set by `initialize`; guards against a second initialization.
    pub initialized: bool,
    pub rolls_requested: u64,
    pub rolls_published: u64,
    /// PDA bump seed cached for efficient re-derivation.
    pub bump: u8,
}

impl GameConfig {
    /// One-shot initializer for the deployed instance.
    pub fn initialize(&mut self, authority: Pubkey, oracle_bridge: Pubkey, bump: u8) -> Result<()> {
        require!(!self.initialized, DiceError::AlreadyInitialized);
        require!(
            oracle_bridge != Pubkey::default(),
            DiceError::ZeroAddressNotAllowed
        );
        self.authority = authority;
        self.bind(oracle_bridge);
        self.rolls_requested = 0;
        self.rolls_published = 0;
        self.initialized = true;
        self.bump = bump;
        Ok(())
    }

    /// Rewire to another bridge; authority only. Returns the previous bridge.
    pub fn set_oracle_bridge(&mut self, caller: &Pubkey, oracle_bridge: Pubkey) -> Result<Pubkey> {
        if *caller != self.authority {
            msg!("Rejected bridge rewiring from {}", caller);
            return err!(DiceError::Unauthorized);
        }
        require!(
            oracle_bridge != Pubkey::default(),
            DiceError::ZeroAddressNotAllowed
        );
        let previous = self.oracle_bridge;
        self.bind(oracle_bridge);
        Ok(previous)
    }

    fn bind(&mut self, oracle_bridge: Pubkey) {
        self.oracle_bridge = oracle_bridge;
        self.bridge_authority =
            Pubkey::find_program_address(&[BRIDGE_CONFIG_SEED], &oracle_bridge).0;
    }

    /// Requests go only through the bound bridge.
    pub fn ensure_bridge(&self, program: &Pubkey) -> Result<()> {
        require_keys_eq!(*program, self.oracle_bridge, DiceError::BridgeMismatch);
        Ok(())
    }

    /// Fulfillments are only accepted when signed by the bound bridge's PDA.
    /// A stale bridge that was rewired away is rejected the same way.
    pub fn ensure_bridge_caller(&self, caller: &Pubkey, is_signer: bool) -> Result<()> {
        if !is_signer || *caller != self.bridge_authority {
            msg!("Rejected fulfillment from {}", caller);
            return err!(DiceError::UnauthorizedCaller);
        }
        Ok(())
    }
}

/// A dice roll backed by VRF randomness, keyed by the coordinator's request id.
///
/// Seeds: `["dice-roll", request_id.to_le_bytes()]`
///
/// Lifecycle: Requested -> Fulfilled -> Published. An id with no account is
/// the Idle state; no transition skips a state and none goes backwards.
#[account]
#[derive(InitSpace, Debug, PartialEq)]
pub struct DiceRoll {
    /// The player who requested the roll.
    pub player: Pubkey,
    /// The VRF request id associated with this roll.
    pub request_id: u64,
    /// Lifecycle status. See `STATUS_*` constants.
    pub status: u8,
    /// Dice outcome: 0 until fulfilled, 1-6 afterwards.
    pub result: u8,
    /// First random word delivered by the oracle.
    pub random_word: [u8; 32],
    /// Slot at which the roll was requested.
    pub requested_slot: u64,
    /// Slot at which the fulfillment was accepted.
    pub fulfilled_slot: u64,
    /// PDA bump seed cached for efficient re-derivation.
    pub bump: u8,
}

impl DiceRoll {
    /// Request sent, awaiting fulfillment.
    pub const STATUS_REQUESTED: u8 = 1;
    /// Fulfillment accepted and outcome computed.
    pub const STATUS_FULFILLED: u8 = 2;
    /// Outcome published (terminal).
    pub const STATUS_PUBLISHED: u8 = 3;

    pub fn requested(player: Pubkey, request_id: u64, slot: u64, bump: u8) -> Self {
        Self {
            player,
            request_id,
            status: Self::STATUS_REQUESTED,
            result: 0,
            random_word: [0u8; 32],
            requested_slot: slot,
            fulfilled_slot: 0,
            bump,
        }
    }

    /// Accept the one fulfillment this roll may ever get and derive the face.
    ///
    /// Rejections leave the roll untouched.
    pub fn fulfill(&mut self, random_words: &[[u8; 32]], slot: u64) -> Result<u8> {
        self.ensure_awaiting_fulfillment()?;
        let word = random_words.first().ok_or(DiceError::EmptyRandomWords)?;

        let face = dice_face(word);
        self.random_word = *word;
        self.result = face;
        self.fulfilled_slot = slot;
        self.status = Self::STATUS_FULFILLED;
        Ok(face)
    }

    /// Only a roll still in `Requested` may be fulfilled.
    pub fn ensure_awaiting_fulfillment(&self) -> Result<()> {
        if self.status != Self::STATUS_REQUESTED {
            msg!("Duplicate fulfillment for request_id={}", self.request_id);
            return err!(DiceError::DuplicateFulfillment);
        }
        Ok(())
    }

    pub fn publish(&mut self) -> Result<()> {
        require!(
            self.status == Self::STATUS_FULFILLED,
            DiceError::InvalidStateTransition
        );
        self.status = Self::STATUS_PUBLISHED;
        Ok(())
    }
}

/// Map a random word onto a die face: `1 + (word mod 6)`.
///
/// The word is read as a little-endian 256-bit integer and reduced exactly.
/// The modulo bias is about 2^-253 and accepted.
pub fn dice_face(word: &[u8; 32]) -> u8 {
    let remainder = word
        .iter()
        .rev()
        .fold(0u16, |acc, byte| (acc * 256 + *byte as u16) % 6);
    remainder as u8 + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_lang::error::Error;

    fn code_of(err: Error) -> u32 {
        match err {
            Error::AnchorError(e) => e.error_code_number,
            Error::ProgramError(_) => u32::MAX,
        }
    }

    fn word(value: u64) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[..8].copy_from_slice(&value.to_le_bytes());
        word
    }

    fn config(authority: Pubkey, bridge: Pubkey) -> GameConfig {
        let mut config = GameConfig {
            authority: Pubkey::default(),
            oracle_bridge: Pubkey::default(),
            bridge_authority: Pubkey::default(),
            initialized: false,
            rolls_requested: 0,
            rolls_published: 0,
            bump: 0,
        };
        config.initialize(authority, bridge, 255).unwrap();
        config
    }

    #[test]
    fn face_is_one_plus_word_mod_six() {
        assert_eq!(dice_face(&word(17)), 6);
        assert_eq!(dice_face(&word(3)), 4);
        assert_eq!(dice_face(&word(6)), 1);
        assert_eq!(dice_face(&word(u64::MAX)), (u64::MAX % 6) as u8 + 1);
    }

    #[test]
    fn face_stays_in_range_at_extremes() {
        assert_eq!(dice_face(&[0u8; 32]), 1);
        // 2^256 - 1 = 3 (mod 6)
        assert_eq!(dice_face(&[0xFFu8; 32]), 4);
        // The high bytes count: 2^248 = 4 (mod 6)
        let mut high = [0u8; 32];
        high[31] = 1;
        assert_eq!(dice_face(&high), 5);

        for seed in 0u8..=255 {
            let face = dice_face(&[seed; 32]);
            assert!((1..=6).contains(&face));
        }
    }

    #[test]
    fn second_fulfillment_is_rejected_and_outcome_kept() {
        let player = Pubkey::new_unique();
        let mut roll = DiceRoll::requested(player, 42, 10, 254);

        assert_eq!(roll.fulfill(&[word(17)], 20).unwrap(), 6);
        roll.publish().unwrap();
        let published = roll.clone();

        let err = roll.fulfill(&[word(3)], 30).unwrap_err();
        assert_eq!(code_of(err), u32::from(DiceError::DuplicateFulfillment));
        assert_eq!(roll, published);
        assert_eq!(roll.result, 6);
        assert_eq!(roll.status, DiceRoll::STATUS_PUBLISHED);
    }

    #[test]
    fn fulfilled_but_unpublished_roll_also_rejects_duplicates() {
        let mut roll = DiceRoll::requested(Pubkey::new_unique(), 1, 0, 254);
        roll.fulfill(&[word(5)], 1).unwrap();
        let fulfilled = roll.clone();

        let err = roll.fulfill(&[word(0)], 2).unwrap_err();
        assert_eq!(code_of(err), u32::from(DiceError::DuplicateFulfillment));
        assert_eq!(roll, fulfilled);
    }

    #[test]
    fn only_requested_rolls_await_fulfillment() {
        let mut roll = DiceRoll::requested(Pubkey::new_unique(), 4, 0, 254);
        roll.ensure_awaiting_fulfillment().unwrap();

        roll.fulfill(&[word(2)], 1).unwrap();
        let err = roll.ensure_awaiting_fulfillment().unwrap_err();
        assert_eq!(code_of(err), u32::from(DiceError::DuplicateFulfillment));
    }

    #[test]
    fn transitions_cannot_skip_states() {
        let mut roll = DiceRoll::requested(Pubkey::new_unique(), 1, 0, 254);
        let err = roll.publish().unwrap_err();
        assert_eq!(code_of(err), u32::from(DiceError::InvalidStateTransition));
        assert_eq!(roll.status, DiceRoll::STATUS_REQUESTED);

        let err = roll.fulfill(&[], 1).unwrap_err();
        assert_eq!(code_of(err), u32::from(DiceError::EmptyRandomWords));
        assert_eq!(roll.status, DiceRoll::STATUS_REQUESTED);
    }

    #[test]
    fn out_of_order_fulfillments_stay_independent() {
        let p1 = Pubkey::new_unique();
        let p2 = Pubkey::new_unique();
        let mut first = DiceRoll::requested(p1, 1, 5, 250);
        let mut second = DiceRoll::requested(p2, 2, 5, 251);

        assert_eq!(second.fulfill(&[word(4)], 6).unwrap(), 5);
        assert_eq!(first.status, DiceRoll::STATUS_REQUESTED);
        assert_eq!(first.fulfill(&[word(9)], 7).unwrap(), 4);

        assert_eq!((first.player, first.result), (p1, 4));
        assert_eq!((second.player, second.result), (p2, 5));
    }

    #[test]
    fn same_player_rolls_are_tracked_separately() {
        let player = Pubkey::new_unique();
        let mut a = DiceRoll::requested(player, 7, 0, 1);
        let b = DiceRoll::requested(player, 8, 0, 2);

        a.fulfill(&[word(0)], 1).unwrap();
        assert_eq!(b.status, DiceRoll::STATUS_REQUESTED);
        assert_eq!(b.result, 0);
    }

    #[test]
    fn initialize_runs_once() {
        let bridge = Pubkey::new_unique();
        let mut config = config(Pubkey::new_unique(), bridge);
        assert_eq!(
            config.bridge_authority,
            Pubkey::find_program_address(&[b"bridge-config"], &bridge).0
        );
        let before = config.clone();

        let err = config
            .initialize(Pubkey::new_unique(), Pubkey::new_unique(), 1)
            .unwrap_err();
        assert_eq!(code_of(err), u32::from(DiceError::AlreadyInitialized));
        assert_eq!(config, before);
    }

    #[test]
    fn stranger_cannot_rewire_bridge() {
        let authority = Pubkey::new_unique();
        let bridge = Pubkey::new_unique();
        let mut config = config(authority, bridge);

        let err = config
            .set_oracle_bridge(&Pubkey::new_unique(), Pubkey::new_unique())
            .unwrap_err();
        assert_eq!(code_of(err), u32::from(DiceError::Unauthorized));
        assert_eq!(config.oracle_bridge, bridge);

        let err = config.set_oracle_bridge(&authority, Pubkey::default()).unwrap_err();
        assert_eq!(code_of(err), u32::from(DiceError::ZeroAddressNotAllowed));
        assert_eq!(config.oracle_bridge, bridge);
    }

    #[test]
    fn stale_bridge_is_rejected_after_rewiring() {
        let authority = Pubkey::new_unique();
        let old_bridge = Pubkey::new_unique();
        let mut config = config(authority, old_bridge);
        let old_signer = config.bridge_authority;
        config.ensure_bridge_caller(&old_signer, true).unwrap();

        let new_bridge = Pubkey::new_unique();
        assert_eq!(config.set_oracle_bridge(&authority, new_bridge).unwrap(), old_bridge);

        let err = config.ensure_bridge_caller(&old_signer, true).unwrap_err();
        assert_eq!(code_of(err), u32::from(DiceError::UnauthorizedCaller));
        let err = config.ensure_bridge(&old_bridge).unwrap_err();
        assert_eq!(code_of(err), u32::from(DiceError::BridgeMismatch));

        let new_signer = config.bridge_authority;
        config.ensure_bridge_caller(&new_signer, true).unwrap();
        config.ensure_bridge(&new_bridge).unwrap();
    }

    #[test]
    fn unsigned_or_foreign_callers_are_rejected() {
        let config = config(Pubkey::new_unique(), Pubkey::new_unique());
        let signer = config.bridge_authority;

        for (caller, signed) in [(Pubkey::new_unique(), true), (signer, false)] {
            let err = config.ensure_bridge_caller(&caller, signed).unwrap_err();
            assert_eq!(code_of(err), u32::from(DiceError::UnauthorizedCaller));
        }
    }
}
