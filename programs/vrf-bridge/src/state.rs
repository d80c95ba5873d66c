use anchor_lang::prelude::*;

use crate::errors::BridgeError;

/// Seed of the bridge configuration PDA, which also signs forwarded fulfillments.
pub const BRIDGE_CONFIG_SEED: &[u8] = b"bridge-config";
/// Seed of the signer PDA a game program uses when calling `request_randomness`.
pub const GAME_CONFIG_SEED: &[u8] = b"game-config";
/// Seed of the coordinator config PDA, which signs the coordinator's callbacks.
pub const COORDINATOR_CONFIG_SEED: &[u8] = b"coordinator-config";
/// Upper bound on random words per request.
pub const MAX_NUM_WORDS: u32 = 10;

/// Subscription parameters supplied at initialization and on reconfiguration.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionParams {
    /// Program id of the VRF coordinator that bills the subscription.
    pub coordinator_program: Pubkey,
    /// Coordinator subscription paying for requests. `None` is rejected.
    pub subscription_id: Option<u64>,
    /// Selects the oracle key; forwarded to the oracle in `RandomnessRequested`.
    pub key_hash: [u8; 32],
    /// Compute budget for the coordinator's callback into this bridge.
    pub callback_compute_limit: u32,
    /// Confirmations the oracle should wait before honoring a request.
    pub request_confirmations: u16,
    /// Random words requested per call.
    pub num_words: u32,
}

impl SubscriptionParams {
    /// Check every field and return the subscription id.
    pub fn validate(&self) -> Result<u64> {
        let Some(subscription_id) = self.subscription_id else {
            msg!("Rejected subscription config without a subscription id");
            return err!(BridgeError::MissingSubscription);
        };
        require!(
            self.coordinator_program != Pubkey::default(),
            BridgeError::ZeroAddressNotAllowed
        );
        require!(self.key_hash != [0u8; 32], BridgeError::InvalidConfiguration);
        require!(
            self.num_words > 0 && self.num_words <= MAX_NUM_WORDS,
            BridgeError::InvalidConfiguration
        );
        Ok(subscription_id)
    }
}

/// Address a program signs with when its PDA `[seed]` is used as a CPI signer.
pub fn signer_address(seed: &[u8], program_id: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[seed], program_id).0
}

/// Bridge configuration, stored as a singleton PDA.
///
/// Seeds: `["bridge-config"]`
///
/// Holds the subscription mechanics the game never sees, plus the two
/// late-bound identities: the oracle allowed to call back and the game that
/// receives fulfillments. Both are stored as lookup keys next to the signer
/// address derived from them.
#[account]
#[derive(InitSpace, Debug, PartialEq)]
pub struct BridgeConfig {
    /// Privileged key that may reconfigure the bridge and bind games.
    pub owner: Pubkey,
    /// VRF coordinator program id.
    pub coordinator_program: Pubkey,
    /// Coordinator config PDA; the only signer accepted on `fulfill_random_words`.
    pub oracle: Pubkey,
    /// Coordinator subscription paying for requests.
    pub subscription_id: u64,
    /// Oracle key selector.
    pub key_hash: [u8; 32],
    /// Compute budget for the coordinator's callback.
    pub callback_compute_limit: u32,
    /// Confirmations the oracle waits before honoring a request.
    pub request_confirmations: u16,
    /// Random words requested per call.
    pub num_words: u32,
    /// Bound game program; `Pubkey::default()` while unbound.
    pub game_program: Pubkey,
    /// Game config PDA of `game_program`; the only signer accepted on `request_randomness`.
    pub game_authority: Pubkey,
    /// Set by `initialize`; guards against a second initialization.
    pub initialized: bool,
    /// Requests accepted by the coordinator through this bridge.
    pub requests_forwarded: u64,
    /// Fulfillments accepted by the bound game.
    pub fulfillments_forwarded: u64,
    /// PDA bump seed cached for efficient re-derivation.
    pub bump: u8,
}

impl BridgeConfig {
    /// One-shot initialization. Validates everything before writing anything.
    pub fn initialize(
        &mut self,
        owner: Pubkey,
        params: &SubscriptionParams,
        bump: u8,
    ) -> Result<()> {
        require!(!self.initialized, BridgeError::AlreadyInitialized);
        self.apply(params)?;
        self.owner = owner;
        self.game_program = Pubkey::default();
        self.game_authority = Pubkey::default();
        self.requests_forwarded = 0;
        self.fulfillments_forwarded = 0;
        self.initialized = true;
        self.bump = bump;
        Ok(())
    }

    /// Replace the whole subscription configuration; owner only.
    pub fn reconfigure(&mut self, caller: &Pubkey, params: &SubscriptionParams) -> Result<()> {
        self.ensure_owner(caller)?;
        self.apply(params)
    }

    fn apply(&mut self, params: &SubscriptionParams) -> Result<()> {
        let subscription_id = params.validate()?;
        self.coordinator_program = params.coordinator_program;
        self.oracle = signer_address(COORDINATOR_CONFIG_SEED, &params.coordinator_program);
        self.subscription_id = subscription_id;
        self.key_hash = params.key_hash;
        self.callback_compute_limit = params.callback_compute_limit;
        self.request_confirmations = params.request_confirmations;
        self.num_words = params.num_words;
        Ok(())
    }

    pub fn ensure_owner(&self, caller: &Pubkey) -> Result<()> {
        if *caller != self.owner {
            msg!("Rejected owner-only call from {}", caller);
            return err!(BridgeError::Unauthorized);
        }
        Ok(())
    }

    /// Point fulfillments at `game_program`; owner only. Returns the previous binding.
    pub fn bind_game(&mut self, caller: &Pubkey, game_program: Pubkey) -> Result<Pubkey> {
        self.ensure_owner(caller)?;
        require!(
            game_program != Pubkey::default(),
            BridgeError::ZeroAddressNotAllowed
        );
        let previous = self.game_program;
        self.game_program = game_program;
        self.game_authority = signer_address(GAME_CONFIG_SEED, &game_program);
        Ok(previous)
    }

    pub fn is_bound(&self) -> bool {
        self.game_program != Pubkey::default()
    }

    /// The request must come from the bound game's signer PDA.
    pub fn ensure_game_caller(&self, caller: &Pubkey, is_signer: bool) -> Result<()> {
        require!(self.is_bound(), BridgeError::BridgeNotBound);
        if !is_signer || *caller != self.game_authority {
            msg!("Rejected randomness request from {}", caller);
            return err!(BridgeError::Unauthorized);
        }
        Ok(())
    }

    /// The callback must be signed by the coordinator's config PDA.
    pub fn ensure_oracle(&self, caller: &Pubkey, is_signer: bool) -> Result<()> {
        if !is_signer || *caller != self.oracle {
            msg!("Rejected fulfillment from untrusted caller {}", caller);
            return err!(BridgeError::UntrustedCaller);
        }
        Ok(())
    }

    /// The fulfillment target must be the currently bound game.
    pub fn ensure_bound_game(&self, game_program: &Pubkey) -> Result<()> {
        require!(self.is_bound(), BridgeError::BridgeNotBound);
        require_keys_eq!(
            *game_program,
            self.game_program,
            BridgeError::GameProgramMismatch
        );
        Ok(())
    }

    pub fn ensure_word_count(&self, len: usize) -> Result<()> {
        require!(
            len == self.num_words as usize,
            BridgeError::UnexpectedWordCount
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anchor_lang::error::Error;

    pub(crate) fn code_of(err: Error) -> u32 {
        match err {
            Error::AnchorError(e) => e.error_code_number,
            Error::ProgramError(_) => u32::MAX,
        }
    }

    pub(crate) fn params(coordinator: Pubkey) -> SubscriptionParams {
        SubscriptionParams {
            coordinator_program: coordinator,
            subscription_id: Some(7),
            key_hash: [9u8; 32],
            callback_compute_limit: 200_000,
            request_confirmations: 3,
            num_words: 1,
        }
    }

    fn blank() -> BridgeConfig {
        BridgeConfig {
            owner: Pubkey::default(),
            coordinator_program: Pubkey::default(),
            oracle: Pubkey::default(),
            subscription_id: 0,
            key_hash: [0u8; 32],
            callback_compute_limit: 0,
            request_confirmations: 0,
            num_words: 0,
            game_program: Pubkey::default(),
            game_authority: Pubkey::default(),
            initialized: false,
            requests_forwarded: 0,
            fulfillments_forwarded: 0,
            bump: 0,
        }
    }

    pub(crate) fn configured(owner: Pubkey, coordinator: Pubkey) -> BridgeConfig {
        let mut config = blank();
        config.initialize(owner, &params(coordinator), 254).unwrap();
        config
    }

    #[test]
    fn initialize_derives_oracle_signer() {
        let coordinator = Pubkey::new_unique();
        let config = configured(Pubkey::new_unique(), coordinator);

        assert!(config.initialized);
        assert_eq!(config.subscription_id, 7);
        assert_eq!(
            config.oracle,
            Pubkey::find_program_address(&[b"coordinator-config"], &coordinator).0
        );
        assert!(!config.is_bound());
    }

    #[test]
    fn missing_subscription_leaves_config_untouched() {
        let mut config = blank();
        let mut p = params(Pubkey::new_unique());
        p.subscription_id = None;

        let err = config.initialize(Pubkey::new_unique(), &p, 1).unwrap_err();
        assert_eq!(code_of(err), u32::from(BridgeError::MissingSubscription));
        assert_eq!(config, blank());
    }

    #[test]
    fn invalid_params_are_rejected() {
        let mut zero_coordinator = params(Pubkey::default());
        assert_eq!(
            code_of(zero_coordinator.validate().unwrap_err()),
            u32::from(BridgeError::ZeroAddressNotAllowed)
        );

        zero_coordinator.coordinator_program = Pubkey::new_unique();
        zero_coordinator.num_words = 0;
        assert_eq!(
            code_of(zero_coordinator.validate().unwrap_err()),
            u32::from(BridgeError::InvalidConfiguration)
        );

        let mut zero_key = params(Pubkey::new_unique());
        zero_key.key_hash = [0u8; 32];
        assert_eq!(
            code_of(zero_key.validate().unwrap_err()),
            u32::from(BridgeError::InvalidConfiguration)
        );
    }

    #[test]
    fn second_initialize_fails() {
        let owner = Pubkey::new_unique();
        let mut config = configured(owner, Pubkey::new_unique());
        let before = config.clone();

        let err = config
            .initialize(Pubkey::new_unique(), &params(Pubkey::new_unique()), 1)
            .unwrap_err();
        assert_eq!(code_of(err), u32::from(BridgeError::AlreadyInitialized));
        assert_eq!(config, before);
    }

    #[test]
    fn reconfigure_is_owner_only_and_atomic() {
        let owner = Pubkey::new_unique();
        let mut config = configured(owner, Pubkey::new_unique());
        let before = config.clone();

        let err = config
            .reconfigure(&Pubkey::new_unique(), &params(Pubkey::new_unique()))
            .unwrap_err();
        assert_eq!(code_of(err), u32::from(BridgeError::Unauthorized));
        assert_eq!(config, before);

        let mut bad = params(Pubkey::new_unique());
        bad.num_words = MAX_NUM_WORDS + 1;
        assert!(config.reconfigure(&owner, &bad).is_err());
        assert_eq!(config, before);

        let new_coordinator = Pubkey::new_unique();
        let mut next = params(new_coordinator);
        next.subscription_id = Some(11);
        config.reconfigure(&owner, &next).unwrap();
        assert_eq!(config.subscription_id, 11);
        assert_eq!(config.coordinator_program, new_coordinator);
        assert_eq!(
            config.oracle,
            signer_address(COORDINATOR_CONFIG_SEED, &new_coordinator)
        );
    }

    #[test]
    fn rebinding_by_stranger_keeps_previous_binding() {
        let owner = Pubkey::new_unique();
        let mut config = configured(owner, Pubkey::new_unique());
        let game = Pubkey::new_unique();
        assert_eq!(config.bind_game(&owner, game).unwrap(), Pubkey::default());

        let err = config
            .bind_game(&Pubkey::new_unique(), Pubkey::new_unique())
            .unwrap_err();
        assert_eq!(code_of(err), u32::from(BridgeError::Unauthorized));
        assert_eq!(config.game_program, game);
        assert_eq!(config.game_authority, signer_address(GAME_CONFIG_SEED, &game));

        let next = Pubkey::new_unique();
        assert_eq!(config.bind_game(&owner, next).unwrap(), game);
        assert_eq!(config.game_program, next);
    }

    #[test]
    fn request_requires_bound_game_signer() {
        let owner = Pubkey::new_unique();
        let mut config = configured(owner, Pubkey::new_unique());
        let stranger = Pubkey::new_unique();

        assert_eq!(
            code_of(config.ensure_game_caller(&stranger, true).unwrap_err()),
            u32::from(BridgeError::BridgeNotBound)
        );

        let game = Pubkey::new_unique();
        config.bind_game(&owner, game).unwrap();
        let authority = signer_address(GAME_CONFIG_SEED, &game);

        assert_eq!(
            code_of(config.ensure_game_caller(&stranger, true).unwrap_err()),
            u32::from(BridgeError::Unauthorized)
        );
        assert_eq!(
            code_of(config.ensure_game_caller(&authority, false).unwrap_err()),
            u32::from(BridgeError::Unauthorized)
        );
        config.ensure_game_caller(&authority, true).unwrap();
    }

    #[test]
    fn only_coordinator_signer_may_fulfill() {
        let coordinator = Pubkey::new_unique();
        let config = configured(Pubkey::new_unique(), coordinator);
        let oracle = signer_address(COORDINATOR_CONFIG_SEED, &coordinator);

        for (caller, signed) in [
            (Pubkey::new_unique(), true),
            (coordinator, true),
            (oracle, false),
        ] {
            assert_eq!(
                code_of(config.ensure_oracle(&caller, signed).unwrap_err()),
                u32::from(BridgeError::UntrustedCaller)
            );
        }
        config.ensure_oracle(&oracle, true).unwrap();
    }

    #[test]
    fn fulfillment_target_must_be_bound_game() {
        let owner = Pubkey::new_unique();
        let mut config = configured(owner, Pubkey::new_unique());
        let game = Pubkey::new_unique();

        assert_eq!(
            code_of(config.ensure_bound_game(&game).unwrap_err()),
            u32::from(BridgeError::BridgeNotBound)
        );

        config.bind_game(&owner, game).unwrap();
        assert_eq!(
            code_of(config.ensure_bound_game(&Pubkey::new_unique()).unwrap_err()),
            u32::from(BridgeError::GameProgramMismatch)
        );
        config.ensure_bound_game(&game).unwrap();

        config.ensure_word_count(1).unwrap();
        assert_eq!(
            code_of(config.ensure_word_count(2).unwrap_err()),
            u32::from(BridgeError::UnexpectedWordCount)
        );
    }
}
