use anchor_lang::prelude::*;

/// Error codes for the VRF bridge program.
///
/// Anchor encodes these as `6000 + variant index` in on-chain error responses.
#[error_code]
pub enum BridgeError {
    /// The subscription id was not provided; no request could be billed.
    #[msg("Subscription id is not set")]
    MissingSubscription,
    /// A subscription parameter is out of range (zero key hash, word count).
    #[msg("Invalid subscription configuration")]
    InvalidConfiguration,
    /// A public key argument was the zero address (`11111111111111111111111111111111`).
    #[msg("Zero address not allowed")]
    ZeroAddressNotAllowed,
    /// `initialize` was called on a bridge that is already configured.
    #[msg("Bridge is already initialized")]
    AlreadyInitialized,
    /// Signer does not have permission for this action (wrong owner or game authority).
    #[msg("Unauthorized")]
    Unauthorized,
    /// No game program has been bound with `bind_coordinator` yet.
    #[msg("No game program is bound to this bridge")]
    BridgeNotBound,
    /// The fulfillment callback was not signed by the coordinator's config PDA.
    #[msg("Fulfillment caller is not the registered oracle")]
    UntrustedCaller,
    /// The subscription balance cannot cover `fee_per_word * num_words`.
    #[msg("Subscription balance cannot cover the request fee")]
    UnfundedSubscription,
    /// The subscription account passed in is not the configured subscription.
    #[msg("Subscription account does not match the configured subscription")]
    SubscriptionMismatch,
    /// A coordinator account has the wrong owner or discriminator.
    #[msg("Invalid coordinator account")]
    InvalidCoordinatorAccount,
    /// The game program passed to the callback is not the bound game.
    #[msg("Game program does not match the bound game")]
    GameProgramMismatch,
    /// The callback carried a different number of words than configured.
    #[msg("Unexpected number of random words")]
    UnexpectedWordCount,
    /// The coordinator rejected the `request_random_words` CPI.
    #[msg("Coordinator request failed")]
    CoordinatorRequestFailed,
    /// The game rejected the forwarded fulfillment.
    #[msg("Forwarding the fulfillment to the game failed")]
    ForwardFailed,
    /// A bookkeeping counter would overflow u64 (practically unreachable).
    #[msg("Counter overflow")]
    CounterOverflow,
}
