//! Anchor discriminators and `DiceLanded` event decoding from transaction logs.
//!
//! Anchor emits events as base64 `Program data:` log lines. Only lines logged
//! while the game program is the innermost running program are accepted, so
//! another program in the same transaction cannot forge an outcome.

use base64::Engine;
use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::correlator::RollOutcome;

fn sighash(namespace: &str, name: &str) -> [u8; 8] {
    let mut hasher = Sha256::new();
    hasher.update(format!("{namespace}:{name}"));
    let hash = hasher.finalize();
    let mut disc = [0u8; 8];
    disc.copy_from_slice(&hash[..8]);
    disc
}

/// `sha256("event:<Name>")[..8]`.
pub fn event_discriminator(event_name: &str) -> [u8; 8] {
    sighash("event", event_name)
}

/// `sha256("account:<Name>")[..8]`.
pub fn account_discriminator(account_name: &str) -> [u8; 8] {
    sighash("account", account_name)
}

/// `sha256("global:<name>")[..8]`.
pub fn instruction_discriminator(instruction_name: &str) -> [u8; 8] {
    sighash("global", instruction_name)
}

/// Decode a `DiceLanded` payload (discriminator already stripped).
///
/// Layout: `request_id (8) + player (32) + result (1) = 41 bytes`.
pub fn parse_dice_landed(data: &[u8]) -> Option<RollOutcome> {
    if data.len() < 41 {
        return None;
    }
    let request_id = u64::from_le_bytes(data[0..8].try_into().ok()?);
    let player = Pubkey::try_from(&data[8..40]).ok()?;
    let result = data[40];
    if !(1..=6).contains(&result) {
        return None;
    }
    Some(RollOutcome {
        request_id,
        player,
        result,
    })
}

/// Raw event payloads emitted by `program_id` in one transaction's logs.
///
/// Tracks the `invoke` / `success` / `failed` lines to know which program
/// logged each `Program data:` line.
pub fn program_data<'a>(logs: &'a [String], program_id: &Pubkey) -> Vec<Vec<u8>> {
    let program_id = program_id.to_string();
    let mut stack: Vec<&'a str> = Vec::new();
    let mut payloads = Vec::new();

    for line in logs {
        let Some(rest) = line.strip_prefix("Program ") else {
            continue;
        };

        if let Some(data) = rest.strip_prefix("data: ") {
            if stack.last() != Some(&program_id.as_str()) {
                continue;
            }
            match base64::engine::general_purpose::STANDARD.decode(data.trim()) {
                Ok(decoded) => payloads.push(decoded),
                Err(e) => debug!(error = %e, "Failed to decode base64 log data"),
            }
        } else if let Some((id, tail)) = rest.split_once(' ') {
            // `log:`, `return:` and `consumption:` lines carry no frame change.
            if id.ends_with(':') {
                continue;
            }
            if tail.starts_with("invoke [") {
                stack.push(id);
            } else if tail == "success" || tail.starts_with("failed") {
                stack.pop();
            }
        }
    }

    payloads
}

/// All `DiceLanded` outcomes the game program emitted in `logs`.
pub fn dice_landed_events(logs: &[String], game_program: &Pubkey) -> Vec<RollOutcome> {
    let discriminator = event_discriminator("DiceLanded");
    program_data(logs, game_program)
        .into_iter()
        .filter(|payload| payload.len() >= 8 && payload[..8] == discriminator)
        .filter_map(|payload| parse_dice_landed(&payload[8..]))
        .collect()
}
