//! Consent sessions for revealing sealed fields.
//!
//! A viewer opens a session once, then authorizes each reveal over the
//! session's consent message:
//!
//! ```text
//! publickey:0x<2000 hex nibbles>
//! contractAddresses:<game contract strkey>
//! contractsChainId:0x<network id>
//! startTimestamp:<unix seconds>
//! durationDays:<days>
//! ```
//!
//! The public key is drawn from the ledger PRNG and is not key material.

use soroban_sdk::{Bytes, Env};

use crate::codec;
use crate::DecryptSession;

/// 1000 bytes, i.e. 2000 hex nibbles in the consent message.
pub const PUBLIC_KEY_BYTES: u32 = 1_000;

pub const SESSION_DURATION_DAYS: u32 = 30;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;
const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";
const HEX_CHUNK: u32 = 64;

pub fn open(env: &Env) -> DecryptSession {
    DecryptSession {
        public_key: generate_public_key(env),
        contract: env.current_contract_address(),
        network_id: env.ledger().network_id(),
        start_timestamp: env.ledger().timestamp(),
        duration_days: SESSION_DURATION_DAYS,
    }
}

pub fn generate_public_key(env: &Env) -> Bytes {
    let mut key = Bytes::new(env);
    let mut i = 0;
    while i < PUBLIC_KEY_BYTES / 8 {
        let word: u64 = env.prng().gen();
        key.extend_from_slice(&word.to_be_bytes());
        i += 1;
    }
    key
}

pub fn is_expired(session: &DecryptSession, now: u64) -> bool {
    let lifetime = session.duration_days as u64 * SECONDS_PER_DAY;
    now >= session.start_timestamp.saturating_add(lifetime)
}

pub fn consent_message(env: &Env, session: &DecryptSession) -> Bytes {
    let mut message = Bytes::from_slice(env, b"publickey:0x");
    append_hex(&mut message, &session.public_key);

    message.extend_from_slice(b"\ncontractAddresses:");
    message.append(&session.contract.to_string().to_bytes());

    message.extend_from_slice(b"\ncontractsChainId:0x");
    let network_id: Bytes = session.network_id.clone().into();
    append_hex(&mut message, &network_id);

    let mut digits = [0u8; codec::MAX_DECIMAL_BYTES];
    message.extend_from_slice(b"\nstartTimestamp:");
    let n = codec::format_unsigned(session.start_timestamp, &mut digits);
    message.extend_from_slice(&digits[..n]);

    message.extend_from_slice(b"\ndurationDays:");
    let n = codec::format_unsigned(session.duration_days as u64, &mut digits);
    message.extend_from_slice(&digits[..n]);

    message
}

fn append_hex(message: &mut Bytes, data: &Bytes) {
    let mut raw = [0u8; HEX_CHUNK as usize];
    let mut hex = [0u8; 2 * HEX_CHUNK as usize];
    let mut offset = 0;
    while offset < data.len() {
        let end = (offset + HEX_CHUNK).min(data.len());
        let n = (end - offset) as usize;
        data.slice(offset..end).copy_into_slice(&mut raw[..n]);
        for (i, b) in raw[..n].iter().enumerate() {
            hex[2 * i] = HEX_DIGITS[(b >> 4) as usize];
            hex[2 * i + 1] = HEX_DIGITS[(b & 0x0F) as usize];
        }
        message.extend_from_slice(&hex[..2 * n]);
        offset = end;
    }
}
