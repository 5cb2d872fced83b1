//! Reversible number encoding for the "sealed" role and task fields.
//!
//! This is not encryption. A token is `FHE-` followed by the base64 of the
//! decimal text of the value, and anyone holding the token can invert it.
//! The format is kept so documents stay interchangeable with the web client
//! that introduced it.
//!
//! Values are `i64`. A token whose decimal text has a non-zero fraction
//! (`"FHE-MS41"`, i.e. `"1.5"`) has no integer value and decodes to `None`,
//! like any other unreadable token.
//!
//! ```text
//! encrypt(1)   == "FHE-MQ=="
//! encrypt(-42) == "FHE-LTQy"
//! decrypt("7") == Some(7)      // unprefixed input is parsed as plain text
//! ```

use soroban_sdk::{symbol_short, Env, String, Symbol};

pub const TOKEN_PREFIX: &[u8] = b"FHE-";

/// Longest token accepted by `decrypt`; anything longer is unreadable.
pub const MAX_TOKEN_BYTES: usize = 64;

/// Room for the decimal text of any `i64` ("-9223372036854775808").
pub const MAX_DECIMAL_BYTES: usize = 20;

const BASE64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Arithmetic applied to a decoded token by `compute`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Op {
    Increment,
    Toggle,
    Identity,
}

impl Op {
    /// `increment` and `toggle` are recognised; every other symbol is identity.
    pub fn from_symbol(op: &Symbol) -> Op {
        if *op == symbol_short!("increment") {
            Op::Increment
        } else if *op == symbol_short!("toggle") {
            Op::Toggle
        } else {
            Op::Identity
        }
    }
}

pub fn encrypt(env: &Env, value: i64) -> String {
    let mut decimal = [0u8; MAX_DECIMAL_BYTES];
    let digits = format_signed(value, &mut decimal);

    let mut token = [0u8; MAX_TOKEN_BYTES];
    let prefix = TOKEN_PREFIX.len();
    token[..prefix].copy_from_slice(TOKEN_PREFIX);
    let encoded = base64_encode(&decimal[..digits], &mut token[prefix..]);
    String::from_bytes(env, &token[..prefix + encoded])
}

/// `None` is the not-a-number outcome: malformed tokens never panic.
pub fn decrypt(token: &String) -> Option<i64> {
    let len = token.len() as usize;
    if len == 0 || len > MAX_TOKEN_BYTES {
        return None;
    }
    let mut buf = [0u8; MAX_TOKEN_BYTES];
    token.copy_into_slice(&mut buf[..len]);
    decrypt_slice(&buf[..len])
}

pub fn decrypt_slice(text: &[u8]) -> Option<i64> {
    match text.strip_prefix(TOKEN_PREFIX) {
        Some(body) => {
            let mut decimal = [0u8; MAX_TOKEN_BYTES];
            let len = base64_decode(body, &mut decimal)?;
            parse_leading_i64(&decimal[..len])
        }
        None => parse_leading_i64(text),
    }
}

/// Decode, apply `op`, re-encode.
///
/// Toggle maps 1 to 0 and anything else (unreadable input included) to 1.
/// Increment saturates at `i64::MAX`. Increment and identity hand an
/// unreadable token back unchanged.
pub fn compute(env: &Env, token: &String, op: Op) -> String {
    match (op, decrypt(token)) {
        (Op::Toggle, Some(1)) => encrypt(env, 0),
        (Op::Toggle, _) => encrypt(env, 1),
        (Op::Increment, Some(value)) => encrypt(env, value.saturating_add(1)),
        (Op::Identity, Some(value)) => encrypt(env, value),
        (_, None) => token.clone(),
    }
}

// ─── Decimal text ──────────────────────────────────────────────────────────

/// Writes the decimal digits of `value` at the start of `out`, returns the length.
/// `out` must hold at least `MAX_DECIMAL_BYTES`.
pub fn format_unsigned(value: u64, out: &mut [u8]) -> usize {
    let mut reversed = [0u8; MAX_DECIMAL_BYTES];
    let mut n = value;
    let mut count = 0;
    loop {
        reversed[count] = b'0' + (n % 10) as u8;
        n /= 10;
        count += 1;
        if n == 0 {
            break;
        }
    }
    for i in 0..count {
        out[i] = reversed[count - 1 - i];
    }
    count
}

pub fn format_signed(value: i64, out: &mut [u8]) -> usize {
    if value < 0 {
        out[0] = b'-';
        1 + format_unsigned(value.unsigned_abs(), &mut out[1..])
    } else {
        format_unsigned(value as u64, out)
    }
}

/// Lenient integer parse: leading whitespace, optional sign, then digits up to
/// the first non-digit. No digits or overflow gives `None`. A fraction is only
/// accepted when it is all zeros (`"1.0"` is 1, `"1.5"` is `None`).
fn parse_leading_i64(text: &[u8]) -> Option<i64> {
    let mut pos = 0;
    while pos < text.len() && text[pos].is_ascii_whitespace() {
        pos += 1;
    }
    let mut negative = false;
    if pos < text.len() && (text[pos] == b'-' || text[pos] == b'+') {
        negative = text[pos] == b'-';
        pos += 1;
    }

    // Accumulate negatively so i64::MIN parses.
    let mut acc: i64 = 0;
    let mut digits = 0;
    while pos < text.len() && text[pos].is_ascii_digit() {
        let digit = (text[pos] - b'0') as i64;
        acc = acc.checked_mul(10)?.checked_sub(digit)?;
        digits += 1;
        pos += 1;
    }
    if digits == 0 {
        return None;
    }
    if pos < text.len() && text[pos] == b'.' {
        pos += 1;
        while pos < text.len() && text[pos].is_ascii_digit() {
            if text[pos] != b'0' {
                return None;
            }
            pos += 1;
        }
    }
    if negative {
        Some(acc)
    } else {
        acc.checked_neg()
    }
}

// ─── Base64 (standard alphabet, padded) ────────────────────────────────────

fn base64_encode(input: &[u8], out: &mut [u8]) -> usize {
    let mut len = 0;
    for chunk in input.chunks(3) {
        let b0 = chunk[0] as u32;
        let b1 = if chunk.len() > 1 { chunk[1] as u32 } else { 0 };
        let b2 = if chunk.len() > 2 { chunk[2] as u32 } else { 0 };
        let triple = (b0 << 16) | (b1 << 8) | b2;

        out[len] = BASE64_ALPHABET[((triple >> 18) & 0x3F) as usize];
        out[len + 1] = BASE64_ALPHABET[((triple >> 12) & 0x3F) as usize];
        out[len + 2] = if chunk.len() > 1 {
            BASE64_ALPHABET[((triple >> 6) & 0x3F) as usize]
        } else {
            b'='
        };
        out[len + 3] = if chunk.len() > 2 {
            BASE64_ALPHABET[(triple & 0x3F) as usize]
        } else {
            b'='
        };
        len += 4;
    }
    len
}

/// Padding is optional, as with the browser's `atob`.
fn base64_decode(input: &[u8], out: &mut [u8]) -> Option<usize> {
    let mut end = input.len();
    let mut padding = 0;
    while end > 0 && input[end - 1] == b'=' && padding < 2 {
        end -= 1;
        padding += 1;
    }
    let data = &input[..end];
    if data.len() % 4 == 1 {
        return None;
    }
    if padding > 0 && (data.len() + padding) % 4 != 0 {
        return None;
    }

    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mut len = 0;
    for &c in data {
        acc = (acc << 6) | sextet(c)? as u32;
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            if len >= out.len() {
                return None;
            }
            out[len] = (acc >> bits) as u8;
            len += 1;
            acc &= (1 << bits) - 1;
        }
    }
    Some(len)
}

fn sextet(c: u8) -> Option<u8> {
    match c {
        b'A'..=b'Z' => Some(c - b'A'),
        b'a'..=b'z' => Some(c - b'a' + 26),
        b'0'..=b'9' => Some(c - b'0' + 52),
        b'+' => Some(62),
        b'/' => Some(63),
        _ => None,
    }
}
