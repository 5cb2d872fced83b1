#![cfg(test)]

use crate::codec::{self, Op};
use soroban_sdk::{symbol_short, Env, String};

fn token(env: &Env, text: &str) -> String {
    String::from_str(env, text)
}

#[test]
fn test_encrypt_matches_web_client_tokens() {
    let env = Env::default();
    assert_eq!(codec::encrypt(&env, 0), token(&env, "FHE-MA=="));
    assert_eq!(codec::encrypt(&env, 1), token(&env, "FHE-MQ=="));
    assert_eq!(codec::encrypt(&env, 2), token(&env, "FHE-Mg=="));
    assert_eq!(codec::encrypt(&env, -42), token(&env, "FHE-LTQy"));
}

#[test]
fn test_decrypt_inverts_encrypt_at_the_extremes() {
    let env = Env::default();
    for value in [i64::MIN, -1, 0, 7, 123_456_789, i64::MAX] {
        let sealed = codec::encrypt(&env, value);
        assert_eq!(codec::decrypt(&sealed), Some(value));
    }
}

#[test]
fn test_decrypt_accepts_unpadded_and_plain_input() {
    let env = Env::default();
    assert_eq!(codec::decrypt(&token(&env, "FHE-MQ")), Some(1));
    assert_eq!(codec::decrypt(&token(&env, "7")), Some(7));
    assert_eq!(codec::decrypt(&token(&env, "  12abc")), Some(12));
}

#[test]
fn test_fractional_values_are_not_integers() {
    let env = Env::default();
    assert_eq!(codec::decrypt(&token(&env, "FHE-MS41")), None); // "1.5"
    assert_eq!(codec::decrypt(&token(&env, "FHE-MS4w")), Some(1)); // "1.0"
    assert_eq!(codec::decrypt(&token(&env, "-2.000")), Some(-2));
    assert_eq!(codec::decrypt(&token(&env, "3.25")), None);

    // Toggle treats a fraction like any unreadable value.
    let toggled = codec::compute(&env, &token(&env, "FHE-MS41"), Op::Toggle);
    assert_eq!(toggled, token(&env, "FHE-MQ=="));
}

#[test]
fn test_malformed_tokens_are_unreadable() {
    let env = Env::default();
    assert_eq!(codec::decrypt(&token(&env, "")), None);
    assert_eq!(codec::decrypt(&token(&env, "FHE-")), None);
    assert_eq!(codec::decrypt(&token(&env, "FHE-***")), None);
    assert_eq!(codec::decrypt(&token(&env, "FHE-YWJj")), None); // "abc"
    assert_eq!(codec::decrypt(&token(&env, "abc")), None);
    assert_eq!(codec::decrypt(&token(&env, "99999999999999999999")), None);
}

#[test]
fn test_toggle_flips_between_zero_and_one() {
    let env = Env::default();
    let done = codec::compute(&env, &token(&env, "FHE-MA=="), Op::Toggle);
    assert_eq!(done, token(&env, "FHE-MQ=="));
    let open = codec::compute(&env, &done, Op::Toggle);
    assert_eq!(open, token(&env, "FHE-MA=="));

    // Anything that is not 1 toggles to 1, garbage included.
    let from_seven = codec::compute(&env, &codec::encrypt(&env, 7), Op::Toggle);
    assert_eq!(from_seven, token(&env, "FHE-MQ=="));
    let from_garbage = codec::compute(&env, &token(&env, "FHE-!!"), Op::Toggle);
    assert_eq!(from_garbage, token(&env, "FHE-MQ=="));
}

#[test]
fn test_increment_saturates_and_keeps_garbage() {
    let env = Env::default();
    let next = codec::compute(&env, &codec::encrypt(&env, 5), Op::Increment);
    assert_eq!(codec::decrypt(&next), Some(6));

    let top = codec::compute(&env, &codec::encrypt(&env, i64::MAX), Op::Increment);
    assert_eq!(codec::decrypt(&top), Some(i64::MAX));

    let garbage = token(&env, "FHE-!!");
    assert_eq!(codec::compute(&env, &garbage, Op::Increment), garbage);
    assert_eq!(codec::compute(&env, &garbage, Op::Identity), garbage);
}

#[test]
fn test_op_from_symbol() {
    assert_eq!(Op::from_symbol(&symbol_short!("increment")), Op::Increment);
    assert_eq!(Op::from_symbol(&symbol_short!("toggle")), Op::Toggle);
    assert_eq!(Op::from_symbol(&symbol_short!("double")), Op::Identity);
}

#[test]
fn test_decimal_formatting() {
    let mut out = [0u8; codec::MAX_DECIMAL_BYTES];

    let n = codec::format_unsigned(0, &mut out);
    assert_eq!(&out[..n], b"0");

    let n = codec::format_unsigned(u64::MAX, &mut out);
    assert_eq!(&out[..n], b"18446744073709551615");

    let n = codec::format_signed(i64::MIN, &mut out);
    assert_eq!(&out[..n], b"-9223372036854775808");

    let n = codec::format_signed(-5, &mut out);
    assert_eq!(&out[..n], b"-5");
}
