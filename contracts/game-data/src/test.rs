#![cfg(test)]

use crate::{DataError, GameDataContract, GameDataContractClient};
use soroban_sdk::testutils::{Address as _, Ledger as _};
use soroban_sdk::{Address, Bytes, Env, IntoVal, String};

// ════════════════════════════════════════════════════════════════════════════
//  Helpers
// ════════════════════════════════════════════════════════════════════════════

fn setup() -> (Env, GameDataContractClient<'static>, Address) {
    let env = Env::default();
    env.mock_all_auths();

    env.ledger().set(soroban_sdk::testutils::LedgerInfo {
        timestamp: 1_700_000_000,
        protocol_version: 25,
        sequence_number: 100,
        network_id: Default::default(),
        base_reserve: 10,
        min_temp_entry_ttl: u32::MAX / 2,
        min_persistent_entry_ttl: u32::MAX / 2,
        max_entry_ttl: u32::MAX / 2,
    });

    let admin = Address::generate(&env);
    let contract_id = env.register(GameDataContract, (&admin,));
    let client = GameDataContractClient::new(&env, &contract_id);

    (env, client, admin)
}

fn key(env: &Env) -> String {
    String::from_str(env, "game_players")
}

fn payload(env: &Env, text: &str) -> Bytes {
    Bytes::from_slice(env, text.as_bytes())
}

fn assert_data_error<T, E>(
    result: &Result<Result<T, E>, Result<DataError, soroban_sdk::InvokeError>>,
    expected: DataError,
) {
    match result {
        Err(Ok(actual)) => assert_eq!(*actual, expected),
        Err(Err(invoke_err)) => panic!("Expected {:?}, got invoke error: {:?}", expected, invoke_err),
        Ok(_) => panic!("Expected {:?}, but operation succeeded", expected),
    }
}

// ════════════════════════════════════════════════════════════════════════════
//  Reads
// ════════════════════════════════════════════════════════════════════════════

#[test]
fn test_absent_document_is_empty() {
    let (env, client, _admin) = setup();
    assert!(client.is_available());
    assert!(client.get_data(&key(&env)).is_empty());
    assert_eq!(client.get_version(&key(&env)), 0);
    assert_eq!(client.get_address(), client.address);
}

// ════════════════════════════════════════════════════════════════════════════
//  Writes
// ════════════════════════════════════════════════════════════════════════════

#[test]
fn test_admin_write_bumps_version() {
    let (env, client, admin) = setup();

    let v1 = client.set_data(&admin, &key(&env), &payload(&env, "[]"));
    assert_eq!(v1, 1);
    let v2 = client.set_data(&admin, &key(&env), &payload(&env, "[1]"));
    assert_eq!(v2, 2);

    assert_eq!(client.get_data(&key(&env)), payload(&env, "[1]"));
    assert_eq!(client.get_version(&key(&env)), 2);
}

#[test]
fn test_unknown_writer_rejected() {
    let (env, client, _admin) = setup();
    let outsider = Address::generate(&env);

    let result = client.try_set_data(&outsider, &key(&env), &payload(&env, "[]"));
    assert_data_error(&result, DataError::NotAuthorized);
    assert_eq!(client.get_version(&key(&env)), 0);
}

#[test]
fn test_authorized_writer_can_write_until_revoked() {
    let (env, client, _admin) = setup();
    let writer = Address::generate(&env);

    client.authorize_writer(&writer);
    assert_eq!(client.get_writers().len(), 1);
    client.set_data(&writer, &key(&env), &payload(&env, "[]"));

    client.revoke_writer(&writer);
    assert_eq!(client.get_writers().len(), 0);
    let result = client.try_set_data(&writer, &key(&env), &payload(&env, "[]"));
    assert_data_error(&result, DataError::NotAuthorized);
}

#[test]
fn test_authorize_writer_is_idempotent() {
    let (env, client, _admin) = setup();
    let writer = Address::generate(&env);

    client.authorize_writer(&writer);
    client.authorize_writer(&writer);
    assert_eq!(client.get_writers().len(), 1);
}

#[test]
fn test_conditional_write_detects_stale_version() {
    let (env, client, admin) = setup();

    client.set_data(&admin, &key(&env), &payload(&env, "[\"a\"]"));

    // A second client read at version 0 and tries to write on top of it.
    let stale = client.try_set_data_if(&admin, &key(&env), &payload(&env, "[\"b\"]"), &0);
    assert_data_error(&stale, DataError::VersionConflict);
    assert_eq!(client.get_data(&key(&env)), payload(&env, "[\"a\"]"));

    let fresh = client.set_data_if(&admin, &key(&env), &payload(&env, "[\"a\",\"b\"]"), &1);
    assert_eq!(fresh, 2);
}

#[test]
fn test_remove_clears_payload_and_advances_version() {
    let (env, client, admin) = setup();

    client.set_data(&admin, &key(&env), &payload(&env, "garbage"));
    let version = client.remove_data(&key(&env));

    assert_eq!(version, 2);
    assert!(client.get_data(&key(&env)).is_empty());
    assert_eq!(client.get_version(&key(&env)), 2);
}

#[test]
fn test_stale_version_still_conflicts_after_remove() {
    let (env, client, admin) = setup();

    client.set_data(&admin, &key(&env), &payload(&env, "[\"a\"]"));
    let seen = client.get_version(&key(&env));

    client.remove_data(&key(&env));
    client.set_data(&admin, &key(&env), &payload(&env, "[\"fresh\"]"));

    let stale = client.try_set_data_if(&admin, &key(&env), &payload(&env, "[\"stale\"]"), &seen);
    assert_data_error(&stale, DataError::VersionConflict);
    assert_eq!(client.get_data(&key(&env)), payload(&env, "[\"fresh\"]"));
    assert_eq!(client.get_version(&key(&env)), 3);
}

#[test]
fn test_remove_requires_admin() {
    let (env, client, _admin) = setup();
    let writer = Address::generate(&env);
    client.authorize_writer(&writer);
    client.set_data(&writer, &key(&env), &payload(&env, "[]"));

    // Only the writer signs; the admin does not.
    env.mock_auths(&[soroban_sdk::testutils::MockAuth {
        address: &writer,
        invoke: &soroban_sdk::testutils::MockAuthInvoke {
            contract: &client.address,
            fn_name: "remove_data",
            args: (key(&env),).into_val(&env),
            sub_invokes: &[],
        },
    }]);
    let result = client.try_remove_data(&key(&env));
    assert!(result.is_err());
    assert_eq!(client.get_data(&key(&env)), payload(&env, "[]"));
    assert_eq!(client.get_version(&key(&env)), 1);
}

// ════════════════════════════════════════════════════════════════════════════
//  Availability
// ════════════════════════════════════════════════════════════════════════════

#[test]
fn test_writes_refused_while_unavailable() {
    let (env, client, admin) = setup();

    client.set_available(&false);
    assert!(!client.is_available());

    let result = client.try_set_data(&admin, &key(&env), &payload(&env, "[]"));
    assert_data_error(&result, DataError::Unavailable);

    client.set_available(&true);
    assert_eq!(client.set_data(&admin, &key(&env), &payload(&env, "[]")), 1);
}

#[test]
fn test_write_without_signature_fails() {
    let (env, client, admin) = setup();
    env.set_auths(&[]);

    let result = client.try_set_data(&admin, &key(&env), &payload(&env, "[]"));
    assert!(result.is_err());
    assert_eq!(client.get_version(&key(&env)), 0);
}
