#![no_std]

//! # Game Data Contract
//!
//! Keyed document store shared by Hidden Kill clients and the game contract.
//! Each key holds an opaque byte payload (UTF-8 JSON in practice) plus a
//! version counter that advances on every write.
//!
//! ## Features
//! - Read-only views: availability, payload, version
//! - Signer-bound writes restricted to the admin and authorized writers
//! - Last-write-wins `set_data` and optimistic `set_data_if`
//! - Event emission for indexing

use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, Address, Bytes, Env,
    String, Vec,
};

// ═══════════════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════════════

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoredDocument {
    pub data: Bytes,
    pub version: u32,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DataKey {
    Admin,
    Available,
    /// Accounts and contracts allowed to write documents
    Writers,
    /// Document payload: DataKey::Document(key) → StoredDocument
    Document(String),
}

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum DataError {
    AdminNotSet = 1,
    NotAuthorized = 2,
    Unavailable = 3,
    VersionConflict = 4,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Events
// ═══════════════════════════════════════════════════════════════════════════════

#[contractevent]
pub struct EvDocumentWritten {
    pub key: String,
    pub writer: Address,
    pub version: u32,
    pub size: u32,
}

#[contractevent]
pub struct EvDocumentRemoved {
    pub key: String,
    pub writer: Address,
    pub version: u32,
}

#[contractevent]
pub struct EvAvailabilityChanged {
    pub available: bool,
}

#[contractevent]
pub struct EvWriterAuthorized {
    pub writer: Address,
    pub authorized: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Constants
// ═══════════════════════════════════════════════════════════════════════════════

// Ledger rate is approximately 5 seconds per ledger on Stellar
const LEDGER_RATE_SECS: u32 = 5;

// TTL expressed in human-readable time units (120 days)
const TTL_SECONDS: u32 = 120 * 24 * 60 * 60; // 10,368,000 seconds

/// TTL for documents in ledgers: 120 * 24 * 60 * 60 / 5 = 2,073,600 ledgers
const TTL_LEDGERS: u32 = TTL_SECONDS / LEDGER_RATE_SECS;

// ═══════════════════════════════════════════════════════════════════════════════
//  Contract
// ═══════════════════════════════════════════════════════════════════════════════

#[contract]
pub struct GameDataContract;

#[contractimpl]
impl GameDataContract {
    pub fn __constructor(env: Env, admin: Address) {
        env.storage().instance().set(&DataKey::Admin, &admin);
        env.storage().instance().set(&DataKey::Available, &true);
        let empty_writers: Vec<Address> = Vec::new(&env);
        env.storage().instance().set(&DataKey::Writers, &empty_writers);
    }

    // ─── Read-only views ───────────────────────────────────────────────────

    pub fn is_available(env: Env) -> bool {
        env.storage()
            .instance()
            .get(&DataKey::Available)
            .unwrap_or(false)
    }

    pub fn get_address(env: Env) -> Address {
        env.current_contract_address()
    }

    /// Payload stored under `key`. Empty when never written or removed.
    pub fn get_data(env: Env, key: String) -> Bytes {
        match Self::read_document(&env, &key) {
            Some(doc) => doc.data,
            None => Bytes::new(&env),
        }
    }

    /// Write counter for `key`, 0 when the document was never written.
    /// Removal counts as a write.
    pub fn get_version(env: Env, key: String) -> u32 {
        match Self::read_document(&env, &key) {
            Some(doc) => doc.version,
            None => 0,
        }
    }

    pub fn get_writers(env: Env) -> Vec<Address> {
        Self::load_writers(&env)
    }

    // ─── Signer-bound writes ───────────────────────────────────────────────

    /// Replace the payload under `key` unconditionally. Returns the new version.
    pub fn set_data(env: Env, writer: Address, key: String, data: Bytes) -> Result<u32, DataError> {
        Self::require_writer(&env, &writer)?;
        let current = Self::get_version(env.clone(), key.clone());
        Ok(Self::write_document(&env, &writer, key, data, current))
    }

    /// Replace the payload under `key` only if it is still at `expected_version`.
    pub fn set_data_if(
        env: Env,
        writer: Address,
        key: String,
        data: Bytes,
        expected_version: u32,
    ) -> Result<u32, DataError> {
        Self::require_writer(&env, &writer)?;
        let current = Self::get_version(env.clone(), key.clone());
        if current != expected_version {
            return Err(DataError::VersionConflict);
        }
        Ok(Self::write_document(&env, &writer, key, data, current))
    }

    /// Admin recovery: clear the payload under `key`. The version still
    /// advances, so a writer holding the pre-removal version stays stale.
    pub fn remove_data(env: Env, key: String) -> Result<u32, DataError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();

        let current = Self::get_version(env.clone(), key.clone());
        let version = current.saturating_add(1);
        let storage_key = DataKey::Document(key.clone());
        env.storage().persistent().set(
            &storage_key,
            &StoredDocument {
                data: Bytes::new(&env),
                version,
            },
        );
        env.storage()
            .persistent()
            .extend_ttl(&storage_key, TTL_LEDGERS, TTL_LEDGERS);

        EvDocumentRemoved {
            key,
            writer: admin,
            version,
        }
        .publish(&env);
        Ok(version)
    }

    // ─── Admin ─────────────────────────────────────────────────────────────

    pub fn get_admin(env: Env) -> Result<Address, DataError> {
        Self::load_admin(&env)
    }

    pub fn set_admin(env: Env, new_admin: Address) -> Result<(), DataError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        env.storage().instance().set(&DataKey::Admin, &new_admin);
        Ok(())
    }

    pub fn set_available(env: Env, available: bool) -> Result<(), DataError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        env.storage().instance().set(&DataKey::Available, &available);
        EvAvailabilityChanged { available }.publish(&env);
        Ok(())
    }

    /// Allow an account or contract (typically the game contract) to write documents.
    pub fn authorize_writer(env: Env, writer: Address) -> Result<(), DataError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        let mut writers = Self::load_writers(&env);
        if !writers.contains(&writer) {
            writers.push_back(writer.clone());
            env.storage().instance().set(&DataKey::Writers, &writers);
        }
        EvWriterAuthorized {
            writer,
            authorized: true,
        }
        .publish(&env);
        Ok(())
    }

    pub fn revoke_writer(env: Env, writer: Address) -> Result<(), DataError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        let mut writers = Self::load_writers(&env);
        if let Some(idx) = writers.first_index_of(&writer) {
            writers.remove(idx);
            env.storage().instance().set(&DataKey::Writers, &writers);
        }
        EvWriterAuthorized {
            writer,
            authorized: false,
        }
        .publish(&env);
        Ok(())
    }

    // ─── Internal helpers ──────────────────────────────────────────────────

    fn require_writer(env: &Env, writer: &Address) -> Result<(), DataError> {
        writer.require_auth();

        let admin = Self::load_admin(env)?;
        if *writer != admin && !Self::load_writers(env).contains(writer) {
            return Err(DataError::NotAuthorized);
        }
        if !Self::is_available(env.clone()) {
            return Err(DataError::Unavailable);
        }
        Ok(())
    }

    fn read_document(env: &Env, key: &String) -> Option<StoredDocument> {
        env.storage()
            .persistent()
            .get(&DataKey::Document(key.clone()))
    }

    fn write_document(
        env: &Env,
        writer: &Address,
        key: String,
        data: Bytes,
        current_version: u32,
    ) -> u32 {
        let version = current_version.saturating_add(1);
        let size = data.len();
        let storage_key = DataKey::Document(key.clone());
        env.storage()
            .persistent()
            .set(&storage_key, &StoredDocument { data, version });
        env.storage()
            .persistent()
            .extend_ttl(&storage_key, TTL_LEDGERS, TTL_LEDGERS);
        env.storage().instance().extend_ttl(TTL_LEDGERS, TTL_LEDGERS);

        EvDocumentWritten {
            key,
            writer: writer.clone(),
            version,
            size,
        }
        .publish(env);
        version
    }

    fn load_admin(env: &Env) -> Result<Address, DataError> {
        env.storage()
            .instance()
            .get(&DataKey::Admin)
            .ok_or(DataError::AdminNotSet)
    }

    fn load_writers(env: &Env) -> Vec<Address> {
        env.storage()
            .instance()
            .get(&DataKey::Writers)
            .unwrap_or(Vec::new(env))
    }
}

#[cfg(test)]
mod test;
