#![no_std]

//! # Hidden Kill
//!
//! A social deduction game whose player list, task list and game phase live
//! as JSON documents in a separate data store contract (`game-data`). This
//! contract is the only writer of those documents: every mutation reads the
//! current document, applies the change, and writes it back guarded by the
//! document's version.
//!
//! ## Game flow
//! 1. Players join the lobby with a sealed role and a 3D position.
//! 2. The admin seeds tasks; any joined player may start the game.
//! 3. While playing, alive players toggle tasks and cast ballots.
//!    A strict majority of alive players' ballots eliminates the target and
//!    opens the next round.
//! 4. The admin ends the game.
//!
//! ## Sealed fields
//! Roles and task states are stored as codec tokens (`FHE-<base64>`). The
//! codec is a reversible encoding, not encryption; `reveal` is a consent
//! gate signed over a per-session message, not access control.

use soroban_sdk::{
    contract, contractclient, contracterror, contractevent, contractimpl, contracttype, log, vec,
    Address, Bytes, BytesN, Env, IntoVal, Map, String, Symbol, Vec,
};

mod codec;
mod document;
mod session;

use codec::Op;
use document::{DocError, PLAYERS_KEY, STATE_KEY, TASKS_KEY};

// ═══════════════════════════════════════════════════════════════════════════════
//  Contract Events
// ═══════════════════════════════════════════════════════════════════════════════

#[contractevent]
pub struct EvPlayerAdded {
    pub player_id: String,
    pub owner: Address,
}

#[contractevent]
pub struct EvPlayerMoved {
    pub player_id: String,
    pub position: Position,
}

#[contractevent]
pub struct EvTaskAdded {
    pub task_id: String,
}

#[contractevent]
pub struct EvGameStarted {
    pub round: u32,
    pub start_time: u64,
    pub started_by: Address,
}

#[contractevent]
pub struct EvGameEnded {
    pub round: u32,
}

#[contractevent]
pub struct EvTaskToggled {
    pub task_id: String,
    pub player_id: String,
}

#[contractevent]
pub struct EvBallotCast {
    pub round: u32,
    pub voter_id: String,
    pub target_id: String,
    pub votes: u32,
}

#[contractevent]
pub struct EvPlayerEliminated {
    pub round: u32,
    pub player_id: String,
    pub votes: u32,
}

#[contractevent]
pub struct EvSessionOpened {
    pub viewer: Address,
    pub start_timestamp: u64,
}

#[contractevent]
pub struct EvFieldRevealed {
    pub viewer: Address,
    pub field: SealedField,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  External trait interfaces
// ═══════════════════════════════════════════════════════════════════════════════

/// Keyed document store (`game-data`).
#[contractclient(name = "GameDataClient")]
pub trait GameData {
    fn is_available(env: Env) -> bool;

    fn get_data(env: Env, key: String) -> Bytes;

    fn get_version(env: Env, key: String) -> u32;

    fn set_data_if(
        env: Env,
        writer: Address,
        key: String,
        data: Bytes,
        expected_version: u32,
    ) -> u32;
}

/// `DataError::VersionConflict` in the data store.
const STORE_VERSION_CONFLICT: u32 = 4;

// ═══════════════════════════════════════════════════════════════════════════════
//  Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum GameError {
    AdminNotSet = 1,
    DataStoreNotSet = 2,
    StoreUnavailable = 3,
    StoreRejected = 4,
    StoreConflict = 5,
    DocumentUnreadable = 6,
    DocumentTooLarge = 7,
    InvalidRole = 8,
    InvalidPhase = 9,
    NotAPlayer = 10,
    AlreadyJoined = 11,
    LobbyFull = 12,
    PlayerNotFound = 13,
    PlayerNotAlive = 14,
    TaskNotFound = 15,
    TooManyTasks = 16,
    NotAuthorized = 17,
    SessionNotFound = 18,
    SessionExpired = 19,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Game data
// ═══════════════════════════════════════════════════════════════════════════════

/// Coordinates in milli-units: `x: 1_500` is 1.5 in the JSON document.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Position {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl Position {
    pub fn origin() -> Position {
        Position { x: 0, y: 0, z: 0 }
    }
}

#[contracttype]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum PlayerStatus {
    Alive = 0,
    Dead = 1,
    Disconnected = 2,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Player {
    pub id: String,
    pub encrypted_role: String,
    pub encrypted_tasks: Vec<String>,
    pub position: Position,
    pub status: PlayerStatus,
    /// Unix seconds
    pub last_seen: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Task {
    pub id: String,
    pub encrypted_description: String,
    /// Codec token, 0 = open, 1 = done
    pub encrypted_status: String,
    pub location: Position,
}

#[contracttype]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum GamePhase {
    Lobby = 0,
    Playing = 1,
    Finished = 2,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GameState {
    pub status: GamePhase,
    pub round: u32,
    pub start_time: u64,
}

/// Full view of the three documents as of one read.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GameSnapshot {
    pub available: bool,
    pub players: Vec<Player>,
    pub tasks: Vec<Task>,
    pub state: GameState,
}

/// Result of a mutation: the affected id and the documents re-read after the write.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Receipt {
    pub subject: String,
    pub snapshot: GameSnapshot,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlayerCounts {
    pub total: u32,
    pub alive: u32,
    pub dead: u32,
    pub disconnected: u32,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecryptSession {
    pub public_key: Bytes,
    pub contract: Address,
    pub network_id: BytesN<32>,
    pub start_timestamp: u64,
    pub duration_days: u32,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SealedField {
    Role(String),
    TaskStatus(String),
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RevealState {
    Hidden,
    Revealed(i64),
    Unreadable,
}

#[contracttype]
#[derive(Clone)]
enum StorageKey {
    Admin,
    DataStore,
    /// Player id joined by an account
    PlayerOf(Address),
    /// Open ballots of a round: voter → target player id
    Ballots(u32),
    Session(Address),
    Revealed(Address, SealedField),
}

struct Versioned<T> {
    value: T,
    version: u32,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Constants
// ═══════════════════════════════════════════════════════════════════════════════

pub const ROLE_CREW: u32 = 0;
pub const ROLE_IMPOSTOR: u32 = 1;

pub const MAX_PLAYERS: u32 = 15;
pub const MAX_TASKS: u32 = 32;

/// Placeholder task tokens handed to every new player.
const STARTER_TASKS: [i64; 2] = [1, 2];

const ID_SUFFIX_LEN: usize = 7;
const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

// Ledger rate is approximately 5 seconds per ledger on Stellar
const LEDGER_RATE_SECS: u32 = 5;

// TTL expressed in human-readable time units (120 days)
const TTL_SECONDS: u32 = 120 * 24 * 60 * 60; // 10,368,000 seconds

/// TTL for player bindings and instance config: 2,073,600 ledgers
const TTL_LEDGERS: u32 = TTL_SECONDS / LEDGER_RATE_SECS;

/// Sessions, reveals and open ballots live as long as one consent session:
/// 30 * 24 * 60 * 60 / 5 = 518,400 ledgers
const SESSION_TTL_LEDGERS: u32 = session::SESSION_DURATION_DAYS * 24 * 60 * 60 / LEDGER_RATE_SECS;

// ═══════════════════════════════════════════════════════════════════════════════
//  Contract
// ═══════════════════════════════════════════════════════════════════════════════

#[contract]
pub struct HiddenKillContract;

#[contractimpl]
impl HiddenKillContract {
    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Constructor
    // ───────────────────────────────────────────────────────────────────────────

    pub fn __constructor(env: Env, admin: Address, data_store: Address) {
        env.storage().instance().set(&StorageKey::Admin, &admin);
        env.storage()
            .instance()
            .set(&StorageKey::DataStore, &data_store);
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Codec
    // ───────────────────────────────────────────────────────────────────────────

    pub fn encrypt(env: Env, value: i64) -> String {
        codec::encrypt(&env, value)
    }

    pub fn decrypt(_env: Env, token: String) -> Option<i64> {
        codec::decrypt(&token)
    }

    pub fn compute(env: Env, token: String, op: Symbol) -> String {
        codec::compute(&env, &token, Op::from_symbol(&op))
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Store views
    // ───────────────────────────────────────────────────────────────────────────

    /// Read all three documents. Each one degrades to its default on its own
    /// when empty or unreadable; an unavailable store yields the default
    /// snapshot with `available == false`.
    pub fn load_all(env: Env) -> Result<GameSnapshot, GameError> {
        let store = Self::data_store(&env)?;
        Ok(Self::snapshot(&env, &store))
    }

    pub fn player_counts(env: Env) -> Result<PlayerCounts, GameError> {
        let snapshot = Self::load_all(env)?;
        let mut counts = PlayerCounts {
            total: snapshot.players.len(),
            alive: 0,
            dead: 0,
            disconnected: 0,
        };
        for player in snapshot.players.iter() {
            match player.status {
                PlayerStatus::Alive => counts.alive += 1,
                PlayerStatus::Dead => counts.dead += 1,
                PlayerStatus::Disconnected => counts.disconnected += 1,
            }
        }
        Ok(counts)
    }

    /// Open ballots of `round`, voter → target player id.
    pub fn get_ballots(env: Env, round: u32) -> Map<Address, String> {
        env.storage()
            .temporary()
            .get(&StorageKey::Ballots(round))
            .unwrap_or_else(|| Map::new(&env))
    }

    pub fn get_player_id(env: Env, owner: Address) -> Option<String> {
        env.storage()
            .persistent()
            .get(&StorageKey::PlayerOf(owner))
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Lobby
    // ───────────────────────────────────────────────────────────────────────────

    pub fn add_player(
        env: Env,
        owner: Address,
        role: u32,
        position: Position,
    ) -> Result<Receipt, GameError> {
        owner.require_auth();

        if role != ROLE_CREW && role != ROLE_IMPOSTOR {
            return Err(GameError::InvalidRole);
        }

        let store = Self::available_store(&env)?;
        let state = Self::read_state(&env, &store)?.value;
        if state.status != GamePhase::Lobby {
            return Err(GameError::InvalidPhase);
        }

        let players = Self::read_players(&env, &store)?;
        if Self::joined_player(&env, &players.value, &owner).is_some() {
            return Err(GameError::AlreadyJoined);
        }
        if players.value.len() >= MAX_PLAYERS {
            return Err(GameError::LobbyFull);
        }

        let now = env.ledger().timestamp();
        let id = Self::fresh_id(&env, now, |candidate| {
            Self::find_player(&players.value, candidate).is_some()
        });

        let mut encrypted_tasks = Vec::new(&env);
        for value in STARTER_TASKS {
            encrypted_tasks.push_back(codec::encrypt(&env, value));
        }

        let mut list = players.value.clone();
        list.push_back(Player {
            id: id.clone(),
            encrypted_role: codec::encrypt(&env, role as i64),
            encrypted_tasks,
            position,
            status: PlayerStatus::Alive,
            last_seen: now,
        });
        Self::write_players(&env, &store, &list, players.version)?;

        let binding = StorageKey::PlayerOf(owner.clone());
        env.storage().persistent().set(&binding, &id);
        env.storage()
            .persistent()
            .extend_ttl(&binding, TTL_LEDGERS, TTL_LEDGERS);

        EvPlayerAdded {
            player_id: id.clone(),
            owner,
        }
        .publish(&env);

        Ok(Self::receipt(&env, &store, id))
    }

    /// Move the caller's player and refresh its `lastSeen`.
    pub fn move_player(env: Env, owner: Address, position: Position) -> Result<Receipt, GameError> {
        owner.require_auth();

        let store = Self::available_store(&env)?;
        let state = Self::read_state(&env, &store)?.value;
        if state.status == GamePhase::Finished {
            return Err(GameError::InvalidPhase);
        }

        let players = Self::read_players(&env, &store)?;
        let (idx, mut player) = Self::require_alive_player(&env, &players.value, &owner)?;
        player.position = position.clone();
        player.last_seen = env.ledger().timestamp();

        let mut list = players.value.clone();
        list.set(idx, player.clone());
        Self::write_players(&env, &store, &list, players.version)?;

        EvPlayerMoved {
            player_id: player.id.clone(),
            position,
        }
        .publish(&env);

        Ok(Self::receipt(&env, &store, player.id))
    }

    /// Seed a task (admin only). The description is a sealed number.
    pub fn add_task(env: Env, description: i64, location: Position) -> Result<Receipt, GameError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();

        let store = Self::available_store(&env)?;
        let state = Self::read_state(&env, &store)?.value;
        if state.status == GamePhase::Finished {
            return Err(GameError::InvalidPhase);
        }

        let tasks = Self::read_tasks(&env, &store)?;
        if tasks.value.len() >= MAX_TASKS {
            return Err(GameError::TooManyTasks);
        }

        let id = Self::fresh_id(&env, env.ledger().timestamp(), |candidate| {
            Self::find_task(&tasks.value, candidate).is_some()
        });

        let mut list = tasks.value.clone();
        list.push_back(Task {
            id: id.clone(),
            encrypted_description: codec::encrypt(&env, description),
            encrypted_status: codec::encrypt(&env, 0),
            location,
        });
        Self::write_tasks(&env, &store, &list, tasks.version)?;

        EvTaskAdded {
            task_id: id.clone(),
        }
        .publish(&env);

        Ok(Self::receipt(&env, &store, id))
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Phase transitions
    // ───────────────────────────────────────────────────────────────────────────

    /// lobby → playing. The caller must be the admin or a joined player.
    pub fn start_game(env: Env, caller: Address) -> Result<Receipt, GameError> {
        caller.require_auth();

        let store = Self::available_store(&env)?;
        let admin = Self::load_admin(&env)?;
        if caller != admin {
            let players = Self::read_players(&env, &store)?.value;
            if Self::joined_player(&env, &players, &caller).is_none() {
                return Err(GameError::NotAuthorized);
            }
        }

        let current = Self::read_state(&env, &store)?;
        if current.value.status != GamePhase::Lobby {
            return Err(GameError::InvalidPhase);
        }

        let state = GameState {
            status: GamePhase::Playing,
            round: 1,
            start_time: env.ledger().timestamp(),
        };
        Self::write_state(&env, &store, &state, current.version)?;

        EvGameStarted {
            round: state.round,
            start_time: state.start_time,
            started_by: caller,
        }
        .publish(&env);

        Ok(Self::receipt(&env, &store, String::from_str(&env, STATE_KEY)))
    }

    /// playing → finished (admin only).
    pub fn end_game(env: Env) -> Result<Receipt, GameError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();

        let store = Self::available_store(&env)?;
        let current = Self::read_state(&env, &store)?;
        if current.value.status != GamePhase::Playing {
            return Err(GameError::InvalidPhase);
        }

        let mut state = current.value;
        state.status = GamePhase::Finished;
        Self::write_state(&env, &store, &state, current.version)?;

        EvGameEnded { round: state.round }.publish(&env);

        Ok(Self::receipt(&env, &store, String::from_str(&env, STATE_KEY)))
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Round actions
    // ───────────────────────────────────────────────────────────────────────────

    /// Flip a task between open and done.
    pub fn complete_task(env: Env, owner: Address, task_id: String) -> Result<Receipt, GameError> {
        owner.require_auth();

        let store = Self::available_store(&env)?;
        Self::require_playing(&env, &store)?;

        let players = Self::read_players(&env, &store)?.value;
        let (_, player) = Self::require_alive_player(&env, &players, &owner)?;

        let tasks = Self::read_tasks(&env, &store)?;
        let idx = Self::find_task(&tasks.value, &task_id).ok_or(GameError::TaskNotFound)?;
        let mut task = tasks.value.get_unchecked(idx);
        task.encrypted_status = codec::compute(&env, &task.encrypted_status, Op::Toggle);

        let mut list = tasks.value.clone();
        list.set(idx, task);
        Self::write_tasks(&env, &store, &list, tasks.version)?;

        EvTaskToggled {
            task_id: task_id.clone(),
            player_id: player.id,
        }
        .publish(&env);

        Ok(Self::receipt(&env, &store, task_id))
    }

    /// Cast (or replace) the voter's ballot for this round. A strict majority
    /// of alive players eliminates the target, clears the ballots and opens
    /// the next round.
    pub fn vote_player(env: Env, voter: Address, target_id: String) -> Result<Receipt, GameError> {
        voter.require_auth();

        let store = Self::available_store(&env)?;
        let state = Self::read_state(&env, &store)?;
        if state.value.status != GamePhase::Playing {
            return Err(GameError::InvalidPhase);
        }

        let players = Self::read_players(&env, &store)?;
        let (_, voter_player) = Self::require_alive_player(&env, &players.value, &voter)?;

        let target_idx =
            Self::find_player(&players.value, &target_id).ok_or(GameError::PlayerNotFound)?;
        let mut target = players.value.get_unchecked(target_idx);
        if target.status != PlayerStatus::Alive {
            return Err(GameError::PlayerNotAlive);
        }

        let round = state.value.round;
        let ballots_key = StorageKey::Ballots(round);
        let mut ballots = Self::get_ballots(env.clone(), round);
        ballots.set(voter.clone(), target_id.clone());

        let votes = Self::tally(&ballots, &target_id);
        EvBallotCast {
            round,
            voter_id: voter_player.id,
            target_id: target_id.clone(),
            votes,
        }
        .publish(&env);

        if votes * 2 > Self::count_alive(&players.value) {
            target.status = PlayerStatus::Dead;
            let mut list = players.value.clone();
            list.set(target_idx, target);
            Self::write_players(&env, &store, &list, players.version)?;

            let mut next = state.value.clone();
            next.round = round.saturating_add(1);
            Self::write_state(&env, &store, &next, state.version)?;

            env.storage().temporary().remove(&ballots_key);

            EvPlayerEliminated {
                round,
                player_id: target_id.clone(),
                votes,
            }
            .publish(&env);
        } else {
            env.storage().temporary().set(&ballots_key, &ballots);
            env.storage()
                .temporary()
                .extend_ttl(&ballots_key, SESSION_TTL_LEDGERS, SESSION_TTL_LEDGERS);
        }

        Ok(Self::receipt(&env, &store, target_id))
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Reveal
    // ───────────────────────────────────────────────────────────────────────────

    /// Start a consent session for `viewer`, replacing any previous one.
    pub fn open_session(env: Env, viewer: Address) -> DecryptSession {
        viewer.require_auth();

        let opened = session::open(&env);
        let key = StorageKey::Session(viewer.clone());
        env.storage().temporary().set(&key, &opened);
        env.storage()
            .temporary()
            .extend_ttl(&key, SESSION_TTL_LEDGERS, SESSION_TTL_LEDGERS);

        EvSessionOpened {
            viewer,
            start_timestamp: opened.start_timestamp,
        }
        .publish(&env);

        opened
    }

    pub fn get_session(env: Env, viewer: Address) -> Option<DecryptSession> {
        env.storage()
            .temporary()
            .get(&StorageKey::Session(viewer))
    }

    /// The message a viewer signs to reveal fields during their session.
    pub fn consent_message(env: Env, viewer: Address) -> Result<Bytes, GameError> {
        let opened = Self::load_session(&env, &viewer)?;
        Ok(session::consent_message(&env, &opened))
    }

    /// Toggle a sealed field for `viewer`.
    ///
    /// Hidden → requires an unexpired session and the viewer's authorization
    /// over the consent message, then decodes the field. The store must be
    /// available, matching what `load_all` serves.
    /// Revealed → hidden again, no consent message needed.
    pub fn reveal(env: Env, viewer: Address, field: SealedField) -> Result<RevealState, GameError> {
        let key = StorageKey::Revealed(viewer.clone(), field.clone());
        if env.storage().temporary().has(&key) {
            viewer.require_auth();
            env.storage().temporary().remove(&key);
            return Ok(RevealState::Hidden);
        }

        let opened = Self::load_session(&env, &viewer)?;
        if session::is_expired(&opened, env.ledger().timestamp()) {
            return Err(GameError::SessionExpired);
        }
        let message = session::consent_message(&env, &opened);
        viewer.require_auth_for_args(vec![&env, message.into_val(&env)]);

        let store = Self::available_store(&env)?;
        let token = Self::sealed_token(&env, &store, &field)?;
        let revealed = match codec::decrypt(&token) {
            Some(value) => RevealState::Revealed(value),
            None => RevealState::Unreadable,
        };

        env.storage().temporary().set(&key, &revealed);
        env.storage()
            .temporary()
            .extend_ttl(&key, SESSION_TTL_LEDGERS, SESSION_TTL_LEDGERS);

        EvFieldRevealed { viewer, field }.publish(&env);

        Ok(revealed)
    }

    pub fn reveal_state(env: Env, viewer: Address, field: SealedField) -> RevealState {
        env.storage()
            .temporary()
            .get(&StorageKey::Revealed(viewer, field))
            .unwrap_or(RevealState::Hidden)
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Admin
    // ───────────────────────────────────────────────────────────────────────────

    pub fn get_admin(env: Env) -> Result<Address, GameError> {
        Self::load_admin(&env)
    }

    pub fn set_admin(env: Env, new_admin: Address) -> Result<(), GameError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        env.storage().instance().set(&StorageKey::Admin, &new_admin);
        Ok(())
    }

    pub fn get_data_store(env: Env) -> Result<Address, GameError> {
        Self::load_data_store(&env)
    }

    pub fn set_data_store(env: Env, new_store: Address) -> Result<(), GameError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        env.storage()
            .instance()
            .set(&StorageKey::DataStore, &new_store);
        Ok(())
    }

    pub fn upgrade(env: Env, new_wasm_hash: BytesN<32>) -> Result<(), GameError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        env.deployer().update_current_contract_wasm(new_wasm_hash);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  Internal: Snapshots
    // ═══════════════════════════════════════════════════════════════════════════

    fn snapshot(env: &Env, store: &GameDataClient) -> GameSnapshot {
        if !store.is_available() {
            log!(env, "data store unavailable, serving empty snapshot");
            return GameSnapshot {
                available: false,
                players: Vec::new(env),
                tasks: Vec::new(env),
                state: document::default_state(),
            };
        }
        GameSnapshot {
            available: true,
            players: Self::load_or_default(
                env,
                store,
                PLAYERS_KEY,
                document::decode_players,
                Vec::new(env),
            ),
            tasks: Self::load_or_default(
                env,
                store,
                TASKS_KEY,
                document::decode_tasks,
                Vec::new(env),
            ),
            state: Self::load_or_default(
                env,
                store,
                STATE_KEY,
                document::decode_state,
                document::default_state(),
            ),
        }
    }

    fn load_or_default<T>(
        env: &Env,
        store: &GameDataClient,
        key: &str,
        decode: fn(&Env, &Bytes) -> Result<T, DocError>,
        default: T,
    ) -> T {
        let key = String::from_str(env, key);
        let data = store.get_data(&key);
        if data.is_empty() {
            return default;
        }
        match decode(env, &data) {
            Ok(value) => value,
            Err(err) => {
                log!(env, "discarding unreadable document", key, err as u32);
                default
            }
        }
    }

    fn receipt(env: &Env, store: &GameDataClient, subject: String) -> Receipt {
        Receipt {
            subject,
            snapshot: Self::snapshot(env, store),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  Internal: Document round trips
    // ═══════════════════════════════════════════════════════════════════════════

    fn read_players(env: &Env, store: &GameDataClient) -> Result<Versioned<Vec<Player>>, GameError> {
        Self::read_document(env, store, PLAYERS_KEY, document::decode_players, Vec::new(env))
    }

    fn read_tasks(env: &Env, store: &GameDataClient) -> Result<Versioned<Vec<Task>>, GameError> {
        Self::read_document(env, store, TASKS_KEY, document::decode_tasks, Vec::new(env))
    }

    fn read_state(env: &Env, store: &GameDataClient) -> Result<Versioned<GameState>, GameError> {
        Self::read_document(
            env,
            store,
            STATE_KEY,
            document::decode_state,
            document::default_state(),
        )
    }

    /// Strict read for mutations: an unreadable document is an error, never
    /// an empty default that would be written back over it.
    fn read_document<T>(
        env: &Env,
        store: &GameDataClient,
        key: &str,
        decode: fn(&Env, &Bytes) -> Result<T, DocError>,
        default: T,
    ) -> Result<Versioned<T>, GameError> {
        let key = String::from_str(env, key);
        let version = store.get_version(&key);
        let data = store.get_data(&key);
        let value = if data.is_empty() {
            default
        } else {
            decode(env, &data).map_err(Self::document_error)?
        };
        Ok(Versioned { value, version })
    }

    fn write_players(
        env: &Env,
        store: &GameDataClient,
        players: &Vec<Player>,
        expected_version: u32,
    ) -> Result<u32, GameError> {
        let data = document::encode_players(env, players).map_err(Self::document_error)?;
        Self::write_document(env, store, PLAYERS_KEY, data, expected_version)
    }

    fn write_tasks(
        env: &Env,
        store: &GameDataClient,
        tasks: &Vec<Task>,
        expected_version: u32,
    ) -> Result<u32, GameError> {
        let data = document::encode_tasks(env, tasks).map_err(Self::document_error)?;
        Self::write_document(env, store, TASKS_KEY, data, expected_version)
    }

    fn write_state(
        env: &Env,
        store: &GameDataClient,
        state: &GameState,
        expected_version: u32,
    ) -> Result<u32, GameError> {
        let data = document::encode_state(env, state).map_err(Self::document_error)?;
        Self::write_document(env, store, STATE_KEY, data, expected_version)
    }

    fn write_document(
        env: &Env,
        store: &GameDataClient,
        key: &str,
        data: Bytes,
        expected_version: u32,
    ) -> Result<u32, GameError> {
        let writer = env.current_contract_address();
        let key = String::from_str(env, key);
        let result = store.try_set_data_if(&writer, &key, &data, &expected_version);
        env.storage().instance().extend_ttl(TTL_LEDGERS, TTL_LEDGERS);
        match result {
            Ok(Ok(version)) => Ok(version),
            Err(Ok(err)) if err == soroban_sdk::Error::from_contract_error(STORE_VERSION_CONFLICT) => {
                Err(GameError::StoreConflict)
            }
            _ => Err(GameError::StoreRejected),
        }
    }

    fn document_error(err: DocError) -> GameError {
        match err {
            DocError::TooLarge => GameError::DocumentTooLarge,
            _ => GameError::DocumentUnreadable,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  Internal: Guards & lookups
    // ═══════════════════════════════════════════════════════════════════════════

    fn require_playing(env: &Env, store: &GameDataClient) -> Result<(), GameError> {
        let state = Self::read_state(env, store)?.value;
        if state.status != GamePhase::Playing {
            return Err(GameError::InvalidPhase);
        }
        Ok(())
    }

    /// The player joined by `account`, if its record is still in the document.
    fn joined_player(env: &Env, players: &Vec<Player>, account: &Address) -> Option<(u32, Player)> {
        let id: String = env
            .storage()
            .persistent()
            .get(&StorageKey::PlayerOf(account.clone()))?;
        let idx = Self::find_player(players, &id)?;
        players.get(idx).map(|player| (idx, player))
    }

    fn require_alive_player(
        env: &Env,
        players: &Vec<Player>,
        account: &Address,
    ) -> Result<(u32, Player), GameError> {
        let (idx, player) =
            Self::joined_player(env, players, account).ok_or(GameError::NotAPlayer)?;
        if player.status != PlayerStatus::Alive {
            return Err(GameError::PlayerNotAlive);
        }
        Ok((idx, player))
    }

    fn find_player(players: &Vec<Player>, id: &String) -> Option<u32> {
        for (i, player) in players.iter().enumerate() {
            if player.id == *id {
                return Some(i as u32);
            }
        }
        None
    }

    fn find_task(tasks: &Vec<Task>, id: &String) -> Option<u32> {
        for (i, task) in tasks.iter().enumerate() {
            if task.id == *id {
                return Some(i as u32);
            }
        }
        None
    }

    fn count_alive(players: &Vec<Player>) -> u32 {
        let mut alive = 0u32;
        for player in players.iter() {
            if player.status == PlayerStatus::Alive {
                alive += 1;
            }
        }
        alive
    }

    fn tally(ballots: &Map<Address, String>, target_id: &String) -> u32 {
        let mut votes = 0u32;
        for (_, choice) in ballots.iter() {
            if choice == *target_id {
                votes += 1;
            }
        }
        votes
    }

    fn sealed_token(
        env: &Env,
        store: &GameDataClient,
        field: &SealedField,
    ) -> Result<String, GameError> {
        match field {
            SealedField::Role(player_id) => {
                let players = Self::read_players(env, store)?.value;
                let idx = Self::find_player(&players, player_id).ok_or(GameError::PlayerNotFound)?;
                Ok(players.get_unchecked(idx).encrypted_role)
            }
            SealedField::TaskStatus(task_id) => {
                let tasks = Self::read_tasks(env, store)?.value;
                let idx = Self::find_task(&tasks, task_id).ok_or(GameError::TaskNotFound)?;
                Ok(tasks.get_unchecked(idx).encrypted_status)
            }
        }
    }

    /// `<unix milliseconds>-<7 base36 chars>`, drawn until `taken` rejects nothing.
    fn fresh_id(env: &Env, now: u64, taken: impl Fn(&String) -> bool) -> String {
        // Ledger time has second resolution; the prefix is in milliseconds.
        let millis = now.saturating_mul(1_000);
        loop {
            let mut buf = [0u8; codec::MAX_DECIMAL_BYTES + 1 + ID_SUFFIX_LEN];
            let mut len = codec::format_unsigned(millis, &mut buf);
            buf[len] = b'-';
            len += 1;
            for _ in 0..ID_SUFFIX_LEN {
                let digit = env.prng().gen_range::<u64>(0..36) as usize;
                buf[len] = BASE36_DIGITS[digit];
                len += 1;
            }
            let candidate = String::from_bytes(env, &buf[..len]);
            if !taken(&candidate) {
                return candidate;
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  Internal: Storage
    // ═══════════════════════════════════════════════════════════════════════════

    fn data_store(env: &Env) -> Result<GameDataClient<'_>, GameError> {
        let address = Self::load_data_store(env)?;
        Ok(GameDataClient::new(env, &address))
    }

    fn available_store(env: &Env) -> Result<GameDataClient<'_>, GameError> {
        let store = Self::data_store(env)?;
        if !store.is_available() {
            return Err(GameError::StoreUnavailable);
        }
        Ok(store)
    }

    fn load_session(env: &Env, viewer: &Address) -> Result<DecryptSession, GameError> {
        env.storage()
            .temporary()
            .get(&StorageKey::Session(viewer.clone()))
            .ok_or(GameError::SessionNotFound)
    }

    fn load_admin(env: &Env) -> Result<Address, GameError> {
        env.storage()
            .instance()
            .get(&StorageKey::Admin)
            .ok_or(GameError::AdminNotSet)
    }

    fn load_data_store(env: &Env) -> Result<Address, GameError> {
        env.storage()
            .instance()
            .get(&StorageKey::DataStore)
            .ok_or(GameError::DataStoreNotSet)
    }
}

#[cfg(test)]
mod codec_test;
