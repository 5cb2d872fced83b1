//! JSON documents kept in the data store.
//!
//! Three keys, same field names as the web client:
//!
//! ```text
//! game_players : [{"id","encryptedRole","encryptedTasks":[..],"position":{"x","y","z"},"status","lastSeen"}]
//! game_tasks   : [{"id","encryptedDescription","encryptedStatus","location":{"x","y","z"}}]
//! game_state   : {"status":"lobby|playing|finished","round":n,"startTime":secs}
//! ```
//!
//! The reader accepts whitespace, any key order and unknown keys. It rejects
//! string escapes (nothing in these documents needs them). Coordinates are
//! fixed-point: `1.5` reads as 1500 milli-units and `2.5e-1` as 250; digits
//! below a milli-unit are dropped, so `1e-7` reads as 0.

use soroban_sdk::{Bytes, Env, String, Vec};

use crate::codec;
use crate::{GamePhase, GameState, Player, PlayerStatus, Position, Task};

pub const PLAYERS_KEY: &str = "game_players";
pub const TASKS_KEY: &str = "game_tasks";
pub const STATE_KEY: &str = "game_state";

/// Largest document read or written, in bytes.
pub const MAX_DOCUMENT_BYTES: usize = 16 * 1024;

/// Fixed-point scale of coordinates.
pub const MILLI: i64 = 1_000;

const MAX_DEPTH: u32 = 16;

/// Significant digits kept while reading a number.
const MANTISSA_LIMIT: i128 = 1_000_000_000_000_000_000_000_000_000_000;
/// Largest power of ten that fits an `i128`.
const MAX_POW10: i32 = 38;
const MAX_EXPONENT: i32 = 10_000;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum DocError {
    TooLarge = 1,
    Syntax = 2,
    Unsupported = 3,
    MissingField = 4,
    Overflow = 5,
    UnknownStatus = 6,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Decoding
// ═══════════════════════════════════════════════════════════════════════════════

pub fn decode_players(env: &Env, data: &Bytes) -> Result<Vec<Player>, DocError> {
    with_buffer(data, |input| {
        let mut reader = Reader::new(env, input);
        let mut players = Vec::new(env);
        if reader.peek().is_none() {
            return Ok(players);
        }
        reader.array(|r| {
            players.push_back(read_player(r)?);
            Ok(())
        })?;
        reader.finish()?;
        Ok(players)
    })
}

pub fn decode_tasks(env: &Env, data: &Bytes) -> Result<Vec<Task>, DocError> {
    with_buffer(data, |input| {
        let mut reader = Reader::new(env, input);
        let mut tasks = Vec::new(env);
        if reader.peek().is_none() {
            return Ok(tasks);
        }
        reader.array(|r| {
            tasks.push_back(read_task(r)?);
            Ok(())
        })?;
        reader.finish()?;
        Ok(tasks)
    })
}

/// Missing fields fall back to lobby / round 1 / start time 0.
pub fn decode_state(env: &Env, data: &Bytes) -> Result<GameState, DocError> {
    with_buffer(data, |input| {
        let mut reader = Reader::new(env, input);
        let mut state = default_state();
        reader.object(|r, name| {
            match name {
                b"status" => state.status = phase_from_text(r.raw_string()?)?,
                b"round" => {
                    let round = r.unsigned()?;
                    state.round = u32::try_from(round).map_err(|_| DocError::Overflow)?;
                    if state.round == 0 {
                        state.round = 1;
                    }
                }
                b"startTime" => state.start_time = r.unsigned()?,
                _ => r.skip_value()?,
            }
            Ok(())
        })?;
        reader.finish()?;
        Ok(state)
    })
}

pub fn default_state() -> GameState {
    GameState {
        status: GamePhase::Lobby,
        round: 1,
        start_time: 0,
    }
}

fn read_player(r: &mut Reader) -> Result<Player, DocError> {
    let env = r.env;
    let mut id = None;
    let mut encrypted_role = None;
    let mut status = None;
    let mut encrypted_tasks = Vec::new(env);
    let mut position = Position::origin();
    let mut last_seen = 0u64;

    r.object(|r, name| {
        match name {
            b"id" => id = Some(r.string()?),
            b"encryptedRole" => encrypted_role = Some(r.string()?),
            b"encryptedTasks" => r.array(|r| {
                encrypted_tasks.push_back(r.string()?);
                Ok(())
            })?,
            b"position" => position = read_position(r)?,
            b"status" => status = Some(player_status_from_text(r.raw_string()?)?),
            b"lastSeen" => last_seen = r.unsigned()?,
            _ => r.skip_value()?,
        }
        Ok(())
    })?;

    Ok(Player {
        id: id.ok_or(DocError::MissingField)?,
        encrypted_role: encrypted_role.ok_or(DocError::MissingField)?,
        encrypted_tasks,
        position,
        status: status.ok_or(DocError::MissingField)?,
        last_seen,
    })
}

fn read_task(r: &mut Reader) -> Result<Task, DocError> {
    let mut id = None;
    let mut encrypted_description = None;
    let mut encrypted_status = None;
    let mut location = Position::origin();

    r.object(|r, name| {
        match name {
            b"id" => id = Some(r.string()?),
            b"encryptedDescription" => encrypted_description = Some(r.string()?),
            b"encryptedStatus" => encrypted_status = Some(r.string()?),
            b"location" => location = read_position(r)?,
            _ => r.skip_value()?,
        }
        Ok(())
    })?;

    Ok(Task {
        id: id.ok_or(DocError::MissingField)?,
        encrypted_description: encrypted_description.ok_or(DocError::MissingField)?,
        encrypted_status: encrypted_status.ok_or(DocError::MissingField)?,
        location,
    })
}

fn read_position(r: &mut Reader) -> Result<Position, DocError> {
    let mut position = Position::origin();
    r.object(|r, name| {
        match name {
            b"x" => position.x = r.milli()?,
            b"y" => position.y = r.milli()?,
            b"z" => position.z = r.milli()?,
            _ => r.skip_value()?,
        }
        Ok(())
    })?;
    Ok(position)
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Encoding
// ═══════════════════════════════════════════════════════════════════════════════

pub fn encode_players(env: &Env, players: &Vec<Player>) -> Result<Bytes, DocError> {
    let mut w = Writer::new();
    w.byte(b'[')?;
    for (i, player) in players.iter().enumerate() {
        if i > 0 {
            w.byte(b',')?;
        }
        w.byte(b'{')?;
        w.key(b"id")?;
        w.string(&player.id)?;
        w.byte(b',')?;
        w.key(b"encryptedRole")?;
        w.string(&player.encrypted_role)?;
        w.byte(b',')?;
        w.key(b"encryptedTasks")?;
        w.byte(b'[')?;
        for (j, token) in player.encrypted_tasks.iter().enumerate() {
            if j > 0 {
                w.byte(b',')?;
            }
            w.string(&token)?;
        }
        w.byte(b']')?;
        w.byte(b',')?;
        w.key(b"position")?;
        w.position(&player.position)?;
        w.byte(b',')?;
        w.key(b"status")?;
        w.quoted(player_status_text(player.status))?;
        w.byte(b',')?;
        w.key(b"lastSeen")?;
        w.unsigned(player.last_seen)?;
        w.byte(b'}')?;
    }
    w.byte(b']')?;
    Ok(w.into_bytes(env))
}

pub fn encode_tasks(env: &Env, tasks: &Vec<Task>) -> Result<Bytes, DocError> {
    let mut w = Writer::new();
    w.byte(b'[')?;
    for (i, task) in tasks.iter().enumerate() {
        if i > 0 {
            w.byte(b',')?;
        }
        w.byte(b'{')?;
        w.key(b"id")?;
        w.string(&task.id)?;
        w.byte(b',')?;
        w.key(b"encryptedDescription")?;
        w.string(&task.encrypted_description)?;
        w.byte(b',')?;
        w.key(b"encryptedStatus")?;
        w.string(&task.encrypted_status)?;
        w.byte(b',')?;
        w.key(b"location")?;
        w.position(&task.location)?;
        w.byte(b'}')?;
    }
    w.byte(b']')?;
    Ok(w.into_bytes(env))
}

pub fn encode_state(env: &Env, state: &GameState) -> Result<Bytes, DocError> {
    let mut w = Writer::new();
    w.byte(b'{')?;
    w.key(b"status")?;
    w.quoted(phase_text(state.status))?;
    w.byte(b',')?;
    w.key(b"round")?;
    w.unsigned(state.round as u64)?;
    w.byte(b',')?;
    w.key(b"startTime")?;
    w.unsigned(state.start_time)?;
    w.byte(b'}')?;
    Ok(w.into_bytes(env))
}

// ─── Status text ───────────────────────────────────────────────────────────

pub fn player_status_text(status: PlayerStatus) -> &'static [u8] {
    match status {
        PlayerStatus::Alive => b"alive",
        PlayerStatus::Dead => b"dead",
        PlayerStatus::Disconnected => b"disconnected",
    }
}

fn player_status_from_text(text: &[u8]) -> Result<PlayerStatus, DocError> {
    match text {
        b"alive" => Ok(PlayerStatus::Alive),
        b"dead" => Ok(PlayerStatus::Dead),
        b"disconnected" => Ok(PlayerStatus::Disconnected),
        _ => Err(DocError::UnknownStatus),
    }
}

pub fn phase_text(phase: GamePhase) -> &'static [u8] {
    match phase {
        GamePhase::Lobby => b"lobby",
        GamePhase::Playing => b"playing",
        GamePhase::Finished => b"finished",
    }
}

fn phase_from_text(text: &[u8]) -> Result<GamePhase, DocError> {
    match text {
        b"lobby" => Ok(GamePhase::Lobby),
        b"playing" => Ok(GamePhase::Playing),
        b"finished" => Ok(GamePhase::Finished),
        _ => Err(DocError::UnknownStatus),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Reader
// ═══════════════════════════════════════════════════════════════════════════════

fn with_buffer<T>(
    data: &Bytes,
    parse: impl FnOnce(&[u8]) -> Result<T, DocError>,
) -> Result<T, DocError> {
    let len = data.len() as usize;
    if len > MAX_DOCUMENT_BYTES {
        return Err(DocError::TooLarge);
    }
    let mut buf = [0u8; MAX_DOCUMENT_BYTES];
    data.copy_into_slice(&mut buf[..len]);
    parse(&buf[..len])
}

struct Reader<'a> {
    env: &'a Env,
    input: &'a [u8],
    pos: usize,
    depth: u32,
}

impl<'a> Reader<'a> {
    fn new(env: &'a Env, input: &'a [u8]) -> Self {
        Reader {
            env,
            input,
            pos: 0,
            depth: 0,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.input.get(self.pos) {
            if matches!(c, b' ' | b'\t' | b'\n' | b'\r') {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_whitespace();
        self.input.get(self.pos).copied()
    }

    fn eat(&mut self, c: u8) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: u8) -> Result<(), DocError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(DocError::Syntax)
        }
    }

    /// Only trailing whitespace may follow the top-level value.
    fn finish(&mut self) -> Result<(), DocError> {
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(DocError::Syntax),
        }
    }

    fn enter(&mut self) -> Result<(), DocError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(DocError::Unsupported);
        }
        Ok(())
    }

    fn object<F>(&mut self, mut field: F) -> Result<(), DocError>
    where
        F: FnMut(&mut Self, &'a [u8]) -> Result<(), DocError>,
    {
        self.enter()?;
        self.expect(b'{')?;
        if !self.eat(b'}') {
            loop {
                let name = self.raw_string()?;
                self.expect(b':')?;
                field(self, name)?;
                if self.eat(b',') {
                    continue;
                }
                self.expect(b'}')?;
                break;
            }
        }
        self.depth -= 1;
        Ok(())
    }

    fn array<F>(&mut self, mut item: F) -> Result<(), DocError>
    where
        F: FnMut(&mut Self) -> Result<(), DocError>,
    {
        self.enter()?;
        self.expect(b'[')?;
        if !self.eat(b']') {
            loop {
                item(self)?;
                if self.eat(b',') {
                    continue;
                }
                self.expect(b']')?;
                break;
            }
        }
        self.depth -= 1;
        Ok(())
    }

    fn raw_string(&mut self) -> Result<&'a [u8], DocError> {
        self.expect(b'"')?;
        let input: &'a [u8] = self.input;
        let start = self.pos;
        while let Some(&c) = input.get(self.pos) {
            match c {
                b'"' => {
                    let text = &input[start..self.pos];
                    self.pos += 1;
                    return Ok(text);
                }
                b'\\' => return Err(DocError::Unsupported),
                c if c < 0x20 => return Err(DocError::Syntax),
                _ => self.pos += 1,
            }
        }
        Err(DocError::Syntax)
    }

    fn string(&mut self) -> Result<String, DocError> {
        let text = self.raw_string()?;
        Ok(String::from_bytes(self.env, text))
    }

    /// Decimal number in milli-units. Digits below a milli-unit are dropped.
    fn milli(&mut self) -> Result<i64, DocError> {
        let (negative, mantissa, scale) = self.number()?;
        let magnitude = scale_to_milli(mantissa, scale)?;
        Ok(if negative { -magnitude } else { magnitude })
    }

    /// JSON number as `(negative, mantissa, scale)`, worth
    /// `mantissa * 10^scale` milli-units.
    fn number(&mut self) -> Result<(bool, i128, i32), DocError> {
        self.skip_whitespace();
        let negative = self.input.get(self.pos) == Some(&b'-');
        if negative {
            self.pos += 1;
        }

        let mut mantissa: i128 = 0;
        let mut scale: i32 = 3;
        if self.digits(&mut mantissa, &mut scale, false) == 0 {
            return Err(DocError::Syntax);
        }
        if self.input.get(self.pos) == Some(&b'.') {
            self.pos += 1;
            if self.digits(&mut mantissa, &mut scale, true) == 0 {
                return Err(DocError::Syntax);
            }
        }
        if matches!(self.input.get(self.pos), Some(b'e') | Some(b'E')) {
            self.pos += 1;
            scale = scale.saturating_add(self.exponent()?);
        }
        Ok((negative, mantissa, scale))
    }

    /// Folds a digit run into `mantissa`. Past `MANTISSA_LIMIT` integer digits
    /// only grow `scale` and fraction digits are dropped.
    fn digits(&mut self, mantissa: &mut i128, scale: &mut i32, fraction: bool) -> usize {
        let mut count = 0;
        while let Some(&c) = self.input.get(self.pos) {
            if !c.is_ascii_digit() {
                break;
            }
            if *mantissa < MANTISSA_LIMIT {
                *mantissa = *mantissa * 10 + (c - b'0') as i128;
                if fraction {
                    *scale -= 1;
                }
            } else if !fraction {
                *scale = scale.saturating_add(1);
            }
            count += 1;
            self.pos += 1;
        }
        count
    }

    fn exponent(&mut self) -> Result<i32, DocError> {
        let negative = match self.input.get(self.pos) {
            Some(b'-') => {
                self.pos += 1;
                true
            }
            Some(b'+') => {
                self.pos += 1;
                false
            }
            _ => false,
        };
        let mut value: i32 = 0;
        let mut count = 0;
        while let Some(&c) = self.input.get(self.pos) {
            if !c.is_ascii_digit() {
                break;
            }
            value = (value * 10 + (c - b'0') as i32).min(MAX_EXPONENT);
            count += 1;
            self.pos += 1;
        }
        if count == 0 {
            return Err(DocError::Syntax);
        }
        Ok(if negative { -value } else { value })
    }

    /// Non-negative number truncated to its integer part.
    fn unsigned(&mut self) -> Result<u64, DocError> {
        let value = self.milli()?;
        if value < 0 {
            return Err(DocError::Syntax);
        }
        Ok((value / MILLI) as u64)
    }

    fn literal(&mut self, word: &[u8]) -> Result<(), DocError> {
        self.skip_whitespace();
        if self.input[self.pos..].starts_with(word) {
            self.pos += word.len();
            Ok(())
        } else {
            Err(DocError::Syntax)
        }
    }

    fn skip_value(&mut self) -> Result<(), DocError> {
        match self.peek() {
            Some(b'"') => self.raw_string().map(|_| ()),
            Some(b'{') => self.object(|r, _| r.skip_value()),
            Some(b'[') => self.array(|r| r.skip_value()),
            Some(b't') => self.literal(b"true"),
            Some(b'f') => self.literal(b"false"),
            Some(b'n') => self.literal(b"null"),
            Some(_) => self.number().map(|_| ()),
            None => Err(DocError::Syntax),
        }
    }
}

/// `mantissa * 10^scale`, truncated toward zero, as an `i64`.
fn scale_to_milli(mantissa: i128, scale: i32) -> Result<i64, DocError> {
    if mantissa == 0 {
        return Ok(0);
    }
    let value = if scale >= 0 {
        if scale > MAX_POW10 {
            return Err(DocError::Overflow);
        }
        mantissa
            .checked_mul(10i128.pow(scale as u32))
            .ok_or(DocError::Overflow)?
    } else if -scale > MAX_POW10 {
        0
    } else {
        mantissa / 10i128.pow((-scale) as u32)
    };
    i64::try_from(value).map_err(|_| DocError::Overflow)
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Writer
// ═══════════════════════════════════════════════════════════════════════════════

struct Writer {
    buf: [u8; MAX_DOCUMENT_BYTES],
    len: usize,
}

impl Writer {
    fn new() -> Self {
        Writer {
            buf: [0u8; MAX_DOCUMENT_BYTES],
            len: 0,
        }
    }

    fn reserve(&mut self, n: usize) -> Result<usize, DocError> {
        let end = self.len + n;
        if end > MAX_DOCUMENT_BYTES {
            return Err(DocError::TooLarge);
        }
        Ok(end)
    }

    fn push(&mut self, bytes: &[u8]) -> Result<(), DocError> {
        let end = self.reserve(bytes.len())?;
        self.buf[self.len..end].copy_from_slice(bytes);
        self.len = end;
        Ok(())
    }

    fn byte(&mut self, b: u8) -> Result<(), DocError> {
        self.push(&[b])
    }

    fn key(&mut self, name: &[u8]) -> Result<(), DocError> {
        self.quoted(name)?;
        self.byte(b':')
    }

    fn quoted(&mut self, text: &[u8]) -> Result<(), DocError> {
        self.byte(b'"')?;
        self.push(text)?;
        self.byte(b'"')
    }

    /// Contract strings are copied verbatim; anything that would need an
    /// escape is refused.
    fn string(&mut self, text: &String) -> Result<(), DocError> {
        let n = text.len() as usize;
        self.byte(b'"')?;
        let start = self.len;
        let end = self.reserve(n)?;
        text.copy_into_slice(&mut self.buf[start..end]);
        if self.buf[start..end]
            .iter()
            .any(|&c| c == b'"' || c == b'\\' || c < 0x20)
        {
            return Err(DocError::Unsupported);
        }
        self.len = end;
        self.byte(b'"')
    }

    fn unsigned(&mut self, value: u64) -> Result<(), DocError> {
        let mut digits = [0u8; codec::MAX_DECIMAL_BYTES];
        let n = codec::format_unsigned(value, &mut digits);
        self.push(&digits[..n])
    }

    /// `1500` → `1.5`, `-3000` → `-3`, `5` → `0.005`.
    fn milli(&mut self, value: i64) -> Result<(), DocError> {
        let magnitude = value.unsigned_abs();
        if value < 0 {
            self.byte(b'-')?;
        }
        self.unsigned(magnitude / MILLI as u64)?;

        let mut fraction = magnitude % MILLI as u64;
        if fraction != 0 {
            let mut digits = [b'0'; 3];
            let mut i = 3;
            while i > 0 {
                i -= 1;
                digits[i] = b'0' + (fraction % 10) as u8;
                fraction /= 10;
            }
            let mut len = 3;
            while digits[len - 1] == b'0' {
                len -= 1;
            }
            self.byte(b'.')?;
            self.push(&digits[..len])?;
        }
        Ok(())
    }

    fn position(&mut self, position: &Position) -> Result<(), DocError> {
        self.push(b"{\"x\":")?;
        self.milli(position.x)?;
        self.push(b",\"y\":")?;
        self.milli(position.y)?;
        self.push(b",\"z\":")?;
        self.milli(position.z)?;
        self.byte(b'}')
    }

    fn into_bytes(self, env: &Env) -> Bytes {
        Bytes::from_slice(env, &self.buf[..self.len])
    }
}
