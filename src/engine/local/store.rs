//! Local keyspace
//!
//! In-memory data for the local engine, one map per logical database.
//! Expiry is lazy: expired keys are dropped the next time they are touched.
//!
//! Missing keys (and missing hash fields / set members where a value is
//! expected) are reported as request errors rather than nil replies.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::protocol::{CommandError, ErrorKind, RequestType};

/// Reply text or command error
pub type Reply = std::result::Result<String, CommandError>;

/// Error message for reads of absent keys
pub const NO_SUCH_KEY: &str = "no such key";

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";
const NOT_INTEGER: &str = "ERR value is not an integer or out of range";
const NOT_FLOAT: &str = "ERR value is not a valid float";
const OVERFLOW: &str = "ERR increment or decrement would overflow";

pub(super) fn request_error(message: impl Into<String>) -> CommandError {
    CommandError::new(ErrorKind::Request, message)
}

pub(super) fn wrong_arity(request: RequestType) -> CommandError {
    request_error(format!(
        "ERR wrong number of arguments for '{}' command",
        request.to_string().to_lowercase()
    ))
}

fn parse_i64(text: &str) -> Result<i64, CommandError> {
    text.parse().map_err(|_| request_error(NOT_INTEGER))
}

fn parse_f64(text: &str) -> Result<f64, CommandError> {
    text.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| request_error(NOT_FLOAT))
}

fn join(items: impl IntoIterator<Item = impl AsRef<str>>) -> String {
    items
        .into_iter()
        .map(|item| item.as_ref().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

fn bool_reply(value: bool) -> String {
    let reply = if value { "1" } else { "0" };
    reply.to_string()
}

/// Clamp an inclusive `[start, stop]` range with negative indexing
fn normalize_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len || stop < 0 {
        None
    } else {
        Some((start as usize, stop as usize))
    }
}

// =============================================================================
// Values
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct StreamId {
    ms: u64,
    seq: u64,
}

impl StreamId {
    const ZERO: StreamId = StreamId { ms: 0, seq: 0 };

    fn parse(text: &str) -> Result<Self, CommandError> {
        let invalid = || request_error("ERR Invalid stream ID specified as stream command argument");
        match text.split_once('-') {
            Some((ms, seq)) => Ok(StreamId {
                ms: ms.parse().map_err(|_| invalid())?,
                seq: seq.parse().map_err(|_| invalid())?,
            }),
            None => Ok(StreamId {
                ms: text.parse().map_err(|_| invalid())?,
                seq: 0,
            }),
        }
    }

    fn render(self) -> String {
        format!("{}-{}", self.ms, self.seq)
    }
}

#[derive(Debug, Default)]
struct Stream {
    entries: BTreeMap<StreamId, Vec<(String, String)>>,
    last_id: Option<StreamId>,
    groups: BTreeMap<String, StreamId>,
}

impl Stream {
    fn next_auto_id(&self) -> Result<StreamId, CommandError> {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0);
        match self.last_id {
            Some(last) if last.ms >= now_ms => match last.seq.checked_add(1) {
                Some(seq) => Ok(StreamId { ms: last.ms, seq }),
                None => last
                    .ms
                    .checked_add(1)
                    .map(|ms| StreamId { ms, seq: 0 })
                    .ok_or_else(|| {
                        request_error(
                            "ERR The stream has exhausted the last possible ID, unable to add more items",
                        )
                    }),
            },
            _ => Ok(StreamId { ms: now_ms, seq: 0 }),
        }
    }
}

#[derive(Debug)]
enum Value {
    Str(String),
    Hash(BTreeMap<String, String>),
    List(VecDeque<String>),
    Set(BTreeSet<String>),
    SortedSet(BTreeMap<String, f64>),
    Stream(Stream),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Hash(_) => "hash",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::SortedSet(_) => "zset",
            Value::Stream(_) => "stream",
        }
    }

    /// Collections are removed once empty; strings and streams never are
    fn is_empty_collection(&self) -> bool {
        match self {
            Value::Hash(map) => map.is_empty(),
            Value::List(list) => list.is_empty(),
            Value::Set(set) => set.is_empty(),
            Value::SortedSet(set) => set.is_empty(),
            Value::Str(_) | Value::Stream(_) => false,
        }
    }
}

macro_rules! typed_accessor {
    ($name:ident, $variant:ident, $ty:ty) => {
        fn $name(value: &mut Value) -> Result<&mut $ty, CommandError> {
            match value {
                Value::$variant(inner) => Ok(inner),
                _ => Err(request_error(WRONG_TYPE)),
            }
        }
    };
}

typed_accessor!(as_string, Str, String);
typed_accessor!(as_hash, Hash, BTreeMap<String, String>);
typed_accessor!(as_list, List, VecDeque<String>);
typed_accessor!(as_set, Set, BTreeSet<String>);
typed_accessor!(as_sorted_set, SortedSet, BTreeMap<String, f64>);
typed_accessor!(as_stream, Stream, Stream);

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// One logical database
#[derive(Debug, Default)]
struct Database {
    entries: HashMap<String, Entry>,
}

impl Database {
    /// Live entry for `key`, dropping it first if it has expired
    fn entry(&mut self, key: &str, now: Instant) -> Option<&mut Entry> {
        if self.entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn value(&mut self, key: &str, now: Instant) -> Option<&mut Value> {
        self.entry(key, now).map(|entry| &mut entry.value)
    }

    fn value_or_insert(&mut self, key: &str, now: Instant, init: fn() -> Value) -> &mut Value {
        self.entry(key, now);
        &mut self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry {
                value: init(),
                expires_at: None,
            })
            .value
    }

    fn remove(&mut self, key: &str, now: Instant) -> bool {
        self.entry(key, now);
        self.entries.remove(key).is_some()
    }

    fn remove_if_empty(&mut self, key: &str) {
        if self
            .entries
            .get(key)
            .is_some_and(|entry| entry.value.is_empty_collection())
        {
            self.entries.remove(key);
        }
    }

    fn live_len(&mut self, now: Instant) -> usize {
        self.entries.retain(|_, entry| entry.is_live(now));
        self.entries.len()
    }
}

// =============================================================================
// Store
// =============================================================================

/// Keyspace shared by all sessions of a local engine
#[derive(Debug, Default)]
pub struct Store {
    databases: Mutex<HashMap<u32, Database>>,
    config: Mutex<BTreeMap<String, String>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute a keyspace command against database `db`
    pub fn execute(&self, db: u32, request: RequestType, args: &[String]) -> Reply {
        use RequestType::*;

        match request {
            Ping => match args {
                [] => Ok("PONG".to_string()),
                [message] => Ok(message.clone()),
                _ => Err(wrong_arity(request)),
            },
            Echo => match args {
                [message] => Ok(message.clone()),
                _ => Err(wrong_arity(request)),
            },
            ConfigGet => self.config_get(request, args),
            ConfigSet => self.config_set(request, args),
            _ => {
                let mut databases = self.databases.lock();
                let database = databases.entry(db).or_default();
                execute_keyspace(database, Instant::now(), request, args)
            }
        }
    }

    fn config_get(&self, request: RequestType, args: &[String]) -> Reply {
        let [pattern] = args else {
            return Err(wrong_arity(request));
        };
        let config = self.config.lock();
        let pairs = config
            .iter()
            .filter(|(name, _)| pattern == "*" || name.eq_ignore_ascii_case(pattern))
            .flat_map(|(name, value)| [name.as_str(), value.as_str()]);
        Ok(join(pairs))
    }

    fn config_set(&self, request: RequestType, args: &[String]) -> Reply {
        if args.is_empty() || args.len() % 2 != 0 {
            return Err(wrong_arity(request));
        }
        let mut config = self.config.lock();
        for pair in args.chunks(2) {
            config.insert(pair[0].to_lowercase(), pair[1].clone());
        }
        Ok("OK".to_string())
    }
}

fn execute_keyspace(db: &mut Database, now: Instant, request: RequestType, args: &[String]) -> Reply {
    use RequestType::*;

    match request {
        // ---------------------------------------------------------------------
        // Keys & strings
        // ---------------------------------------------------------------------
        GetString => {
            let [key] = args else { return Err(wrong_arity(request)) };
            match db.value(key, now) {
                Some(value) => Ok(as_string(value)?.clone()),
                None => Err(request_error(NO_SUCH_KEY)),
            }
        }
        SetString => {
            let (key, value, expires_at) = match args {
                [key, value] => (key, value, None),
                [key, value, unit, amount] => {
                    let amount = parse_i64(amount)?;
                    if amount <= 0 {
                        return Err(request_error("ERR invalid expire time in 'set' command"));
                    }
                    let ttl = match unit.to_ascii_uppercase().as_str() {
                        "EX" => Duration::from_secs(amount as u64),
                        "PX" => Duration::from_millis(amount as u64),
                        _ => return Err(request_error("ERR syntax error")),
                    };
                    let expires_at = now
                        .checked_add(ttl)
                        .ok_or_else(|| request_error("ERR invalid expire time in 'set' command"))?;
                    (key, value, Some(expires_at))
                }
                _ => return Err(wrong_arity(request)),
            };
            db.entries.insert(
                key.clone(),
                Entry {
                    value: Value::Str(value.clone()),
                    expires_at,
                },
            );
            Ok("OK".to_string())
        }
        MGet => {
            if args.is_empty() {
                return Err(wrong_arity(request));
            }
            let values: Vec<String> = args
                .iter()
                .map(|key| match db.value(key, now) {
                    Some(Value::Str(value)) => value.clone(),
                    _ => String::new(),
                })
                .collect();
            Ok(join(values))
        }
        MSet => {
            if args.is_empty() || args.len() % 2 != 0 {
                return Err(wrong_arity(request));
            }
            for pair in args.chunks(2) {
                db.entries.insert(
                    pair[0].clone(),
                    Entry {
                        value: Value::Str(pair[1].clone()),
                        expires_at: None,
                    },
                );
            }
            Ok("OK".to_string())
        }
        Del | Unlink => {
            if args.is_empty() {
                return Err(wrong_arity(request));
            }
            let removed = args.iter().filter(|key| db.remove(key, now)).count();
            Ok(removed.to_string())
        }
        Exists => {
            if args.is_empty() {
                return Err(wrong_arity(request));
            }
            let found = args.iter().filter(|key| db.entry(key, now).is_some()).count();
            Ok(found.to_string())
        }
        Type => {
            let [key] = args else { return Err(wrong_arity(request)) };
            Ok(db
                .value(key, now)
                .map_or("none", |value| value.type_name())
                .to_string())
        }
        Strlen => {
            let [key] = args else { return Err(wrong_arity(request)) };
            match db.value(key, now) {
                Some(value) => Ok(as_string(value)?.len().to_string()),
                None => Ok("0".to_string()),
            }
        }
        Append => {
            let [key, suffix] = args else { return Err(wrong_arity(request)) };
            let value = as_string(db.value_or_insert(key, now, || Value::Str(String::new())))?;
            value.push_str(suffix);
            Ok(value.len().to_string())
        }
        Incr | Decr | IncrBy | DecrBy => {
            let (key, delta) = match (request, args) {
                (Incr, [key]) => (key, 1),
                (Decr, [key]) => (key, -1),
                (IncrBy, [key, delta]) => (key, parse_i64(delta)?),
                (DecrBy, [key, delta]) => (
                    key,
                    parse_i64(delta)?
                        .checked_neg()
                        .ok_or_else(|| request_error(OVERFLOW))?,
                ),
                _ => return Err(wrong_arity(request)),
            };
            let value = as_string(db.value_or_insert(key, now, || Value::Str("0".to_string())))?;
            let updated = parse_i64(value)?
                .checked_add(delta)
                .ok_or_else(|| request_error(OVERFLOW))?;
            *value = updated.to_string();
            Ok(value.clone())
        }
        IncrByFloat => {
            let [key, delta] = args else { return Err(wrong_arity(request)) };
            let delta = parse_f64(delta)?;
            let value = as_string(db.value_or_insert(key, now, || Value::Str("0".to_string())))?;
            let updated = parse_f64(value)? + delta;
            if !updated.is_finite() {
                return Err(request_error("ERR increment would produce NaN or Infinity"));
            }
            *value = updated.to_string();
            Ok(value.clone())
        }

        // ---------------------------------------------------------------------
        // Expiry
        // ---------------------------------------------------------------------
        Expire | PExpire => {
            let [key, amount] = args else { return Err(wrong_arity(request)) };
            let amount = parse_i64(amount)?;
            if db.entry(key, now).is_none() {
                return Ok("0".to_string());
            }
            if amount <= 0 {
                db.entries.remove(key.as_str());
                return Ok("1".to_string());
            }
            let ttl = if request == Expire {
                Duration::from_secs(amount as u64)
            } else {
                Duration::from_millis(amount as u64)
            };
            let expires_at = now.checked_add(ttl).ok_or_else(|| {
                request_error(format!(
                    "ERR invalid expire time in '{}' command",
                    request.to_string().to_lowercase()
                ))
            })?;
            if let Some(entry) = db.entry(key, now) {
                entry.expires_at = Some(expires_at);
            }
            Ok("1".to_string())
        }
        Ttl | PTtl => {
            let [key] = args else { return Err(wrong_arity(request)) };
            let reply = match db.entry(key, now) {
                None => -2,
                Some(Entry {
                    expires_at: None, ..
                }) => -1,
                Some(Entry {
                    expires_at: Some(at),
                    ..
                }) => {
                    let remaining = at.saturating_duration_since(now).as_millis() as i64;
                    if request == Ttl {
                        (remaining + 500) / 1000
                    } else {
                        remaining
                    }
                }
            };
            Ok(reply.to_string())
        }
        Persist => {
            let [key] = args else { return Err(wrong_arity(request)) };
            let cleared = db
                .entry(key, now)
                .and_then(|entry| entry.expires_at.take())
                .is_some();
            Ok(bool_reply(cleared))
        }
        DbSize => {
            if !args.is_empty() {
                return Err(wrong_arity(request));
            }
            Ok(db.live_len(now).to_string())
        }

        // ---------------------------------------------------------------------
        // Hashes
        // ---------------------------------------------------------------------
        HashSet | HashMSet => {
            if args.len() < 3 || args.len() % 2 != 1 {
                return Err(wrong_arity(request));
            }
            let hash = as_hash(db.value_or_insert(&args[0], now, || Value::Hash(BTreeMap::new())))?;
            let added = args[1..]
                .chunks(2)
                .filter(|pair| hash.insert(pair[0].clone(), pair[1].clone()).is_none())
                .count();
            if request == HashMSet {
                Ok("OK".to_string())
            } else {
                Ok(added.to_string())
            }
        }
        HashGet => {
            let [key, field] = args else { return Err(wrong_arity(request)) };
            let Some(value) = db.value(key, now) else {
                return Err(request_error(NO_SUCH_KEY));
            };
            as_hash(value)?
                .get(field)
                .cloned()
                .ok_or_else(|| request_error("no such field"))
        }
        HashDel => {
            if args.len() < 2 {
                return Err(wrong_arity(request));
            }
            let Some(value) = db.value(&args[0], now) else {
                return Ok("0".to_string());
            };
            let hash = as_hash(value)?;
            let removed = args[1..]
                .iter()
                .filter(|field| hash.remove(field.as_str()).is_some())
                .count();
            db.remove_if_empty(&args[0]);
            Ok(removed.to_string())
        }
        HashExists => {
            let [key, field] = args else { return Err(wrong_arity(request)) };
            match db.value(key, now) {
                Some(value) => Ok(bool_reply(as_hash(value)?.contains_key(field))),
                None => Ok(bool_reply(false)),
            }
        }
        HLen => {
            let [key] = args else { return Err(wrong_arity(request)) };
            match db.value(key, now) {
                Some(value) => Ok(as_hash(value)?.len().to_string()),
                None => Ok("0".to_string()),
            }
        }
        HashGetAll | HKeys | HVals => {
            let [key] = args else { return Err(wrong_arity(request)) };
            let Some(value) = db.value(key, now) else {
                return Ok(String::new());
            };
            let hash = as_hash(value)?;
            Ok(match request {
                HKeys => join(hash.keys()),
                HVals => join(hash.values()),
                _ => join(hash.iter().flat_map(|(field, value)| [field, value])),
            })
        }

        // ---------------------------------------------------------------------
        // Lists
        // ---------------------------------------------------------------------
        LPush | RPush => {
            if args.len() < 2 {
                return Err(wrong_arity(request));
            }
            let list = as_list(db.value_or_insert(&args[0], now, || Value::List(VecDeque::new())))?;
            for element in &args[1..] {
                if request == LPush {
                    list.push_front(element.clone());
                } else {
                    list.push_back(element.clone());
                }
            }
            Ok(list.len().to_string())
        }
        LPop | RPop => {
            let [key] = args else { return Err(wrong_arity(request)) };
            let Some(value) = db.value(key, now) else {
                return Err(request_error(NO_SUCH_KEY));
            };
            let list = as_list(value)?;
            let popped = if request == LPop {
                list.pop_front()
            } else {
                list.pop_back()
            };
            db.remove_if_empty(key);
            popped.ok_or_else(|| request_error(NO_SUCH_KEY))
        }
        LLen => {
            let [key] = args else { return Err(wrong_arity(request)) };
            match db.value(key, now) {
                Some(value) => Ok(as_list(value)?.len().to_string()),
                None => Ok("0".to_string()),
            }
        }
        LRange => {
            let [key, start, stop] = args else { return Err(wrong_arity(request)) };
            let (start, stop) = (parse_i64(start)?, parse_i64(stop)?);
            let Some(value) = db.value(key, now) else {
                return Ok(String::new());
            };
            let list = as_list(value)?;
            Ok(match normalize_range(start, stop, list.len()) {
                Some((from, to)) => join(list.range(from..=to)),
                None => String::new(),
            })
        }
        LTrim => {
            let [key, start, stop] = args else { return Err(wrong_arity(request)) };
            let (start, stop) = (parse_i64(start)?, parse_i64(stop)?);
            let Some(value) = db.value(key, now) else {
                return Ok("OK".to_string());
            };
            let list = as_list(value)?;
            match normalize_range(start, stop, list.len()) {
                Some((from, to)) => {
                    list.truncate(to + 1);
                    list.drain(..from);
                }
                None => list.clear(),
            }
            db.remove_if_empty(key);
            Ok("OK".to_string())
        }
        LIndex => {
            let [key, index] = args else { return Err(wrong_arity(request)) };
            let index = parse_i64(index)?;
            let Some(value) = db.value(key, now) else {
                return Err(request_error(NO_SUCH_KEY));
            };
            let list = as_list(value)?;
            let position = if index < 0 {
                list.len() as i64 + index
            } else {
                index
            };
            usize::try_from(position)
                .ok()
                .and_then(|position| list.get(position))
                .cloned()
                .ok_or_else(|| request_error("index out of range"))
        }

        // ---------------------------------------------------------------------
        // Sets
        // ---------------------------------------------------------------------
        SAdd => {
            if args.len() < 2 {
                return Err(wrong_arity(request));
            }
            let set = as_set(db.value_or_insert(&args[0], now, || Value::Set(BTreeSet::new())))?;
            let added = args[1..]
                .iter()
                .filter(|member| set.insert((*member).clone()))
                .count();
            Ok(added.to_string())
        }
        SRem => {
            if args.len() < 2 {
                return Err(wrong_arity(request));
            }
            let Some(value) = db.value(&args[0], now) else {
                return Ok("0".to_string());
            };
            let set = as_set(value)?;
            let removed = args[1..]
                .iter()
                .filter(|member| set.remove(member.as_str()))
                .count();
            db.remove_if_empty(&args[0]);
            Ok(removed.to_string())
        }
        SMembers => {
            let [key] = args else { return Err(wrong_arity(request)) };
            match db.value(key, now) {
                Some(value) => Ok(join(as_set(value)?.iter())),
                None => Ok(String::new()),
            }
        }
        SCard => {
            let [key] = args else { return Err(wrong_arity(request)) };
            match db.value(key, now) {
                Some(value) => Ok(as_set(value)?.len().to_string()),
                None => Ok("0".to_string()),
            }
        }
        SIsMember => {
            let [key, member] = args else { return Err(wrong_arity(request)) };
            match db.value(key, now) {
                Some(value) => Ok(bool_reply(as_set(value)?.contains(member))),
                None => Ok(bool_reply(false)),
            }
        }

        // ---------------------------------------------------------------------
        // Sorted sets
        // ---------------------------------------------------------------------
        ZAdd => {
            if args.len() < 3 || args.len() % 2 != 1 {
                return Err(wrong_arity(request));
            }
            let scored = args[1..]
                .chunks(2)
                .map(|pair| Ok((parse_f64(&pair[0])?, pair[1].clone())))
                .collect::<Result<Vec<_>, CommandError>>()?;
            let zset = as_sorted_set(db.value_or_insert(&args[0], now, || {
                Value::SortedSet(BTreeMap::new())
            }))?;
            let added = scored
                .into_iter()
                .filter(|(score, member)| zset.insert(member.clone(), *score).is_none())
                .count();
            Ok(added.to_string())
        }
        ZRem => {
            if args.len() < 2 {
                return Err(wrong_arity(request));
            }
            let Some(value) = db.value(&args[0], now) else {
                return Ok("0".to_string());
            };
            let zset = as_sorted_set(value)?;
            let removed = args[1..]
                .iter()
                .filter(|member| zset.remove(member.as_str()).is_some())
                .count();
            db.remove_if_empty(&args[0]);
            Ok(removed.to_string())
        }
        ZScore => {
            let [key, member] = args else { return Err(wrong_arity(request)) };
            let Some(value) = db.value(key, now) else {
                return Err(request_error(NO_SUCH_KEY));
            };
            as_sorted_set(value)?
                .get(member)
                .map(|score| score.to_string())
                .ok_or_else(|| request_error("no such member"))
        }
        ZCard => {
            let [key] = args else { return Err(wrong_arity(request)) };
            match db.value(key, now) {
                Some(value) => Ok(as_sorted_set(value)?.len().to_string()),
                None => Ok("0".to_string()),
            }
        }
        ZIncrBy => {
            let [key, delta, member] = args else { return Err(wrong_arity(request)) };
            let delta = parse_f64(delta)?;
            let zset = as_sorted_set(db.value_or_insert(key, now, || {
                Value::SortedSet(BTreeMap::new())
            }))?;
            let score = zset.entry(member.clone()).or_insert(0.0);
            *score += delta;
            Ok(score.to_string())
        }
        ZRank => {
            let [key, member] = args else { return Err(wrong_arity(request)) };
            let Some(value) = db.value(key, now) else {
                return Err(request_error(NO_SUCH_KEY));
            };
            let zset = as_sorted_set(value)?;
            let mut ordered: Vec<(&String, f64)> =
                zset.iter().map(|(member, score)| (member, *score)).collect();
            ordered.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
            ordered
                .iter()
                .position(|(candidate, _)| *candidate == member)
                .map(|rank| rank.to_string())
                .ok_or_else(|| request_error("no such member"))
        }

        // ---------------------------------------------------------------------
        // Streams
        // ---------------------------------------------------------------------
        XAdd => {
            if args.len() < 4 || args.len() % 2 != 0 {
                return Err(wrong_arity(request));
            }
            let stream = as_stream(db.value_or_insert(&args[0], now, || {
                Value::Stream(Stream::default())
            }))?;
            let id = if args[1] == "*" {
                stream.next_auto_id()?
            } else {
                let id = StreamId::parse(&args[1])?;
                if id == StreamId::ZERO || stream.last_id.is_some_and(|last| id <= last) {
                    return Err(request_error(
                        "ERR The ID specified in XADD is equal or smaller than the target stream top item",
                    ));
                }
                id
            };
            let fields = args[2..]
                .chunks(2)
                .map(|pair| (pair[0].clone(), pair[1].clone()))
                .collect();
            stream.entries.insert(id, fields);
            stream.last_id = Some(id);
            Ok(id.render())
        }
        XTrim => {
            let (key, max_len) = match args {
                [key, strategy, max_len] if strategy.eq_ignore_ascii_case("MAXLEN") => (key, max_len),
                [key, strategy, modifier, max_len]
                    if strategy.eq_ignore_ascii_case("MAXLEN") && (modifier == "=" || modifier == "~") =>
                {
                    (key, max_len)
                }
                _ => return Err(request_error("ERR syntax error")),
            };
            let max_len = usize::try_from(parse_i64(max_len)?)
                .map_err(|_| request_error("ERR The MAXLEN argument must be >= 0."))?;
            let Some(value) = db.value(key, now) else {
                return Ok("0".to_string());
            };
            let stream = as_stream(value)?;
            let excess = stream.entries.len().saturating_sub(max_len);
            for _ in 0..excess {
                stream.entries.pop_first();
            }
            Ok(excess.to_string())
        }
        XGroupCreate => {
            let (key, group, id, make_stream) = match args {
                [key, group, id] => (key, group, id, false),
                [key, group, id, flag] if flag.eq_ignore_ascii_case("MKSTREAM") => (key, group, id, true),
                _ => return Err(wrong_arity(request)),
            };
            if make_stream {
                db.value_or_insert(key, now, || Value::Stream(Stream::default()));
            }
            let Some(value) = db.value(key, now) else {
                return Err(request_error(
                    "ERR The XGROUP subcommand requires the key to exist. Note that for CREATE you may want to use the MKSTREAM option to create an empty stream automatically.",
                ));
            };
            let stream = as_stream(value)?;
            if stream.groups.contains_key(group) {
                return Err(request_error("BUSYGROUP Consumer Group name already exists"));
            }
            let start = if id == "$" {
                stream.last_id.unwrap_or(StreamId::ZERO)
            } else {
                StreamId::parse(id)?
            };
            stream.groups.insert(group.clone(), start);
            Ok("OK".to_string())
        }
        XGroupDestroy => {
            let [key, group] = args else { return Err(wrong_arity(request)) };
            let Some(value) = db.value(key, now) else {
                return Err(request_error(NO_SUCH_KEY));
            };
            Ok(bool_reply(as_stream(value)?.groups.remove(group).is_some()))
        }

        other => Err(request_error(format!(
            "ERR unsupported command '{}' in local engine",
            other
        ))),
    }
}
