//! Client handle
//!
//! A connected session on an execution core plus the typed command surface.
//!
//! ## Lifecycle
//! ```text
//!  connect(config) ──▶ encode ──▶ establish ──▶ Client
//!                                                 │  execute / typed commands
//!                                                 ▼
//!                                   close() or drop ──▶ release (once)
//! ```
//!
//! Once the engine reports a closing error, the client latches into the
//! closing state and every later command fails fast without engine contact.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ConnectionConfig;
use crate::dispatch::{self, Dispatcher, Resolver};
use crate::engine::{ClientHandle, ExecutionCore};
use crate::error::{RelayError, Result};
use crate::protocol::{
    encode_connection_config, parse_bool_reply, parse_float_reply, parse_integer_reply,
    parse_list_reply, CommandResult, RequestType,
};

/// A live session on an execution core
///
/// Safe to share between threads; concurrent commands are correlated
/// independently.
pub struct Client {
    core: Arc<dyn ExecutionCore>,
    resolver: Arc<Resolver>,
    handle: ClientHandle,
    request_timeout: Option<Duration>,
    closing: AtomicBool,
    released: bool,
}

impl Client {
    /// Connect through `core`, resolving completions on the process-wide resolver
    pub fn connect(core: Arc<dyn ExecutionCore>, config: &ConnectionConfig) -> Result<Self> {
        Self::connect_with_resolver(core, config, Arc::clone(dispatch::global()))
    }

    /// Connect through `core`, resolving completions on `resolver`
    ///
    /// The engine must deliver its completions to the same resolver; a core
    /// that reports a different one is refused before any session is made.
    pub fn connect_with_resolver(
        core: Arc<dyn ExecutionCore>,
        config: &ConnectionConfig,
        resolver: Arc<Resolver>,
    ) -> Result<Self> {
        let encoded = encode_connection_config(config)?;
        if let Some(completes_on) = core.completion_resolver() {
            if !Arc::ptr_eq(completes_on, &resolver) {
                return Err(RelayError::Config(
                    "execution core completes calls on a different resolver".to_string(),
                ));
            }
        }
        let handle = core.establish(&encoded).into_result()?;

        tracing::debug!(
            handle = handle.as_raw(),
            seeds = config.addresses.len(),
            cluster = config.cluster_mode,
            "client connected"
        );

        Ok(Self {
            core,
            resolver,
            handle,
            request_timeout: config.request_timeout,
            closing: AtomicBool::new(false),
            released: false,
        })
    }

    /// The engine's session token
    pub fn handle(&self) -> ClientHandle {
        self.handle
    }

    /// True once the engine has reported that the client is closing
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// A dispatcher bound to this session
    pub fn dispatcher(&self) -> Dispatcher<'_> {
        Dispatcher::new(self.core.as_ref(), &self.resolver, self.handle)
    }

    /// Release the session
    ///
    /// Consumes the client, so no command can follow. Dropping a client
    /// releases it as well.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.core.release(self.handle);
        tracing::debug!(handle = self.handle.as_raw(), "client released");
    }

    /// Execute any catalog request and return the reply text
    pub fn execute(&self, request: RequestType, args: &[&str]) -> Result<String> {
        if self.is_closing() {
            return Err(RelayError::Closing("client is closing".to_string()));
        }

        let dispatcher = self.dispatcher();
        let outcome = match self.request_timeout {
            Some(timeout) => dispatcher.dispatch_with_timeout(request, args, timeout),
            None => dispatcher.dispatch(request, args),
        }
        .and_then(CommandResult::into_result);

        if matches!(outcome, Err(RelayError::Closing(_))) {
            self.closing.store(true, Ordering::Release);
            tracing::debug!(handle = self.handle.as_raw(), "client entered closing state");
        }
        outcome
    }

    /// Execute an arbitrary command; `args` carries the command words too
    pub fn custom_command(&self, args: &[&str]) -> Result<String> {
        self.execute(RequestType::CustomCommand, args)
    }

    fn execute_integer(&self, request: RequestType, args: &[&str]) -> Result<i64> {
        parse_integer_reply(&self.execute(request, args)?)
    }

    fn execute_bool(&self, request: RequestType, args: &[&str]) -> Result<bool> {
        parse_bool_reply(&self.execute(request, args)?)
    }

    fn execute_list(&self, request: RequestType, args: &[&str]) -> Result<Vec<String>> {
        Ok(parse_list_reply(&self.execute(request, args)?))
    }

    fn execute_with_key(&self, request: RequestType, key: &str, rest: &[&str]) -> Result<String> {
        let mut args = Vec::with_capacity(rest.len() + 1);
        args.push(key);
        args.extend_from_slice(rest);
        self.execute(request, &args)
    }

    // =========================================================================
    // Connection Management
    // =========================================================================

    pub fn ping(&self) -> Result<String> {
        self.execute(RequestType::Ping, &[])
    }

    pub fn ping_message(&self, message: &str) -> Result<String> {
        self.execute(RequestType::Ping, &[message])
    }

    pub fn echo(&self, message: &str) -> Result<String> {
        self.execute(RequestType::Echo, &[message])
    }

    pub fn info(&self) -> Result<String> {
        self.execute(RequestType::Info, &[])
    }

    pub fn client_id(&self) -> Result<i64> {
        self.execute_integer(RequestType::ClientId, &[])
    }

    /// The connection name; empty when none is set
    pub fn client_getname(&self) -> Result<String> {
        self.execute(RequestType::ClientGetName, &[])
    }

    pub fn client_setname(&self, name: &str) -> Result<String> {
        self.execute(RequestType::ClientSetName, &[name])
    }

    pub fn select(&self, database: u32) -> Result<String> {
        self.execute(RequestType::Select, &[&database.to_string()])
    }

    /// Matching parameters as `(name, value)` pairs
    pub fn config_get(&self, parameter: &str) -> Result<Vec<(String, String)>> {
        let items = self.execute_list(RequestType::ConfigGet, &[parameter])?;
        into_pairs(items)
    }

    pub fn config_set(&self, parameter: &str, value: &str) -> Result<String> {
        self.execute(RequestType::ConfigSet, &[parameter, value])
    }

    // =========================================================================
    // Strings & Keys
    // =========================================================================

    pub fn get(&self, key: &str) -> Result<String> {
        self.execute(RequestType::GetString, &[key])
    }

    pub fn set(&self, key: &str, value: &str) -> Result<String> {
        self.execute(RequestType::SetString, &[key, value])
    }

    /// Values for `keys` in order; a missing key yields an empty string
    pub fn mget(&self, keys: &[&str]) -> Result<Vec<String>> {
        let text = self.execute(RequestType::MGet, keys)?;
        if keys.len() == 1 {
            return Ok(vec![text]);
        }
        Ok(parse_list_reply(&text))
    }

    pub fn mset(&self, pairs: &[(&str, &str)]) -> Result<String> {
        let args: Vec<&str> = pairs.iter().flat_map(|(key, value)| [*key, *value]).collect();
        self.execute(RequestType::MSet, &args)
    }

    /// Number of keys removed
    pub fn del(&self, keys: &[&str]) -> Result<i64> {
        self.execute_integer(RequestType::Del, keys)
    }

    /// Number of the given keys that exist
    pub fn exists(&self, keys: &[&str]) -> Result<i64> {
        self.execute_integer(RequestType::Exists, keys)
    }

    pub fn strlen(&self, key: &str) -> Result<i64> {
        self.execute_integer(RequestType::Strlen, &[key])
    }

    /// Length of the string after appending
    pub fn append(&self, key: &str, value: &str) -> Result<i64> {
        self.execute_integer(RequestType::Append, &[key, value])
    }

    pub fn incr(&self, key: &str) -> Result<i64> {
        self.execute_integer(RequestType::Incr, &[key])
    }

    pub fn incr_by(&self, key: &str, amount: i64) -> Result<i64> {
        self.execute_integer(RequestType::IncrBy, &[key, &amount.to_string()])
    }

    pub fn incr_by_float(&self, key: &str, amount: f64) -> Result<f64> {
        let text = self.execute(RequestType::IncrByFloat, &[key, &amount.to_string()])?;
        parse_float_reply(&text)
    }

    pub fn decr(&self, key: &str) -> Result<i64> {
        self.execute_integer(RequestType::Decr, &[key])
    }

    pub fn decr_by(&self, key: &str, amount: i64) -> Result<i64> {
        self.execute_integer(RequestType::DecrBy, &[key, &amount.to_string()])
    }

    // =========================================================================
    // Expiry
    // =========================================================================

    /// False when the key does not exist
    pub fn expire(&self, key: &str, seconds: i64) -> Result<bool> {
        self.execute_bool(RequestType::Expire, &[key, &seconds.to_string()])
    }

    /// Remaining seconds; -1 without expiry, -2 when the key is missing
    pub fn ttl(&self, key: &str) -> Result<i64> {
        self.execute_integer(RequestType::Ttl, &[key])
    }

    pub fn persist(&self, key: &str) -> Result<bool> {
        self.execute_bool(RequestType::Persist, &[key])
    }

    // =========================================================================
    // Hashes
    // =========================================================================

    /// Number of fields added
    pub fn hset(&self, key: &str, fields: &[(&str, &str)]) -> Result<i64> {
        let rest: Vec<&str> = fields.iter().flat_map(|(field, value)| [*field, *value]).collect();
        let reply = self.execute_with_key(RequestType::HashSet, key, &rest)?;
        parse_integer_reply(&reply)
    }

    pub fn hget(&self, key: &str, field: &str) -> Result<String> {
        self.execute(RequestType::HashGet, &[key, field])
    }

    pub fn hdel(&self, key: &str, fields: &[&str]) -> Result<i64> {
        parse_integer_reply(&self.execute_with_key(RequestType::HashDel, key, fields)?)
    }

    pub fn hlen(&self, key: &str) -> Result<i64> {
        self.execute_integer(RequestType::HLen, &[key])
    }

    pub fn hexists(&self, key: &str, field: &str) -> Result<bool> {
        self.execute_bool(RequestType::HashExists, &[key, field])
    }

    /// All `(field, value)` pairs of the hash
    pub fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>> {
        into_pairs(self.execute_list(RequestType::HashGetAll, &[key])?)
    }

    // =========================================================================
    // Lists
    // =========================================================================

    /// Length of the list after the push
    pub fn lpush(&self, key: &str, elements: &[&str]) -> Result<i64> {
        parse_integer_reply(&self.execute_with_key(RequestType::LPush, key, elements)?)
    }

    pub fn rpush(&self, key: &str, elements: &[&str]) -> Result<i64> {
        parse_integer_reply(&self.execute_with_key(RequestType::RPush, key, elements)?)
    }

    pub fn lpop(&self, key: &str) -> Result<String> {
        self.execute(RequestType::LPop, &[key])
    }

    pub fn rpop(&self, key: &str) -> Result<String> {
        self.execute(RequestType::RPop, &[key])
    }

    pub fn llen(&self, key: &str) -> Result<i64> {
        self.execute_integer(RequestType::LLen, &[key])
    }

    pub fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        self.execute_list(
            RequestType::LRange,
            &[key, &start.to_string(), &stop.to_string()],
        )
    }

    pub fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<String> {
        self.execute(
            RequestType::LTrim,
            &[key, &start.to_string(), &stop.to_string()],
        )
    }

    pub fn lindex(&self, key: &str, index: i64) -> Result<String> {
        self.execute(RequestType::LIndex, &[key, &index.to_string()])
    }

    // =========================================================================
    // Sets
    // =========================================================================

    pub fn sadd(&self, key: &str, members: &[&str]) -> Result<i64> {
        parse_integer_reply(&self.execute_with_key(RequestType::SAdd, key, members)?)
    }

    pub fn srem(&self, key: &str, members: &[&str]) -> Result<i64> {
        parse_integer_reply(&self.execute_with_key(RequestType::SRem, key, members)?)
    }

    pub fn smembers(&self, key: &str) -> Result<Vec<String>> {
        self.execute_list(RequestType::SMembers, &[key])
    }

    pub fn scard(&self, key: &str) -> Result<i64> {
        self.execute_integer(RequestType::SCard, &[key])
    }

    pub fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        self.execute_bool(RequestType::SIsMember, &[key, member])
    }

    // =========================================================================
    // Sorted Sets
    // =========================================================================

    /// Number of new members added
    pub fn zadd(&self, key: &str, members: &[(f64, &str)]) -> Result<i64> {
        let scores: Vec<String> = members.iter().map(|(score, _)| score.to_string()).collect();
        let rest: Vec<&str> = scores
            .iter()
            .zip(members)
            .flat_map(|(score, (_, member))| [score.as_str(), *member])
            .collect();
        parse_integer_reply(&self.execute_with_key(RequestType::ZAdd, key, &rest)?)
    }

    pub fn zrem(&self, key: &str, members: &[&str]) -> Result<i64> {
        parse_integer_reply(&self.execute_with_key(RequestType::ZRem, key, members)?)
    }

    pub fn zscore(&self, key: &str, member: &str) -> Result<f64> {
        parse_float_reply(&self.execute(RequestType::ZScore, &[key, member])?)
    }

    pub fn zcard(&self, key: &str) -> Result<i64> {
        self.execute_integer(RequestType::ZCard, &[key])
    }

    /// The member's new score
    pub fn zincr_by(&self, key: &str, increment: f64, member: &str) -> Result<f64> {
        let text = self.execute(RequestType::ZIncrBy, &[key, &increment.to_string(), member])?;
        parse_float_reply(&text)
    }

    /// Zero-based rank, lowest score first
    pub fn zrank(&self, key: &str, member: &str) -> Result<i64> {
        self.execute_integer(RequestType::ZRank, &[key, member])
    }

    // =========================================================================
    // Streams
    // =========================================================================

    /// Append an entry with an engine-generated id; returns the id
    pub fn xadd(&self, key: &str, fields: &[(&str, &str)]) -> Result<String> {
        let mut rest = vec!["*"];
        rest.extend(fields.iter().flat_map(|(field, value)| [*field, *value]));
        self.execute_with_key(RequestType::XAdd, key, &rest)
    }

    /// Trim to at most `max_len` entries; returns the number removed
    pub fn xtrim(&self, key: &str, max_len: u64) -> Result<i64> {
        self.execute_integer(RequestType::XTrim, &[key, "MAXLEN", &max_len.to_string()])
    }

    pub fn xack(&self, key: &str, group: &str, ids: &[&str]) -> Result<i64> {
        let mut rest = vec![group];
        rest.extend_from_slice(ids);
        parse_integer_reply(&self.execute_with_key(RequestType::XAck, key, &rest)?)
    }

    pub fn xgroup_create(&self, key: &str, group: &str, id: &str) -> Result<String> {
        self.execute(RequestType::XGroupCreate, &[key, group, id])
    }

    pub fn xgroup_destroy(&self, key: &str, group: &str) -> Result<bool> {
        self.execute_bool(RequestType::XGroupDestroy, &[key, group])
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("handle", &self.handle)
            .field("request_timeout", &self.request_timeout)
            .field("closing", &self.is_closing())
            .finish()
    }
}

fn into_pairs(items: Vec<String>) -> Result<Vec<(String, String)>> {
    if items.len() % 2 != 0 {
        return Err(RelayError::UnexpectedReply(format!(
            "expected field/value pairs, got {} elements",
            items.len()
        )));
    }
    let mut pairs = Vec::with_capacity(items.len() / 2);
    let mut items = items.into_iter();
    while let (Some(field), Some(value)) = (items.next(), items.next()) {
        pairs.push((field, value));
    }
    Ok(pairs)
}
