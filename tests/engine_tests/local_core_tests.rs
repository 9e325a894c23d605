//! Local Core Tests
//!
//! Tests for the in-process execution core: sessions, worker completion
//! and the keyspace commands it serves.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use relaykv::config::{ReadFrom, TlsMode};
use relaykv::dispatch::{CallRef, Resolver};
use relaykv::engine::LocalCoreConfig;
use relaykv::protocol::{encode_args, encode_connection_config, ConnectResponse, ErrorKind};
use relaykv::{
    Client, ClientHandle, CommandResult, ConnectionConfig, ExecutionCore, LocalCore, RelayError,
    RequestType,
};

fn config() -> ConnectionConfig {
    ConnectionConfig::builder()
        .address("localhost", 6379)
        .tls_mode(TlsMode::None)
        .cluster_mode(false)
        .read_from(ReadFrom::Primary)
        .build()
        .unwrap()
}

fn start(workers: usize) -> (Arc<LocalCore>, Arc<Resolver>) {
    let resolver = Arc::new(Resolver::new());
    let core = LocalCore::with_resolver(
        LocalCoreConfig::builder().workers(workers).build(),
        Arc::clone(&resolver),
    )
    .unwrap();
    (Arc::new(core), resolver)
}

fn connect(core: &Arc<LocalCore>, resolver: &Arc<Resolver>) -> Client {
    let core: Arc<dyn ExecutionCore> = core.clone();
    Client::connect_with_resolver(core, &config(), Arc::clone(resolver)).unwrap()
}

fn request_error(message: &str) -> RelayError {
    RelayError::Request(message.to_string())
}

// =============================================================================
// Sessions
// =============================================================================

#[test]
fn test_establish_and_release() {
    let (core, _resolver) = start(1);
    let frame = encode_connection_config(&config()).unwrap();

    let handle = match core.establish(&frame) {
        ConnectResponse::Connected(handle) => handle,
        other => panic!("Expected connection, got {:?}", other),
    };
    assert_eq!(core.session_count(), 1);

    core.release(handle);
    assert_eq!(core.session_count(), 0);
}

#[test]
fn test_establish_rejects_garbage_config() {
    let (core, _resolver) = start(1);

    match core.establish(b"not a config frame") {
        ConnectResponse::Failed { kind, .. } => assert_eq!(kind, ErrorKind::Connection),
        other => panic!("Expected failure, got {:?}", other),
    }
    assert_eq!(core.session_count(), 0);
}

#[test]
fn test_refused_connection() {
    let resolver = Arc::new(Resolver::new());
    let core = LocalCore::with_resolver(
        LocalCoreConfig::builder()
            .refuse_connections("connection refused")
            .build(),
        Arc::clone(&resolver),
    )
    .unwrap();

    let result = Client::connect_with_resolver(Arc::new(core), &config(), resolver);

    assert_eq!(
        result.unwrap_err(),
        RelayError::Connection("connection refused".to_string())
    );
}

#[test]
fn test_connect_refuses_foreign_resolver() {
    let (core, _resolver) = start(1);

    let result = Client::connect(core.clone(), &config());

    assert!(matches!(result, Err(RelayError::Config(_))));
    assert_eq!(core.session_count(), 0);
}

#[test]
fn test_handles_are_distinct() {
    let (core, resolver) = start(1);
    let a = connect(&core, &resolver);
    let b = connect(&core, &resolver);

    assert_ne!(a.handle(), b.handle());
    assert_eq!(core.session_count(), 2);
    assert_ne!(a.client_id().unwrap(), b.client_id().unwrap());
}

#[test]
fn test_submit_to_unknown_handle() {
    let (core, resolver) = start(1);
    let pending = resolver.register().unwrap();
    let args = encode_args(&["key"]).unwrap();

    let result = core.submit(
        ClientHandle::from_raw(9999),
        pending.call_ref(),
        RequestType::GetString,
        &args,
    );

    assert!(matches!(result, Err(RelayError::Closing(_))));
}

#[test]
fn test_completion_arrives_on_worker_thread() {
    let (core, resolver) = start(2);
    let frame = encode_connection_config(&config()).unwrap();
    let handle = match core.establish(&frame) {
        ConnectResponse::Connected(handle) => handle,
        other => panic!("Expected connection, got {:?}", other),
    };

    let pending = resolver.register().unwrap();
    let call_ref: CallRef = pending.call_ref();
    let args = encode_args::<&str>(&[]).unwrap();
    core.submit(handle, call_ref, RequestType::Ping, &args).unwrap();
    drop(args);

    assert_eq!(
        pending.wait_timeout(Duration::from_secs(5)),
        Some(CommandResult::value("PONG"))
    );
}

#[test]
fn test_dropping_core_finishes_queued_work() {
    let (core, resolver) = start(1);
    let frame = encode_connection_config(&config()).unwrap();
    let ConnectResponse::Connected(handle) = core.establish(&frame) else {
        panic!("Expected connection");
    };

    let calls: Vec<_> = (0..10)
        .map(|i| {
            let pending = resolver.register().unwrap();
            let value = i.to_string();
            let args = encode_args(&["counter", value.as_str()]).unwrap();
            core.submit(handle, pending.call_ref(), RequestType::SetString, &args)
                .unwrap();
            pending
        })
        .collect();

    drop(core);

    for pending in calls {
        assert_eq!(pending.wait(), CommandResult::value("OK"));
    }
}

// =============================================================================
// Connection Commands
// =============================================================================

#[test]
fn test_ping_and_echo() {
    let (core, resolver) = start(2);
    let client = connect(&core, &resolver);

    assert_eq!(client.ping().unwrap(), "PONG");
    assert_eq!(client.ping_message("hi").unwrap(), "hi");
    assert_eq!(client.echo("hello").unwrap(), "hello");
}

#[test]
fn test_client_name() {
    let (core, resolver) = start(1);
    let client = connect(&core, &resolver);

    assert_eq!(client.client_getname().unwrap(), "");
    assert_eq!(client.client_setname("worker-1").unwrap(), "OK");
    assert_eq!(client.client_getname().unwrap(), "worker-1");
}

#[test]
fn test_client_name_from_config() {
    let (core, resolver) = start(1);
    let mut config = config();
    config.client_name = Some("configured".to_string());

    let client = Client::connect_with_resolver(core, &config, resolver).unwrap();

    assert_eq!(client.client_getname().unwrap(), "configured");
}

#[test]
fn test_info_reports_sessions() {
    let (core, resolver) = start(1);
    let client = connect(&core, &resolver);
    let _other = connect(&core, &resolver);

    let info = client.info().unwrap();
    assert!(info.contains("relaykv_version:"));
    assert!(info.contains("connected_clients:2"));
}

#[test]
fn test_select_isolates_databases() {
    let (core, resolver) = start(1);
    let client = connect(&core, &resolver);

    client.set("shared", "db0").unwrap();
    assert_eq!(client.select(1).unwrap(), "OK");
    assert_eq!(client.get("shared"), Err(request_error("no such key")));
    client.set("shared", "db1").unwrap();
    client.select(0).unwrap();

    assert_eq!(client.get("shared").unwrap(), "db0");
}

#[test]
fn test_config_get_and_set() {
    let (core, resolver) = start(1);
    let client = connect(&core, &resolver);

    assert_eq!(client.config_set("maxmemory", "100mb").unwrap(), "OK");
    assert_eq!(
        client.config_get("maxmemory").unwrap(),
        vec![("maxmemory".to_string(), "100mb".to_string())]
    );
    assert!(client.config_get("unknown").unwrap().is_empty());
}

#[test]
fn test_custom_command() {
    let (core, resolver) = start(1);
    let client = connect(&core, &resolver);

    assert_eq!(client.custom_command(&["set", "k", "v"]).unwrap(), "OK");
    assert_eq!(client.custom_command(&["GET", "k"]).unwrap(), "v");
    assert_eq!(client.custom_command(&["CLIENT", "SETNAME", "raw"]).unwrap(), "OK");
    assert_eq!(client.client_getname().unwrap(), "raw");
    assert_eq!(
        client.custom_command(&["NOPE"]),
        Err(request_error("ERR unknown command 'NOPE'"))
    );
}

// =============================================================================
// Strings & Keys
// =============================================================================

#[test]
fn test_strings() {
    let (core, resolver) = start(2);
    let client = connect(&core, &resolver);

    assert_eq!(client.set("greeting", "hello").unwrap(), "OK");
    assert_eq!(client.append("greeting", " world").unwrap(), 11);
    assert_eq!(client.get("greeting").unwrap(), "hello world");
    assert_eq!(client.strlen("greeting").unwrap(), 11);
    assert_eq!(client.strlen("absent").unwrap(), 0);
}

#[test]
fn test_counters() {
    let (core, resolver) = start(1);
    let client = connect(&core, &resolver);

    assert_eq!(client.incr("n").unwrap(), 1);
    assert_eq!(client.incr_by("n", 9).unwrap(), 10);
    assert_eq!(client.decr("n").unwrap(), 9);
    assert_eq!(client.decr_by("n", 4).unwrap(), 5);
    assert_eq!(client.incr_by_float("f", 1.5).unwrap(), 1.5);

    client.set("text", "abc").unwrap();
    assert_eq!(
        client.incr("text"),
        Err(request_error("ERR value is not an integer or out of range"))
    );
}

#[test]
fn test_mset_mget_del_exists() {
    let (core, resolver) = start(1);
    let client = connect(&core, &resolver);

    client.mset(&[("a", "1"), ("b", "2")]).unwrap();
    assert_eq!(
        client.mget(&["a", "missing", "b"]).unwrap(),
        vec!["1".to_string(), String::new(), "2".to_string()]
    );
    assert_eq!(client.mget(&["missing"]).unwrap(), vec![String::new()]);
    assert_eq!(client.exists(&["a", "b", "c"]).unwrap(), 2);
    assert_eq!(client.del(&["a", "c"]).unwrap(), 1);
    assert_eq!(client.exists(&["a"]).unwrap(), 0);
}

#[test]
fn test_wrong_type() {
    let (core, resolver) = start(1);
    let client = connect(&core, &resolver);

    client.lpush("list", &["x"]).unwrap();
    match client.get("list") {
        Err(RelayError::Request(msg)) => assert!(msg.starts_with("WRONGTYPE")),
        other => panic!("Expected WRONGTYPE, got {:?}", other),
    }
}

#[test]
fn test_wrong_arity() {
    let (core, resolver) = start(1);
    let client = connect(&core, &resolver);

    assert_eq!(
        client.execute(RequestType::GetString, &[]),
        Err(request_error("ERR wrong number of arguments for 'get' command"))
    );
}

// =============================================================================
// Expiry
// =============================================================================

#[test]
fn test_expire_and_ttl() {
    let (core, resolver) = start(1);
    let client = connect(&core, &resolver);

    client.set("session", "data").unwrap();
    assert_eq!(client.ttl("session").unwrap(), -1);
    assert_eq!(client.ttl("absent").unwrap(), -2);

    assert!(client.expire("session", 100).unwrap());
    let ttl = client.ttl("session").unwrap();
    assert!((99..=100).contains(&ttl));

    assert!(client.persist("session").unwrap());
    assert_eq!(client.ttl("session").unwrap(), -1);
    assert!(!client.expire("absent", 10).unwrap());
}

#[test]
fn test_expired_keys_disappear() {
    let (core, resolver) = start(1);
    let client = connect(&core, &resolver);

    client
        .execute(RequestType::SetString, &["short", "lived", "PX", "20"])
        .unwrap();
    thread::sleep(Duration::from_millis(60));

    assert_eq!(client.get("short"), Err(request_error("no such key")));
    assert_eq!(client.exists(&["short"]).unwrap(), 0);
}

#[test]
fn test_expire_beyond_clock_range() {
    let (core, resolver) = start(1);
    let config = ConnectionConfig::builder()
        .address("localhost", 6379)
        .tls_mode(TlsMode::None)
        .cluster_mode(false)
        .read_from(ReadFrom::Primary)
        .request_timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    let client = Client::connect_with_resolver(core.clone(), &config, Arc::clone(&resolver)).unwrap();

    let far = i64::MAX.to_string();
    client.set("k", "v").unwrap();
    assert_eq!(
        client.expire("k", i64::MAX),
        Err(request_error("ERR invalid expire time in 'expire' command"))
    );
    assert_eq!(
        client.execute(RequestType::PExpire, &["k", far.as_str()]),
        Err(request_error("ERR invalid expire time in 'pexpire' command"))
    );
    assert_eq!(
        client.execute(RequestType::SetString, &["a", "b", "EX", far.as_str()]),
        Err(request_error("ERR invalid expire time in 'set' command"))
    );

    // The single worker is still serving and the key kept no deadline.
    assert_eq!(client.ttl("k").unwrap(), -1);
    assert_eq!(client.get("a"), Err(request_error("no such key")));
    assert_eq!(resolver.outstanding(), 0);
}

// =============================================================================
// Collections
// =============================================================================

#[test]
fn test_hashes() {
    let (core, resolver) = start(1);
    let client = connect(&core, &resolver);

    assert_eq!(client.hset("user", &[("name", "ada"), ("lang", "rust")]).unwrap(), 2);
    assert_eq!(client.hget("user", "name").unwrap(), "ada");
    assert_eq!(client.hget("user", "age"), Err(request_error("no such field")));
    assert_eq!(client.hlen("user").unwrap(), 2);
    assert!(client.hexists("user", "lang").unwrap());
    assert_eq!(
        client.hgetall("user").unwrap(),
        vec![
            ("lang".to_string(), "rust".to_string()),
            ("name".to_string(), "ada".to_string()),
        ]
    );
    assert_eq!(client.hdel("user", &["lang", "nope"]).unwrap(), 1);
    assert!(client.hgetall("absent").unwrap().is_empty());
}

#[test]
fn test_lists() {
    let (core, resolver) = start(1);
    let client = connect(&core, &resolver);

    assert_eq!(client.rpush("q", &["b", "c"]).unwrap(), 2);
    assert_eq!(client.lpush("q", &["a"]).unwrap(), 3);
    assert_eq!(client.lrange("q", 0, -1).unwrap(), vec!["a", "b", "c"]);
    assert_eq!(client.lindex("q", -1).unwrap(), "c");
    assert_eq!(client.lindex("q", 10), Err(request_error("index out of range")));
    assert_eq!(client.ltrim("q", 1, -1).unwrap(), "OK");
    assert_eq!(client.llen("q").unwrap(), 2);
    assert_eq!(client.lpop("q").unwrap(), "b");
    assert_eq!(client.rpop("q").unwrap(), "c");
    assert_eq!(client.lpop("q"), Err(request_error("no such key")));
    assert_eq!(client.exists(&["q"]).unwrap(), 0);
}

#[test]
fn test_sets() {
    let (core, resolver) = start(1);
    let client = connect(&core, &resolver);

    assert_eq!(client.sadd("tags", &["b", "a", "b"]).unwrap(), 2);
    assert_eq!(client.scard("tags").unwrap(), 2);
    assert!(client.sismember("tags", "a").unwrap());
    assert!(!client.sismember("tags", "z").unwrap());
    assert_eq!(client.smembers("tags").unwrap(), vec!["a", "b"]);
    assert_eq!(client.srem("tags", &["a"]).unwrap(), 1);
    assert!(client.smembers("absent").unwrap().is_empty());
}

#[test]
fn test_sorted_sets() {
    let (core, resolver) = start(1);
    let client = connect(&core, &resolver);

    assert_eq!(
        client
            .zadd("board", &[(10.0, "carol"), (5.0, "alice"), (7.5, "bob")])
            .unwrap(),
        3
    );
    assert_eq!(client.zcard("board").unwrap(), 3);
    assert_eq!(client.zscore("board", "bob").unwrap(), 7.5);
    assert_eq!(client.zrank("board", "alice").unwrap(), 0);
    assert_eq!(client.zincr_by("board", 10.0, "alice").unwrap(), 15.0);
    assert_eq!(client.zrank("board", "alice").unwrap(), 2);
    assert_eq!(client.zrem("board", &["carol"]).unwrap(), 1);
    assert_eq!(
        client.zscore("board", "carol"),
        Err(request_error("no such member"))
    );
}

#[test]
fn test_streams() {
    let (core, resolver) = start(1);
    let client = connect(&core, &resolver);

    let first = client.xadd("events", &[("kind", "login")]).unwrap();
    let second = client.xadd("events", &[("kind", "logout")]).unwrap();
    assert!(first.contains('-'));
    assert_ne!(first, second);

    assert_eq!(client.xgroup_create("events", "readers", "$").unwrap(), "OK");
    match client.xgroup_create("events", "readers", "$") {
        Err(RelayError::Request(msg)) => assert!(msg.starts_with("BUSYGROUP")),
        other => panic!("Expected BUSYGROUP, got {:?}", other),
    }
    assert!(client.xgroup_destroy("events", "readers").unwrap());
    assert!(!client.xgroup_destroy("events", "readers").unwrap());

    assert_eq!(client.xtrim("events", 1).unwrap(), 1);
    assert_eq!(client.xtrim("events", 1).unwrap(), 0);
}

#[test]
fn test_stream_ids_at_upper_bound() {
    let (core, resolver) = start(1);
    let client = connect(&core, &resolver);
    let max = u64::MAX;

    let near_end = format!("{}-{}", max - 1, max);
    assert_eq!(
        client.execute(RequestType::XAdd, &["s", near_end.as_str(), "f", "v"]).unwrap(),
        near_end
    );
    assert_eq!(client.xadd("s", &[("f", "v")]).unwrap(), format!("{}-0", max));

    let last = format!("{}-{}", max, max);
    client.execute(RequestType::XAdd, &["s", last.as_str(), "f", "v"]).unwrap();
    assert_eq!(
        client.xadd("s", &[("f", "v")]),
        Err(request_error(
            "ERR The stream has exhausted the last possible ID, unable to add more items"
        ))
    );
    assert_eq!(client.ping().unwrap(), "PONG");
}

#[test]
fn test_unsupported_command() {
    let (core, resolver) = start(1);
    let client = connect(&core, &resolver);

    match client.execute(RequestType::GeoAdd, &["geo", "0", "0", "here"]) {
        Err(RelayError::Request(msg)) => assert!(msg.contains("unsupported")),
        other => panic!("Expected unsupported error, got {:?}", other),
    }
}
