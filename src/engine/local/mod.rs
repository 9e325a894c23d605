//! Local engine
//!
//! An in-process execution core that runs commands against an in-memory
//! keyspace on its own worker threads and reports completions through a
//! resolver, exactly like a native engine would.
//!
//! ## Threading
//! - `submit` copies the arguments into a job and enqueues it (never blocks
//!   on command execution)
//! - `workers` threads drain the queue and invoke the resolver
//! - Dropping the core closes the queue and joins the workers after the
//!   queued jobs have completed
//!
//! Supports the connection, string, expiry, hash, list, set, sorted-set and
//! basic stream commands. Anything else completes with a request error.

mod store;

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::RwLock;

use crate::dispatch::{self, CallRef, Resolver};
use crate::error::{RelayError, Result};
use crate::protocol::{
    decode_connection_config, CommandError, ConnectResponse, EncodedArgs, ErrorKind, RequestType,
};

use super::{ClientHandle, ExecutionCore};

use store::{request_error, wrong_arity, Reply};

pub use store::{Store, NO_SUCH_KEY};

/// Configuration for a local engine
#[derive(Debug, Clone)]
pub struct LocalCoreConfig {
    /// Number of worker threads executing commands
    pub workers: usize,

    /// Name prefix for worker threads
    pub thread_name: String,

    /// When set, every connection attempt fails with this message
    pub refuse_connections: Option<String>,
}

impl Default for LocalCoreConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            thread_name: "relaykv-local".to_string(),
            refuse_connections: None,
        }
    }
}

impl LocalCoreConfig {
    pub fn builder() -> LocalCoreConfigBuilder {
        LocalCoreConfigBuilder::default()
    }
}

/// Builder for LocalCoreConfig
#[derive(Default)]
pub struct LocalCoreConfigBuilder {
    config: LocalCoreConfig,
}

impl LocalCoreConfigBuilder {
    /// Set the worker thread count (at least one)
    pub fn workers(mut self, count: usize) -> Self {
        self.config.workers = count.max(1);
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// Make every `establish` fail with `message`
    pub fn refuse_connections(mut self, message: impl Into<String>) -> Self {
        self.config.refuse_connections = Some(message.into());
        self
    }

    pub fn build(self) -> LocalCoreConfig {
        self.config
    }
}

/// Per-handle session state
#[derive(Debug)]
struct Session {
    id: usize,
    database: u32,
    name: Option<String>,
}

/// A queued command
struct Job {
    handle: ClientHandle,
    call_ref: CallRef,
    request: RequestType,
    args: Vec<String>,
}

/// State shared between the core and its workers
struct Shared {
    store: Store,
    sessions: RwLock<HashMap<ClientHandle, Session>>,
    resolver: Arc<Resolver>,
}

/// In-process execution core
pub struct LocalCore {
    shared: Arc<Shared>,
    jobs: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    next_handle: AtomicUsize,
    refuse_connections: Option<String>,
}

impl LocalCore {
    /// Start a local engine with default settings, completing through the
    /// process-wide resolver
    pub fn new() -> Result<Self> {
        Self::with_config(LocalCoreConfig::default())
    }

    pub fn with_config(config: LocalCoreConfig) -> Result<Self> {
        Self::with_resolver(config, Arc::clone(dispatch::global()))
    }

    /// Start a local engine that completes through `resolver`
    pub fn with_resolver(config: LocalCoreConfig, resolver: Arc<Resolver>) -> Result<Self> {
        let shared = Arc::new(Shared {
            store: Store::new(),
            sessions: RwLock::new(HashMap::new()),
            resolver,
        });
        let (sender, receiver) = channel::unbounded();

        let worker_count = config.workers.max(1);
        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let shared = Arc::clone(&shared);
            let receiver = receiver.clone();
            let worker = thread::Builder::new()
                .name(format!("{}-{}", config.thread_name, index))
                .spawn(move || run_worker(shared, receiver))
                .map_err(|err| RelayError::Engine(format!("failed to spawn worker: {}", err)))?;
            workers.push(worker);
        }

        tracing::debug!(workers = worker_count, "local engine started");

        Ok(Self {
            shared,
            jobs: Some(sender),
            workers,
            next_handle: AtomicUsize::new(1),
            refuse_connections: config.refuse_connections,
        })
    }

    /// Number of sessions not yet released
    pub fn session_count(&self) -> usize {
        self.shared.sessions.read().len()
    }
}

impl ExecutionCore for LocalCore {
    fn establish(&self, config: &[u8]) -> ConnectResponse {
        let config = match decode_connection_config(config) {
            Ok(config) => config,
            Err(err) => return ConnectResponse::failed(err.to_string()),
        };

        if let Some(message) = &self.refuse_connections {
            return ConnectResponse::failed(message.clone());
        }

        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let handle = ClientHandle::from_raw(id);
        self.shared.sessions.write().insert(
            handle,
            Session {
                id,
                database: config.database_id,
                name: config.client_name,
            },
        );

        tracing::debug!(handle = id, seeds = config.addresses.len(), "local session established");
        ConnectResponse::Connected(handle)
    }

    fn submit(
        &self,
        handle: ClientHandle,
        call_ref: CallRef,
        request: RequestType,
        args: &EncodedArgs,
    ) -> Result<()> {
        if !self.shared.sessions.read().contains_key(&handle) {
            return Err(RelayError::Closing(format!(
                "unknown client handle {}",
                handle.as_raw()
            )));
        }

        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| RelayError::Closing("local engine stopped".to_string()))?;

        jobs.send(Job {
            handle,
            call_ref,
            request,
            args: args.to_strings(),
        })
        .map_err(|_| RelayError::Closing("local engine stopped".to_string()))
    }

    fn release(&self, handle: ClientHandle) {
        if self.shared.sessions.write().remove(&handle).is_some() {
            tracing::debug!(handle = handle.as_raw(), "local session released");
        } else {
            tracing::warn!(handle = handle.as_raw(), "release of unknown client handle");
        }
    }

    fn completion_resolver(&self) -> Option<&Arc<Resolver>> {
        Some(&self.shared.resolver)
    }
}

impl Drop for LocalCore {
    fn drop(&mut self) {
        // Closing the queue lets workers finish what is queued, then exit.
        self.jobs.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::warn!("local engine worker panicked");
            }
        }
    }
}

fn run_worker(shared: Arc<Shared>, jobs: Receiver<Job>) {
    for job in jobs.iter() {
        // A panicking command still resolves its caller and leaves the worker running.
        let reply = panic::catch_unwind(AssertUnwindSafe(|| {
            shared.execute(job.handle, job.request, &job.args)
        }))
        .unwrap_or_else(|_| {
            tracing::error!(call_ref = %job.call_ref, request = %job.request, "command panicked");
            Err(request_error(format!("ERR internal error executing '{}'", job.request)))
        });
        let delivered = match reply {
            Ok(text) => shared.resolver.on_success(job.call_ref, text),
            Err(err) => shared.resolver.on_error(job.call_ref, err.kind, err.message),
        };
        if delivered.is_err() {
            tracing::trace!(call_ref = %job.call_ref, "completion had no waiting caller");
        }
    }
}

impl Shared {
    fn execute(&self, handle: ClientHandle, request: RequestType, args: &[String]) -> Reply {
        use RequestType::*;

        match request {
            CustomCommand => {
                let tokens: Vec<&str> = args.iter().map(String::as_str).collect();
                match RequestType::parse_command(&tokens) {
                    Some((inner, consumed)) => self.execute(handle, inner, &args[consumed..]),
                    None => Err(request_error(match args.first() {
                        Some(name) => format!("ERR unknown command '{}'", name),
                        None => "ERR empty command".to_string(),
                    })),
                }
            }
            Select => {
                let [index] = args else { return Err(wrong_arity(request)) };
                let database: u32 = index
                    .parse()
                    .map_err(|_| request_error("ERR DB index is out of range"))?;
                self.with_session(handle, |session| {
                    session.database = database;
                    "OK".to_string()
                })
            }
            ClientId => {
                if !args.is_empty() {
                    return Err(wrong_arity(request));
                }
                self.with_session(handle, |session| session.id.to_string())
            }
            ClientGetName => {
                if !args.is_empty() {
                    return Err(wrong_arity(request));
                }
                self.with_session(handle, |session| session.name.clone().unwrap_or_default())
            }
            ClientSetName => {
                let [name] = args else { return Err(wrong_arity(request)) };
                if name.contains(' ') {
                    return Err(request_error("ERR Client names cannot contain spaces"));
                }
                self.with_session(handle, |session| {
                    session.name = (!name.is_empty()).then(|| name.clone());
                    "OK".to_string()
                })
            }
            Info => Ok(format!(
                "# Server\r\nrelaykv_version:{}\r\nengine:local\r\n# Clients\r\nconnected_clients:{}\r\n",
                crate::VERSION,
                self.sessions.read().len()
            )),
            _ => {
                let database = self.with_session(handle, |session| session.database)?;
                self.store.execute(database, request, args)
            }
        }
    }

    fn with_session<T>(
        &self,
        handle: ClientHandle,
        f: impl FnOnce(&mut Session) -> T,
    ) -> std::result::Result<T, CommandError> {
        let mut sessions = self.sessions.write();
        let session = sessions.get_mut(&handle).ok_or_else(|| {
            CommandError::new(ErrorKind::Closing, "client handle was released")
        })?;
        Ok(f(session))
    }
}
