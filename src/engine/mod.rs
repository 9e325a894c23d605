//! Engine Module
//!
//! The boundary to the execution core that performs the actual store I/O.
//!
//! ## Contract
//! - `establish` blocks until the session is up or has failed
//! - `submit` returns as soon as the engine has copied the arguments; the
//!   engine later invokes exactly one resolver entry point with the same
//!   `CallRef`, from a thread of its choosing. If `submit` returns an error,
//!   no callback follows.
//! - `release` frees everything tied to the handle
//!
//! Implementations must tolerate concurrent `submit` calls on one handle.

pub mod ffi;
pub mod local;

use std::sync::Arc;

use crate::dispatch::{CallRef, Resolver};
use crate::error::Result;
use crate::protocol::{ConnectResponse, EncodedArgs, RequestType};

pub use ffi::{EngineApi, FfiCore};
pub use local::{LocalCore, LocalCoreConfig};

/// Opaque session token issued by the engine
///
/// The client never looks inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientHandle(usize);

impl ClientHandle {
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> usize {
        self.0
    }
}

/// The narrow synchronous interface of an execution core
pub trait ExecutionCore: Send + Sync {
    /// Establish a session from an encoded connection config
    fn establish(&self, config: &[u8]) -> ConnectResponse;

    /// Schedule a command; completion arrives through the resolver
    fn submit(
        &self,
        handle: ClientHandle,
        call_ref: CallRef,
        request: RequestType,
        args: &EncodedArgs,
    ) -> Result<()>;

    /// Tear down a session
    fn release(&self, handle: ClientHandle);

    /// The resolver this core delivers completions to, when it is fixed
    ///
    /// Clients refuse to connect through a core that completes elsewhere.
    fn completion_resolver(&self) -> Option<&Arc<Resolver>> {
        None
    }
}
