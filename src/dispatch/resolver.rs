//! Callback resolver
//!
//! Entry points the execution core calls when an operation finishes. Each
//! call reference resolves to exactly one waiting caller; the resolver makes
//! no assumption about completion order across calls.
//!
//! A single process-wide resolver backs the free functions in this module
//! and the FFI callbacks. Standalone resolvers can be created for engines
//! that are wired up explicitly.

use std::sync::{Arc, OnceLock};

use crate::error::Result;
use crate::protocol::{CommandResult, ErrorKind};

use super::registry::{CallRef, CallRegistry, PendingCall};

/// Resolves completed calls back to their waiting callers
pub struct Resolver {
    registry: CallRegistry,
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            registry: CallRegistry::new(),
        }
    }

    /// Register a new pending call
    pub fn register(&self) -> Result<PendingCall> {
        self.registry.register()
    }

    /// Abandon a pending call; any later completion for it is rejected
    pub fn cancel(&self, call_ref: CallRef) -> bool {
        self.registry.cancel(call_ref)
    }

    /// Successful completion with the reply text
    pub fn on_success(&self, call_ref: CallRef, message: impl Into<String>) -> Result<()> {
        self.resolve(call_ref, CommandResult::Value(message.into()))
    }

    /// Failed completion; the engine gave no finer category
    pub fn on_failure(&self, call_ref: CallRef, message: impl Into<String>) -> Result<()> {
        self.on_error(call_ref, ErrorKind::Request, message)
    }

    /// Failed completion with an explicit category
    pub fn on_error(
        &self,
        call_ref: CallRef,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Result<()> {
        self.resolve(call_ref, CommandResult::error(kind, message))
    }

    /// Deliver a result to the caller waiting on `call_ref`
    pub fn resolve(&self, call_ref: CallRef, result: CommandResult) -> Result<()> {
        tracing::trace!(%call_ref, ok = result.is_value(), "resolving call");
        self.registry.complete(call_ref, result).map_err(|err| {
            tracing::warn!(%call_ref, "discarding completion: {}", err);
            err
        })
    }

    /// Fail every outstanding call with a closing error
    ///
    /// Returns the number of callers released.
    pub fn shutdown(&self, reason: &str) -> usize {
        let pending = self.registry.drain();
        let count = pending.len();
        for (call_ref, sender) in pending {
            if sender
                .send(CommandResult::error(ErrorKind::Closing, reason))
                .is_err()
            {
                tracing::debug!(%call_ref, "caller gone during shutdown");
            }
        }
        if count > 0 {
            tracing::debug!(count, reason, "resolver shut down with outstanding calls");
        }
        count
    }

    /// Number of calls waiting for a result
    pub fn outstanding(&self) -> usize {
        self.registry.outstanding()
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Process-Wide Resolver
// =============================================================================

/// The process-wide resolver, created on first use
pub fn global() -> &'static Arc<Resolver> {
    static INSTANCE: OnceLock<Arc<Resolver>> = OnceLock::new();
    INSTANCE.get_or_init(|| Arc::new(Resolver::new()))
}

pub fn on_success(call_ref: CallRef, message: impl Into<String>) -> Result<()> {
    global().on_success(call_ref, message)
}

pub fn on_failure(call_ref: CallRef, message: impl Into<String>) -> Result<()> {
    global().on_failure(call_ref, message)
}

pub fn on_error(call_ref: CallRef, kind: ErrorKind, message: impl Into<String>) -> Result<()> {
    global().on_error(call_ref, kind, message)
}
