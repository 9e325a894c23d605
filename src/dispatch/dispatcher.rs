//! Command dispatcher
//!
//! Runs one command end to end: register, encode, submit, wait.

use std::time::Duration;

use crate::engine::{ClientHandle, ExecutionCore};
use crate::error::Result;
use crate::protocol::{encode_args, CommandResult, ErrorKind, RequestType};

use super::resolver::Resolver;

/// Issues commands for one client handle and blocks for their results
///
/// Cheap to construct; borrows the engine and resolver for its lifetime.
pub struct Dispatcher<'a> {
    core: &'a dyn ExecutionCore,
    resolver: &'a Resolver,
    handle: ClientHandle,
}

impl<'a> Dispatcher<'a> {
    pub fn new(core: &'a dyn ExecutionCore, resolver: &'a Resolver, handle: ClientHandle) -> Self {
        Self {
            core,
            resolver,
            handle,
        }
    }

    /// Execute a command and block until the engine resolves it
    ///
    /// `Err` means the command never reached the engine: its arguments
    /// could not be encoded, no call slot was available, or submission was
    /// rejected. Everything the engine reports arrives as the `CommandResult`.
    pub fn dispatch(&self, request: RequestType, args: &[&str]) -> Result<CommandResult> {
        self.run(request, args, None)
    }

    /// Execute a command, waiting at most `timeout` for the result
    ///
    /// On expiry the call is cancelled and a timeout error returned; the
    /// engine's eventual completion for it is discarded.
    pub fn dispatch_with_timeout(
        &self,
        request: RequestType,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandResult> {
        self.run(request, args, Some(timeout))
    }

    fn run(
        &self,
        request: RequestType,
        args: &[&str],
        timeout: Option<Duration>,
    ) -> Result<CommandResult> {
        let encoded = encode_args(args)?;
        let pending = self.resolver.register()?;
        let call_ref = pending.call_ref();

        tracing::trace!(%call_ref, %request, argc = encoded.argc(), "submitting command");

        if let Err(err) = self.core.submit(self.handle, call_ref, request, &encoded) {
            self.resolver.cancel(call_ref);
            tracing::warn!(%call_ref, %request, "engine rejected submission: {}", err);
            return Err(err);
        }

        // The engine has copied the arguments by the time submit returns.
        drop(encoded);

        let Some(timeout) = timeout else {
            return Ok(pending.wait());
        };

        if let Some(result) = pending.wait_timeout(timeout) {
            return Ok(result);
        }

        if self.resolver.cancel(call_ref) {
            tracing::debug!(%call_ref, %request, ?timeout, "command timed out");
            Ok(CommandResult::error(
                ErrorKind::Timeout,
                format!("{} did not complete within {:?}", request, timeout),
            ))
        } else {
            // Completed between the timeout and the cancel; the result is already queued.
            Ok(pending.wait())
        }
    }
}
