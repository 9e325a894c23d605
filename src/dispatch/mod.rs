//! Dispatch Module
//!
//! Turns the engine's asynchronous completions into blocking calls.
//!
//! ## Flow
//! ```text
//!  caller thread                          engine thread
//!  ─────────────                          ─────────────
//!  register() ─▶ CallRef
//!  submit(handle, CallRef, tag, args) ──▶ schedule
//!  wait on one-shot channel                  │
//!        ▲                                   ▼
//!        └──────── Resolver::on_success / on_failure(CallRef)
//! ```
//!
//! ## Guarantees
//! - Each `CallRef` is resolved at most once; stale references are rejected
//! - Completions may arrive in any order across calls
//! - No locks are held while blocking or sending

mod dispatcher;
mod registry;
pub mod resolver;

pub use dispatcher::Dispatcher;
pub use registry::{CallRef, CallRegistry, PendingCall};
pub use resolver::{global, on_error, on_failure, on_success, Resolver};
