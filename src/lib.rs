//! # RelayKV
//!
//! A synchronous key-value store client layered over an asynchronous
//! execution core:
//! - Typed command surface over a closed request catalog
//! - Callback-based response correlation with generation-checked call references
//! - Checksummed binary connection config frames
//! - Pluggable execution cores: a native engine over the C ABI, or the
//!   in-process local engine
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Client                               │
//! │             (typed commands, closing latch)                  │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    Dispatcher                                │
//! │          (encode args, register, submit, wait)               │
//! └──────────┬──────────────────────────────────▲───────────────┘
//!            │ submit(handle, CallRef, tag,     │ on_success /
//!            │        args)                     │ on_failure
//!            ▼                                  │
//!   ┌─────────────────┐                 ┌───────┴───────┐
//!   │ ExecutionCore   │ ──────────────▶ │   Resolver    │
//!   │ (ffi / local)   │   completions   │ (call arena)  │
//!   └─────────────────┘                 └───────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod dispatch;
pub mod engine;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{RelayError, Result};
pub use config::ConnectionConfig;
pub use client::Client;
pub use protocol::{CommandResult, ErrorKind, RequestType};
pub use engine::{ClientHandle, ExecutionCore, LocalCore};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of RelayKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
