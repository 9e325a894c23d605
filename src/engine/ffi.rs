//! FFI adapter
//!
//! Drives a native execution core through its C ABI. The engine's entry
//! points are supplied at runtime as an [`EngineApi`] table; its completions
//! come back through [`relaykv_success_callback`] and
//! [`relaykv_failure_callback`], which feed the process-wide resolver.
//!
//! ## Ownership
//! - Config bytes and argument buffers belong to the client and are only
//!   borrowed for the duration of the call they are passed to
//! - The connection response belongs to the engine and is handed back
//!   through `free_connection_response` once decoded
//! - Callback arguments are borrowed for the duration of the callback; the
//!   engine frees them after it returns

use std::ffi::{c_void, CStr};
use std::os::raw::c_char;
use std::sync::Arc;

use crate::dispatch::{self, CallRef, Resolver};
use crate::error::Result;
use crate::protocol::{ConnectResponse, EncodedArgs, ErrorKind, RequestType};

use super::{ClientHandle, ExecutionCore};

/// Called by the engine when a command succeeds; a null message is an empty value
pub type SuccessCallback = unsafe extern "C" fn(call_ref: u64, message: *const c_char);

/// Called by the engine when a command fails
pub type FailureCallback = unsafe extern "C" fn(call_ref: u64, error: *const RawError);

pub type CreateClientFn = unsafe extern "C" fn(
    config: *const u8,
    config_len: usize,
    success_callback: SuccessCallback,
    failure_callback: FailureCallback,
) -> *const RawConnectionResponse;

pub type CommandFn = unsafe extern "C" fn(
    client: *const c_void,
    call_ref: u64,
    request_type: u32,
    arg_count: usize,
    args: *const *const c_char,
);

pub type CloseClientFn = unsafe extern "C" fn(client: *const c_void);

pub type FreeConnectionResponseFn = unsafe extern "C" fn(response: *const RawConnectionResponse);

/// Error as reported across the C ABI
#[repr(C)]
#[derive(Debug)]
pub struct RawError {
    pub message: *const c_char,
    /// An [`ErrorKind`] tag
    pub error_type: u32,
}

/// Connection response: exactly one of the two pointers is non-null
#[repr(C)]
#[derive(Debug)]
pub struct RawConnectionResponse {
    pub conn_ptr: *const c_void,
    pub error: *const RawError,
}

/// Entry points of a native engine
#[derive(Debug, Clone, Copy)]
pub struct EngineApi {
    pub create_client: CreateClientFn,
    pub command: CommandFn,
    pub close_client: CloseClientFn,
    pub free_connection_response: FreeConnectionResponseFn,
}

/// Execution core backed by a native engine
///
/// Completions always go to [`dispatch::global`], so clients on this core
/// must use the global resolver.
pub struct FfiCore {
    api: EngineApi,
}

impl FfiCore {
    /// Wrap a native engine
    ///
    /// # Safety
    ///
    /// * Every function in `api` must be callable from any thread with the
    ///   arguments documented on its type.
    /// * `create_client` must return null or a pointer that stays valid until
    ///   it is passed to `free_connection_response`.
    /// * `command` must copy the arguments before returning and invoke exactly
    ///   one of the callbacks later with the same `call_ref`.
    /// * `close_client` must accept every `conn_ptr` the engine handed out.
    pub unsafe fn new(api: EngineApi) -> Self {
        Self { api }
    }
}

impl ExecutionCore for FfiCore {
    fn establish(&self, config: &[u8]) -> ConnectResponse {
        // SAFETY: `config` is valid for `config.len()` bytes for the whole call;
        // the callbacks match the declared signatures.
        let raw = unsafe {
            (self.api.create_client)(
                config.as_ptr(),
                config.len(),
                relaykv_success_callback,
                relaykv_failure_callback,
            )
        };

        let _guard = ResponseGuard {
            response: raw,
            free: self.api.free_connection_response,
        };

        // SAFETY: per the contract of `FfiCore::new`, `raw` is null or valid
        // until the guard frees it.
        unsafe { decode_connect_response(raw) }
    }

    fn submit(
        &self,
        handle: ClientHandle,
        call_ref: CallRef,
        request: RequestType,
        args: &EncodedArgs,
    ) -> Result<()> {
        // SAFETY: the handle came from this engine; `args` outlives the call and
        // its pointer array is non-null with `argc` valid entries.
        unsafe {
            (self.api.command)(
                handle.as_raw() as *const c_void,
                call_ref.as_raw(),
                request.tag(),
                args.argc(),
                args.as_ptr(),
            );
        }
        Ok(())
    }

    fn release(&self, handle: ClientHandle) {
        tracing::debug!(handle = handle.as_raw(), "closing native client");
        // SAFETY: the handle came from this engine and is released only once.
        unsafe { (self.api.close_client)(handle.as_raw() as *const c_void) }
    }

    /// The C callbacks carry no context, so completions always land on the
    /// process-wide resolver.
    fn completion_resolver(&self) -> Option<&Arc<Resolver>> {
        Some(dispatch::global())
    }
}

/// Returns the connection response to the engine on every path
struct ResponseGuard {
    response: *const RawConnectionResponse,
    free: FreeConnectionResponseFn,
}

impl Drop for ResponseGuard {
    fn drop(&mut self) {
        if !self.response.is_null() {
            // SAFETY: the pointer came from `create_client` and is freed once.
            unsafe { (self.free)(self.response) }
        }
    }
}

/// Decode the engine's connection response
///
/// # Safety
///
/// `response` must be null or point to a valid `RawConnectionResponse` whose
/// `error`, when non-null, points to a valid `RawError` with a null or
/// NUL-terminated message.
pub unsafe fn decode_connect_response(response: *const RawConnectionResponse) -> ConnectResponse {
    if response.is_null() {
        return ConnectResponse::failed("engine returned no connection response");
    }

    // SAFETY: non-null and valid per the function contract.
    let response = unsafe { &*response };

    match (response.conn_ptr.is_null(), response.error.is_null()) {
        (false, true) => ConnectResponse::Connected(ClientHandle::from_raw(response.conn_ptr as usize)),
        (true, false) => {
            // SAFETY: non-null and valid per the function contract.
            let (kind, message) = unsafe { decode_error(response.error) };
            ConnectResponse::Failed { kind, message }
        }
        (true, true) => ConnectResponse::failed("engine returned neither a client nor an error"),
        (false, false) => ConnectResponse::failed("engine returned both a client and an error"),
    }
}

/// # Safety
///
/// `error` must point to a valid `RawError`.
unsafe fn decode_error(error: *const RawError) -> (ErrorKind, String) {
    // SAFETY: valid per the function contract.
    let error = unsafe { &*error };
    let kind = ErrorKind::from_tag(error.error_type).unwrap_or_else(|| {
        tracing::warn!(tag = error.error_type, "unknown error kind from engine");
        ErrorKind::Request
    });
    // SAFETY: the message is null or NUL-terminated per the function contract.
    let message = unsafe { message_from_ptr(error.message) };
    (kind, message)
}

/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string.
unsafe fn message_from_ptr(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: non-null and NUL-terminated per the function contract.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

// =============================================================================
// Callback Entry Points
// =============================================================================

/// Success entry point handed to the engine
///
/// # Safety
///
/// `message` must be null or point to a NUL-terminated string that stays
/// valid until this function returns.
#[no_mangle]
pub unsafe extern "C" fn relaykv_success_callback(call_ref: u64, message: *const c_char) {
    // SAFETY: forwarded from this function's contract.
    let message = unsafe { message_from_ptr(message) };
    // Stale references are already logged by the resolver.
    let _ = dispatch::on_success(CallRef::from_raw(call_ref), message);
}

/// Failure entry point handed to the engine
///
/// # Safety
///
/// `error` must be null or point to a `RawError` (with a null or
/// NUL-terminated message) that stays valid until this function returns.
#[no_mangle]
pub unsafe extern "C" fn relaykv_failure_callback(call_ref: u64, error: *const RawError) {
    let call_ref = CallRef::from_raw(call_ref);
    let (kind, message) = if error.is_null() {
        (ErrorKind::Request, "engine reported a failure without details".to_string())
    } else {
        // SAFETY: non-null and valid per this function's contract.
        unsafe { decode_error(error) }
    };
    let _ = dispatch::on_error(call_ref, kind, message);
}
