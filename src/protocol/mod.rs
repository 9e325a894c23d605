//! Protocol Module
//!
//! The wire codec between the client and the execution core.
//!
//! ## Boundary Format
//!
//! ### Session Establishment
//! The connection config travels as a checksummed, length-prefixed frame
//! (see [`encode_connection_config`]). The engine answers with either a client handle or an
//! error message.
//!
//! ### Commands
//! ```text
//! submit(handle, call_ref, request_tag, argc, argv)
//! ```
//! - `request_tag`: a [`RequestType`] discriminant
//! - `argv`: `argc` NUL-terminated strings
//!
//! ### Results
//! Delivered as plain text through the success callback, or as
//! `{kind, message}` through the failure callback.
//!
//! ### Error Kinds
//! - 0: CLOSING
//! - 1: REQUEST
//! - 2: TIMEOUT
//! - 3: EXEC_ABORT
//! - 4: CONNECTION

mod codec;
mod request_type;
mod response;

pub use codec::{
    decode_connection_config, encode_args, encode_connection_config, EncodedArgs,
    FRAME_HEADER_SIZE, FRAME_VERSION, MAX_CONFIG_SIZE,
};
pub use request_type::RequestType;
pub use response::{
    parse_bool_reply, parse_float_reply, parse_integer_reply, parse_list_reply, CommandError,
    CommandResult, ConnectResponse, ErrorKind,
};
