//! Wire codec
//!
//! Encoding for everything that crosses the execution core boundary.
//!
//! ## Connection Config Frame
//! ```text
//! ┌────────────┬──────────┬──────────┬─────────────────────────────┐
//! │ Version(1) │ Len (4)  │ CRC (4)  │   Payload (bincode config)  │
//! └────────────┴──────────┴──────────┴─────────────────────────────┘
//! ```
//! Length and CRC are big-endian; the CRC covers the payload only.
//!
//! ## Command Arguments
//! `argc` plus a pointer to `argc` NUL-terminated strings. The buffers belong
//! to the caller and stay alive until `submit` returns.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use bytes::{Buf, BufMut, BytesMut};

use crate::config::ConnectionConfig;
use crate::error::{RelayError, Result};

/// Current config frame version
pub const FRAME_VERSION: u8 = 1;

/// Header size: 1 byte version + 4 bytes length + 4 bytes CRC
pub const FRAME_HEADER_SIZE: usize = 9;

/// Maximum encoded config payload (1 MB)
pub const MAX_CONFIG_SIZE: u32 = 1024 * 1024;

// =============================================================================
// Connection Config Encoding/Decoding
// =============================================================================

/// Encode a connection config into a checksummed frame
///
/// Invalid configs are rejected here, before the engine is contacted.
pub fn encode_connection_config(config: &ConnectionConfig) -> Result<Vec<u8>> {
    config
        .validate()
        .map_err(|err| RelayError::Encoding(err.to_string()))?;

    let payload =
        bincode::serialize(config).map_err(|err| RelayError::Encoding(err.to_string()))?;

    if payload.len() > MAX_CONFIG_SIZE as usize {
        return Err(RelayError::Encoding(format!(
            "Config too large: {} bytes (max {})",
            payload.len(),
            MAX_CONFIG_SIZE
        )));
    }

    let mut frame = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.put_u8(FRAME_VERSION);
    frame.put_u32(payload.len() as u32);
    frame.put_u32(crc32fast::hash(&payload));
    frame.put_slice(&payload);

    Ok(frame.to_vec())
}

/// Decode a config frame produced by [`encode_connection_config`]
pub fn decode_connection_config(bytes: &[u8]) -> Result<ConnectionConfig> {
    if bytes.len() < FRAME_HEADER_SIZE {
        return Err(RelayError::Protocol(format!(
            "Incomplete config header: expected {} bytes, got {}",
            FRAME_HEADER_SIZE,
            bytes.len()
        )));
    }

    let mut buf = bytes;
    let version = buf.get_u8();
    let payload_len = buf.get_u32();
    let expected_crc = buf.get_u32();

    if version != FRAME_VERSION {
        return Err(RelayError::Protocol(format!(
            "Unsupported config frame version: {}",
            version
        )));
    }

    if payload_len > MAX_CONFIG_SIZE {
        return Err(RelayError::Protocol(format!(
            "Config payload too large: {} bytes (max {})",
            payload_len, MAX_CONFIG_SIZE
        )));
    }

    let payload_len = payload_len as usize;
    if buf.remaining() != payload_len {
        return Err(RelayError::Protocol(format!(
            "Config payload length mismatch: header says {}, frame has {}",
            payload_len,
            buf.remaining()
        )));
    }

    let actual_crc = crc32fast::hash(buf);
    if actual_crc != expected_crc {
        return Err(RelayError::Protocol(format!(
            "Config checksum mismatch: expected {:#010x}, got {:#010x}",
            expected_crc, actual_crc
        )));
    }

    let config: ConnectionConfig =
        bincode::deserialize(buf).map_err(|err| RelayError::Protocol(err.to_string()))?;
    config
        .validate()
        .map_err(|err| RelayError::Protocol(err.to_string()))?;

    Ok(config)
}

// =============================================================================
// Argument Encoding
// =============================================================================

/// Command arguments in the layout the engine consumes
///
/// Owns one NUL-terminated buffer per argument plus the pointer array that
/// references them. Dropping it frees everything.
#[derive(Debug)]
pub struct EncodedArgs {
    strings: Vec<CString>,
    pointers: Vec<*const c_char>,
}

impl EncodedArgs {
    /// Number of arguments
    pub fn argc(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Pointer to the argument array
    ///
    /// Never null, also for zero arguments; with `argc() == 0` it must not be
    /// read through.
    pub fn as_ptr(&self) -> *const *const c_char {
        self.pointers.as_ptr()
    }

    /// Borrow the arguments as C strings
    pub fn iter(&self) -> impl Iterator<Item = &CStr> {
        self.strings.iter().map(CString::as_c_str)
    }

    /// Copy the arguments out as owned strings
    pub fn to_strings(&self) -> Vec<String> {
        self.iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }
}

/// Encode arguments for submission
///
/// Fails if any argument contains an interior NUL byte.
pub fn encode_args<S: AsRef<str>>(args: &[S]) -> Result<EncodedArgs> {
    let strings = args
        .iter()
        .enumerate()
        .map(|(index, arg)| {
            CString::new(arg.as_ref()).map_err(|err| {
                RelayError::Encoding(format!(
                    "argument {} contains a NUL byte at position {}",
                    index,
                    err.nul_position()
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    // CString buffers live on the heap, so these stay valid as `strings` moves.
    let pointers = strings.iter().map(|arg| arg.as_ptr()).collect();

    Ok(EncodedArgs { strings, pointers })
}
