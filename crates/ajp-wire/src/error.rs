//! Error types for frame buffers and message codecs

use crate::frame::Protocol;
use thiserror::Error;

/// Errors raised while building or reading AJP frames.
///
/// Every variant is a malformed-message condition: the frame in hand cannot
/// be trusted and the connection that produced it must not be reused.
#[derive(Debug, Error)]
pub enum WireError {
    /// An append would exceed the buffer capacity
    #[error("Buffer overflow: need {needed} bytes, {available} available")]
    BufferOverflow {
        /// Bytes the append required
        needed: usize,
        /// Bytes left before capacity
        available: usize,
    },

    /// A read would go past the end of the received payload
    #[error("Read past end of message: need {needed} bytes at offset {offset}, length {len}")]
    ReadPastEnd {
        /// Bytes the read required
        needed: usize,
        /// Read cursor at the time of the failure
        offset: usize,
        /// Message length
        len: usize,
    },

    /// A string's declared length runs outside the received payload
    #[error("String of length {length} at offset {offset} exceeds message length {len}")]
    StringOutOfBounds {
        /// Declared string length
        length: usize,
        /// Read cursor at the time of the failure
        offset: usize,
        /// Message length
        len: usize,
    },

    /// Frame magic is not an AJP magic at all
    #[error("Bad frame magic: expected {expected:#06x}, got {got:#06x}")]
    BadMagic {
        /// Magic the receiver expected
        expected: u16,
        /// Magic found on the wire
        got: u16,
    },

    /// Frame magic belongs to another protocol variant or direction
    #[error("Frame magic {got:#06x} ({received}) where {expected:#06x} ({protocol}) was expected")]
    MagicMismatch {
        /// Magic the receiver expected
        expected: u16,
        /// Protocol the receiver speaks
        protocol: Protocol,
        /// Magic found on the wire
        got: u16,
        /// Protocol the received magic belongs to
        received: Protocol,
    },

    /// Declared payload length does not fit the receive buffer
    #[error("Frame payload of {length} bytes exceeds buffer capacity {capacity}")]
    PayloadTooLarge {
        /// Declared payload length
        length: usize,
        /// Payload capacity of the buffer
        capacity: usize,
    },

    /// HTTP method name has no protocol code
    #[error("Unknown HTTP method: {0}")]
    UnknownMethod(String),

    /// Method byte has no entry in the method table
    #[error("Unknown method code: {0}")]
    UnknownMethodCode(u8),

    /// Header code outside the well-known table
    #[error("Invalid header code: {0:#06x}")]
    InvalidHeaderCode(u16),

    /// Response status was zero
    #[error("Response status code is zero")]
    ZeroStatus,

    /// Header name was the null string
    #[error("Null header name")]
    NullHeaderName,

    /// Header value was the null string
    #[error("Null value for header {0}")]
    NullHeaderValue(String),

    /// A required string field was null
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Message carried a different command than expected
    #[error("Unexpected command: expected {expected:#04x}, got {got:#04x}")]
    UnexpectedCommand {
        /// Command the decoder expected
        expected: u8,
        /// Command found in the payload
        got: u8,
    },

    /// Command byte not valid at this point of an exchange
    #[error("Unknown command: {0:#04x}")]
    UnknownCommand(u8),

    /// Request attribute tag has no meaning
    #[error("Unknown request attribute tag: {0:#04x}")]
    UnknownAttribute(u8),

    /// More entries than a 16-bit count can describe
    #[error("Too many {what}: {count}")]
    TooManyEntries {
        /// What was being counted
        what: &'static str,
        /// Number of entries
        count: usize,
    },

    /// Key material of the wrong length
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Required length
        expected: usize,
        /// Supplied length
        actual: usize,
    },

    /// String bytes are not valid UTF-8
    #[error("Invalid UTF-8 in string field: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Frame header encoding failure
    #[error("Frame header error: {0}")]
    BinRw(#[from] binrw::Error),
}

/// Result alias for wire operations
pub type Result<T> = std::result::Result<T, WireError>;
