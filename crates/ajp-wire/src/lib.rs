//! Frame buffer and message codecs for the AJP13/AJP14 connector protocol
//!
//! This crate holds everything about AJP that does not touch a socket: the
//! bounds-checked [`WireBuffer`], the frame header, command and attribute
//! tables, and symmetric codecs for every message a connector sends or
//! receives. The backend halves of the codecs are included so test backends
//! and loopback checks can be written against the same types.
//!
//! # Frames
//!
//! A frame is a 4-byte header (magic, payload length) followed by the
//! payload. The first payload byte is a command code, except for request body
//! chunks which carry only a length and the bytes.
//!
//! # Example
//!
//! ```
//! use ajp_wire::{ForwardRequest, Protocol, WireBuffer};
//!
//! let request = ForwardRequest::new("GET", "/index.jsp").header("host", "example.com");
//!
//! let mut buf = WireBuffer::default();
//! request.marshal(&mut buf, false).expect("request fits the buffer");
//! buf.finalize(Protocol::Ajp13.outbound_magic()).expect("payload fits 16 bits");
//!
//! assert_eq!(&buf.frame()[..2], &[0x12, 0x34]);
//! ```

#![warn(missing_docs)]

pub mod buffer;
pub mod command;
pub mod context;
pub mod error;
pub mod frame;
pub mod headers;
pub mod login;
pub mod method;
pub mod request;
pub mod response;

pub use buffer::WireBuffer;
pub use command::{LoginFailure, Negotiation};
pub use context::{
    ContextEntry, ContextInfo, ContextQuery, ContextStateQuery, ContextStateReply, ContextStatus,
};
pub use error::{Result, WireError};
pub use frame::{
    DEFAULT_BUFFER_SIZE, FrameHeader, HEADER_SIZE, MAX_BUFFER_SIZE, MAX_SEND_BODY_SIZE, Protocol,
    max_body_for,
};
pub use login::{
    KEY_SIZE, LoginComplete, LoginInit, LoginReply, LoginSeed, ShutdownReply, ShutdownRequest,
    UnknownPacket,
};
pub use method::Method;
pub use request::{ForwardRequest, decode_body_chunk, marshal_body_chunk};
pub use response::{Reply, ResponseHead};
