//! Command codes, request attribute tags and AJP14 negotiation flags
//!
//! The first payload byte of every frame (except a raw request body chunk)
//! is a command code.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// AJP13 command codes
pub mod ajp13 {
    /// Web server → backend: request header frame
    pub const FORWARD_REQUEST: u8 = 2;
    /// Backend → web server: response body chunk
    pub const SEND_BODY_CHUNK: u8 = 3;
    /// Backend → web server: response status and headers
    pub const SEND_HEADERS: u8 = 4;
    /// Backend → web server: end of response, carries the reuse flag
    pub const END_RESPONSE: u8 = 5;
    /// Backend → web server: request for more request body
    pub const GET_BODY_CHUNK: u8 = 6;
    /// Web server → backend: shutdown request
    pub const SHUTDOWN: u8 = 7;
    /// Web server → backend: legacy ping
    pub const PING: u8 = 8;
    /// Backend → web server: answer to [`CPING`]
    pub const CPONG_REPLY: u8 = 9;
    /// Web server → backend: connection probe
    pub const CPING: u8 = 10;
}

/// AJP14 command codes
pub mod ajp14 {
    /// Web server → backend: open a login, carries requested negotiation
    pub const LOGIN_INIT: u8 = 0x10;
    /// Backend → web server: entropy seed
    pub const LOGIN_SEED: u8 = 0x11;
    /// Web server → backend: computed key
    pub const LOGIN_COMPLETE: u8 = 0x12;
    /// Backend → web server: login accepted
    pub const LOGIN_OK: u8 = 0x13;
    /// Backend → web server: login refused
    pub const LOGIN_NOK: u8 = 0x14;
    /// Web server → backend: list contexts of a virtual host
    pub const CONTEXT_QUERY: u8 = 0x15;
    /// Backend → web server: context list
    pub const CONTEXT_INFO: u8 = 0x16;
    /// Backend → web server: context state change
    pub const CONTEXT_UPDATE: u8 = 0x17;
    /// Status probe
    pub const STATUS: u8 = 0x18;
    /// Web server → backend: authenticated shutdown
    pub const SHUTDOWN: u8 = 0x19;
    /// Backend → web server: shutdown accepted
    pub const SHUTDOWN_OK: u8 = 0x1A;
    /// Backend → web server: shutdown refused
    pub const SHUTDOWN_NOK: u8 = 0x1B;
    /// Web server → backend: query context states
    pub const CONTEXT_STATE: u8 = 0x1C;
    /// Backend → web server: context states
    pub const CONTEXT_STATE_REPLY: u8 = 0x1D;
    /// Either direction: reply to an unhandled message
    pub const UNKNOWN_PACKET: u8 = 0x1E;
}

/// Optional request attribute tags, emitted after the headers
pub mod attribute {
    /// Servlet context (unused)
    pub const CONTEXT: u8 = 1;
    /// Servlet path (unused)
    pub const SERVLET_PATH: u8 = 2;
    /// Authenticated remote user
    pub const REMOTE_USER: u8 = 3;
    /// Authentication type
    pub const AUTH_TYPE: u8 = 4;
    /// Query string
    pub const QUERY_STRING: u8 = 5;
    /// Route token for sticky sessions
    pub const JVM_ROUTE: u8 = 6;
    /// Client certificate
    pub const SSL_CERT: u8 = 7;
    /// TLS cipher suite
    pub const SSL_CIPHER: u8 = 8;
    /// TLS session id
    pub const SSL_SESSION: u8 = 9;
    /// Free-form name/value attribute
    pub const REQ_ATTRIBUTE: u8 = 10;
    /// TLS key size, a 16-bit integer
    pub const SSL_KEY_SIZE: u8 = 11;
    /// Shared request secret
    pub const SECRET: u8 = 12;
    /// End of attributes
    pub const ARE_DONE: u8 = 0xFF;
}

/// Human-readable name of a command code, for logs
#[must_use]
pub const fn command_name(code: u8) -> &'static str {
    match code {
        ajp13::FORWARD_REQUEST => "FORWARD_REQUEST",
        ajp13::SEND_BODY_CHUNK => "SEND_BODY_CHUNK",
        ajp13::SEND_HEADERS => "SEND_HEADERS",
        ajp13::END_RESPONSE => "END_RESPONSE",
        ajp13::GET_BODY_CHUNK => "GET_BODY_CHUNK",
        ajp13::SHUTDOWN => "SHUTDOWN",
        ajp13::PING => "PING",
        ajp13::CPONG_REPLY => "CPONG_REPLY",
        ajp13::CPING => "CPING",
        ajp14::LOGIN_INIT => "LOGIN_INIT",
        ajp14::LOGIN_SEED => "LOGIN_SEED",
        ajp14::LOGIN_COMPLETE => "LOGIN_COMPLETE",
        ajp14::LOGIN_OK => "LOGIN_OK",
        ajp14::LOGIN_NOK => "LOGIN_NOK",
        ajp14::CONTEXT_QUERY => "CONTEXT_QUERY",
        ajp14::CONTEXT_INFO => "CONTEXT_INFO",
        ajp14::CONTEXT_UPDATE => "CONTEXT_UPDATE",
        ajp14::STATUS => "STATUS",
        ajp14::SHUTDOWN => "SHUTDOWN14",
        ajp14::SHUTDOWN_OK => "SHUTDOWN_OK",
        ajp14::SHUTDOWN_NOK => "SHUTDOWN_NOK",
        ajp14::CONTEXT_STATE => "CONTEXT_STATE",
        ajp14::CONTEXT_STATE_REPLY => "CONTEXT_STATE_REPLY",
        ajp14::UNKNOWN_PACKET => "UNKNOWN_PACKET",
        _ => "UNKNOWN",
    }
}

/// AJP14 capability bitmask exchanged during login
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Negotiation(pub u32);

impl Negotiation {
    /// Backend may send context information
    pub const CONTEXT_INFO: Self = Self(0x8000_0000);
    /// Backend may send context state updates
    pub const CONTEXT_UPDATE: Self = Self(0x4000_0000);
    /// Gzip stream compression
    pub const GZIP_STREAM: Self = Self(0x2000_0000);
    /// DES56 stream encryption
    pub const DES56_STREAM: Self = Self(0x1000_0000);
    /// Forward the virtual server TLS information
    pub const SSL_VSERVER: Self = Self(0x0800_0000);
    /// Forward the client certificate
    pub const SSL_VCLIENT: Self = Self(0x0400_0000);
    /// Forward the crypto settings
    pub const SSL_VCRYPTO: Self = Self(0x0200_0000);
    /// Forward miscellaneous TLS information
    pub const SSL_VMISC: Self = Self(0x0100_0000);
    /// Mask of the protocol-level bits
    pub const PROTO_SUPPORT_MASK: Self = Self(0x00FF_0000);
    /// AJP14 protocol level
    pub const PROTO_SUPPORT_AJP14: Self = Self(0x0001_0000);
    /// AJP15 protocol level
    pub const PROTO_SUPPORT_AJP15: Self = Self(0x0002_0000);
    /// AJP16 protocol level
    pub const PROTO_SUPPORT_AJP16: Self = Self(0x0004_0000);

    /// What a connector asks for unless configured otherwise
    pub const DEFAULT_REQUEST: Self =
        Self(Self::CONTEXT_INFO.0 | Self::PROTO_SUPPORT_AJP14.0);

    /// Raw bits
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Protocol-level bits only
    #[must_use]
    pub const fn protocol_support(self) -> Self {
        Self(self.0 & Self::PROTO_SUPPORT_MASK.0)
    }
}

impl BitOr for Negotiation {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Negotiation {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Negotiation {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for Negotiation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Failure code carried by LOGIN_NOK and SHUTDOWN_NOK
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoginFailure {
    /// Computed key did not match
    BadKey,
    /// Servlet engine is down
    EngineDown,
    /// Servlet engine asks to retry later
    RetryLater,
    /// Shutdown was not authorized
    ShutdownNotAuthorized,
    /// Any other code
    Other(u32),
}

impl LoginFailure {
    /// Wire value of a bad key rejection
    pub const BAD_KEY: u32 = 0xFFFF_FFFF;
    /// Wire value of an engine-down rejection
    pub const ENGINE_DOWN: u32 = 0xFFFF_FFFE;
    /// Wire value of a retry-later rejection
    pub const RETRY_LATER: u32 = 0xFFFF_FFFD;
    /// Wire value of an unauthorized shutdown
    pub const SHUT_AUTHOR_FAILED: u32 = 0xFFFF_FFFC;

    /// Wire value
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::BadKey => Self::BAD_KEY,
            Self::EngineDown => Self::ENGINE_DOWN,
            Self::RetryLater => Self::RETRY_LATER,
            Self::ShutdownNotAuthorized => Self::SHUT_AUTHOR_FAILED,
            Self::Other(code) => code,
        }
    }
}

impl From<u32> for LoginFailure {
    fn from(code: u32) -> Self {
        match code {
            Self::BAD_KEY => Self::BadKey,
            Self::ENGINE_DOWN => Self::EngineDown,
            Self::RETRY_LATER => Self::RetryLater,
            Self::SHUT_AUTHOR_FAILED => Self::ShutdownNotAuthorized,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for LoginFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadKey => write!(f, "bad key"),
            Self::EngineDown => write!(f, "servlet engine down"),
            Self::RetryLater => write!(f, "retry later"),
            Self::ShutdownNotAuthorized => write!(f, "shutdown not authorized"),
            Self::Other(code) => write!(f, "code {code:#010x}"),
        }
    }
}
