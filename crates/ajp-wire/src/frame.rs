//! Frame header layout and protocol variants
//!
//! Every AJP frame starts with a 4-byte header: a big-endian magic that
//! identifies protocol and direction, then a big-endian payload length.
//!
//! | Variant | Web server → backend | Backend → web server |
//! |---------|----------------------|----------------------|
//! | AJP13   | `0x1234`             | `0x4142` (`"AB"`)    |
//! | AJP14   | `0x1235`             | `0x1235`             |

use binrw::{BinRead, BinWrite};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Size of the frame header in bytes
pub const HEADER_SIZE: usize = 4;

/// Default frame buffer capacity
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Largest buffer capacity a 16-bit length field can describe
pub const MAX_BUFFER_SIZE: usize = HEADER_SIZE + u16::MAX as usize;

/// Bytes of a body frame taken by the header and the chunk length prefix
pub const BODY_FRAME_OVERHEAD: usize = HEADER_SIZE + 2;

/// Largest request body chunk that fits a default-sized frame
pub const MAX_SEND_BODY_SIZE: usize = DEFAULT_BUFFER_SIZE - BODY_FRAME_OVERHEAD;

/// AJP13 magic for frames sent to the backend
pub const AJP13_WS_MAGIC: u16 = 0x1234;

/// AJP13 magic for frames sent by the backend
pub const AJP13_SW_MAGIC: u16 = 0x4142;

/// AJP14 magic, both directions
pub const AJP14_MAGIC: u16 = 0x1235;

/// Largest body chunk a buffer of `capacity` bytes can carry
#[must_use]
pub const fn max_body_for(capacity: usize) -> usize {
    capacity.saturating_sub(BODY_FRAME_OVERHEAD)
}

/// Frame header as it appears on the wire
#[derive(BinRead, BinWrite, Debug, Clone, Copy, PartialEq, Eq)]
#[brw(big)]
pub struct FrameHeader {
    /// Protocol and direction tag
    pub magic: u16,
    /// Payload length in bytes
    pub length: u16,
}

/// Protocol variant spoken on a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Unauthenticated legacy protocol
    #[default]
    Ajp13,
    /// Protocol with login handshake and context discovery
    Ajp14,
}

impl Protocol {
    /// Magic for frames the web server sends
    #[must_use]
    pub const fn outbound_magic(self) -> u16 {
        match self {
            Self::Ajp13 => AJP13_WS_MAGIC,
            Self::Ajp14 => AJP14_MAGIC,
        }
    }

    /// Magic for frames the backend sends
    #[must_use]
    pub const fn inbound_magic(self) -> u16 {
        match self {
            Self::Ajp13 => AJP13_SW_MAGIC,
            Self::Ajp14 => AJP14_MAGIC,
        }
    }

    /// Conventional backend port for this variant
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Ajp13 => 8009,
            Self::Ajp14 => 8010,
        }
    }

    /// Identify the variant a magic belongs to, if any
    #[must_use]
    pub const fn from_magic(magic: u16) -> Option<Self> {
        match magic {
            AJP13_WS_MAGIC | AJP13_SW_MAGIC => Some(Self::Ajp13),
            AJP14_MAGIC => Some(Self::Ajp14),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ajp13 => write!(f, "ajp13"),
            Self::Ajp14 => write!(f, "ajp14"),
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ajp13" => Ok(Self::Ajp13),
            "ajp14" => Ok(Self::Ajp14),
            other => Err(format!("unknown protocol '{other}', expected ajp13 or ajp14")),
        }
    }
}
