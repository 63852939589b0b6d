//! AJP14 login and shutdown messages
//!
//! ```text
//! → LOGIN_INIT      u32 negotiation, string web server name
//! ← LOGIN_SEED      32 bytes entropy
//! → LOGIN_COMPLETE  32 bytes computed key
//! ← LOGIN_OK        u32 negotiated, string servlet engine name
//! ← LOGIN_NOK       u32 failure code
//! → SHUTDOWN        32 bytes computed key
//! ← SHUTDOWN_OK | SHUTDOWN_NOK u32 failure code
//! ```

use crate::buffer::WireBuffer;
use crate::command::{LoginFailure, Negotiation, ajp14};
use crate::error::{Result, WireError};

/// Length of the entropy seed and of the computed key
pub const KEY_SIZE: usize = 32;

/// Consume the command byte and check it
pub(crate) fn expect_command(buf: &mut WireBuffer, expected: u8) -> Result<()> {
    let got = buf.get_byte()?;
    if got != expected {
        return Err(WireError::UnexpectedCommand { expected, got });
    }
    Ok(())
}

fn get_key(buf: &mut WireBuffer) -> Result<[u8; KEY_SIZE]> {
    let bytes = buf.get_bytes(KEY_SIZE)?;
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(bytes);
    Ok(key)
}

/// Opening message of a login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginInit {
    /// Requested capabilities
    pub negotiation: Negotiation,
    /// Name the web server identifies itself with
    pub web_server_name: String,
}

impl LoginInit {
    /// Write the payload
    pub fn encode(&self, buf: &mut WireBuffer) -> Result<()> {
        buf.reset();
        buf.append_byte(ajp14::LOGIN_INIT)?;
        buf.append_long(self.negotiation.bits())?;
        buf.append_string(Some(&self.web_server_name))
    }

    /// Read the payload
    pub fn decode(buf: &mut WireBuffer) -> Result<Self> {
        expect_command(buf, ajp14::LOGIN_INIT)?;
        Ok(Self {
            negotiation: Negotiation(buf.get_long()?),
            web_server_name: buf.get_required_string("web server name")?,
        })
    }
}

/// Entropy sent by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSeed(pub [u8; KEY_SIZE]);

impl LoginSeed {
    /// Write the payload
    pub fn encode(&self, buf: &mut WireBuffer) -> Result<()> {
        buf.reset();
        buf.append_byte(ajp14::LOGIN_SEED)?;
        buf.append_bytes(&self.0)
    }

    /// Read the payload
    pub fn decode(buf: &mut WireBuffer) -> Result<Self> {
        expect_command(buf, ajp14::LOGIN_SEED)?;
        Ok(Self(get_key(buf)?))
    }
}

/// Computed key sent to finish a login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginComplete(pub [u8; KEY_SIZE]);

impl LoginComplete {
    /// Write the payload
    pub fn encode(&self, buf: &mut WireBuffer) -> Result<()> {
        buf.reset();
        buf.append_byte(ajp14::LOGIN_COMPLETE)?;
        buf.append_bytes(&self.0)
    }

    /// Read the payload
    pub fn decode(buf: &mut WireBuffer) -> Result<Self> {
        expect_command(buf, ajp14::LOGIN_COMPLETE)?;
        Ok(Self(get_key(buf)?))
    }
}

/// Outcome of a login as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginReply {
    /// Login accepted
    Ok {
        /// Capabilities both sides agreed on
        negotiated: Negotiation,
        /// Name the backend identifies itself with
        servlet_engine: String,
    },
    /// Login refused
    Nok(LoginFailure),
}

impl LoginReply {
    /// Write the payload
    pub fn encode(&self, buf: &mut WireBuffer) -> Result<()> {
        buf.reset();
        match self {
            Self::Ok {
                negotiated,
                servlet_engine,
            } => {
                buf.append_byte(ajp14::LOGIN_OK)?;
                buf.append_long(negotiated.bits())?;
                buf.append_string(Some(servlet_engine))
            }
            Self::Nok(failure) => {
                buf.append_byte(ajp14::LOGIN_NOK)?;
                buf.append_long(failure.code())
            }
        }
    }

    /// Read a LOGIN_OK or LOGIN_NOK payload
    pub fn decode(buf: &mut WireBuffer) -> Result<Self> {
        match buf.get_byte()? {
            ajp14::LOGIN_OK => Ok(Self::Ok {
                negotiated: Negotiation(buf.get_long()?),
                servlet_engine: buf.get_required_string("servlet engine name")?,
            }),
            ajp14::LOGIN_NOK => Ok(Self::Nok(LoginFailure::from(buf.get_long()?))),
            got => Err(WireError::UnexpectedCommand {
                expected: ajp14::LOGIN_OK,
                got,
            }),
        }
    }
}

/// Authenticated request to stop the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownRequest(pub [u8; KEY_SIZE]);

impl ShutdownRequest {
    /// Write the payload
    pub fn encode(&self, buf: &mut WireBuffer) -> Result<()> {
        buf.reset();
        buf.append_byte(ajp14::SHUTDOWN)?;
        buf.append_bytes(&self.0)
    }

    /// Read the payload
    pub fn decode(buf: &mut WireBuffer) -> Result<Self> {
        expect_command(buf, ajp14::SHUTDOWN)?;
        Ok(Self(get_key(buf)?))
    }
}

/// Backend answer to a shutdown request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReply {
    /// Backend is stopping
    Ok,
    /// Shutdown refused
    Nok(LoginFailure),
}

impl ShutdownReply {
    /// Write the payload
    pub fn encode(&self, buf: &mut WireBuffer) -> Result<()> {
        buf.reset();
        match self {
            Self::Ok => buf.append_byte(ajp14::SHUTDOWN_OK),
            Self::Nok(failure) => {
                buf.append_byte(ajp14::SHUTDOWN_NOK)?;
                buf.append_long(failure.code())
            }
        }
    }

    /// Read a SHUTDOWN_OK or SHUTDOWN_NOK payload
    pub fn decode(buf: &mut WireBuffer) -> Result<Self> {
        match buf.get_byte()? {
            ajp14::SHUTDOWN_OK => Ok(Self::Ok),
            ajp14::SHUTDOWN_NOK => Ok(Self::Nok(LoginFailure::from(buf.get_long()?))),
            got => Err(WireError::UnexpectedCommand {
                expected: ajp14::SHUTDOWN_OK,
                got,
            }),
        }
    }
}

/// Echo of a message the receiver could not handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPacket(pub Vec<u8>);

impl UnknownPacket {
    /// Write the payload: a 16-bit length, then the echoed bytes
    pub fn encode(&self, buf: &mut WireBuffer) -> Result<()> {
        let length = u16::try_from(self.0.len()).map_err(|_| WireError::BufferOverflow {
            needed: self.0.len() + 3,
            available: buf.available(),
        })?;
        buf.reset();
        buf.append_byte(ajp14::UNKNOWN_PACKET)?;
        buf.append_int(length)?;
        buf.append_bytes(&self.0)
    }

    /// Read the payload
    pub fn decode(buf: &mut WireBuffer) -> Result<Self> {
        expect_command(buf, ajp14::UNKNOWN_PACKET)?;
        let length = buf.get_int()?;
        Ok(Self(buf.get_bytes(usize::from(length))?.to_vec()))
    }
}
