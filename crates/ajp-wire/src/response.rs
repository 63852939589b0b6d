//! Backend reply codecs
//!
//! A response is a sequence of frames from the backend: at most one
//! SEND_HEADERS, any number of SEND_BODY_CHUNK and GET_BODY_CHUNK, and a
//! terminating END_RESPONSE. [`Reply::decode`] dispatches on the leading
//! command byte; the `encode_*` functions are the backend side, used by
//! test backends.

use crate::buffer::WireBuffer;
use crate::command::ajp13;
use crate::error::{Result, WireError};
use crate::headers::{is_header_code, response_header_code, response_header_name};

/// Status line and headers of a response
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseHead {
    /// HTTP status code, never zero
    pub status: u16,
    /// Reason phrase; empty when the backend sent none
    pub reason: String,
    /// Headers in the order the backend sent them
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    /// Create a response head with no headers
    pub fn new(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            headers: Vec::new(),
        }
    }

    /// Append a header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Read the body of a SEND_HEADERS frame; the command byte is already consumed
    pub fn unmarshal(buf: &mut WireBuffer) -> Result<Self> {
        let status = buf.get_int()?;
        if status == 0 {
            return Err(WireError::ZeroStatus);
        }
        let reason = buf.get_optional_string()?.unwrap_or_default();

        let count = buf.get_int()?;
        let mut headers = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let peek = buf.peek_int()?;
            let name = if is_header_code(peek) {
                buf.get_int()?;
                response_header_name(peek)
                    .ok_or(WireError::InvalidHeaderCode(peek))?
                    .to_string()
            } else {
                buf.get_string()?
                    .ok_or(WireError::NullHeaderName)?
                    .to_string()
            };
            let value = buf
                .get_string()?
                .ok_or_else(|| WireError::NullHeaderValue(name.clone()))?
                .to_string();
            headers.push((name, value));
        }

        Ok(Self {
            status,
            reason,
            headers,
        })
    }

    /// Write a complete SEND_HEADERS payload
    pub fn encode(&self, buf: &mut WireBuffer) -> Result<()> {
        let count = u16::try_from(self.headers.len()).map_err(|_| WireError::TooManyEntries {
            what: "headers",
            count: self.headers.len(),
        })?;
        buf.reset();
        buf.append_byte(ajp13::SEND_HEADERS)?;
        buf.append_int(self.status)?;
        buf.append_string(Some(&self.reason))?;
        buf.append_int(count)?;
        for (name, value) in &self.headers {
            match response_header_code(name) {
                Some(code) => buf.append_int(code)?,
                None => buf.append_string(Some(name))?,
            }
            buf.append_string(Some(value))?;
        }
        Ok(())
    }

    /// Value of the first header with this name, ignoring ASCII case
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// One decoded backend frame
#[derive(Debug, PartialEq, Eq)]
pub enum Reply<'a> {
    /// Status and headers
    Headers(ResponseHead),
    /// Response body bytes, a view into the receive buffer
    BodyChunk(&'a [u8]),
    /// Backend wants up to this many more request body bytes
    GetBodyChunk(u16),
    /// End of the response
    EndResponse {
        /// Whether the connection may carry another exchange
        reuse: bool,
    },
    /// Answer to a CPING probe
    CpongReply,
}

impl<'a> Reply<'a> {
    /// Decode the frame in `buf`, dispatching on its command byte
    pub fn decode(buf: &'a mut WireBuffer) -> Result<Self> {
        match buf.get_byte()? {
            ajp13::SEND_HEADERS => Ok(Self::Headers(ResponseHead::unmarshal(buf)?)),
            ajp13::SEND_BODY_CHUNK => {
                let length = buf.get_int()?;
                Ok(Self::BodyChunk(buf.get_bytes(usize::from(length))?))
            }
            ajp13::GET_BODY_CHUNK => Ok(Self::GetBodyChunk(buf.get_int()?)),
            ajp13::END_RESPONSE => Ok(Self::EndResponse {
                reuse: buf.get_byte()? == 1,
            }),
            ajp13::CPONG_REPLY => Ok(Self::CpongReply),
            other => Err(WireError::UnknownCommand(other)),
        }
    }
}

/// Write a SEND_BODY_CHUNK payload
pub fn encode_send_body_chunk(buf: &mut WireBuffer, data: &[u8]) -> Result<()> {
    let length = u16::try_from(data.len()).map_err(|_| WireError::BufferOverflow {
        needed: data.len() + 3,
        available: buf.available(),
    })?;
    buf.reset();
    buf.append_byte(ajp13::SEND_BODY_CHUNK)?;
    buf.append_int(length)?;
    buf.append_bytes(data)
}

/// Write a GET_BODY_CHUNK payload
pub fn encode_get_body_chunk(buf: &mut WireBuffer, requested: u16) -> Result<()> {
    buf.reset();
    buf.append_byte(ajp13::GET_BODY_CHUNK)?;
    buf.append_int(requested)
}

/// Write an END_RESPONSE payload
pub fn encode_end_response(buf: &mut WireBuffer, reuse: bool) -> Result<()> {
    buf.reset();
    buf.append_byte(ajp13::END_RESPONSE)?;
    buf.append_byte(u8::from(reuse))
}

/// Write a single-byte command payload such as CPING or CPONG_REPLY
pub fn encode_command(buf: &mut WireBuffer, command: u8) -> Result<()> {
    buf.reset();
    buf.append_byte(command)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::frame::{AJP13_SW_MAGIC, DEFAULT_BUFFER_SIZE};
    use pretty_assertions::assert_eq;

    fn receive(tx: &mut WireBuffer) -> WireBuffer {
        tx.finalize(AJP13_SW_MAGIC).expect("Operation should succeed");
        let mut rx = WireBuffer::new(DEFAULT_BUFFER_SIZE);
        rx.load(tx.frame(), AJP13_SW_MAGIC).expect("Operation should succeed");
        rx
    }

    #[test]
    fn test_headers_round_trip() {
        let head = ResponseHead::new(200, "OK")
            .header("Content-Type", "text/html")
            .header("Set-Cookie", "a=1")
            .header("Set-Cookie", "b=2")
            .header("X-Powered-By", "Servlet/6.0");
        let mut tx = WireBuffer::new(DEFAULT_BUFFER_SIZE);
        head.encode(&mut tx).expect("Operation should succeed");
        let mut rx = receive(&mut tx);
        assert_eq!(
            Reply::decode(&mut rx).expect("Operation should succeed"),
            Reply::Headers(head)
        );
    }

    #[test]
    fn test_code_and_literal_forms() {
        let head = ResponseHead::new(302, "Found")
            .header("Location", "/next")
            .header("location", "/lower");
        let mut tx = WireBuffer::new(DEFAULT_BUFFER_SIZE);
        head.encode(&mut tx).expect("Operation should succeed");
        let payload = tx.payload();
        // Location is code 0xA006; the lower-case spelling goes literally
        assert!(payload.windows(2).any(|w| w == [0xA0, 0x06]));
        assert!(payload.windows(9).any(|w| w == b"location\0"));
    }

    #[test]
    fn test_zero_status_rejected() {
        let mut tx = WireBuffer::new(64);
        ResponseHead::new(0, "")
            .encode(&mut tx)
            .expect("Operation should succeed");
        let mut rx = receive(&mut tx);
        assert!(matches!(Reply::decode(&mut rx), Err(WireError::ZeroStatus)));
    }

    #[test]
    fn test_header_code_out_of_range() {
        let mut tx = WireBuffer::new(64);
        tx.append_byte(ajp13::SEND_HEADERS).unwrap();
        tx.append_int(200).unwrap();
        tx.append_string(Some("OK")).unwrap();
        tx.append_int(1).unwrap();
        tx.append_int(0xA00C).unwrap();
        tx.append_string(Some("v")).unwrap();
        let mut rx = receive(&mut tx);
        assert!(matches!(
            Reply::decode(&mut rx),
            Err(WireError::InvalidHeaderCode(0xA00C))
        ));
    }

    #[test]
    fn test_null_header_value_rejected() {
        let mut tx = WireBuffer::new(64);
        tx.append_byte(ajp13::SEND_HEADERS).unwrap();
        tx.append_int(200).unwrap();
        tx.append_string(Some("OK")).unwrap();
        tx.append_int(1).unwrap();
        tx.append_string(Some("X-Empty")).unwrap();
        tx.append_string(None).unwrap();
        let mut rx = receive(&mut tx);
        assert!(matches!(
            Reply::decode(&mut rx),
            Err(WireError::NullHeaderValue(name)) if name == "X-Empty"
        ));
    }

    #[test]
    fn test_null_reason_is_empty() {
        let mut tx = WireBuffer::new(64);
        tx.append_byte(ajp13::SEND_HEADERS).unwrap();
        tx.append_int(204).unwrap();
        tx.append_string(None).unwrap();
        tx.append_int(0).unwrap();
        let mut rx = receive(&mut tx);
        let Reply::Headers(head) = Reply::decode(&mut rx).unwrap() else {
            panic!("expected headers");
        };
        assert_eq!(head.status, 204);
        assert_eq!(head.reason, "");
    }

    #[test]
    fn test_body_get_and_end_frames() {
        let mut tx = WireBuffer::new(64);
        encode_send_body_chunk(&mut tx, b"chunk").unwrap();
        let mut rx = receive(&mut tx);
        assert_eq!(Reply::decode(&mut rx).unwrap(), Reply::BodyChunk(b"chunk"));

        encode_get_body_chunk(&mut tx, 8186).unwrap();
        let mut rx = receive(&mut tx);
        assert_eq!(Reply::decode(&mut rx).unwrap(), Reply::GetBodyChunk(8186));

        encode_end_response(&mut tx, true).unwrap();
        let mut rx = receive(&mut tx);
        assert_eq!(
            Reply::decode(&mut rx).unwrap(),
            Reply::EndResponse { reuse: true }
        );

        encode_command(&mut tx, ajp13::CPONG_REPLY).unwrap();
        let mut rx = receive(&mut tx);
        assert_eq!(Reply::decode(&mut rx).unwrap(), Reply::CpongReply);
    }

    #[test]
    fn test_truncated_body_chunk() {
        let mut tx = WireBuffer::new(64);
        tx.append_byte(ajp13::SEND_BODY_CHUNK).unwrap();
        tx.append_int(10).unwrap();
        tx.append_bytes(b"abc").unwrap();
        let mut rx = receive(&mut tx);
        assert!(matches!(
            Reply::decode(&mut rx),
            Err(WireError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn test_unknown_command() {
        let mut tx = WireBuffer::new(64);
        encode_command(&mut tx, ajp13::FORWARD_REQUEST).unwrap();
        let mut rx = receive(&mut tx);
        assert!(matches!(
            Reply::decode(&mut rx),
            Err(WireError::UnknownCommand(2))
        ));
    }
}
