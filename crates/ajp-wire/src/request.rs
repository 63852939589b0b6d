//! FORWARD_REQUEST marshaling
//!
//! Field order on the wire:
//!
//! ```text
//! u8     FORWARD_REQUEST
//! u8     method code
//! string protocol, uri, remote_addr, remote_host, server_name
//! u16    server_port
//! u8     is_ssl
//! u16    header count
//!        per header: (u16 code | string name) string value
//!        optional (u8 tag, value) attributes
//! u8     ARE_DONE
//! ```

use crate::buffer::WireBuffer;
use crate::command::{ajp13, attribute};
use crate::error::{Result, WireError};
use crate::headers::{is_header_code, request_header_code, request_header_name};
use crate::method::Method;

/// Request as handed over by a web server adapter
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ForwardRequest {
    /// HTTP method name, e.g. `GET`
    pub method: String,
    /// HTTP version string, e.g. `HTTP/1.1`
    pub protocol: String,
    /// Decoded request URI without the query string
    pub uri: String,
    /// Client address
    pub remote_addr: String,
    /// Client host name, if resolved
    pub remote_host: Option<String>,
    /// Server name the request was addressed to
    pub server_name: String,
    /// Server port the request arrived on
    pub server_port: u16,
    /// Whether the client connection is TLS
    pub is_ssl: bool,
    /// Headers in arrival order, duplicates preserved
    pub headers: Vec<(String, String)>,
    /// Shared request secret
    pub secret: Option<String>,
    /// Authenticated remote user
    pub remote_user: Option<String>,
    /// Authentication type
    pub auth_type: Option<String>,
    /// Query string without the leading `?`
    pub query_string: Option<String>,
    /// Route token for sticky sessions
    pub route: Option<String>,
    /// Client certificate
    pub ssl_cert: Option<String>,
    /// TLS cipher suite
    pub ssl_cipher: Option<String>,
    /// TLS session id
    pub ssl_session: Option<String>,
    /// TLS key size in bits
    pub ssl_key_size: Option<u16>,
    /// Free-form attributes
    pub attributes: Vec<(String, String)>,
}

impl ForwardRequest {
    /// Start a request for `method` and `uri` with HTTP/1.1 defaults
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            protocol: "HTTP/1.1".to_string(),
            uri: uri.into(),
            remote_addr: "127.0.0.1".to_string(),
            server_name: "localhost".to_string(),
            server_port: 80,
            ..Self::default()
        }
    }

    /// Append a header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Append a free-form attribute
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Value of the first header with this name, ignoring ASCII case
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Declared request body length from the `content-length` header
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.header_value("content-length")
            .and_then(|v| v.trim().parse().ok())
    }

    /// Append the request to `buf` as a FORWARD_REQUEST payload
    ///
    /// The buffer is reset first. The TLS key size is only emitted when
    /// `forward_key_size` is set. The caller finalizes the frame.
    pub fn marshal(&self, buf: &mut WireBuffer, forward_key_size: bool) -> Result<()> {
        let method: Method = self.method.parse()?;
        let header_count =
            u16::try_from(self.headers.len()).map_err(|_| WireError::TooManyEntries {
                what: "headers",
                count: self.headers.len(),
            })?;

        buf.reset();
        buf.append_byte(ajp13::FORWARD_REQUEST)?;
        buf.append_byte(method.code())?;
        buf.append_string(Some(&self.protocol))?;
        buf.append_string(Some(&self.uri))?;
        buf.append_string(Some(&self.remote_addr))?;
        buf.append_string(self.remote_host.as_deref())?;
        buf.append_string(Some(&self.server_name))?;
        buf.append_int(self.server_port)?;
        buf.append_byte(u8::from(self.is_ssl))?;
        buf.append_int(header_count)?;

        for (name, value) in &self.headers {
            match request_header_code(name) {
                Some(code) => buf.append_int(code)?,
                None => buf.append_string(Some(name))?,
            }
            buf.append_string(Some(value))?;
        }

        let optional = [
            (attribute::SECRET, &self.secret),
            (attribute::REMOTE_USER, &self.remote_user),
            (attribute::AUTH_TYPE, &self.auth_type),
            (attribute::QUERY_STRING, &self.query_string),
            (attribute::JVM_ROUTE, &self.route),
            (attribute::SSL_CERT, &self.ssl_cert),
            (attribute::SSL_CIPHER, &self.ssl_cipher),
            (attribute::SSL_SESSION, &self.ssl_session),
        ];
        for (tag, value) in optional {
            if let Some(value) = value {
                buf.append_byte(tag)?;
                buf.append_string(Some(value))?;
            }
        }

        if forward_key_size && let Some(size) = self.ssl_key_size {
            buf.append_byte(attribute::SSL_KEY_SIZE)?;
            buf.append_int(size)?;
        }

        for (name, value) in &self.attributes {
            buf.append_byte(attribute::REQ_ATTRIBUTE)?;
            buf.append_string(Some(name))?;
            buf.append_string(Some(value))?;
        }

        buf.append_byte(attribute::ARE_DONE)
    }

    /// Read a FORWARD_REQUEST payload, the backend side of [`marshal`](Self::marshal)
    pub fn decode(buf: &mut WireBuffer) -> Result<Self> {
        let command = buf.get_byte()?;
        if command != ajp13::FORWARD_REQUEST {
            return Err(WireError::UnexpectedCommand {
                expected: ajp13::FORWARD_REQUEST,
                got: command,
            });
        }

        let method = Method::from_code(buf.get_byte()?)?;
        let mut req = Self {
            method: method.as_str().to_string(),
            protocol: buf.get_required_string("protocol")?,
            uri: buf.get_required_string("uri")?,
            remote_addr: buf.get_required_string("remote_addr")?,
            remote_host: buf.get_optional_string()?,
            server_name: buf.get_required_string("server_name")?,
            server_port: buf.get_int()?,
            is_ssl: buf.get_byte()? != 0,
            ..Self::default()
        };

        let count = buf.get_int()?;
        req.headers.reserve(usize::from(count));
        for _ in 0..count {
            let peek = buf.peek_int()?;
            let name = if is_header_code(peek) {
                buf.get_int()?;
                request_header_name(peek)
                    .ok_or(WireError::InvalidHeaderCode(peek))?
                    .to_string()
            } else {
                buf.get_string()?.ok_or(WireError::NullHeaderName)?.to_string()
            };
            let value = buf
                .get_string()?
                .ok_or_else(|| WireError::NullHeaderValue(name.clone()))?
                .to_string();
            req.headers.push((name, value));
        }

        loop {
            match buf.get_byte()? {
                attribute::ARE_DONE => break,
                attribute::SSL_KEY_SIZE => req.ssl_key_size = Some(buf.get_int()?),
                attribute::REQ_ATTRIBUTE => {
                    let name = buf.get_required_string("attribute name")?;
                    let value = buf.get_required_string("attribute value")?;
                    req.attributes.push((name, value));
                }
                tag => {
                    let slot = match tag {
                        attribute::SECRET => &mut req.secret,
                        attribute::REMOTE_USER => &mut req.remote_user,
                        attribute::AUTH_TYPE => &mut req.auth_type,
                        attribute::QUERY_STRING => &mut req.query_string,
                        attribute::JVM_ROUTE => &mut req.route,
                        attribute::SSL_CERT => &mut req.ssl_cert,
                        attribute::SSL_CIPHER => &mut req.ssl_cipher,
                        attribute::SSL_SESSION => &mut req.ssl_session,
                        other => return Err(WireError::UnknownAttribute(other)),
                    };
                    *slot = buf.get_optional_string()?;
                }
            }
        }

        Ok(req)
    }
}

/// Append a request body chunk: a 16-bit length then the bytes
///
/// An empty chunk is an empty payload, which the backend reads as the end of
/// the request body.
pub fn marshal_body_chunk(buf: &mut WireBuffer, data: &[u8]) -> Result<()> {
    let length = u16::try_from(data.len()).map_err(|_| WireError::BufferOverflow {
        needed: data.len() + 2,
        available: buf.available(),
    })?;
    buf.reset();
    if data.is_empty() {
        return Ok(());
    }
    buf.append_int(length)?;
    buf.append_bytes(data)
}

/// Read a request body chunk, the backend side of [`marshal_body_chunk`]
pub fn decode_body_chunk(buf: &mut WireBuffer) -> Result<&[u8]> {
    if buf.is_empty() {
        return Ok(&[]);
    }
    let length = buf.get_int()?;
    buf.get_bytes(usize::from(length))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::frame::{AJP13_WS_MAGIC, DEFAULT_BUFFER_SIZE};
    use pretty_assertions::assert_eq;

    fn sample() -> ForwardRequest {
        let mut req = ForwardRequest::new("GET", "/app/index.jsp")
            .header("host", "example.com")
            .header("X-Trace", "abc")
            .header("cookie", "a=1")
            .header("cookie", "b=2")
            .attribute("ssl.protocol", "TLSv1.3");
        req.remote_host = Some("client.example.com".to_string());
        req.query_string = Some("q=1&r=2".to_string());
        req.route = Some("node1".to_string());
        req.remote_user = Some("alice".to_string());
        req.ssl_key_size = Some(256);
        req.is_ssl = true;
        req.server_port = 443;
        req
    }

    fn round_trip(req: &ForwardRequest, forward_key_size: bool) -> ForwardRequest {
        let mut tx = WireBuffer::new(DEFAULT_BUFFER_SIZE);
        req.marshal(&mut tx, forward_key_size).expect("Operation should succeed");
        tx.finalize(AJP13_WS_MAGIC).expect("Operation should succeed");
        let mut rx = WireBuffer::new(DEFAULT_BUFFER_SIZE);
        rx.load(tx.frame(), AJP13_WS_MAGIC).expect("Operation should succeed");
        ForwardRequest::decode(&mut rx).expect("Operation should succeed")
    }

    #[test]
    fn test_round_trip_preserves_fields() {
        let req = sample();
        assert_eq!(round_trip(&req, true), req);
    }

    #[test]
    fn test_key_size_gated_by_option() {
        let req = sample();
        let decoded = round_trip(&req, false);
        assert_eq!(decoded.ssl_key_size, None);
    }

    #[test]
    fn test_wire_layout_of_minimal_get() {
        let req = ForwardRequest {
            method: "GET".to_string(),
            protocol: "HTTP/1.1".to_string(),
            uri: "/".to_string(),
            remote_addr: "1.2.3.4".to_string(),
            remote_host: None,
            server_name: "h".to_string(),
            server_port: 80,
            headers: vec![("host".to_string(), "h".to_string())],
            ..ForwardRequest::default()
        };
        let mut buf = WireBuffer::new(DEFAULT_BUFFER_SIZE);
        req.marshal(&mut buf, false).expect("Operation should succeed");

        let mut expected = vec![2u8, 2];
        expected.extend_from_slice(&[0, 8]);
        expected.extend_from_slice(b"HTTP/1.1\0");
        expected.extend_from_slice(&[0, 1, b'/', 0]);
        expected.extend_from_slice(&[0, 7]);
        expected.extend_from_slice(b"1.2.3.4\0");
        expected.extend_from_slice(&[0xFF, 0xFF]);
        expected.extend_from_slice(&[0, 1, b'h', 0]);
        expected.extend_from_slice(&[0, 80, 0, 0, 1]);
        expected.extend_from_slice(&[0xA0, 0x0B, 0, 1, b'h', 0]);
        expected.push(0xFF);
        assert_eq!(buf.payload(), expected.as_slice());
    }

    #[test]
    fn test_literal_header_names() {
        let req = ForwardRequest::new("POST", "/").header("Host", "x");
        let mut buf = WireBuffer::new(DEFAULT_BUFFER_SIZE);
        req.marshal(&mut buf, false).expect("Operation should succeed");
        // "Host" is not in the lower-case table and travels as a string
        let payload = buf.payload();
        let needle = [0u8, 4, b'H', b'o', b's', b't', 0];
        assert!(payload.windows(needle.len()).any(|w| w == needle));
    }

    #[test]
    fn test_unknown_method_fails_before_writing() {
        let req = ForwardRequest::new("BREW", "/pot");
        let mut buf = WireBuffer::new(DEFAULT_BUFFER_SIZE);
        assert!(matches!(
            req.marshal(&mut buf, false),
            Err(WireError::UnknownMethod(_))
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_oversized_request_fails() {
        let req = ForwardRequest::new("GET", "/").header("x-big", "v".repeat(200));
        let mut buf = WireBuffer::new(128);
        assert!(matches!(
            req.marshal(&mut buf, false),
            Err(WireError::BufferOverflow { .. })
        ));
    }

    #[test]
    fn test_content_length_lookup() {
        let req = ForwardRequest::new("POST", "/").header("Content-Length", " 20480 ");
        assert_eq!(req.content_length(), Some(20480));
        assert_eq!(ForwardRequest::new("GET", "/").content_length(), None);
    }

    #[test]
    fn test_body_chunk_round_trip() {
        let mut buf = WireBuffer::new(64);
        marshal_body_chunk(&mut buf, b"hello").expect("Operation should succeed");
        buf.finalize(AJP13_WS_MAGIC).expect("Operation should succeed");
        assert_eq!(buf.frame(), &[0x12, 0x34, 0, 7, 0, 5, b'h', b'e', b'l', b'l', b'o']);

        let mut rx = WireBuffer::new(64);
        rx.load(buf.frame(), AJP13_WS_MAGIC).expect("Operation should succeed");
        assert_eq!(decode_body_chunk(&mut rx).expect("Operation should succeed"), b"hello");
    }

    #[test]
    fn test_empty_body_chunk_is_empty_payload() {
        let mut buf = WireBuffer::new(64);
        marshal_body_chunk(&mut buf, b"").expect("Operation should succeed");
        buf.finalize(AJP13_WS_MAGIC).expect("Operation should succeed");
        assert_eq!(buf.frame(), &[0x12, 0x34, 0, 0]);

        let mut rx = WireBuffer::new(64);
        rx.load(buf.frame(), AJP13_WS_MAGIC).expect("Operation should succeed");
        assert!(decode_body_chunk(&mut rx).expect("Operation should succeed").is_empty());
    }

    #[test]
    fn test_body_chunk_too_large() {
        let mut buf = WireBuffer::new(16);
        assert!(marshal_body_chunk(&mut buf, &[0u8; 32]).is_err());
    }
}
