//! Boundary between the connector and the web server front end
//!
//! A front end describes the inbound request as a [`ForwardRequest`] and
//! implements [`ServiceAdapter`] so the exchange can pull request body bytes
//! on demand and push the response back.

use ajp_wire::{ForwardRequest, ResponseHead};
use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};

/// How much request body the client will send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyLength {
    /// Exact length from `content-length`; zero means no body
    Known(u64),
    /// Length unknown until the client signals end of stream
    Chunked,
}

impl BodyLength {
    /// Derive from the request headers
    pub fn of(request: &ForwardRequest) -> Self {
        if let Some(length) = request.content_length() {
            return Self::Known(length);
        }
        let chunked = request
            .header_value("transfer-encoding")
            .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"));
        if chunked { Self::Chunked } else { Self::Known(0) }
    }

    /// Whether any body bytes are expected
    pub fn has_body(self) -> bool {
        !matches!(self, Self::Known(0))
    }
}

/// Front-end callbacks driven by an exchange
///
/// Body reads happen only when the backend asks for data (and once for the
/// eager first chunk). `start_response` is called at most once per request;
/// `write_body` once per body frame, in arrival order. An error from any of
/// these is treated as the client going away.
#[async_trait]
pub trait ServiceAdapter: Send {
    /// The request to forward
    fn request(&self) -> &ForwardRequest;

    /// Request body length; derived from the headers unless overridden
    fn body_length(&self) -> BodyLength {
        BodyLength::of(self.request())
    }

    /// Read up to `buf.len()` body bytes; zero means end of body
    async fn read_body(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Deliver status and headers
    async fn start_response(&mut self, head: &ResponseHead) -> std::io::Result<()>;

    /// Deliver response body bytes
    async fn write_body(&mut self, data: &[u8]) -> std::io::Result<()>;
}

/// In-memory adapter that serves a fixed body and collects the response
#[derive(Debug, Clone)]
pub struct MemoryService {
    request: ForwardRequest,
    body: Bytes,
    head: Option<ResponseHead>,
    starts: usize,
    output: BytesMut,
}

impl MemoryService {
    /// Request with a body; `content-length` is added when missing and the
    /// request is not chunked
    pub fn new(mut request: ForwardRequest, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        let chunked = request
            .header_value("transfer-encoding")
            .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"));
        if !body.is_empty() && !chunked && request.header_value("content-length").is_none() {
            request.headers.push(("content-length".to_string(), body.len().to_string()));
        }
        Self {
            request,
            body,
            head: None,
            starts: 0,
            output: BytesMut::new(),
        }
    }

    /// Request without a body
    pub fn without_body(request: ForwardRequest) -> Self {
        Self::new(request, Bytes::new())
    }

    /// Status and headers, once received
    pub fn response(&self) -> Option<&ResponseHead> {
        self.head.as_ref()
    }

    /// How often `start_response` was called
    pub fn response_starts(&self) -> usize {
        self.starts
    }

    /// Response body received so far
    pub fn body(&self) -> &[u8] {
        &self.output
    }

    /// Request body bytes not read yet
    pub fn unread(&self) -> usize {
        self.body.len()
    }
}

#[async_trait]
impl ServiceAdapter for MemoryService {
    fn request(&self) -> &ForwardRequest {
        &self.request
    }

    async fn read_body(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = buf.len().min(self.body.len());
        buf[..n].copy_from_slice(&self.body[..n]);
        self.body.advance(n);
        Ok(n)
    }

    async fn start_response(&mut self, head: &ResponseHead) -> std::io::Result<()> {
        self.starts += 1;
        self.head = Some(head.clone());
        Ok(())
    }

    async fn write_body(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.output.extend_from_slice(data);
        Ok(())
    }
}
