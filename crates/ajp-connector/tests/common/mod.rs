//! Scripted AJP backend for integration tests

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ajp_crypto::{ComputedKey, EntropySeed};
use ajp_wire::command::ajp13;
use ajp_wire::response::{
    encode_command, encode_end_response, encode_get_body_chunk, encode_send_body_chunk,
};
use ajp_wire::{
    ForwardRequest, LoginComplete, LoginFailure, LoginInit, LoginReply, LoginSeed, Negotiation,
    Protocol, ResponseHead, WireBuffer, decode_body_chunk,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const SEED: [u8; 32] = *b"0123456789ABCDEF0123456789ABCDEF";

/// Backend side of one accepted connection
pub struct BackendConn {
    stream: TcpStream,
    protocol: Protocol,
}

impl BackendConn {
    /// Next frame from the connector, `None` once it hung up
    pub async fn read_frame(&mut self) -> Option<WireBuffer> {
        let mut header = [0u8; 4];
        self.stream.read_exact(&mut header).await.ok()?;
        let length = usize::from(u16::from_be_bytes([header[2], header[3]]));
        let mut frame = header.to_vec();
        frame.resize(4 + length, 0);
        self.stream.read_exact(&mut frame[4..]).await.ok()?;

        let mut buf = WireBuffer::new(ajp_wire::MAX_BUFFER_SIZE);
        buf.load(&frame, self.protocol.outbound_magic())
            .expect("connector sent a well-formed frame");
        Some(buf)
    }

    pub async fn write(&mut self, build: impl FnOnce(&mut WireBuffer) -> ajp_wire::Result<()>) {
        let mut buf = WireBuffer::default();
        build(&mut buf).expect("Operation should succeed");
        buf.finalize(self.protocol.inbound_magic())
            .expect("Operation should succeed");
        // The connector may already have hung up
        let _ = self.stream.write_all(buf.frame()).await;
    }

    pub async fn read_request(&mut self) -> Option<ForwardRequest> {
        let mut frame = self.read_frame().await?;
        Some(ForwardRequest::decode(&mut frame).expect("Operation should succeed"))
    }

    pub async fn read_body_chunk(&mut self) -> Option<Vec<u8>> {
        let mut frame = self.read_frame().await?;
        Some(
            decode_body_chunk(&mut frame)
                .expect("Operation should succeed")
                .to_vec(),
        )
    }

    /// Pull the whole request body: the eager chunk, then GET_BODY_CHUNK rounds
    pub async fn read_body(&mut self, length: usize) -> Option<Vec<u8>> {
        let mut body = Vec::with_capacity(length);
        if length == 0 {
            return Some(body);
        }
        body.extend(self.read_body_chunk().await?);
        while body.len() < length {
            self.write(|buf| encode_get_body_chunk(buf, 8186)).await;
            body.extend(self.read_body_chunk().await?);
        }
        Some(body)
    }

    pub async fn respond(&mut self, status: u16, body: &[u8], reuse: bool) {
        self.write(|buf| {
            ResponseHead::new(status, "OK")
                .header("Content-Type", "text/plain")
                .header("Content-Length", body.len().to_string())
                .encode(buf)
        })
        .await;
        for chunk in body.chunks(4096) {
            self.write(|buf| encode_send_body_chunk(buf, chunk)).await;
        }
        self.write(|buf| encode_end_response(buf, reuse)).await;
    }

    /// Serve requests until the connector hangs up, echoing method and URI
    pub async fn serve(&mut self) {
        while let Some(request) = self.read_request().await {
            let length = usize::try_from(request.content_length().unwrap_or(0)).unwrap();
            let Some(body) = self.read_body(length).await else {
                return;
            };
            let text = format!("{} {} {}", request.method, request.uri, body.len());
            self.respond(200, text.as_bytes(), true).await;
        }
    }

    /// Answer CPING probes and requests alike until the connector hangs up
    pub async fn serve_with_cping(&mut self) {
        while let Some(mut frame) = self.read_frame().await {
            if frame.peek_byte().ok() == Some(ajp13::CPING) {
                self.write(|buf| encode_command(buf, ajp13::CPONG_REPLY)).await;
                continue;
            }
            let request = ForwardRequest::decode(&mut frame).expect("Operation should succeed");
            let text = format!("{} {}", request.method, request.uri);
            self.respond(200, text.as_bytes(), true).await;
        }
    }

    /// Run the backend half of an AJP14 login; true if the key matched
    pub async fn login(&mut self, secret: &str) -> bool {
        let Some(mut frame) = self.read_frame().await else {
            return false;
        };
        let init = LoginInit::decode(&mut frame).expect("Operation should succeed");
        assert!(init.negotiation.contains(Negotiation::PROTO_SUPPORT_AJP14));

        self.write(|buf| LoginSeed(SEED).encode(buf)).await;

        let Some(mut frame) = self.read_frame().await else {
            return false;
        };
        let complete = LoginComplete::decode(&mut frame).expect("Operation should succeed");
        let expected = ComputedKey::compute(&EntropySeed::from_bytes(SEED), secret)
            .expect("Operation should succeed");

        let ok = expected.verify(&complete.0);
        let reply = if ok {
            LoginReply::Ok {
                negotiated: init.negotiation,
                servlet_engine: "MockCat/1.0".to_string(),
            }
        } else {
            LoginReply::Nok(LoginFailure::BadKey)
        };
        self.write(|buf| reply.encode(buf)).await;
        ok
    }

    pub fn key_for(secret: &str) -> ComputedKey {
        ComputedKey::compute(&EntropySeed::from_bytes(SEED), secret)
            .expect("Operation should succeed")
    }
}

/// Listener on 127.0.0.1 handing each accepted connection to a script
pub struct MockBackend {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl MockBackend {
    /// Start a backend; `script` receives the zero-based connection index
    pub async fn start<F, Fut>(protocol: Protocol, script: F) -> Self
    where
        F: Fn(usize, BackendConn) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Operation should succeed");
        let addr = listener.local_addr().expect("Operation should succeed");
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);

        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let index = counter.fetch_add(1, Ordering::SeqCst);
                let conn = BackendConn { stream, protocol };
                tokio::spawn(script(index, conn));
            }
        });

        Self {
            addr,
            accepted,
            handle,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Connections accepted so far
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
