//! One request/response cycle on one connection
//!
//! ```text
//! SendingRequest ──► AwaitingReply ──► Completed
//!                      │      ▲
//!      GET_BODY_CHUNK  ▼      │
//!                  StreamingUpload
//!
//! any failure ──► Aborted
//! ```
//!
//! Everything that must survive a retry (the marshaled request, the eager
//! body chunk, the body counters and the recoverable flag) lives in
//! [`RequestState`], which the retry loop owns. An [`Exchange`] only borrows
//! it for one attempt.

use std::time::Duration;

use ajp_wire::{
    ForwardRequest, Protocol, Reply, ResponseHead, WireBuffer, marshal_body_chunk, max_body_for,
};
use tracing::{debug, trace};

use crate::config::{RecoveryOptions, WorkerConfig};
use crate::connection::Connection;
use crate::error::{ConnectorError, Result};
use crate::service::{BodyLength, ServiceAdapter};

/// Where an exchange stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// Request frame and eager body chunk going out
    SendingRequest,
    /// Waiting for the next backend frame
    AwaitingReply,
    /// Forwarding request body the backend asked for
    StreamingUpload,
    /// END_RESPONSE received
    Completed,
    /// Stopped on an error
    Aborted,
}

/// Result of one attempt
#[derive(Debug)]
pub enum ExchangeOutcome {
    /// Response delivered; `reuse` tells whether the connection may be pooled
    Completed {
        /// Reuse flag from END_RESPONSE
        reuse: bool,
    },
    /// Nothing irreversible happened; the request may run on another connection
    RecoverableFailure(ConnectorError),
    /// The backend consumed request data or the client saw part of a response
    FatalFailure(ConnectorError),
    /// The client stopped sending the body or stopped reading the response
    ClientAbort(ConnectorError),
}

/// Per-worker settings an exchange needs
#[derive(Debug, Clone)]
pub struct ExchangeOptions {
    /// Protocol variant, for the outbound magic
    pub protocol: Protocol,
    /// Frame capacity
    pub packet_size: usize,
    /// Most body bytes sent unsolicited with the request
    pub eager_body_cap: usize,
    /// Bound on each backend frame while awaiting the reply
    pub reply_timeout: Option<Duration>,
    /// Extra recovery restrictions
    pub recovery: RecoveryOptions,
    /// Forward the TLS key size attribute
    pub forward_key_size: bool,
    /// Request secret added to requests that carry none
    pub secret: Option<String>,
}

impl ExchangeOptions {
    /// Settings from a worker configuration
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            protocol: config.protocol,
            packet_size: config.max_packet_size,
            eager_body_cap: config.eager_body_cap,
            reply_timeout: config.reply_deadline(),
            recovery: config.recovery_options,
            forward_key_size: config.forward_key_size,
            secret: config.secret.clone(),
        }
    }
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self::from_config(&WorkerConfig::default())
    }
}

/// Request data kept across attempts
#[derive(Debug)]
pub struct RequestState {
    request: WireBuffer,
    replay: WireBuffer,
    has_replay: bool,
    body: BodyLength,
    remaining: u64,
    body_done: bool,
    recoverable: bool,
    response_started: bool,
    scratch: Vec<u8>,
}

impl RequestState {
    /// Marshal and finalize the request frame once
    ///
    /// The configured request secret is added when the request has none.
    /// Fails without touching the network if the request cannot be encoded
    /// or declares a content length that is not a number.
    pub fn new(
        request: &ForwardRequest,
        body: BodyLength,
        options: &ExchangeOptions,
    ) -> Result<Self> {
        if let Some(value) = request.header_value("content-length")
            && request.content_length().is_none()
        {
            return Err(ConnectorError::InvalidRequest(format!(
                "content-length `{value}` is not a byte count"
            )));
        }

        let with_secret;
        let request = match (&options.secret, &request.secret) {
            (Some(secret), None) => {
                with_secret = ForwardRequest {
                    secret: Some(secret.clone()),
                    ..request.clone()
                };
                &with_secret
            }
            _ => request,
        };

        let mut frame = WireBuffer::new(options.packet_size);
        request.marshal(&mut frame, options.forward_key_size)?;
        frame.finalize(options.protocol.outbound_magic())?;

        let (remaining, body_done) = match body {
            BodyLength::Known(length) => (length, length == 0),
            BodyLength::Chunked => (0, false),
        };

        Ok(Self {
            request: frame,
            replay: WireBuffer::new(options.packet_size),
            has_replay: false,
            body,
            remaining,
            body_done,
            recoverable: true,
            response_started: false,
            scratch: Vec::with_capacity(max_body_for(options.packet_size)),
        })
    }

    /// Marshaled FORWARD_REQUEST frame
    pub fn request_frame(&self) -> &WireBuffer {
        &self.request
    }

    /// Known body bytes not yet read from the client
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Whether the backend has not yet consumed anything that cannot be replayed
    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    /// Whether response headers reached the client
    pub fn response_started(&self) -> bool {
        self.response_started
    }

    /// Whether another attempt may replay this request
    fn may_retry(&self, delivered: bool, recovery: RecoveryOptions) -> bool {
        self.recoverable
            && !self.response_started
            && !(delivered && recovery.abort_if_backend_got_request())
    }

    /// Bytes to read for a chunk of at most `limit`
    fn next_chunk_len(&self, limit: usize) -> usize {
        if self.body_done {
            return 0;
        }
        match self.body {
            BodyLength::Known(_) => usize::try_from(self.remaining).map_or(limit, |r| r.min(limit)),
            BodyLength::Chunked => limit,
        }
    }

    /// Read up to `limit` body bytes from the client into the scratch buffer
    async fn read_chunk(
        &mut self,
        adapter: &mut dyn ServiceAdapter,
        limit: usize,
    ) -> std::io::Result<()> {
        let want = self.next_chunk_len(limit);
        self.scratch.clear();
        self.scratch.resize(want, 0);

        let mut filled = 0;
        while filled < want {
            let n = adapter.read_body(&mut self.scratch[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        self.scratch.truncate(filled);

        match self.body {
            BodyLength::Known(_) => {
                if filled < want {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!(
                            "client body ended with {} of {} bytes outstanding",
                            self.remaining - filled as u64,
                            self.remaining
                        ),
                    ));
                }
                self.remaining -= filled as u64;
                self.body_done = self.remaining == 0;
            }
            BodyLength::Chunked => {
                if filled < want {
                    self.body_done = true;
                }
            }
        }
        Ok(())
    }

    /// Frame the scratch bytes into the replay buffer
    fn frame_scratch(&mut self, protocol: Protocol) -> Result<()> {
        marshal_body_chunk(&mut self.replay, &self.scratch)?;
        self.replay.finalize(protocol.outbound_magic())?;
        Ok(())
    }
}

/// Failure inside an attempt, split by which side caused it
enum StepError {
    Backend(ConnectorError),
    Client(std::io::Error),
}

impl From<ConnectorError> for StepError {
    fn from(e: ConnectorError) -> Self {
        Self::Backend(e)
    }
}

impl From<ajp_wire::WireError> for StepError {
    fn from(e: ajp_wire::WireError) -> Self {
        Self::Backend(e.into())
    }
}

type Step<T> = std::result::Result<T, StepError>;

enum Next {
    Headers(ResponseHead),
    SendBody(u16),
}

/// Drives one attempt of a request over one connection
pub struct Exchange<'a> {
    conn: &'a mut Connection,
    options: &'a ExchangeOptions,
    state: ExchangeState,
    delivered: bool,
}

impl<'a> Exchange<'a> {
    /// Prepare an attempt on `conn`
    pub fn new(conn: &'a mut Connection, options: &'a ExchangeOptions) -> Self {
        Self {
            conn,
            options,
            state: ExchangeState::SendingRequest,
            delivered: false,
        }
    }

    /// Current state
    pub fn state(&self) -> ExchangeState {
        self.state
    }

    fn transition(&mut self, next: ExchangeState) {
        trace!(
            connection = self.conn.id(),
            "Exchange {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }

    /// Run the attempt to completion or failure
    pub async fn run(
        &mut self,
        request: &mut RequestState,
        adapter: &mut dyn ServiceAdapter,
    ) -> ExchangeOutcome {
        let result = match self.send_request(request, adapter).await {
            Ok(()) => {
                self.delivered = true;
                self.transition(ExchangeState::AwaitingReply);
                self.await_reply(request, adapter).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(reuse) => {
                self.transition(ExchangeState::Completed);
                debug!(connection = self.conn.id(), reuse, "Exchange completed");
                ExchangeOutcome::Completed { reuse }
            }
            Err(e) => {
                self.transition(ExchangeState::Aborted);
                self.classify(request, e)
            }
        }
    }

    fn classify(&self, request: &RequestState, err: StepError) -> ExchangeOutcome {
        match err {
            StepError::Client(e) => ExchangeOutcome::ClientAbort(ConnectorError::ClientAbort(e)),
            StepError::Backend(e) if request.may_retry(self.delivered, self.options.recovery) => {
                ExchangeOutcome::RecoverableFailure(e)
            }
            StepError::Backend(e) => ExchangeOutcome::FatalFailure(e),
        }
    }

    async fn send_request(
        &mut self,
        request: &mut RequestState,
        adapter: &mut dyn ServiceAdapter,
    ) -> Step<()> {
        if !request.has_replay && request.body.has_body() {
            request
                .read_chunk(adapter, self.options.eager_body_cap)
                .await
                .map_err(StepError::Client)?;
            request.frame_scratch(self.options.protocol)?;
            request.has_replay = true;
        }

        self.conn.send_frame(&request.request).await?;
        if request.has_replay {
            trace!(
                connection = self.conn.id(),
                "Sending {} byte eager body chunk",
                request.replay.len()
            );
            self.conn.send_frame(&request.replay).await?;
        }
        Ok(())
    }

    async fn await_reply(
        &mut self,
        request: &mut RequestState,
        adapter: &mut dyn ServiceAdapter,
    ) -> Step<bool> {
        loop {
            let frame = self.conn.recv(self.options.reply_timeout).await?;
            let next = match Reply::decode(frame)? {
                Reply::Headers(head) => Next::Headers(head),
                Reply::BodyChunk(data) => {
                    adapter.write_body(data).await.map_err(StepError::Client)?;
                    continue;
                }
                Reply::GetBodyChunk(requested) => Next::SendBody(requested),
                Reply::EndResponse { reuse } => return Ok(reuse),
                Reply::CpongReply => {
                    return Err(
                        ConnectorError::Protocol("CPONG_REPLY during an exchange".to_string())
                            .into(),
                    );
                }
            };

            match next {
                Next::Headers(head) => {
                    if request.response_started {
                        return Err(ConnectorError::Protocol(
                            "second SEND_HEADERS in one exchange".to_string(),
                        )
                        .into());
                    }
                    debug!(
                        connection = self.conn.id(),
                        "Response {} {}",
                        head.status,
                        head.reason
                    );
                    request.response_started = true;
                    adapter
                        .start_response(&head)
                        .await
                        .map_err(StepError::Client)?;
                }
                Next::SendBody(requested) => {
                    self.transition(ExchangeState::StreamingUpload);
                    self.send_body(request, adapter, requested).await?;
                    self.transition(ExchangeState::AwaitingReply);
                }
            }
        }
    }

    /// Answer GET_BODY_CHUNK
    ///
    /// From here on the backend holds body bytes that cannot be replayed, so
    /// the request is no longer recoverable.
    async fn send_body(
        &mut self,
        request: &mut RequestState,
        adapter: &mut dyn ServiceAdapter,
        requested: u16,
    ) -> Step<()> {
        request.recoverable = false;

        let limit = usize::from(requested).min(max_body_for(self.conn.packet_size()));
        request
            .read_chunk(adapter, limit)
            .await
            .map_err(StepError::Client)?;
        request.frame_scratch(self.options.protocol)?;

        trace!(
            connection = self.conn.id(),
            requested,
            sent = request.scratch.len(),
            "Sending requested body chunk"
        );
        self.conn.send_frame(&request.replay).await?;
        Ok(())
    }
}
