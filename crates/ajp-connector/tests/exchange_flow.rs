//! End-to-end AJP13 exchanges against a scripted backend

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::time::Duration;

use ajp_connector::{AjpWorker, ConnectorError, MemoryService, ServiceAdapter, WorkerConfig};
use ajp_wire::response::encode_get_body_chunk;
use ajp_wire::{ForwardRequest, Protocol, ResponseHead};
use async_trait::async_trait;
use common::MockBackend;
use pretty_assertions::assert_eq;

fn worker_for(backend: &MockBackend) -> AjpWorker {
    AjpWorker::new(WorkerConfig::ajp13("127.0.0.1", backend.port()))
        .expect("Operation should succeed")
}

fn get(uri: &str) -> MemoryService {
    MemoryService::without_body(ForwardRequest::new("GET", uri).header("host", "localhost"))
}

#[tokio::test]
async fn test_get_request_reuses_pooled_connection() {
    let backend = MockBackend::start(Protocol::Ajp13, |_, mut conn| async move {
        conn.serve().await;
    })
    .await;
    let worker = worker_for(&backend);

    for uri in ["/first", "/second", "/third"] {
        let mut service = get(uri);
        worker
            .service(&mut service)
            .await
            .expect("Operation should succeed");

        let head = service.response().expect("Operation should succeed");
        assert_eq!(head.status, 200);
        assert_eq!(head.header_value("content-type"), Some("text/plain"));
        assert_eq!(service.body(), format!("GET {uri} 0").as_bytes());
        assert_eq!(service.response_starts(), 1);
    }

    assert_eq!(backend.accepted(), 1);
    assert_eq!(worker.pool().idle_count(), 1);
}

#[tokio::test]
async fn test_post_body_streams_on_demand() {
    let backend = MockBackend::start(Protocol::Ajp13, |_, mut conn| async move {
        conn.serve().await;
    })
    .await;
    let worker = worker_for(&backend);

    let body: Vec<u8> = (0..20 * 1024).map(|i| (i % 251) as u8).collect();
    let mut service = MemoryService::new(ForwardRequest::new("POST", "/upload"), body);
    worker
        .service(&mut service)
        .await
        .expect("Operation should succeed");

    assert_eq!(service.body(), b"POST /upload 20480");
    assert_eq!(service.unread(), 0);
}

#[tokio::test]
async fn test_recovers_on_third_attempt() {
    let backend = MockBackend::start(Protocol::Ajp13, |index, mut conn| async move {
        if index < 2 {
            // Take the request, then drop the connection
            let _ = conn.read_request().await;
            return;
        }
        conn.serve().await;
    })
    .await;
    let worker = worker_for(&backend);

    let mut service = get("/flaky");
    worker
        .service(&mut service)
        .await
        .expect("Operation should succeed");

    assert_eq!(service.response_starts(), 1);
    assert_eq!(service.body(), b"GET /flaky 0");
    assert_eq!(backend.accepted(), 3);
}

#[tokio::test]
async fn test_eager_body_is_replayed_on_retry() {
    let backend = MockBackend::start(Protocol::Ajp13, |index, mut conn| async move {
        if index == 0 {
            let _ = conn.read_request().await;
            let _ = conn.read_body_chunk().await;
            return;
        }
        conn.serve().await;
    })
    .await;
    let worker = worker_for(&backend);

    let mut service = MemoryService::new(ForwardRequest::new("PUT", "/small"), "tiny payload");
    worker
        .service(&mut service)
        .await
        .expect("Operation should succeed");

    assert_eq!(service.body(), b"PUT /small 12");
    assert_eq!(backend.accepted(), 2);
}

#[tokio::test]
async fn test_retries_exhausted() {
    let backend = MockBackend::start(Protocol::Ajp13, |_, mut conn| async move {
        let _ = conn.read_request().await;
    })
    .await;
    let worker = worker_for(&backend);

    let mut service = get("/down");
    let err = worker
        .service(&mut service)
        .await
        .expect_err("Test operation should fail");

    match err {
        ConnectorError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, ConnectorError::ConnectionClosed));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(service.response_starts(), 0);
    assert_eq!(backend.accepted(), 3);
}

#[tokio::test]
async fn test_failure_after_body_request_is_not_retried() {
    let backend = MockBackend::start(Protocol::Ajp13, |_, mut conn| async move {
        let _ = conn.read_request().await;
        let _ = conn.read_body_chunk().await;
        conn.write(|buf| encode_get_body_chunk(buf, 8186)).await;
        let _ = conn.read_body_chunk().await;
        // Backend dies holding part of the body
    })
    .await;
    let worker = worker_for(&backend);

    let mut service = MemoryService::new(ForwardRequest::new("POST", "/upload"), vec![1u8; 20 * 1024]);
    let err = worker
        .service(&mut service)
        .await
        .expect_err("Test operation should fail");

    assert!(matches!(err, ConnectorError::NonRecoverable(_)));
    assert_eq!(backend.accepted(), 1);
}

#[tokio::test]
async fn test_connection_without_reuse_flag_is_not_pooled() {
    let backend = MockBackend::start(Protocol::Ajp13, |_, mut conn| async move {
        while conn.read_request().await.is_some() {
            conn.respond(200, b"bye", false).await;
        }
    })
    .await;
    let worker = worker_for(&backend);

    for _ in 0..2 {
        let mut service = get("/close");
        worker
            .service(&mut service)
            .await
            .expect("Operation should succeed");
        assert_eq!(service.body(), b"bye");
    }

    assert_eq!(worker.pool().idle_count(), 0);
    assert_eq!(backend.accepted(), 2);
}

#[tokio::test]
async fn test_reply_timeout() {
    let backend = MockBackend::start(Protocol::Ajp13, |_, mut conn| async move {
        let _ = conn.read_request().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(conn);
    })
    .await;
    let mut config = WorkerConfig::ajp13("127.0.0.1", backend.port());
    config.reply_timeout = Duration::from_millis(50);
    config.retry.max_attempts = 2;
    let worker = AjpWorker::new(config).expect("Operation should succeed");

    let err = worker
        .service(&mut get("/slow"))
        .await
        .expect_err("Test operation should fail");

    match err {
        ConnectorError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 2);
            assert!(matches!(*last, ConnectorError::Timeout(_)));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_prepost_cping_before_reuse() {
    let backend = MockBackend::start(Protocol::Ajp13, |_, mut conn| async move {
        conn.serve_with_cping().await;
    })
    .await;
    let mut config = WorkerConfig::ajp13("127.0.0.1", backend.port());
    config.prepost_timeout = Duration::from_secs(1);
    config.connect_timeout = Duration::from_secs(1);
    let worker = AjpWorker::new(config).expect("Operation should succeed");

    for uri in ["/one", "/two"] {
        let mut service = get(uri);
        worker
            .service(&mut service)
            .await
            .expect("Operation should succeed");
        assert_eq!(service.body(), format!("GET {uri}").as_bytes());
    }

    let rtt = worker
        .cping(Duration::from_secs(1))
        .await
        .expect("Operation should succeed");
    assert!(rtt < Duration::from_secs(1));
    assert_eq!(backend.accepted(), 1);
}

#[tokio::test]
async fn test_request_secret_is_forwarded() {
    let backend = MockBackend::start(Protocol::Ajp13, |_, mut conn| async move {
        while let Some(request) = conn.read_request().await {
            let status = if request.secret.as_deref() == Some("shared") {
                200
            } else {
                403
            };
            conn.respond(status, b"", true).await;
        }
    })
    .await;
    let mut config = WorkerConfig::ajp13("127.0.0.1", backend.port());
    config.secret = Some("shared".to_string());
    let worker = AjpWorker::new(config).expect("Operation should succeed");

    let mut service = get("/secured");
    worker
        .service(&mut service)
        .await
        .expect("Operation should succeed");
    assert_eq!(service.response().map(|h| h.status), Some(200));
}

/// Adapter whose client disconnects before sending its body
struct VanishingClient {
    request: ForwardRequest,
}

#[async_trait]
impl ServiceAdapter for VanishingClient {
    fn request(&self) -> &ForwardRequest {
        &self.request
    }

    async fn read_body(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        Err(std::io::Error::from(std::io::ErrorKind::ConnectionReset))
    }

    async fn start_response(&mut self, _head: &ResponseHead) -> std::io::Result<()> {
        Ok(())
    }

    async fn write_body(&mut self, _data: &[u8]) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_client_abort_is_reported_distinctly() {
    let backend = MockBackend::start(Protocol::Ajp13, |_, mut conn| async move {
        conn.serve().await;
    })
    .await;
    let worker = worker_for(&backend);

    let mut client = VanishingClient {
        request: ForwardRequest::new("POST", "/upload").header("content-length", "64"),
    };
    let err = worker
        .service(&mut client)
        .await
        .expect_err("Test operation should fail");

    assert!(err.is_client_abort());
    assert!(matches!(err, ConnectorError::ClientAbort(_)));
    assert_eq!(worker.pool().idle_count(), 0);
}
