//! HTTP delivery of encoded envelopes to the function platform.
//!
//! Every envelope is sent as a single asynchronous invocation: the receiver
//! is asked to queue the work (`X-tinyFaaS-Async: true`) and answer 202
//! right away, so the request only waits for acceptance, never for the
//! function itself.
//!
//! # Error Classification
//!
//! - Status 202 → `DeliveryOutcome::Accepted`
//! - Any other status → `DeliveryOutcome::Rejected`
//! - Timeout, connect and other request errors → `DeliveryOutcome::TransportFailure`
//!
//! No retry happens here.

use std::time::Duration;

use async_trait::async_trait;
use common::domain::{DeliveryOutcome, EnvelopeDelivery};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::error::{DeliveryError, DeliveryResult};

/// Header asking the platform to run the function asynchronously
pub const ASYNC_HEADER: &str = "X-tinyFaaS-Async";

const JSON_CONTENT_TYPE: &str = "application/json";
const UPDATE_PATH: &str = "update";

/// Configuration for the delivery client
#[derive(Debug, Clone)]
pub struct HttpDeliveryConfig {
    /// Whole-request timeout, connection included
    pub timeout: Duration,
}

impl Default for HttpDeliveryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

/// Build the `update` function URL from the platform base address
///
/// A trailing slash on the base is ignored.
pub fn update_url(base: &str) -> DeliveryResult<String> {
    let url = format!("{}/{}", base.trim_end_matches('/'), UPDATE_PATH);

    reqwest::Url::parse(&url).map_err(|e| DeliveryError::InvalidTarget {
        url: url.clone(),
        reason: e.to_string(),
    })?;

    Ok(url)
}

/// Delivery client backed by a pooled reqwest client
///
/// Cheap to clone and safe to share across tasks.
#[derive(Clone)]
pub struct HttpDeliveryClient {
    client: Client,
}

impl HttpDeliveryClient {
    pub fn new(config: HttpDeliveryConfig) -> DeliveryResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;

        debug!(timeout_ms = config.timeout.as_millis() as u64, "created HTTP delivery client");

        Ok(Self { client })
    }
}

#[async_trait]
impl EnvelopeDelivery for HttpDeliveryClient {
    async fn send(&self, target_url: &str, body: Vec<u8>) -> DeliveryOutcome {
        debug!(target_url = %target_url, size_bytes = body.len(), "posting envelope");

        let result = self
            .client
            .post(target_url)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .header(ASYNC_HEADER, "true")
            .body(body)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                debug!(target_url = %target_url, status, "receiver responded");
                // Only the status matters; drain so the connection can be reused
                let _ = response.bytes().await;
                DeliveryOutcome::from_status(status)
            }
            Err(e) => DeliveryOutcome::TransportFailure {
                cause: describe_transport_error(&e),
            },
        }
    }
}

/// Render a reqwest error as `<kind>: <message>: <source>...`
fn describe_transport_error(err: &reqwest::Error) -> String {
    let kind = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else {
        "request"
    };

    let mut cause = format!("{}: {}", kind, err);
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        cause.push_str(": ");
        cause.push_str(&inner.to_string());
        source = inner.source();
    }
    cause
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    #[derive(Debug, Clone)]
    struct CapturedRequest {
        content_type: Option<String>,
        async_header: Option<String>,
        body: Vec<u8>,
    }

    #[derive(Clone)]
    struct ReceiverState {
        status: StatusCode,
        delay: Duration,
        captured: Arc<Mutex<Vec<CapturedRequest>>>,
    }

    async fn handle_update(
        State(state): State<ReceiverState>,
        headers: HeaderMap,
        body: Bytes,
    ) -> StatusCode {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        state.captured.lock().unwrap().push(CapturedRequest {
            content_type: header("content-type"),
            async_header: header(ASYNC_HEADER),
            body: body.to_vec(),
        });
        tokio::time::sleep(state.delay).await;
        state.status
    }

    /// Start a local receiver answering every POST /update with `status`
    async fn spawn_receiver(
        status: StatusCode,
        delay: Duration,
    ) -> (String, Arc<Mutex<Vec<CapturedRequest>>>) {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let state = ReceiverState {
            status,
            delay,
            captured: Arc::clone(&captured),
        };
        let router = Router::new()
            .route("/update", post(handle_update))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        (format!("http://{}", addr), captured)
    }

    fn client() -> HttpDeliveryClient {
        HttpDeliveryClient::new(HttpDeliveryConfig::default()).unwrap()
    }

    #[test]
    fn test_update_url_appends_path() {
        assert_eq!(
            update_url("http://localhost:8000").unwrap(),
            "http://localhost:8000/update"
        );
    }

    #[test]
    fn test_update_url_trims_trailing_slash() {
        assert_eq!(
            update_url("http://tinyfaas:8000/").unwrap(),
            "http://tinyfaas:8000/update"
        );
    }

    #[test]
    fn test_update_url_rejects_garbage() {
        let err = update_url("not a url").unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidTarget { .. }));
    }

    #[test]
    fn test_default_timeout_is_five_seconds() {
        assert_eq!(HttpDeliveryConfig::default().timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_send_accepted() {
        let (base, captured) = spawn_receiver(StatusCode::ACCEPTED, Duration::ZERO).await;
        let target = update_url(&base).unwrap();

        let outcome = client().send(&target, br#"{"data":[],"meta":{}}"#.to_vec()).await;

        assert_eq!(outcome, DeliveryOutcome::Accepted);
        let requests = captured.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].content_type.as_deref(), Some("application/json"));
        assert_eq!(requests[0].async_header.as_deref(), Some("true"));
        assert_eq!(requests[0].body, br#"{"data":[],"meta":{}}"#.to_vec());
    }

    #[tokio::test]
    async fn test_send_non_202_statuses_are_rejected() {
        let statuses = [
            StatusCode::OK,
            StatusCode::BAD_REQUEST,
            StatusCode::NOT_FOUND,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::SERVICE_UNAVAILABLE,
        ];

        for status in statuses {
            let (base, captured) = spawn_receiver(status, Duration::ZERO).await;
            let target = update_url(&base).unwrap();

            let outcome = client().send(&target, b"{}".to_vec()).await;

            assert_eq!(
                outcome,
                DeliveryOutcome::Rejected {
                    status: status.as_u16()
                }
            );
            // Exactly one call, never retried
            assert_eq!(captured.lock().unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_send_unknown_path_is_rejected_with_404() {
        let (base, _captured) = spawn_receiver(StatusCode::ACCEPTED, Duration::ZERO).await;

        let outcome = client().send(&format!("{}/missing", base), b"{}".to_vec()).await;

        assert_eq!(outcome, DeliveryOutcome::Rejected { status: 404 });
    }

    #[tokio::test]
    async fn test_send_connection_refused_is_transport_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let started = std::time::Instant::now();
        let outcome = client()
            .send(&format!("http://{}/update", addr), b"{}".to_vec())
            .await;

        match outcome {
            DeliveryOutcome::TransportFailure { cause } => {
                assert!(cause.starts_with("connect"), "unexpected cause: {}", cause);
            }
            other => panic!("expected transport failure, got {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_send_slow_receiver_times_out() {
        let (base, _captured) =
            spawn_receiver(StatusCode::ACCEPTED, Duration::from_secs(2)).await;
        let client = HttpDeliveryClient::new(HttpDeliveryConfig {
            timeout: Duration::from_millis(200),
        })
        .unwrap();

        let outcome = client.send(&update_url(&base).unwrap(), b"{}".to_vec()).await;

        match outcome {
            DeliveryOutcome::TransportFailure { cause } => {
                assert!(cause.starts_with("timeout"), "unexpected cause: {}", cause);
            }
            other => panic!("expected transport failure, got {:?}", other),
        }
    }
}
