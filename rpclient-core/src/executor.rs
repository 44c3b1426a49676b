//! Retrying request executor.
//!
//! Every call to the reporting service goes through [`Executor::execute`]. One
//! attempt ends in exactly one of three ways:
//!
//! ```text
//!  send ──> transport error ───────────────┐
//!   │                                      ├─> retry while attempts remain
//!   ├──> status >= 400, body drained ──────┘      else RetriesExhausted(last)
//!   │
//!   └──> status < 400 ──> decode body ──> Ok(T)
//!                              └────────> Decode error (never retried)
//! ```
//!
//! Delays between attempts follow the exponential backoff of
//! [`RetryConfig::backoff`].

use backon::Retryable;
use serde::de::DeserializeOwned;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tracing::*;

use crate::{
    config::RetryConfig,
    masking::mask_headers,
    transport::{Body, PendingRequest, Transport},
    Error, Result,
};

#[derive(Clone)]
pub struct Executor {
    transport: Arc<dyn Transport>,
    retry: RetryConfig,
    dump_transport: bool,
}

impl Executor {
    pub fn new(transport: Arc<dyn Transport>, retry: RetryConfig) -> Executor {
        Executor {
            transport,
            retry,
            dump_transport: false,
        }
    }

    /// Log every request and response at debug level, credentials masked.
    pub fn dump_transport(mut self, enabled: bool) -> Executor {
        self.dump_transport = enabled;
        self
    }

    /// Initial attempt plus the configured retries.
    pub fn max_attempts(&self) -> usize {
        self.retry.count + 1
    }

    /// Send `request` until it succeeds or the retry budget is spent, then
    /// decode the response body as `T`.
    pub async fn execute<T: DeserializeOwned>(&self, request: PendingRequest) -> Result<T> {
        let attempts = AtomicUsize::new(0);
        let attempt = || self.attempt::<T>(&request, &attempts);

        let res = attempt
            .retry(self.retry.backoff())
            .when(Error::is_retryable)
            .notify(|err, delay| {
                debug!(
                    "retrying {} {} in {delay:?} after: {err}",
                    request.method, request.url
                );
            })
            .await;

        match res {
            Ok(value) => Ok(value),
            Err(last) if last.is_retryable() => {
                let attempts = attempts.load(Ordering::Relaxed);
                error!(
                    "{} {} failed after {attempts} attempts",
                    request.method, request.url
                );
                Err(Error::RetriesExhausted {
                    attempts,
                    last: Box::new(last),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        request: &PendingRequest,
        attempts: &AtomicUsize,
    ) -> Result<T> {
        let n = attempts.fetch_add(1, Ordering::Relaxed) + 1;
        let max = self.max_attempts();

        if self.dump_transport {
            let body = match &request.body {
                Body::Empty => String::new(),
                Body::Json(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                Body::Multipart(parts) => format!("<multipart: {} parts>", parts.len()),
            };
            debug!(
                "> [{n}/{max}] {} {} headers={:?} body={body}",
                request.method,
                request.url,
                mask_headers(&request.headers)
            );
        }

        let res = match self.transport.send(request.clone()).await {
            Ok(res) => res,
            Err(e) => {
                error!(
                    "[{n}/{max}] {} {} transport error: {e}",
                    request.method, request.url
                );
                return Err(e.into());
            }
        };

        if res.status.as_u16() >= 400 {
            let body = res.text();
            error!("[{n}/{max}] request failed: status: {}, body: {body}", res.status);
            return Err(Error::RemoteRejected {
                status: res.status,
                body,
            });
        }

        if self.dump_transport {
            debug!(
                "< [{n}/{max}] {} content-type={:?} body={}",
                res.status,
                res.content_type(),
                res.text()
            );
        }

        serde_json::from_slice(&res.body).map_err(Error::Decode)
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::{error::TransportError, transport::Response};
    use bytes::Bytes;
    use http::{header::HeaderMap, Method, StatusCode};
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use std::{collections::VecDeque, sync::Mutex};
    use test_case::test_case;
    use url::Url;

    /// Transport replaying a fixed list of outcomes and counting calls.
    #[derive(Default)]
    pub(crate) struct Scripted {
        outcomes: Mutex<VecDeque<std::result::Result<(u16, &'static str), &'static str>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        pub fn new(
            outcomes: impl IntoIterator<Item = std::result::Result<(u16, &'static str), &'static str>>,
        ) -> Arc<Scripted> {
            Arc::new(Scripted {
                outcomes: Mutex::new(outcomes.into_iter().collect()),
                calls: AtomicUsize::new(0),
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Transport for Scripted {
        async fn send(
            &self,
            _request: PendingRequest,
        ) -> std::result::Result<Response, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err("script exhausted"));
            match next {
                Ok((status, body)) => Ok(Response {
                    status: StatusCode::from_u16(status).unwrap(),
                    headers: HeaderMap::new(),
                    body: Bytes::from_static(body.as_bytes()),
                }),
                Err(msg) => Err(TransportError::Other(msg.to_string())),
            }
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Created {
        id: String,
    }

    fn request() -> PendingRequest {
        PendingRequest::new(
            Method::POST,
            Url::parse("http://localhost/api/v1/proj/launch").unwrap(),
        )
    }

    fn executor(transport: Arc<Scripted>, retries: usize) -> Executor {
        Executor::new(transport, RetryConfig::immediate(retries)).dump_transport(true)
    }

    #[test_case(0; "first attempt")]
    #[test_case(1; "after one failure")]
    #[test_case(2; "after two failures")]
    #[tokio::test]
    async fn succeeds_after_k_rejections(k: usize) -> eyre::Result<()> {
        let outcomes = std::iter::repeat(Ok((500, "boom")))
            .take(k)
            .chain([Ok((200, r#"{"id":"launch"}"#))]);
        let transport = Scripted::new(outcomes);

        let created: Created = executor(transport.clone(), 3).execute(request()).await?;

        assert_eq!(created, Created { id: "launch".into() });
        assert_eq!(transport.calls(), k + 1);
        Ok(())
    }

    #[tokio::test]
    async fn always_rejected_exhausts_retries() {
        let transport = Scripted::new(std::iter::repeat(Ok((500, "boom"))).take(10));

        let err = executor(transport.clone(), 3)
            .execute::<Created>(request())
            .await
            .unwrap_err();

        assert_eq!(transport.calls(), 4);
        match err {
            Error::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 4);
                assert!(
                    matches!(*last, Error::RemoteRejected { status, ref body } if status == StatusCode::INTERNAL_SERVER_ERROR && body == "boom")
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn client_errors_are_retried_too() {
        let transport = Scripted::new(std::iter::repeat(Ok((404, "missing"))).take(10));

        let err = executor(transport.clone(), 2)
            .execute::<Created>(request())
            .await
            .unwrap_err();

        assert_eq!(transport.calls(), 3);
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn transport_errors_are_retried() -> eyre::Result<()> {
        let transport = Scripted::new([
            Err("connection refused"),
            Err("timed out"),
            Ok((201, r#"{"id":"x"}"#)),
        ]);

        let created: Created = executor(transport.clone(), 3).execute(request()).await?;

        assert_eq!(created.id, "x");
        assert_eq!(transport.calls(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn exhausted_keeps_last_transport_error() {
        let transport = Scripted::new([Ok((500, "boom")), Err("connection reset")]);

        let err = executor(transport.clone(), 1)
            .execute::<Created>(request())
            .await
            .unwrap_err();

        assert_eq!(transport.calls(), 2);
        assert!(matches!(
            err,
            Error::RetriesExhausted { attempts: 2, ref last } if matches!(**last, Error::Transport(_))
        ));
    }

    #[tokio::test]
    async fn malformed_success_body_is_not_retried() {
        let transport = Scripted::new([Ok((200, "<html>")), Ok((200, r#"{"id":"x"}"#))]);

        let err = executor(transport.clone(), 3)
            .execute::<Created>(request())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Decode(_)));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn zero_retries_means_single_attempt() {
        let transport = Scripted::new([Ok((503, "")), Ok((200, r#"{"id":"x"}"#))]);

        let err = executor(transport.clone(), 0)
            .execute::<Created>(request())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RetriesExhausted { attempts: 1, .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn retries_against_http_server() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let m1 = server
            .mock("POST", "/api/v1/proj/launch")
            .with_status(500)
            .expect(2)
            .create_async()
            .await;
        let m2 = server
            .mock("POST", "/api/v1/proj/launch")
            .with_status(200)
            .with_body(r#"{"id":"launch"}"#)
            .expect(1)
            .create_async()
            .await;

        let url = Url::parse(&server.url())?.join("/api/v1/proj/launch")?;
        let executor = Executor::new(
            Arc::new(crate::transport::ReqwestTransport::default()),
            RetryConfig::immediate(3),
        );
        let created: Created = executor
            .execute(PendingRequest::new(Method::POST, url))
            .await?;

        m1.assert_async().await;
        m2.assert_async().await;
        assert_eq!(created.id, "launch");
        Ok(())
    }
}
