//! Single HTTP exchange with the reporting service.
//!
//! A [`Transport`] sends one [`PendingRequest`] and hands back the fully read
//! [`Response`]. It does not retry or interpret status codes; that is the job
//! of [`crate::executor::Executor`]. The default transport is backed by
//! `reqwest`; tests and embedders may plug in their own.

use bytes::Bytes;
use http::{header::HeaderMap, Method, StatusCode};
use std::time::Duration;
use tracing::*;
use url::Url;

use crate::error::TransportError;

pub const APPLICATION_JSON: &str = "application/json";

/// Named part of a `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq)]
pub struct FormPart {
    pub name: String,
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Body {
    #[default]
    Empty,
    /// Encoded JSON document.
    Json(Bytes),
    /// Form parts. The transport picks the boundary and content type.
    Multipart(Vec<FormPart>),
}

/// Request ready to be sent. Cloned for every attempt, never retained after the call.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Body,
}

impl PendingRequest {
    pub fn new(method: Method, url: Url) -> PendingRequest {
        PendingRequest {
            method,
            url,
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    /// Content type of the body, `None` for multipart bodies whose boundary is
    /// chosen by the transport.
    pub fn content_type(&self) -> Option<&'static str> {
        match self.body {
            Body::Json(_) => Some(APPLICATION_JSON),
            Body::Empty | Body::Multipart(_) => None,
        }
    }
}

/// Fully read response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    /// `Content-Type` header of the response, when present and readable.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Performs one request/response exchange.
    ///
    /// Returns `Err` only when no response was obtained. Responses with error
    /// status codes are returned as `Ok`.
    async fn send(&self, request: PendingRequest) -> Result<Response, TransportError>;
}

/// [`Transport`] backed by `reqwest::Client`.
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    pub(crate) inner: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<ReqwestTransport, TransportError> {
        let inner = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(ReqwestTransport { inner })
    }

    pub fn with_client(inner: reqwest::Client) -> ReqwestTransport {
        ReqwestTransport { inner }
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: PendingRequest) -> Result<Response, TransportError> {
        let content_type = request.content_type();
        let PendingRequest {
            method,
            url,
            headers,
            body,
        } = request;
        debug!("Requesting {method} {url}");

        let mut builder = self.inner.request(method, url).headers(headers);
        if let Some(content_type) = content_type {
            builder = builder.header(http::header::CONTENT_TYPE, content_type);
        }
        builder = match body {
            Body::Empty => builder,
            Body::Json(bytes) => builder.body(bytes),
            Body::Multipart(parts) => {
                let mut form = reqwest::multipart::Form::new();
                for part in parts {
                    let data = reqwest::multipart::Part::bytes(part.data.to_vec())
                        .mime_str(&part.content_type)?;
                    form = form.part(part.name, data);
                }
                builder.multipart(form)
            }
        };

        let res = builder.send().await?;
        let status = res.status();
        let headers = res.headers().clone();
        let body = res.bytes().await?;

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn sends_json_body() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/echo")
            .match_header("content-type", APPLICATION_JSON)
            .match_header("x-custom", "1")
            .match_body(r#"{"a":1}"#)
            .with_status(201)
            .with_body("created")
            .create_async()
            .await;

        let mut request = PendingRequest::new(
            Method::POST,
            Url::parse(&format!("{}/echo", server.url())).unwrap(),
        );
        request.headers.insert("x-custom", "1".parse().unwrap());
        request.body = Body::Json(Bytes::from_static(br#"{"a":1}"#));

        let res = ReqwestTransport::default().send(request).await?;
        mock.assert_async().await;
        assert_eq!(res.status, StatusCode::CREATED);
        assert_eq!(res.text(), "created");
        Ok(())
    }

    #[tokio::test]
    async fn keeps_response_headers() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/item")
            .with_header("content-type", APPLICATION_JSON)
            .with_header("x-request-id", "abc")
            .with_body("{}")
            .create_async()
            .await;

        let request = PendingRequest::new(Method::GET, Url::parse(&server.url())?.join("/item")?);
        let res = ReqwestTransport::default().send(request).await?;

        assert_eq!(res.content_type(), Some(APPLICATION_JSON));
        assert_eq!(res.headers["x-request-id"], "abc");
        Ok(())
    }

    #[tokio::test]
    async fn error_status_is_not_a_transport_error() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .with_body("nope")
            .create_async()
            .await;

        let request = PendingRequest::new(
            Method::GET,
            Url::parse(&format!("{}/missing", server.url())).unwrap(),
        );
        let res = ReqwestTransport::default().send(request).await?;
        assert_eq!(res.status, StatusCode::NOT_FOUND);
        assert_eq!(res.text(), "nope");
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        let request = PendingRequest::new(
            Method::GET,
            Url::parse("http://127.0.0.1:1/unreachable").unwrap(),
        );
        let res = ReqwestTransport::default().send(request).await;
        assert!(matches!(res, Err(TransportError::Http(_))));
    }

    #[test]
    fn content_type_follows_body() {
        let url = Url::parse("http://localhost/").unwrap();
        let mut request = PendingRequest::new(Method::POST, url);
        assert_eq!(request.content_type(), None);
        request.body = Body::Json(Bytes::new());
        assert_eq!(request.content_type(), Some(APPLICATION_JSON));
    }
}
