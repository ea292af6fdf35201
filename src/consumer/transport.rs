// Copyright 2026 The Careerline Project
// SPDX-License-Identifier: Apache-2.0

// Chat transport
//
// The controller talks to the relay through `ChatTransport` so tests can
// script responses without a socket. `ReqwestTransport` is the HTTP
// implementation used by the terminal client.

use std::pin::Pin;

use async_trait::async_trait;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::StatusCode;
use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};

use crate::message::ChatRequest;
use crate::relay::{Framing, EVENT_STREAM_CONTENT_TYPE, PLAIN_TEXT_CONTENT_TYPE};

/// Response body as a stream of raw reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to read response body: {0}")]
    Body(String),
}

/// Status line and body of a chat response.
///
/// `body` is `None` when the response has no readable body at all.
pub struct TransportResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Option<ByteStream>,
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// POST the conversation and return as soon as the status line arrives.
    async fn post_chat(&self, request: &ChatRequest) -> Result<TransportResponse, TransportError>;
}

/// HTTP transport over a shared reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    endpoint: String,
    framing: Framing,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            framing: Framing::PlainText,
        }
    }

    /// Ask the relay for a specific framing via the Accept header.
    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn accept(&self) -> &'static str {
        match self.framing {
            Framing::PlainText => PLAIN_TEXT_CONTENT_TYPE,
            Framing::EventStream => EVENT_STREAM_CONTENT_TYPE,
        }
    }
}

#[async_trait]
impl ChatTransport for ReqwestTransport {
    async fn post_chat(&self, request: &ChatRequest) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, self.accept())
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Body(e.to_string())));

        Ok(TransportResponse {
            status,
            content_type,
            body: Some(Box::pin(body)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Turn;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn hello_request() -> ChatRequest {
        ChatRequest::from_turns(&[Turn::user("hello")])
    }

    async fn collect(body: ByteStream) -> Vec<u8> {
        body.map(|chunk| chunk.expect("chunk"))
            .fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                acc
            })
            .await
    }

    #[tokio::test]
    async fn posts_json_and_exposes_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(header("accept", PLAIN_TEXT_CONTENT_TYPE))
            .and(body_json(serde_json::json!({
                "messages": [{"role": "user", "parts": [{"text": "hello"}]}]
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", PLAIN_TEXT_CONTENT_TYPE)
                    .set_body_string("Hi there"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transport =
            ReqwestTransport::new(reqwest::Client::new(), format!("{}/api/chat", server.uri()));
        let response = transport.post_chat(&hello_request()).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.content_type.as_deref(), Some(PLAIN_TEXT_CONTENT_TYPE));
        let body = collect(response.body.expect("body")).await;
        assert_eq!(body, b"Hi there");
    }

    #[tokio::test]
    async fn event_stream_framing_sets_accept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("accept", EVENT_STREAM_CONTENT_TYPE))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(reqwest::Client::new(), server.uri())
            .with_framing(Framing::EventStream);
        let response = transport.post_chat(&hello_request()).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn error_status_is_returned_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("{\"error\":\"slow down\"}"))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(reqwest::Client::new(), server.uri());
        let response = transport.post_chat(&hello_request()).await.unwrap();
        assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_request_error() {
        let server = MockServer::start().await;
        let uri = server.uri();
        drop(server);

        let transport = ReqwestTransport::new(reqwest::Client::new(), uri);
        let err = transport.post_chat(&hello_request()).await.unwrap_err();
        assert!(matches!(err, TransportError::Request(_)));
    }
}
