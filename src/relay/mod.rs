// Copyright 2026 The Careerline Project
// SPDX-License-Identifier: Apache-2.0

// Chat relay
//
// Responsibilities:
// - POST /api/chat: tolerant prompt extraction, throttle, preamble injection
// - Open one upstream generation per request via the injected ModelClient
// - Relay each fragment to the response body as soon as it arrives
// - Setup faults -> complete JSON error; mid-stream faults -> in-band frame
// - Heartbeat endpoint

mod framing;

pub use framing::{
    Framing, DONE_EVENT, ERROR_EVENT, EVENT_STREAM_CONTENT_TYPE, PLAIN_TEXT_CONTENT_TYPE,
    STREAM_INTERRUPTED_MARKER,
};

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};
use http_body_util::LengthLimitError;
use serde::Serialize;
use uuid::Uuid;

use crate::config::{Config, DEFAULT_MAX_BODY_BYTES};
use crate::message::extract_user_prompt;
use crate::model::{ModelClient, ModelError, TextStream};
use crate::prompt::compose_prompt;
use crate::throttle::Throttle;

pub const CHAT_PATH: &str = "/api/chat";
pub const HEARTBEAT_PATH: &str = "/api/heartbeat";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures that happen before any response bytes are streamed.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("failed to read request body: {0}")]
    BodyRead(String),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("request body is not valid JSON: {0}")]
    MalformedJson(String),

    #[error(transparent)]
    Upstream(#[from] ModelError),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::BodyRead(_) | RelayError::MalformedJson(_) => StatusCode::BAD_REQUEST,
            RelayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::Upstream(e) => e
                .status()
                .and_then(|s| StatusCode::from_u16(s).ok())
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

/// JSON body of every pre-stream failure.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, [(CACHE_CONTROL, "no-store")], Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Shared state injected into axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub model: Arc<dyn ModelClient>,
    pub throttle: Arc<dyn Throttle>,
    pub preamble: Arc<str>,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(
        model: Arc<dyn ModelClient>,
        throttle: Arc<dyn Throttle>,
        preamble: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            model,
            throttle,
            preamble: preamble.into(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn from_config(
        config: &Config,
        model: Arc<dyn ModelClient>,
        throttle: Arc<dyn Throttle>,
    ) -> Self {
        Self::new(model, throttle, config.prompt.preamble.as_str())
            .with_max_body_bytes(config.server.max_body_bytes)
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }
}

// ---------------------------------------------------------------------------
// Relay stream
// ---------------------------------------------------------------------------

/// Per-request context for structured logging.
#[derive(Debug, Clone)]
pub struct RelayContext {
    pub request_id: String,
    pub model: String,
    started: Instant,
}

impl RelayContext {
    pub fn new(request_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            model: model.into(),
            started: Instant::now(),
        }
    }
}

enum RelayPhase {
    Streaming,
    Closed,
}

struct RelayState {
    upstream: TextStream,
    framing: Framing,
    ctx: RelayContext,
    phase: RelayPhase,
    chunks: usize,
    bytes: usize,
}

/// Re-emit upstream fragments as response body frames.
///
/// Every fragment is framed and yielded as soon as it arrives. An upstream
/// fault yields one error frame and ends the stream; the upstream is never
/// polled again after a fault or after it ends.
pub fn relay_stream(
    upstream: TextStream,
    framing: Framing,
    ctx: RelayContext,
) -> impl Stream<Item = Bytes> + Send {
    let state = RelayState {
        upstream,
        framing,
        ctx,
        phase: RelayPhase::Streaming,
        chunks: 0,
        bytes: 0,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let RelayPhase::Closed = state.phase {
                return None;
            }

            match state.upstream.next().await {
                Some(Ok(text)) => {
                    if text.is_empty() {
                        continue;
                    }
                    let frame = state.framing.encode_text(&text);
                    state.chunks += 1;
                    state.bytes += text.len();
                    return Some((frame, state));
                }
                Some(Err(e)) => {
                    tracing::warn!(
                        request_id = %state.ctx.request_id,
                        model = %state.ctx.model,
                        chunks = state.chunks,
                        bytes = state.bytes,
                        error = %e,
                        "upstream stream interrupted"
                    );
                    state.phase = RelayPhase::Closed;
                    let frame = state.framing.encode_error(&e.to_string());
                    return Some((frame, state));
                }
                None => {
                    tracing::info!(
                        request_id = %state.ctx.request_id,
                        model = %state.ctx.model,
                        chunks = state.chunks,
                        bytes = state.bytes,
                        latency_ms = state.ctx.started.elapsed().as_secs_f64() * 1000.0,
                        "stream complete"
                    );
                    state.phase = RelayPhase::Closed;
                    return state.framing.encode_done().map(|frame| (frame, state));
                }
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Heartbeat endpoint: GET /api/heartbeat -> 200 OK
pub async fn heartbeat() -> StatusCode {
    StatusCode::OK
}

/// Whether a body read failed because it ran past the size limit. Catches
/// bodies without a `Content-Length`, which the header check cannot see.
fn exceeds_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

/// POST /api/chat
pub async fn chat_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let framing = Framing::negotiate(request.headers());

    let declared_len = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared_len.is_some_and(|len| len > state.max_body_bytes) {
        return RelayError::PayloadTooLarge {
            limit: state.max_body_bytes,
        }
        .into_response();
    }

    let body = match axum::body::to_bytes(request.into_body(), state.max_body_bytes).await {
        Ok(b) => b,
        Err(e) if exceeds_length_limit(&e) => {
            return RelayError::PayloadTooLarge {
                limit: state.max_body_bytes,
            }
            .into_response()
        }
        Err(e) => return RelayError::BodyRead(e.to_string()).into_response(),
    };

    let json: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::info!(request_id = %request_id, error = %e, "rejected non-JSON chat request");
            return RelayError::MalformedJson(e.to_string()).into_response();
        }
    };

    let user_prompt = extract_user_prompt(&json);
    tracing::debug!(
        request_id = %request_id,
        turns = json.get("messages").and_then(|m| m.as_array()).map_or(0, |m| m.len()),
        prompt_chars = user_prompt.chars().count(),
        "chat request received"
    );

    let throttle_start = Instant::now();
    state.throttle.acquire().await;
    let throttle_ms = throttle_start.elapsed().as_secs_f64() * 1000.0;

    let prompt = compose_prompt(&state.preamble, &user_prompt);
    let model = state.model.model_name().to_string();

    let upstream = match state.model.stream_generate(&prompt).await {
        Ok(stream) => stream,
        Err(e) => {
            let err = RelayError::from(e);
            tracing::warn!(
                request_id = %request_id,
                model = %model,
                status = err.status().as_u16(),
                error = %err,
                "upstream call failed before streaming"
            );
            return err.into_response();
        }
    };

    tracing::info!(
        request_id = %request_id,
        model = %model,
        throttle = state.throttle.name(),
        throttle_ms,
        framing = ?framing,
        "upstream stream opened"
    );

    let ctx = RelayContext::new(request_id, model);
    let body = relay_stream(upstream, framing, ctx).map(Ok::<Bytes, std::io::Error>);

    let mut response = Response::new(Body::from_stream(body));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(framing.content_type()));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// Build the axum router with the chat and heartbeat endpoints.
///
/// The model client and throttle are injected through `AppState`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(CHAT_PATH, post(chat_handler))
        .route(HEARTBEAT_PATH, get(heartbeat))
        .with_state(state)
}
