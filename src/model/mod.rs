// Copyright 2026 The Careerline Project
// SPDX-License-Identifier: Apache-2.0

// Upstream generative model
//
// Responsibilities:
// - Injectable `ModelClient` trait used by the relay
// - Gemini implementation over reqwest (streamGenerateContent, SSE)
// - SSE line decoding tolerant of arbitrary chunk boundaries
// - Error taxonomy separating setup faults from mid-stream faults

mod gemini;
mod sse;

pub use gemini::GeminiClient;
pub use sse::{SseDecoder, SseEvent};

use async_trait::async_trait;
use futures_util::stream::Stream;
use std::pin::Pin;

/// Lazy, finite, non-restartable sequence of generated text fragments.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ModelError>> + Send>>;

/// Errors raised by a model client.
///
/// Returned from `stream_generate` they are setup faults (nothing streamed
/// yet). Yielded from a `TextStream` they are mid-stream faults.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("missing API key: environment variable {env_var} is not set")]
    MissingApiKey { env_var: String },

    #[error("upstream request failed: {0}")]
    Transport(String),

    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("response blocked: {0}")]
    Blocked(String),

    #[error("malformed upstream chunk: {0}")]
    MalformedChunk(String),
}

impl ModelError {
    /// HTTP status carried by the fault, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ModelError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Abstraction over the external generative model.
///
/// Implementations must be Send + Sync so they can be shared across request
/// handlers via `Arc`.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Open a streaming generation for `prompt`.
    ///
    /// Resolves once the upstream has accepted the call; text arrives through
    /// the returned stream.
    async fn stream_generate(&self, prompt: &str) -> Result<TextStream, ModelError>;

    /// Model identifier, for logs.
    fn model_name(&self) -> &str;
}
