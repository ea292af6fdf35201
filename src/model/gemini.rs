// Copyright 2026 The Careerline Project
// SPDX-License-Identifier: Apache-2.0

// Gemini streaming client
//
// POST {base}/v1beta/models/{model}:streamGenerateContent?alt=sse
// Each SSE `data:` payload is a GenerateContentResponse; the fragment text
// is the concatenation of the first candidate's parts.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use super::sse::{SseDecoder, SseEvent};
use super::{ModelClient, ModelError, TextStream};
use crate::config::ModelConfig;

/// Finish reasons that fail the chunk even when it carries text.
const WITHHELD_FINISH_REASONS: &[&str] = &["SAFETY", "RECITATION"];

/// Finish reasons for which an empty candidate means the output was withheld.
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
];

/// Streaming client for the Gemini `generateContent` API.
///
/// The API key is looked up in the environment on every call, so a key set
/// or rotated after startup is picked up and a missing key fails only the
/// request that needs it.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key_env: String,
}

impl GeminiClient {
    pub fn new(http: reqwest::Client, config: &ModelConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.name.clone(),
            api_key_env: config.api_key_env.clone(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        )
    }

    fn api_key(&self) -> Result<String, ModelError> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(ModelError::MissingApiKey {
                env_var: self.api_key_env.clone(),
            }),
        }
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn stream_generate(&self, prompt: &str) -> Result<TextStream, ModelError> {
        let api_key = self.api_key()?;

        let request = GenerateContentRequest {
            contents: [Content {
                role: "user",
                parts: [TextPart { text: prompt }],
            }],
        };

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &body));
        }

        Ok(fragment_stream(response.bytes_stream()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [TextPart<'a>; 1],
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: Option<u16>,
    message: Option<String>,
    status: Option<String>,
}

impl ApiErrorBody {
    fn describe(&self) -> String {
        match (&self.status, &self.message) {
            (Some(status), Some(message)) => format!("{status}: {message}"),
            (None, Some(message)) => message.clone(),
            (Some(status), None) => status.clone(),
            (None, None) => "unknown upstream error".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Turn a non-2xx response into `ModelError::Api`, preferring Google's error
/// envelope and falling back to the raw body.
fn api_error(status: u16, body: &str) -> ModelError {
    let message = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.describe(),
        Err(_) if body.trim().is_empty() => format!("upstream returned HTTP {status}"),
        Err(_) => body.trim().to_string(),
    };
    ModelError::Api { status, message }
}

/// Extract the text of one streamed response payload.
///
/// `Ok(None)` for payloads without text (usage-only or empty chunks).
fn chunk_text(payload: &str) -> Result<Option<String>, ModelError> {
    let response: GenerateContentResponse = serde_json::from_str(payload)
        .map_err(|e| ModelError::MalformedChunk(e.to_string()))?;

    if let Some(error) = response.error {
        return Err(ModelError::Api {
            status: error.code.unwrap_or(500),
            message: error.describe(),
        });
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return match response.prompt_feedback.and_then(|f| f.block_reason) {
            Some(reason) => Err(ModelError::Blocked(format!(
                "prompt was blocked due to {reason}"
            ))),
            None => Ok(None),
        };
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if let Some(reason) = candidate.finish_reason.as_deref() {
        let blocked = WITHHELD_FINISH_REASONS.contains(&reason)
            || (text.is_empty() && BLOCKING_FINISH_REASONS.contains(&reason));
        if blocked {
            return Err(ModelError::Blocked(format!(
                "candidate was blocked due to {reason}"
            )));
        }
    }

    if text.is_empty() {
        return Ok(None);
    }

    Ok(Some(text))
}

struct FragmentState {
    body: Pin<Box<dyn Stream<Item = Result<Bytes, String>> + Send>>,
    decoder: SseDecoder,
    ready: VecDeque<Result<String, ModelError>>,
    done: bool,
}

impl FragmentState {
    fn enqueue(&mut self, event: &SseEvent) {
        if !matches!(event.event.as_deref(), None | Some("message")) {
            return;
        }
        let data = event.data.trim();
        if data.is_empty() {
            return;
        }
        match chunk_text(data) {
            Ok(Some(text)) => self.ready.push_back(Ok(text)),
            Ok(None) => {}
            Err(e) => self.ready.push_back(Err(e)),
        }
    }
}

/// Decode an SSE byte stream into text fragments.
///
/// The stream ends after the first error.
pub(crate) fn fragment_stream<S, E>(body: S) -> TextStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display,
{
    let state = FragmentState {
        body: Box::pin(body.map(|item| item.map_err(|e| e.to_string()))),
        decoder: SseDecoder::new(),
        ready: VecDeque::new(),
        done: false,
    };

    Box::pin(futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.ready.pop_front() {
                if item.is_err() {
                    state.ready.clear();
                    state.done = true;
                }
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => {
                    for event in state.decoder.push(&bytes) {
                        state.enqueue(&event);
                    }
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(ModelError::Transport(e)), state));
                }
                None => {
                    state.done = true;
                    if let Some(event) = state.decoder.finish() {
                        state.enqueue(&event);
                    }
                }
            }
        }
    }))
}
