// Copyright 2026 The Careerline Project
// SPDX-License-Identifier: Apache-2.0

// Chat client
//
// Holds the conversation, sends it to the relay, and fills in the model's
// turn as the streamed reply arrives. Observers follow along through a
// watch channel carrying the full turn list after every change.

mod decode;
mod transport;

pub use decode::{BodyDecoder, EventStreamDecoder, Utf8StreamDecoder};
pub use transport::{
    ByteStream, ChatTransport, ReqwestTransport, TransportError, TransportResponse,
};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::http::StatusCode;
use futures_util::stream::StreamExt;
use tokio::sync::watch;

use crate::message::{ChatRequest, Turn};

/// Text shown in place of the reply when a request cannot be completed.
pub const FAILURE_TEXT: &str = "❌ Failed to load response.";

/// Whether a request is in flight, and which turn it is filling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Pending { index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    EmptyInput,
    Busy,
}

/// Result of a single `send`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Nothing was sent and the conversation is unchanged.
    Ignored(IgnoreReason),
    /// The stream ended normally. `text` is the final reply, which may carry
    /// an interruption marker written by the relay.
    Completed { text: String },
    /// The request failed and the reply was replaced with [`FAILURE_TEXT`].
    Failed { reason: String },
}

#[derive(Debug, thiserror::Error)]
enum ExchangeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("relay returned HTTP {0}")]
    Status(StatusCode),

    #[error("response has no body")]
    NoBody,
}

#[derive(Debug)]
struct ChatState {
    turns: Vec<Turn>,
    phase: Phase,
}

struct Inner<T> {
    transport: T,
    state: Mutex<ChatState>,
    updates: watch::Sender<Vec<Turn>>,
}

/// Conversation state plus the send loop.
///
/// At most one request is in flight. While it is, further sends are ignored
/// and the model turn at the pending index is the only turn that changes.
pub struct ChatController<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ChatController<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ChatTransport> ChatController<T> {
    pub fn new(transport: T) -> Self {
        let (updates, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(Inner {
                transport,
                state: Mutex::new(ChatState {
                    turns: Vec::new(),
                    phase: Phase::Idle,
                }),
                updates,
            }),
        }
    }

    /// Receive the full turn list after every change.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Turn>> {
        self.inner.updates.subscribe()
    }

    pub fn turns(&self) -> Vec<Turn> {
        self.lock().turns.clone()
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.phase(), Phase::Pending { .. })
    }

    /// Send `input` as the next user turn and stream the reply into a new
    /// model turn.
    ///
    /// Dropping the returned future before it completes settles the pending
    /// turn with [`FAILURE_TEXT`] and leaves the controller idle.
    pub async fn send(&self, input: &str) -> SendOutcome {
        let (request, pending) = match self.begin(input) {
            Ok(started) => started,
            Err(reason) => {
                tracing::debug!(?reason, "send ignored");
                return SendOutcome::Ignored(reason);
            }
        };

        match self.exchange(&request, pending.index).await {
            Ok(text) => {
                pending.settle(text.clone());
                SendOutcome::Completed { text }
            }
            Err(e) => {
                tracing::warn!(error = %e, "chat request failed");
                pending.settle(FAILURE_TEXT.to_string());
                SendOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Append the user turn and an empty pending model turn. The request
    /// carries the history up to and including the new user turn.
    fn begin(&self, input: &str) -> Result<(ChatRequest, PendingTurn<'_, T>), IgnoreReason> {
        if input.trim().is_empty() {
            return Err(IgnoreReason::EmptyInput);
        }
        let mut state = self.lock();
        if let Phase::Pending { .. } = state.phase {
            return Err(IgnoreReason::Busy);
        }

        state.turns.push(Turn::user(input));
        let request = ChatRequest::from_turns(&state.turns);
        let index = state.turns.len();
        state.turns.push(Turn::model("", true));
        state.phase = Phase::Pending { index };
        self.publish(&state);
        Ok((
            request,
            PendingTurn {
                controller: self,
                index,
                settled: false,
            },
        ))
    }

    /// Post the request and fold the body into the turn at `index`.
    ///
    /// A snapshot is published after every read, including reads that only
    /// complete part of a multi-byte character and so leave the text as it
    /// was.
    async fn exchange(&self, request: &ChatRequest, index: usize) -> Result<String, ExchangeError> {
        let response = self.inner.transport.post_chat(request).await?;
        if !response.status.is_success() {
            return Err(ExchangeError::Status(response.status));
        }
        let mut body = response.body.ok_or(ExchangeError::NoBody)?;
        let mut decoder = BodyDecoder::for_content_type(response.content_type.as_deref());

        let mut text = String::new();
        while let Some(chunk) = body.next().await {
            text.push_str(&decoder.decode(&chunk?));
            self.update(index, &text);
        }
        text.push_str(&decoder.finish());
        Ok(text)
    }
}

impl<T> ChatController<T> {
    fn update(&self, index: usize, text: &str) {
        let mut state = self.lock();
        if let Some(turn) = state.turns.get_mut(index) {
            turn.text.clear();
            turn.text.push_str(text);
        }
        self.publish(&state);
    }

    /// Write the final text and leave the pending phase in one step.
    fn settle(&self, index: usize, text: String) {
        let mut state = self.lock();
        if let Some(turn) = state.turns.get_mut(index) {
            *turn = Turn::model(text, false);
        }
        state.phase = Phase::Idle;
        self.publish(&state);
    }

    fn publish(&self, state: &ChatState) {
        self.inner.updates.send_replace(state.turns.clone());
    }

    fn lock(&self) -> MutexGuard<'_, ChatState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The model turn a `send` is filling.
///
/// Settled exactly once: by the send itself, or on drop with the failure
/// text when the send is abandoned mid-flight.
struct PendingTurn<'a, T> {
    controller: &'a ChatController<T>,
    index: usize,
    settled: bool,
}

impl<T> PendingTurn<'_, T> {
    fn settle(mut self, text: String) {
        self.settled = true;
        self.controller.settle(self.index, text);
    }
}

impl<T> Drop for PendingTurn<'_, T> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!(index = self.index, "send abandoned before the reply finished");
            self.controller.settle(self.index, FAILURE_TEXT.to_string());
        }
    }
}

#[cfg(test)]
mod tests;
