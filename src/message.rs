// Copyright 2026 The Careerline Project
// SPDX-License-Identifier: Apache-2.0

// Conversation types
//
// Wire shape of `POST /api/chat` plus the consumer-side `Turn`. The relay
// never deserializes into these strictly: it walks the JSON tolerantly via
// `extract_user_prompt` so malformed history never becomes an error.

use serde::{Deserialize, Serialize};

/// Author of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One text part of a wire turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

/// A turn as sent over the wire: a role and its parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTurn {
    pub role: Role,
    pub parts: Vec<Part>,
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<WireTurn>,
}

impl ChatRequest {
    /// Encode a history, one text part per turn.
    pub fn from_turns<'a>(turns: impl IntoIterator<Item = &'a Turn>) -> Self {
        Self {
            messages: turns
                .into_iter()
                .map(|turn| WireTurn {
                    role: turn.role,
                    parts: vec![Part {
                        text: turn.text.clone(),
                    }],
                })
                .collect(),
        }
    }
}

/// A turn as held by the chat client.
///
/// `pending` is true only for the model turn currently being filled in by a
/// live stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub pending: bool,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            pending: false,
        }
    }

    pub fn model(text: impl Into<String>, pending: bool) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
            pending,
        }
    }
}

/// Pull the prompt out of a chat request body.
///
/// Reads `messages[last].parts[0].text`. Any missing or mistyped step yields
/// an empty string.
pub fn extract_user_prompt(body: &serde_json::Value) -> String {
    body.get("messages")
        .and_then(|m| m.as_array())
        .and_then(|m| m.last())
        .and_then(|turn| turn.get("parts"))
        .and_then(|parts| parts.as_array())
        .and_then(|parts| parts.first())
        .and_then(|part| part.get("text"))
        .and_then(|text| text.as_str())
        .unwrap_or_default()
        .to_string()
}
