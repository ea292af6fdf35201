// Copyright 2026 The Careerline Project
// SPDX-License-Identifier: Apache-2.0

// Response body framing
//
// PlainText is the default: raw UTF-8 text, with a mid-stream fault written
// as a trailing human-readable marker. EventStream is opt-in via
// `Accept: text/event-stream` and separates text, faults, and completion
// into distinct SSE events whose data is a JSON string.

use axum::http::header::ACCEPT;
use axum::http::HeaderMap;
use bytes::Bytes;

/// Prefix of the in-band fault marker in plain-text bodies.
pub const STREAM_INTERRUPTED_MARKER: &str = "\n\n❌ Stream interrupted: ";

pub const PLAIN_TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream; charset=utf-8";

/// SSE event name for a mid-stream fault.
pub const ERROR_EVENT: &str = "error";
/// SSE event name for normal completion.
pub const DONE_EVENT: &str = "done";

/// How relayed text is laid out in the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    #[default]
    PlainText,
    EventStream,
}

impl Framing {
    /// Pick the framing from the request's `Accept` header.
    pub fn negotiate(headers: &HeaderMap) -> Self {
        let wants_events = headers
            .get_all(ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|media| {
                media
                    .split(';')
                    .next()
                    .map(|m| m.trim().eq_ignore_ascii_case("text/event-stream"))
                    .unwrap_or(false)
            });
        if wants_events {
            Framing::EventStream
        } else {
            Framing::PlainText
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Framing::PlainText => PLAIN_TEXT_CONTENT_TYPE,
            Framing::EventStream => EVENT_STREAM_CONTENT_TYPE,
        }
    }

    /// Encode one generated text fragment.
    pub fn encode_text(self, text: &str) -> Bytes {
        match self {
            Framing::PlainText => Bytes::copy_from_slice(text.as_bytes()),
            Framing::EventStream => Bytes::from(sse_event(None, text)),
        }
    }

    /// Encode the single fault frame that ends an interrupted stream.
    pub fn encode_error(self, message: &str) -> Bytes {
        match self {
            Framing::PlainText => Bytes::from(format!("{STREAM_INTERRUPTED_MARKER}{message}")),
            Framing::EventStream => Bytes::from(sse_event(Some(ERROR_EVENT), message)),
        }
    }

    /// Frame written after the last fragment of a clean stream, if any.
    pub fn encode_done(self) -> Option<Bytes> {
        match self {
            Framing::PlainText => None,
            Framing::EventStream => Some(Bytes::from(sse_event(Some(DONE_EVENT), ""))),
        }
    }
}

/// One SSE event carrying `data` as a JSON string literal.
///
/// SSE cannot carry a bare CR inside a data line, so text is escaped rather
/// than split across lines.
fn sse_event(event: Option<&str>, data: &str) -> String {
    let payload = serde_json::Value::from(data).to_string();
    let mut out = String::with_capacity(payload.len() + 24);
    if let Some(event) = event {
        out.push_str("event: ");
        out.push_str(event);
        out.push('\n');
    }
    out.push_str("data: ");
    out.push_str(&payload);
    out.push_str("\n\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn accept(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn plain_text_by_default() {
        assert_eq!(Framing::negotiate(&HeaderMap::new()), Framing::PlainText);
        assert_eq!(Framing::negotiate(&accept("*/*")), Framing::PlainText);
        assert_eq!(Framing::negotiate(&accept("text/plain")), Framing::PlainText);
    }

    #[test]
    fn event_stream_when_accepted() {
        assert_eq!(
            Framing::negotiate(&accept("text/event-stream")),
            Framing::EventStream
        );
        assert_eq!(
            Framing::negotiate(&accept("application/json, Text/Event-Stream;q=0.9")),
            Framing::EventStream
        );
    }

    #[test]
    fn plain_text_frames() {
        let f = Framing::PlainText;
        assert_eq!(f.encode_text("Hello"), Bytes::from_static(b"Hello"));
        assert_eq!(
            f.encode_error("reset"),
            Bytes::from("\n\n❌ Stream interrupted: reset")
        );
        assert_eq!(f.encode_done(), None);
        assert_eq!(f.content_type(), "text/plain; charset=utf-8");
    }

    #[test]
    fn event_stream_frames() {
        let f = Framing::EventStream;
        assert_eq!(f.encode_text("Hello"), Bytes::from("data: \"Hello\"\n\n"));
        assert_eq!(f.encode_text("a\nb"), Bytes::from("data: \"a\\nb\"\n\n"));
        assert_eq!(
            f.encode_error("reset"),
            Bytes::from("event: error\ndata: \"reset\"\n\n")
        );
        assert_eq!(f.encode_done(), Some(Bytes::from("event: done\ndata: \"\"\n\n")));
        assert_eq!(f.content_type(), "text/event-stream; charset=utf-8");
    }

    #[test]
    fn event_stream_keeps_carriage_returns() {
        let text = "line one\r\nline two\rend\n";
        let mut decoder = crate::model::SseDecoder::new();
        let events = decoder.push(&Framing::EventStream.encode_text(text));
        assert_eq!(events.len(), 1);
        let decoded: String = serde_json::from_str(&events[0].data).unwrap();
        assert_eq!(decoded, text);
    }
}
