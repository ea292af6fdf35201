// Copyright 2026 The Careerline Project
// SPDX-License-Identifier: Apache-2.0

// Response body decoding
//
// Network reads split the body at arbitrary byte offsets. Both decoders
// carry state across reads so that the text they produce does not depend on
// where those splits fall.

use crate::model::SseDecoder;
use crate::relay::{DONE_EVENT, ERROR_EVENT, STREAM_INTERRUPTED_MARKER};

const REPLACEMENT: char = '\u{FFFD}';

/// Stateful UTF-8 decoder.
///
/// An incomplete multi-byte sequence at the end of one read is held back and
/// completed by the next. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next read, returning the text it completes.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(bytes);

        let mut out = String::with_capacity(input.len());
        let mut rest: &[u8] = &input;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(REPLACEMENT);
                            rest = &after[len..];
                        }
                        None => {
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// End of stream: a held-back incomplete sequence becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            REPLACEMENT.to_string()
        }
    }
}

/// Decoder for event-stream framed bodies.
///
/// Text events append their data. An `error` event appends the same marker
/// the plain-text framing writes, so the rendered turn looks the same either
/// way, and flags the stream as interrupted.
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    sse: SseDecoder,
    interrupted: bool,
    done: bool,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, bytes: &[u8]) -> String {
        let events = self.sse.push(bytes);
        let mut out = String::new();
        for event in events {
            self.apply(event, &mut out);
        }
        out
    }

    pub fn finish(&mut self) -> String {
        let mut out = String::new();
        if let Some(event) = self.sse.finish() {
            self.apply(event, &mut out);
        }
        out
    }

    /// Whether the server reported a mid-stream fault.
    pub fn interrupted(&self) -> bool {
        self.interrupted
    }

    /// Whether the server signalled normal completion.
    pub fn done(&self) -> bool {
        self.done
    }

    fn apply(&mut self, event: crate::model::SseEvent, out: &mut String) {
        if self.done || self.interrupted {
            return;
        }
        match event.event.as_deref() {
            None | Some("message") => out.push_str(&event_text(event.data)),
            Some(ERROR_EVENT) => {
                out.push_str(STREAM_INTERRUPTED_MARKER);
                out.push_str(&event_text(event.data));
                self.interrupted = true;
            }
            Some(DONE_EVENT) => self.done = true,
            Some(_) => {}
        }
    }
}

/// Event data is a JSON string; anything else is taken verbatim.
fn event_text(data: String) -> String {
    serde_json::from_str::<String>(&data).unwrap_or(data)
}

/// Picks the decoder matching the response's framing.
#[derive(Debug)]
pub enum BodyDecoder {
    Plain(Utf8StreamDecoder),
    Events(EventStreamDecoder),
}

impl BodyDecoder {
    pub fn for_content_type(content_type: Option<&str>) -> Self {
        let is_event_stream = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|media| media.trim().eq_ignore_ascii_case("text/event-stream"))
            .unwrap_or(false);
        if is_event_stream {
            BodyDecoder::Events(EventStreamDecoder::new())
        } else {
            BodyDecoder::Plain(Utf8StreamDecoder::new())
        }
    }

    pub fn decode(&mut self, bytes: &[u8]) -> String {
        match self {
            BodyDecoder::Plain(d) => d.decode(bytes),
            BodyDecoder::Events(d) => d.decode(bytes),
        }
    }

    pub fn finish(&mut self) -> String {
        match self {
            BodyDecoder::Plain(d) => d.finish(),
            BodyDecoder::Events(d) => d.finish(),
        }
    }
}
