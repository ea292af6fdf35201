// Copyright 2026 The Careerline Project
// SPDX-License-Identifier: Apache-2.0

use super::*;
use std::collections::VecDeque;
use std::task::Poll;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::relay::{
    Framing, EVENT_STREAM_CONTENT_TYPE, PLAIN_TEXT_CONTENT_TYPE, STREAM_INTERRUPTED_MARKER,
};

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

type Scripted = Result<TransportResponse, TransportError>;

/// Hands out pre-built responses in order and records every request.
#[derive(Clone, Default)]
struct ScriptedTransport {
    responses: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl ScriptedTransport {
    fn with(responses: Vec<Scripted>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            requests: Arc::default(),
        }
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn post_chat(&self, request: &ChatRequest) -> Result<TransportResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected chat request")
    }
}

fn body_response(content_type: &str, chunks: Vec<Result<Bytes, TransportError>>) -> Scripted {
    Ok(TransportResponse {
        status: StatusCode::OK,
        content_type: Some(content_type.to_string()),
        body: Some(Box::pin(futures_util::stream::iter(chunks))),
    })
}

fn text_response(chunks: &[&str]) -> Scripted {
    body_response(
        PLAIN_TEXT_CONTENT_TYPE,
        chunks.iter().map(|c| Ok(Bytes::from(c.to_string()))).collect(),
    )
}

/// A 200 response whose body is fed by the returned sender.
fn channel_response() -> (mpsc::Sender<Result<Bytes, TransportError>>, Scripted) {
    let (tx, rx) = mpsc::channel(8);
    let response = TransportResponse {
        status: StatusCode::OK,
        content_type: Some(PLAIN_TEXT_CONTENT_TYPE.to_string()),
        body: Some(Box::pin(ReceiverStream::new(rx))),
    };
    (tx, Ok(response))
}

/// A body stream that fails the test if it is ever polled.
fn unreadable_body() -> ByteStream {
    Box::pin(futures_util::stream::poll_fn(
        |_| -> Poll<Option<Result<Bytes, TransportError>>> { panic!("body must not be read") },
    ))
}

fn assert_failed(outcome: &SendOutcome) {
    assert!(matches!(outcome, SendOutcome::Failed { .. }), "got {outcome:?}");
}

// ---------------------------------------------------------------------------
// Streaming into the pending turn
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fragments_fill_pending_turn_in_order() {
    let (tx, response) = channel_response();
    let controller = ChatController::new(ScriptedTransport::with(vec![response]));
    let mut rx = controller.subscribe();

    let task = tokio::spawn({
        let controller = controller.clone();
        async move { controller.send("Tell me about careers").await }
    });

    rx.changed().await.unwrap();
    assert_eq!(
        *rx.borrow_and_update(),
        vec![Turn::user("Tell me about careers"), Turn::model("", true)]
    );

    tx.send(Ok(Bytes::from("Hello"))).await.unwrap();
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow_and_update()[1], Turn::model("Hello", true));

    tx.send(Ok(Bytes::from(" world"))).await.unwrap();
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow_and_update()[1], Turn::model("Hello world", true));

    drop(tx);
    let outcome = task.await.unwrap();
    assert_eq!(
        outcome,
        SendOutcome::Completed {
            text: "Hello world".into()
        }
    );
    assert_eq!(controller.turns()[1], Turn::model("Hello world", false));
    assert!(!controller.is_busy());
    assert_eq!(controller.phase(), Phase::Idle);
}

#[tokio::test]
async fn send_while_pending_is_ignored() {
    let (tx, response) = channel_response();
    let transport = ScriptedTransport::with(vec![response]);
    let controller = ChatController::new(transport.clone());
    let mut rx = controller.subscribe();

    let task = tokio::spawn({
        let controller = controller.clone();
        async move { controller.send("first").await }
    });
    rx.changed().await.unwrap();
    assert!(controller.is_busy());
    assert_eq!(controller.phase(), Phase::Pending { index: 1 });

    let second = controller.send("second").await;
    assert_eq!(second, SendOutcome::Ignored(IgnoreReason::Busy));
    assert_eq!(transport.requests().len(), 1);
    assert_eq!(controller.turns().len(), 2);

    drop(tx);
    task.await.unwrap();
    assert!(!controller.is_busy());
}

#[tokio::test]
async fn every_read_publishes_a_snapshot() {
    let (tx, response) = channel_response();
    let controller = ChatController::new(ScriptedTransport::with(vec![response]));
    let mut rx = controller.subscribe();

    let task = tokio::spawn({
        let controller = controller.clone();
        async move { controller.send("hi").await }
    });
    rx.changed().await.unwrap();

    let e_acute = "\u{e9}".as_bytes();
    tx.send(Ok(Bytes::copy_from_slice(&e_acute[..1]))).await.unwrap();
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow_and_update()[1], Turn::model("", true));

    tx.send(Ok(Bytes::copy_from_slice(&e_acute[1..]))).await.unwrap();
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow_and_update()[1], Turn::model("\u{e9}", true));

    drop(tx);
    task.await.unwrap();
}

#[tokio::test]
async fn blank_input_is_ignored() {
    let transport = ScriptedTransport::default();
    let controller = ChatController::new(transport.clone());

    assert_eq!(
        controller.send("  \n\t").await,
        SendOutcome::Ignored(IgnoreReason::EmptyInput)
    );
    assert!(controller.turns().is_empty());
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn request_carries_history_without_pending_turn() {
    let transport = ScriptedTransport::with(vec![text_response(&["one"]), text_response(&["two"])]);
    let controller = ChatController::new(transport.clone());

    controller.send("first").await;
    controller.send("second").await;

    let requests = transport.requests();
    assert_eq!(requests[0], ChatRequest::from_turns(&[Turn::user("first")]));
    assert_eq!(
        requests[1],
        ChatRequest::from_turns(&[
            Turn::user("first"),
            Turn::model("one", false),
            Turn::user("second"),
        ])
    );
    assert_eq!(controller.turns().len(), 4);
}

#[tokio::test]
async fn multibyte_characters_split_across_reads() {
    let text = "Caf\u{e9} \u{1f393}";
    let bytes = text.as_bytes();
    // Split inside the two-byte and the four-byte sequences.
    let chunks = vec![
        Ok(Bytes::copy_from_slice(&bytes[..4])),
        Ok(Bytes::copy_from_slice(&bytes[4..8])),
        Ok(Bytes::copy_from_slice(&bytes[8..])),
    ];
    let controller =
        ChatController::new(ScriptedTransport::with(vec![body_response(PLAIN_TEXT_CONTENT_TYPE, chunks)]));

    let outcome = controller.send("hi").await;
    assert_eq!(outcome, SendOutcome::Completed { text: text.into() });
}

#[tokio::test]
async fn relay_interruption_marker_is_part_of_reply() {
    let marker_text = format!("{STREAM_INTERRUPTED_MARKER}quota exceeded");
    let controller = ChatController::new(ScriptedTransport::with(vec![text_response(&[
        "Partial",
        &marker_text,
    ])]));

    let outcome = controller.send("hi").await;
    let expected = format!("Partial{marker_text}");
    assert_eq!(outcome, SendOutcome::Completed { text: expected.clone() });
    assert_eq!(controller.turns()[1], Turn::model(expected, false));
}

#[tokio::test]
async fn event_stream_body_is_decoded() {
    let f = Framing::EventStream;
    let chunks = vec![
        Ok(f.encode_text("Hello")),
        Ok(f.encode_text(" world")),
        Ok(f.encode_error("upstream reset")),
    ];
    let controller =
        ChatController::new(ScriptedTransport::with(vec![body_response(EVENT_STREAM_CONTENT_TYPE, chunks)]));

    let outcome = controller.send("hi").await;
    assert_eq!(
        outcome,
        SendOutcome::Completed {
            text: format!("Hello world{STREAM_INTERRUPTED_MARKER}upstream reset")
        }
    );
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn error_status_replaces_pending_turn_without_reading_body() {
    let response = Ok(TransportResponse {
        status: StatusCode::TOO_MANY_REQUESTS,
        content_type: Some("application/json".into()),
        body: Some(unreadable_body()),
    });
    let controller = ChatController::new(ScriptedTransport::with(vec![response]));

    let outcome = controller.send("hi").await;
    assert_failed(&outcome);
    if let SendOutcome::Failed { reason } = outcome {
        assert!(reason.contains("429"), "{reason}");
    }
    assert_eq!(
        controller.turns(),
        vec![Turn::user("hi"), Turn::model(FAILURE_TEXT, false)]
    );
    assert!(!controller.is_busy());
}

#[tokio::test]
async fn missing_body_fails() {
    let response = Ok(TransportResponse {
        status: StatusCode::OK,
        content_type: None,
        body: None,
    });
    let controller = ChatController::new(ScriptedTransport::with(vec![response]));

    let outcome = controller.send("hi").await;
    assert_eq!(
        outcome,
        SendOutcome::Failed {
            reason: "response has no body".into()
        }
    );
    assert_eq!(controller.turns()[1], Turn::model(FAILURE_TEXT, false));
}

#[tokio::test]
async fn transport_error_fails() {
    let controller = ChatController::new(ScriptedTransport::with(vec![Err(
        TransportError::Request("connection refused".into()),
    )]));

    let outcome = controller.send("hi").await;
    assert_failed(&outcome);
    assert_eq!(controller.turns()[1], Turn::model(FAILURE_TEXT, false));
    assert!(!controller.is_busy());
}

#[tokio::test]
async fn read_error_discards_partial_reply() {
    let chunks = vec![
        Ok(Bytes::from_static(b"partial")),
        Err(TransportError::Body("connection reset".into())),
    ];
    let controller =
        ChatController::new(ScriptedTransport::with(vec![body_response(PLAIN_TEXT_CONTENT_TYPE, chunks)]));

    let outcome = controller.send("hi").await;
    assert_failed(&outcome);
    assert_eq!(controller.turns()[1], Turn::model(FAILURE_TEXT, false));
}

#[tokio::test]
async fn can_send_again_after_failure() {
    let transport = ScriptedTransport::with(vec![
        Err(TransportError::Request("down".into())),
        text_response(&["back"]),
    ]);
    let controller = ChatController::new(transport.clone());

    assert_failed(&controller.send("one").await);
    let outcome = controller.send("two").await;
    assert_eq!(outcome, SendOutcome::Completed { text: "back".into() });
    assert_eq!(controller.turns().len(), 4);
    assert_eq!(controller.turns()[1].text, FAILURE_TEXT);
}

#[tokio::test]
async fn abandoned_send_settles_pending_turn() {
    // Body stays open and silent until the sender is dropped.
    let (tx, response) = channel_response();
    let transport = ScriptedTransport::with(vec![response, text_response(&["second reply"])]);
    let controller = ChatController::new(transport.clone());

    let timed_out =
        tokio::time::timeout(std::time::Duration::from_millis(20), controller.send("first")).await;
    assert!(timed_out.is_err());

    assert_eq!(controller.phase(), Phase::Idle);
    assert_eq!(
        controller.turns(),
        vec![Turn::user("first"), Turn::model(FAILURE_TEXT, false)]
    );

    let outcome = controller.send("second").await;
    assert_eq!(
        outcome,
        SendOutcome::Completed {
            text: "second reply".into()
        }
    );
    assert_eq!(transport.requests().len(), 2);
    assert!(!controller.is_busy());
    drop(tx);
}
