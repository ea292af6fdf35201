// Copyright 2026 The Careerline Project
// SPDX-License-Identifier: Apache-2.0

// careerline-chat: terminal client for the chat relay.
//
// Reads one prompt per line from stdin and prints the model's reply as it
// streams in.
//
// Usage:
//   careerline-chat [--endpoint http://127.0.0.1:3000/api/chat] [--event-stream]

use std::io::Write;

use careerline::consumer::{ChatController, IgnoreReason, ReqwestTransport, SendOutcome};
use careerline::message::{Role, Turn};
use careerline::relay::Framing;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "careerline-chat", about = "Terminal client for the careerline chat relay")]
struct Cli {
    /// Chat endpoint URL
    #[arg(
        long,
        default_value = "http://127.0.0.1:3000/api/chat",
        env = "CAREERLINE_ENDPOINT"
    )]
    endpoint: String,

    /// Ask the relay for event-stream framing instead of plain text
    #[arg(long)]
    event_stream: bool,
}

/// Prints the growing model turn as deltas.
///
/// When a turn's text stops extending what was already printed (a failure
/// replacing a partial reply), the whole text is printed again on a new line.
#[derive(Default)]
struct Renderer {
    index: Option<usize>,
    printed: String,
}

impl Renderer {
    fn show(&mut self, turns: &[Turn], out: &mut impl Write) -> std::io::Result<()> {
        let Some((index, turn)) = turns.iter().enumerate().last() else {
            return Ok(());
        };
        if turn.role != Role::Model {
            return Ok(());
        }
        if self.index != Some(index) {
            self.index = Some(index);
            self.printed.clear();
        }

        match turn.text.strip_prefix(self.printed.as_str()) {
            Some(rest) => write!(out, "{rest}")?,
            None => write!(out, "\n{}", turn.text)?,
        }
        self.printed.clone_from(&turn.text);
        out.flush()
    }
}

fn prompt(out: &mut impl Write) -> std::io::Result<()> {
    write!(out, "> ")?;
    out.flush()
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let framing = if cli.event_stream {
        Framing::EventStream
    } else {
        Framing::PlainText
    };
    tracing::info!(endpoint = %cli.endpoint, ?framing, "careerline-chat starting");

    let transport = ReqwestTransport::new(reqwest::Client::new(), cli.endpoint).with_framing(framing);
    let controller = ChatController::new(transport);
    let mut updates = WatchStream::from_changes(controller.subscribe());
    let mut renderer = Renderer::default();
    let mut stdout = std::io::stdout();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    if let Err(e) = run(&controller, &mut lines, &mut updates, &mut renderer, &mut stdout).await {
        tracing::error!("terminal error: {e}");
        std::process::exit(1);
    }
}

async fn run<R>(
    controller: &ChatController<ReqwestTransport>,
    lines: &mut tokio::io::Lines<R>,
    updates: &mut WatchStream<Vec<Turn>>,
    renderer: &mut Renderer,
    out: &mut std::io::Stdout,
) -> std::io::Result<()>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    prompt(out)?;
    while let Some(line) = lines.next_line().await? {
        let send = controller.send(&line);
        tokio::pin!(send);

        let outcome = loop {
            tokio::select! {
                outcome = &mut send => break outcome,
                Some(turns) = updates.next() => renderer.show(&turns, out)?,
            }
        };
        renderer.show(&controller.turns(), out)?;

        match outcome {
            SendOutcome::Ignored(IgnoreReason::EmptyInput) => {}
            SendOutcome::Ignored(IgnoreReason::Busy) => {
                tracing::warn!("a reply is still streaming");
            }
            SendOutcome::Completed { .. } => writeln!(out)?,
            SendOutcome::Failed { reason } => {
                writeln!(out)?;
                tracing::warn!(%reason, "chat request failed");
            }
        }
        prompt(out)?;
    }
    writeln!(out)
}
