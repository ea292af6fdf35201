// Copyright 2026 The Careerline Project
// SPDX-License-Identifier: Apache-2.0

// Admission throttle
//
// Applied once per `/api/chat` request before the upstream call. Shared by
// every request in the process; not per client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::ThrottleConfig;

/// Gate passed before each upstream model call.
#[async_trait]
pub trait Throttle: Send + Sync {
    /// Resolve when the caller may proceed.
    async fn acquire(&self);

    /// Short label for logs.
    fn name(&self) -> &'static str;
}

/// Build the throttle selected by config.
pub fn build_throttle(config: &ThrottleConfig) -> Arc<dyn Throttle> {
    match config {
        ThrottleConfig::FixedDelay { delay } => Arc::new(FixedDelay::new(*delay)),
        ThrottleConfig::TokenBucket {
            capacity,
            refill_per_sec,
        } => Arc::new(TokenBucket::new(*capacity, *refill_per_sec)),
        ThrottleConfig::Off => Arc::new(Unthrottled),
    }
}

// ---------------------------------------------------------------------------
// Fixed delay
// ---------------------------------------------------------------------------

/// Sleeps a fixed delay on every request.
///
/// Best effort only: concurrent requests sleep in parallel, so this caps the
/// rate of a single sequential caller, nothing more.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Throttle for FixedDelay {
    async fn acquire(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    fn name(&self) -> &'static str {
        "fixed_delay"
    }
}

// ---------------------------------------------------------------------------
// Token bucket
// ---------------------------------------------------------------------------

/// Token bucket admission control.
///
/// Holds up to `capacity` tokens, refilled continuously at `refill_per_sec`.
/// Each acquire takes one token. Waiters queue on a FIFO mutex, so they are
/// admitted in arrival order.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket. `refill_per_sec` must be positive and finite;
    /// the config loader rejects anything else.
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            capacity,
            refill_per_sec,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;
    }
}

#[async_trait]
impl Throttle for TokenBucket {
    async fn acquire(&self) {
        let mut state = self.state.lock().await;
        self.refill(&mut state);

        if state.tokens < 1.0 {
            let wait = Duration::from_secs_f64((1.0 - state.tokens) / self.refill_per_sec);
            tracing::debug!(wait_ms = wait.as_millis() as u64, "token bucket empty, waiting");
            tokio::time::sleep(wait).await;
            self.refill(&mut state);
        }

        state.tokens = (state.tokens - 1.0).max(0.0);
    }

    fn name(&self) -> &'static str {
        "token_bucket"
    }
}

// ---------------------------------------------------------------------------
// No throttle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct Unthrottled;

#[async_trait]
impl Throttle for Unthrottled {
    async fn acquire(&self) {}

    fn name(&self) -> &'static str {
        "off"
    }
}
