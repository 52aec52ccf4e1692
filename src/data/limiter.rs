//! Adaptive pacing of outbound exchange calls.
//!
//! Every worker acquires a slot here before touching the exchange; the
//! limiter is the single authority over call pacing. The delay between
//! slots adapts to the observed success rate over a rolling window, so a
//! struggling upstream slows us down and a healthy one speeds us back up.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::RateLimitConfig;

/// Success-rate band that leaves the delay unchanged.
const BACKOFF_BELOW: f64 = 0.80;
const SPEEDUP_ABOVE: f64 = 0.95;

struct LimiterState {
    delay: Duration,
    /// Rolling outcomes, oldest first.
    window: VecDeque<bool>,
    /// Earliest instant the next call may be issued.
    next_slot: Instant,
    total_calls: u64,
    total_failures: u64,
}

pub struct AdaptiveRateLimiter {
    state: Mutex<LimiterState>,
    min_delay: Duration,
    max_delay: Duration,
    window_size: usize,
}

impl AdaptiveRateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let min_delay = Duration::from_millis(config.min_delay_ms);
        let max_delay = Duration::from_millis(config.max_delay_ms);
        let initial = Duration::from_millis(config.initial_delay_ms).clamp(min_delay, max_delay);

        Self {
            state: Mutex::new(LimiterState {
                delay: initial,
                window: VecDeque::with_capacity(config.window_size),
                next_slot: Instant::now(),
                total_calls: 0,
                total_failures: 0,
            }),
            min_delay,
            max_delay,
            window_size: config.window_size.max(1),
        }
    }

    /// Suspend until it is safe to issue one outbound call. Slots are
    /// handed out serially across all workers at the current delay.
    pub async fn acquire(&self) {
        let wait = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let wait = state.next_slot.saturating_duration_since(now);
            state.next_slot = state.next_slot.max(now) + state.delay;
            wait
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    /// Record a completed call and recompute the delay. Rate-limit
    /// rejections from the exchange must be reported as failures so
    /// backoff accelerates.
    pub async fn report_outcome(&self, success: bool) {
        let mut state = self.state.lock().await;

        state.window.push_back(success);
        while state.window.len() > self.window_size {
            state.window.pop_front();
        }
        state.total_calls += 1;
        if !success {
            state.total_failures += 1;
        }

        let successes = state.window.iter().filter(|&&ok| ok).count();
        let rate = successes as f64 / state.window.len() as f64;

        if rate < BACKOFF_BELOW {
            state.delay = (state.delay * 2).min(self.max_delay);
        } else if rate > SPEEDUP_ABOVE {
            state.delay = state.delay.mul_f64(0.8).max(self.min_delay);
        }
    }

    pub async fn current_delay(&self) -> Duration {
        self.state.lock().await.delay
    }

    /// Success rate over the rolling window; 1.0 before any outcome.
    pub async fn success_rate(&self) -> f64 {
        let state = self.state.lock().await;
        if state.window.is_empty() {
            return 1.0;
        }
        let successes = state.window.iter().filter(|&&ok| ok).count();
        successes as f64 / state.window.len() as f64
    }

    pub async fn total_calls(&self) -> u64 {
        self.state.lock().await.total_calls
    }

    pub async fn total_failures(&self) -> u64 {
        self.state.lock().await.total_failures
    }
}
