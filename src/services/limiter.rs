//! Shrinks the job batch size while the network keeps answering with
//! congestion signals.
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::warn;

use crate::constants::{
    DEFAULT_BUNDLES_SELECTION_LIMIT, INDETERMINATE_RESPONSES_TOLERANCE, LIMITER_RESET_WINDOW,
};
use crate::domain::SubmissionError;

#[derive(Debug)]
struct LimiterState {
    limit_value: i32,
    indeterminate_responses: u32,
    counter_last_updated: Instant,
}

/// Shared by the manager, which reads the batch size, and the workers, which
/// report indeterminate responses.
#[derive(Debug)]
pub struct TransactionProcessingLimiter {
    configured_limit: i32,
    reset_window: Duration,
    state: Mutex<LimiterState>,
}

impl TransactionProcessingLimiter {
    pub fn new(limit: i32) -> Self {
        Self::with_reset_window(limit, LIMITER_RESET_WINDOW)
    }

    pub fn with_reset_window(limit: i32, reset_window: Duration) -> Self {
        let limit = if limit < 0 {
            DEFAULT_BUNDLES_SELECTION_LIMIT
        } else {
            limit
        };
        Self {
            configured_limit: limit,
            reset_window,
            state: Mutex::new(LimiterState {
                limit_value: limit,
                indeterminate_responses: 0,
                counter_last_updated: Instant::now(),
            }),
        }
    }

    pub fn adjust_limit_if_needed(&self, error: &SubmissionError) {
        if !error.is_indeterminate() {
            return;
        }

        let mut state = self.state.lock();
        state.indeterminate_responses += 1;
        if state.indeterminate_responses >= INDETERMINATE_RESPONSES_TOLERANCE {
            if state.limit_value != DEFAULT_BUNDLES_SELECTION_LIMIT {
                warn!(
                    indeterminate_responses = state.indeterminate_responses,
                    limit = DEFAULT_BUNDLES_SELECTION_LIMIT,
                    "lowering transaction processing limit"
                );
            }
            state.limit_value = DEFAULT_BUNDLES_SELECTION_LIMIT;
            state.counter_last_updated = Instant::now();
        }
    }

    /// Batch size for the next selection. Restores the configured value once
    /// the reset window has passed.
    pub fn limit_value(&self) -> i32 {
        let mut state = self.state.lock();
        if state.counter_last_updated.elapsed() > self.reset_window {
            state.indeterminate_responses = 0;
            state.counter_last_updated = Instant::now();
            state.limit_value = self.configured_limit;
        }
        state.limit_value
    }

    #[cfg(test)]
    fn indeterminate_responses(&self) -> u32 {
        self.state.lock().indeterminate_responses
    }
}
