//! Retry policy shared by the backend, GitHub, Discord and Ollama clients.
//!
//! Attempts are numbered from 1. A retryable status or transport failure gets
//! another attempt after an exponential backoff, until the attempt limit or the
//! optional wall-clock budget runs out. A `Retry-After` hint can raise the
//! delay but never lowers it below the backoff.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};

pub const MAX_RETRY_DELAY_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    /// Wall-clock budget for all attempts together. Zero means unbounded.
    pub budget_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: base_delay_ms.max(1),
            budget_ms: 0,
        }
    }

    pub fn with_budget_ms(mut self, budget_ms: u64) -> Self {
        self.budget_ms = budget_ms;
        self
    }

    pub fn backoff(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(10) as u32;
        let scaled = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(exponent));
        Duration::from_millis(scaled.min(MAX_RETRY_DELAY_MS))
    }

    /// Delay before retrying after `attempt` answered with `status`, or `None`
    /// when the caller should surface the failure.
    pub fn delay_after_status(
        &self,
        attempt: usize,
        status: u16,
        headers: &HeaderMap,
        elapsed: Duration,
    ) -> Option<Duration> {
        if !is_retryable_status(status) {
            return None;
        }
        let delay = match parse_retry_after(headers) {
            Some(hint) => hint.max(self.backoff(attempt)),
            None => self.backoff(attempt),
        };
        self.schedule(attempt, delay, elapsed)
    }

    /// Delay before retrying after `attempt` failed below HTTP, or `None`.
    pub fn delay_after_error(
        &self,
        attempt: usize,
        error: &reqwest::Error,
        elapsed: Duration,
    ) -> Option<Duration> {
        if !is_retryable_transport_error(error) {
            return None;
        }
        self.schedule(attempt, self.backoff(attempt), elapsed)
    }

    fn schedule(&self, attempt: usize, delay: Duration, elapsed: Duration) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        if self.budget_ms > 0 && elapsed.saturating_add(delay) > Duration::from_millis(self.budget_ms)
        {
            return None;
        }
        Some(delay)
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || status >= 500
}

pub fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

/// Reads `Retry-After` as delta seconds or as an HTTP date.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let retry_at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    let millis = retry_at.signed_duration_since(Utc::now()).num_milliseconds();
    Some(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
}
