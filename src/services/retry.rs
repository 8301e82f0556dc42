use anyhow::Result;
use log::{debug, info};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::core::error::UpstreamError;
use crate::core::notice::{LogNotices, Notice, NoticeSink};

const RETRYABLE_STATUS: [u16; 7] = [408, 429, 500, 502, 503, 504, 529];

const RETRYABLE_MARKERS: [&str; 8] = [
    "rate limit",
    "rate_limit",
    "too many requests",
    "timeout",
    "timed out",
    "overloaded",
    "service unavailable",
    "bad gateway",
];

static RETRYABLE_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(408|429|500|502|503|504|529)\b").expect("status pattern is valid")
});

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

fn default_max_retries() -> usize {
    3
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    60_000
}
fn default_backoff_factor() -> f64 {
    2.0
}

/// Exponential backoff with jitter around a single upstream request.
#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
    backoff_factor: f64,
    notices: Arc<dyn NoticeSink>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_factor", &self.backoff_factor)
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_factor: config.backoff_factor.max(1.0),
            notices: Arc::new(LogNotices),
        }
    }

    pub fn with_notices(mut self, notices: Arc<dyn NoticeSink>) -> Self {
        self.notices = notices;
        self
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn notices(&self) -> &Arc<dyn NoticeSink> {
        &self.notices
    }

    /// `min(base * factor^attempt, max_delay)`, before jitter. `attempt` starts at 0.
    pub fn backoff_delay(&self, attempt: usize) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        if secs.is_finite() && secs < self.max_delay.as_secs_f64() {
            Duration::from_secs_f64(secs.max(0.0))
        } else {
            self.max_delay
        }
    }

    /// Adds between 10% and 30% of `delay` on top of it.
    pub fn with_jitter(&self, delay: Duration) -> Duration {
        let fraction: f64 = rand::rng().random_range(0.1..=0.3);
        delay + delay.mul_f64(fraction)
    }

    /// Runs `operation`, retrying transient failures.
    ///
    /// The error returned after a non-retryable failure or after the last
    /// attempt is the operation's own error, untouched.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0usize;
        let mut previous = Duration::ZERO;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!("{} succeeded after {} retries", label, attempt);
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let reason = format!("{:#}", err);

                    if !is_retryable(&err) {
                        self.notices.notify(&Notice::NotRetryable {
                            operation: label.to_string(),
                            reason,
                        });
                        return Err(err);
                    }

                    if attempt >= self.max_retries {
                        self.notices.notify(&Notice::RetriesExhausted {
                            operation: label.to_string(),
                            attempts: attempt + 1,
                            reason,
                        });
                        return Err(err);
                    }

                    // fresh jitter on a capped delay must not shorten the wait
                    let delay = self
                        .with_jitter(self.backoff_delay(attempt))
                        .max(previous)
                        .min(self.max_delay.mul_f64(1.3));
                    previous = delay;
                    attempt += 1;
                    self.notices.notify(&Notice::Retrying {
                        operation: label.to_string(),
                        attempt,
                        max_retries: self.max_retries,
                        delay,
                        reason,
                    });
                    debug!("{}: sleeping {:?} before attempt {}", label, delay, attempt + 1);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Whether a failure looks transient: rate limiting, timeouts, overload or a 5xx.
pub fn is_retryable(err: &anyhow::Error) -> bool {
    for cause in err.chain() {
        if let Some(upstream) = cause.downcast_ref::<UpstreamError>() {
            if let Some(status) = upstream.status() {
                return RETRYABLE_STATUS.contains(&status);
            }
        }
        if let Some(http) = cause.downcast_ref::<reqwest::Error>() {
            if http.is_timeout() || http.is_connect() {
                return true;
            }
            if let Some(status) = http.status() {
                return RETRYABLE_STATUS.contains(&status.as_u16());
            }
        }
    }

    let message = format!("{:#}", err).to_lowercase();
    RETRYABLE_MARKERS.iter().any(|m| message.contains(m)) || RETRYABLE_CODE.is_match(&message)
}
