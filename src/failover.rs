//! Resending requests that could not be delivered.

use std::time::Duration;
use std::convert::TryFrom;
use tokio::time::sleep;
use tracing::{ debug, warn };
use crate::{
    conn::Connection,
    wire::{ Request, Response },
    error::{ Error, ErrorExt, Result },
};

/// Upper bound of a single retry delay.
const MAX_DELAY: Duration = Duration::from_secs(3600);

/// How many times, and how patiently, a request is resent after a
/// connection-level failure.
///
/// Only errors of kind `Transport` are retried: if the server answered,
/// even with a rejection, resending would not change the answer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverStrategy {
    /// How many times a request is resent before giving up.
    pub retries: u32,
    /// The delay before the first retry.
    #[serde(with = "crate::config::millis")]
    pub initial_delay: Duration,
    /// Every further retry waits this many times longer than the previous.
    pub backoff_factor: f64,
}

impl Default for FailoverStrategy {
    fn default() -> Self {
        FailoverStrategy {
            retries: 5,
            initial_delay: Duration::from_millis(500),
            backoff_factor: 1.0,
        }
    }
}

impl FailoverStrategy {
    /// Never resends anything.
    pub fn none() -> Self {
        FailoverStrategy { retries: 0, ..Default::default() }
    }

    /// The delay preceding retry number `attempt`, counting from 1.
    /// ```
    /// # use std::time::Duration;
    /// # use drupe::failover::FailoverStrategy;
    /// let strategy = FailoverStrategy {
    ///     retries: 3,
    ///     initial_delay: Duration::from_millis(100),
    ///     backoff_factor: 2.0,
    /// };
    /// assert_eq!(strategy.delay(1), Duration::from_millis(100));
    /// assert_eq!(strategy.delay(3), Duration::from_millis(400));
    /// ```
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.backoff_factor.max(0.0).powi(exponent);
        let secs = self.initial_delay.as_secs_f64() * factor;

        if secs.is_finite() && secs < MAX_DELAY.as_secs_f64() {
            self.initial_delay.mul_f64(factor)
        } else {
            MAX_DELAY
        }
    }
}

/// Submits `request` over `connection`, resending it according to
/// `strategy` as long as it fails with a retryable error.
pub async fn submit(
    connection: &dyn Connection,
    request: &Request,
    strategy: &FailoverStrategy,
) -> Result<Response> {
    let mut attempt = 0;

    loop {
        match connection.submit(request.clone()).await {
            Ok(response) => return Ok(response),
            Err(error) if error.kind().is_retryable() && attempt < strategy.retries => {
                attempt += 1;
                let delay = strategy.delay(attempt);
                debug!(%error, attempt, ?delay, "request failed, resending");
                sleep(delay).await;
            }
            Err(error) if attempt > 0 => {
                warn!(%error, attempt, "giving up on request");
                return Err(Error::with_cause(
                    format!("request failed after {} retries", attempt),
                    error,
                ));
            }
            Err(error) => return Err(error),
        }
    }
}
