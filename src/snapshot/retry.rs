//! Bounded retry with exponential backoff for gateway calls.
//!
//! Only [`GatewayError::Transient`] failures are retried. The default policy makes
//! a single attempt.

use crate::snapshot::cancel::CancellationToken;
use crate::snapshot::gateway::GatewayResult;
use bon::Builder;
use getset::CopyGetters;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, warn};
use validator::Validate;

#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, CopyGetters, PartialEq)]
#[serde(deny_unknown_fields)]
#[getset(get_copy = "pub")]
pub struct RetryConfig {
    #[validate(range(min = 1))]
    #[serde(default = "default_max_attempts")]
    #[builder(default = default_max_attempts())]
    max_attempts: u32,
    #[serde(default = "default_initial_backoff", with = "humantime_serde")]
    #[builder(default = default_initial_backoff())]
    initial_backoff: Duration,
    #[serde(default = "default_max_backoff", with = "humantime_serde")]
    #[builder(default = default_max_backoff())]
    max_backoff: Duration,
    #[validate(range(min = 1.0))]
    #[serde(default = "default_backoff_multiplier")]
    #[builder(default = default_backoff_multiplier())]
    backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    1
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(200)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(5)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryConfig {
    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::try_from_secs_f64(delay.as_secs_f64() * self.backoff_multiplier)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

pub fn retry_with_backoff<T, F>(
    config: &RetryConfig,
    operation_name: &str,
    cancel: Option<&CancellationToken>,
    mut operation: F,
) -> GatewayResult<T>
where
    F: FnMut() -> GatewayResult<T>,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_backoff;

    loop {
        attempt += 1;
        match operation() {
            Ok(v) => return Ok(v),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => {
                if attempt >= config.max_attempts
                    || cancel.is_some_and(CancellationToken::is_cancelled)
                {
                    if config.max_attempts > 1 {
                        error!(
                            operation = %operation_name,
                            attempt = attempt,
                            error = %e,
                            "Operation failed after retries"
                        );
                    }
                    return Err(e);
                }

                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Operation failed, retrying"
                );
                std::thread::sleep(delay);
                delay = config.next_delay(delay);
            }
        }
    }
}
