//! Generic retry executor with exponential backoff and jitter.
//!
//! The executor is failure-kind-agnostic: it retries whatever the supplied
//! operation returns. Callers decide which failure kinds deserve a retry
//! wrapper at all (see [`InferenceError::is_retryable`]).

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::ideastorm::error::InferenceError;

/// Backoff schedule parameters.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Perturb each delay by up to ±10% to avoid thundering herds.
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Preset tuned for inference calls: a longer base delay since upstream
    /// hiccups tend to last seconds, not milliseconds.
    pub fn for_inference() -> Self {
        Self {
            base_delay: Duration::from_millis(2000),
            ..Self::default()
        }
    }
}

/// The pre-jitter delay slept before retrying after `attempt` failures:
/// `min(base * multiplier^(attempt-1), max)`.
pub fn backoff_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let exp = config.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
    let millis = (config.base_delay.as_millis() as f64 * exp) as u64;
    Duration::from_millis(millis).min(config.max_delay)
}

fn jittered(delay: Duration, config: &RetryConfig) -> Duration {
    if !config.use_jitter {
        return delay;
    }
    let millis = delay.as_millis() as f64;
    let jitter = millis * 0.1 * rand::thread_rng().gen_range(-1.0..=1.0);
    Duration::from_millis((millis + jitter).max(0.0) as u64)
}

/// Run `operation` up to `config.max_attempts` times, sleeping the backoff
/// schedule between attempts. The sleep is `tokio::time::sleep`, so waiting
/// never occupies a worker thread.
///
/// After the final failed attempt, returns
/// [`InferenceError::RetryExhausted`] wrapping the last underlying failure.
pub async fn execute_with_retry<T, F, Fut>(
    mut operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> Result<T, InferenceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, InferenceError>>,
{
    let mut last_error = None;

    for attempt in 1..=config.max_attempts {
        log::debug!(
            "executing {}: attempt {}/{}",
            operation_name,
            attempt,
            config.max_attempts
        );

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    log::info!("{} succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(err) => {
                log::warn!(
                    "{} failed on attempt {}/{}: {}",
                    operation_name,
                    attempt,
                    config.max_attempts,
                    err
                );
                last_error = Some(err);

                if attempt < config.max_attempts {
                    let delay = jittered(backoff_delay(attempt, config), config);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    log::error!(
        "{} failed after {} attempts",
        operation_name,
        config.max_attempts
    );
    Err(InferenceError::RetryExhausted {
        attempts: config.max_attempts,
        source: Box::new(last_error.unwrap_or(InferenceError::Upstream(
            "operation produced no attempts".to_string(),
        ))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedule_doubles_and_caps() {
        let config = RetryConfig {
            max_attempts: 10,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_multiplier: 2.0,
            use_jitter: false,
        };
        // Delay before attempt k (k >= 2) is min(1000 * 2^(k-2), 30000).
        assert_eq!(backoff_delay(1, &config), Duration::from_millis(1000));
        assert_eq!(backoff_delay(2, &config), Duration::from_millis(2000));
        assert_eq!(backoff_delay(3, &config), Duration::from_millis(4000));
        assert_eq!(backoff_delay(5, &config), Duration::from_millis(16_000));
        assert_eq!(backoff_delay(6, &config), Duration::from_millis(30_000));
        assert_eq!(backoff_delay(9, &config), Duration::from_millis(30_000));
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let config = RetryConfig::default();
        for _ in 0..100 {
            let jittered = jittered(Duration::from_millis(1000), &config);
            assert!(jittered >= Duration::from_millis(900));
            assert!(jittered <= Duration::from_millis(1100));
        }
    }
}
