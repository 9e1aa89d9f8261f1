use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ideastorm::{execute_with_retry, InferenceError, RetryConfig};

fn fast_config(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(10),
        backoff_multiplier: 2.0,
        use_jitter: false,
    }
}

#[tokio::test]
async fn first_attempt_success_makes_no_retries() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    let result = execute_with_retry(
        || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, InferenceError>("done".to_string())
            }
        },
        &fast_config(3),
        "first-try",
    )
    .await;

    assert_eq!(result.unwrap(), "done");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn recovers_after_transient_failures() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    let result = execute_with_retry(
        || {
            let counter = Arc::clone(&counter);
            async move {
                let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < 3 {
                    Err(InferenceError::Transport("connection reset".into()))
                } else {
                    Ok("recovered".to_string())
                }
            }
        },
        &fast_config(3),
        "flaky",
    )
    .await;

    assert_eq!(result.unwrap(), "recovered");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn exhaustion_reports_attempts_and_preserves_source() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    let result: Result<String, _> = execute_with_retry(
        || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(InferenceError::Timeout)
            }
        },
        &fast_config(3),
        "doomed",
    )
    .await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    match result {
        Err(InferenceError::RetryExhausted { attempts, source }) => {
            assert_eq!(attempts, 3);
            assert!(matches!(*source, InferenceError::Timeout));
        }
        other => panic!("expected RetryExhausted, got {:?}", other),
    }
}

#[tokio::test]
async fn single_attempt_config_never_retries() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    let result: Result<String, _> = execute_with_retry(
        || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(InferenceError::EmptyResponse)
            }
        },
        &fast_config(1),
        "one-shot",
    )
    .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(matches!(
        result,
        Err(InferenceError::RetryExhausted { attempts: 1, .. })
    ));
}

#[test]
fn inference_preset_uses_longer_base_delay() {
    let preset = RetryConfig::for_inference();
    assert_eq!(preset.base_delay, Duration::from_millis(2000));
    assert_eq!(preset.max_attempts, 3);
    assert!(preset.use_jitter);
}
