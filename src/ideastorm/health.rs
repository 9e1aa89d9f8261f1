//! Circuit breaker and health monitor for the upstream inference service.
//!
//! Many concurrent tasks record outcomes, so all state lives in atomics:
//! the state byte, both counters, and the failure/probe timestamps (epoch
//! millis). The Open→HalfOpen flip is a single compare-and-swap; once the
//! breaker is HalfOpen every caller passes the availability gate until the
//! success threshold closes it or a failure re-trips it.

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::task::JoinHandle;

use crate::ideastorm::upstream::InferenceClient;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through; failures accumulate toward the trip threshold.
    Closed,
    /// Calls are rejected without reaching the upstream.
    Open,
    /// Trial traffic is admitted; successes accumulate toward recovery.
    HalfOpen,
}

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

/// Thresholds and timing for the breaker and its background probe.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Consecutive failures that trip Closed/HalfOpen into Open.
    pub failure_threshold: u32,
    /// How long the breaker stays Open before admitting trial traffic.
    pub cooldown: Duration,
    /// Successes in HalfOpen required to close the breaker.
    pub success_threshold: u32,
    /// Interval of the background connection probe.
    pub probe_interval: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
            success_threshold: 3,
            probe_interval: Duration::from_secs(30),
        }
    }
}

/// Point-in-time snapshot returned by [`HealthMonitor::health`].
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_probe_at: Option<DateTime<Utc>>,
    pub available: bool,
}

/// Circuit breaker shared across every task that calls the upstream.
///
/// Constructed once at process start and passed by `Arc` to all callers;
/// there is deliberately no global instance.
pub struct HealthMonitor {
    config: HealthConfig,
    state: AtomicU8,
    failure_count: AtomicU32,
    success_count: AtomicU32,
    // Epoch millis; 0 means "never".
    last_failure_at: AtomicI64,
    last_probe_at: AtomicI64,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            state: AtomicU8::new(STATE_CLOSED),
            failure_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            last_failure_at: AtomicI64::new(0),
            last_probe_at: AtomicI64::new(0),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(HealthConfig::default())
    }

    /// Availability gate checked before every upstream call.
    ///
    /// While Open, returns false until the cooldown has elapsed since the
    /// last failure; the first check after that flips the breaker to
    /// HalfOpen (exactly once, via CAS) and traffic is admitted again.
    pub fn is_available(&self) -> bool {
        match self.state.load(Ordering::Acquire) {
            STATE_CLOSED => true,
            STATE_OPEN => {
                if self.cooldown_elapsed() {
                    if self
                        .state
                        .compare_exchange(
                            STATE_OPEN,
                            STATE_HALF_OPEN,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        log::info!("circuit breaker half-open: admitting trial traffic");
                    }
                    true
                } else {
                    false
                }
            }
            _ => true,
        }
    }

    /// Record one successful upstream call. While Closed this clears the
    /// consecutive-failure streak; while HalfOpen enough successes close
    /// the breaker.
    pub fn record_success(&self) {
        let successes = self.success_count.fetch_add(1, Ordering::AcqRel) + 1;

        match self.state.load(Ordering::Acquire) {
            STATE_HALF_OPEN if successes >= self.config.success_threshold => {
                self.reset();
                log::info!(
                    "circuit breaker closed after {} successful trial calls",
                    successes
                );
            }
            STATE_CLOSED => {
                self.failure_count.store(0, Ordering::Release);
            }
            _ => {}
        }
    }

    /// Record one failed upstream call.
    pub fn record_failure(&self) {
        let failures = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
        self.last_failure_at
            .store(Utc::now().timestamp_millis(), Ordering::Release);

        let state = self.state.load(Ordering::Acquire);
        if (state == STATE_CLOSED || state == STATE_HALF_OPEN)
            && failures >= self.config.failure_threshold
        {
            self.trip();
            log::warn!("circuit breaker opened after {} failures", failures);
        }
    }

    /// Force the breaker back to Closed with counters cleared.
    pub fn reset(&self) {
        self.state.store(STATE_CLOSED, Ordering::Release);
        self.failure_count.store(0, Ordering::Release);
        self.success_count.store(0, Ordering::Release);
        self.last_failure_at.store(0, Ordering::Release);
    }

    /// Fraction of recorded calls that failed, in `0.0..=1.0`.
    pub fn failure_rate(&self) -> f64 {
        let failures = self.failure_count.load(Ordering::Acquire) as f64;
        let successes = self.success_count.load(Ordering::Acquire) as f64;
        let total = failures + successes;
        if total == 0.0 {
            0.0
        } else {
            failures / total
        }
    }

    pub fn state(&self) -> CircuitState {
        match self.state.load(Ordering::Acquire) {
            STATE_OPEN => CircuitState::Open,
            STATE_HALF_OPEN => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            state: self.state(),
            failure_count: self.failure_count.load(Ordering::Acquire),
            success_count: self.success_count.load(Ordering::Acquire),
            last_failure_at: millis_to_datetime(self.last_failure_at.load(Ordering::Acquire)),
            last_probe_at: millis_to_datetime(self.last_probe_at.load(Ordering::Acquire)),
            available: self.is_available(),
        }
    }

    /// Spawn the periodic connection probe.
    ///
    /// The probe performs a lightweight upstream validation call on every
    /// tick and feeds its outcome through the same success/failure recording
    /// path as real traffic. Abort the returned handle to stop probing.
    pub fn spawn_probe(
        self: &Arc<Self>,
        client: Arc<dyn InferenceClient>,
    ) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.config.probe_interval);
            // The first tick fires immediately; skip it so the probe cadence
            // starts one interval after spawn.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                monitor
                    .last_probe_at
                    .store(Utc::now().timestamp_millis(), Ordering::Release);

                if client.validate_connection().await {
                    monitor.record_success();
                    log::debug!("health probe passed");
                } else {
                    monitor.record_failure();
                    log::warn!("health probe failed");
                }
            }
        })
    }

    fn trip(&self) {
        self.state.store(STATE_OPEN, Ordering::Release);
        self.success_count.store(0, Ordering::Release);
    }

    fn cooldown_elapsed(&self) -> bool {
        let last = self.last_failure_at.load(Ordering::Acquire);
        if last == 0 {
            return true;
        }
        let elapsed = Utc::now().timestamp_millis() - last;
        elapsed >= self.config.cooldown.as_millis() as i64
    }
}

fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    if millis == 0 {
        None
    } else {
        Utc.timestamp_millis_opt(millis).single()
    }
}
