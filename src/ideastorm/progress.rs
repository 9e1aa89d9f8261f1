//! In-memory progress registry for running and finished batches.
//!
//! Records are keyed by `(session_id, phase_key)`. Per-task settles from
//! many concurrent workers increment the same record under one mutex, so
//! no updates are lost; system-wide counters are plain atomics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Status of one tracked batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    InProgress,
    Completed,
    Failed,
}

/// Live view of one batch's progress. Becomes immutable once
/// `completed_agents == total_agents`.
#[derive(Debug, Clone)]
pub struct ProgressRecord {
    pub session_id: String,
    pub phase_key: String,
    pub status: ProgressStatus,
    pub total_agents: u32,
    pub completed_agents: u32,
    pub successful_agents: u32,
    pub failed_agents: u32,
    pub success_rate: f64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub processing_time_ms: u64,
    pub error_message: Option<String>,
}

/// Rolled-up counters across every batch this process has run.
#[derive(Debug, Clone)]
pub struct SystemStatistics {
    pub total_batches: u32,
    pub completed_batches: u32,
    pub failed_batches: u32,
    pub avg_processing_time_ms: u64,
}

/// Thread-safe registry of batch progress plus running system counters.
///
/// Constructed once and shared by `Arc`; no global instance.
pub struct ProgressTracker {
    records: Mutex<HashMap<(String, String), ProgressRecord>>,
    total_batches: AtomicU32,
    completed_batches: AtomicU32,
    failed_batches: AtomicU32,
    total_processing_time_ms: AtomicU64,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            total_batches: AtomicU32::new(0),
            completed_batches: AtomicU32::new(0),
            failed_batches: AtomicU32::new(0),
            total_processing_time_ms: AtomicU64::new(0),
        }
    }

    /// Register a new batch. Overwrites any stale record under the same key
    /// (a rejected-then-retried phase reuses its key).
    pub fn start(&self, session_id: &str, phase_key: &str, total_agents: u32) {
        let record = ProgressRecord {
            session_id: session_id.to_string(),
            phase_key: phase_key.to_string(),
            status: ProgressStatus::InProgress,
            total_agents,
            completed_agents: 0,
            successful_agents: 0,
            failed_agents: 0,
            success_rate: 0.0,
            started_at: Utc::now(),
            ended_at: None,
            processing_time_ms: 0,
            error_message: None,
        };

        let mut records = self.records.lock().unwrap();
        records.insert(
            (session_id.to_string(), phase_key.to_string()),
            record,
        );
        self.total_batches.fetch_add(1, Ordering::AcqRel);
    }

    /// Record one settled task. Finalizes the record once every task has
    /// settled: the batch is `Failed` when zero tasks succeeded, otherwise
    /// `Completed`.
    pub fn record_task_settled(&self, session_id: &str, phase_key: &str, success: bool) {
        let mut records = self.records.lock().unwrap();
        let record = match records.get_mut(&(session_id.to_string(), phase_key.to_string())) {
            Some(record) => record,
            None => return,
        };

        record.completed_agents += 1;
        if success {
            record.successful_agents += 1;
        } else {
            record.failed_agents += 1;
        }
        if record.total_agents > 0 {
            record.success_rate = record.successful_agents as f64 / record.total_agents as f64;
        }

        if record.completed_agents >= record.total_agents {
            let ended = Utc::now();
            record.ended_at = Some(ended);
            record.processing_time_ms =
                (ended - record.started_at).num_milliseconds().max(0) as u64;

            if record.successful_agents == 0 {
                record.status = ProgressStatus::Failed;
                self.failed_batches.fetch_add(1, Ordering::AcqRel);
            } else {
                record.status = ProgressStatus::Completed;
                self.completed_batches.fetch_add(1, Ordering::AcqRel);
                self.total_processing_time_ms
                    .fetch_add(record.processing_time_ms, Ordering::AcqRel);
            }
        }
    }

    /// Mark a batch failed outright (for systemic failures that prevent
    /// tasks from settling individually).
    pub fn mark_failed(&self, session_id: &str, phase_key: &str, error: impl Into<String>) {
        let mut records = self.records.lock().unwrap();
        if let Some(record) =
            records.get_mut(&(session_id.to_string(), phase_key.to_string()))
        {
            record.status = ProgressStatus::Failed;
            record.error_message = Some(error.into());
            record.ended_at = Some(Utc::now());
            self.failed_batches.fetch_add(1, Ordering::AcqRel);
        }
    }

    pub fn get(&self, session_id: &str, phase_key: &str) -> Option<ProgressRecord> {
        let records = self.records.lock().unwrap();
        records
            .get(&(session_id.to_string(), phase_key.to_string()))
            .cloned()
    }

    pub fn system_statistics(&self) -> SystemStatistics {
        let completed = self.completed_batches.load(Ordering::Acquire);
        let total_time = self.total_processing_time_ms.load(Ordering::Acquire);
        SystemStatistics {
            total_batches: self.total_batches.load(Ordering::Acquire),
            completed_batches: completed,
            failed_batches: self.failed_batches.load(Ordering::Acquire),
            avg_processing_time_ms: if completed > 0 {
                total_time / completed as u64
            } else {
                0
            },
        }
    }

    /// Drop finalized records whose end time is older than `older_than`.
    /// Returns how many records were removed.
    pub fn cleanup_expired(&self, older_than: Duration) -> usize {
        let cutoff = Utc::now() - older_than;
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|_, record| match record.ended_at {
            Some(ended) => ended >= cutoff,
            None => true,
        });
        before - records.len()
    }

    /// Default retention window: 24 hours.
    pub fn cleanup_expired_default(&self) -> usize {
        self.cleanup_expired(Duration::hours(24))
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
