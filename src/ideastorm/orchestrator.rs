//! Parallel inference orchestrator.
//!
//! `run_batch` fans one task per persona out onto the tokio runtime, each
//! call protected by the circuit breaker, wrapped in the retry executor,
//! and bounded by a per-task timeout. The whole batch is bounded by an
//! overall deadline; tasks that outrun it are recorded as timed out and
//! whatever they eventually produce is discarded. If anything succeeded, a
//! final synthesis call condenses the successful outputs into a summary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::ideastorm::error::InferenceError;
use crate::ideastorm::health::HealthMonitor;
use crate::ideastorm::persona::Persona;
use crate::ideastorm::phase::PhaseType;
use crate::ideastorm::progress::ProgressTracker;
use crate::ideastorm::retry::{execute_with_retry, RetryConfig};
use crate::ideastorm::upstream::InferenceClient;

/// How one persona's task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Success,
    Failed,
    Timeout,
}

/// One prepared unit of work: a persona with its fully-substituted prompts.
#[derive(Debug, Clone)]
pub struct InferenceTask {
    pub persona_id: String,
    pub persona_name: String,
    pub role_label: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub session_context: String,
}

/// The settled result of one persona's task. Written exactly once by the
/// worker that owns it, then frozen into the batch result.
#[derive(Debug, Clone)]
pub struct InferenceOutcome {
    pub persona_id: String,
    pub persona_name: String,
    pub role_label: String,
    pub status: OutcomeStatus,
    pub content: Option<String>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl InferenceOutcome {
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Aggregated result of one batch. Sealed once every task has settled or
/// the overall deadline has fired.
#[derive(Debug)]
pub struct BatchResult {
    pub outcomes: Vec<InferenceOutcome>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub total_duration_ms: u64,
    pub total_count: usize,
    pub success_count: usize,
    pub fail_count: usize,
    pub success_rate: f64,
    pub summary_text: Option<String>,
}

impl BatchResult {
    fn seal(outcomes: Vec<InferenceOutcome>, started_at: DateTime<Utc>) -> Self {
        let ended_at = Utc::now();
        let total_count = outcomes.len();
        let success_count = outcomes.iter().filter(|o| o.is_success()).count();
        let fail_count = total_count - success_count;
        Self {
            started_at,
            ended_at,
            total_duration_ms: (ended_at - started_at).num_milliseconds().max(0) as u64,
            total_count,
            success_count,
            fail_count,
            success_rate: if total_count > 0 {
                success_count as f64 / total_count as f64
            } else {
                0.0
            },
            outcomes,
            summary_text: None,
        }
    }

    pub fn has_successes(&self) -> bool {
        self.success_count > 0
    }

    /// Successful outcomes, used for summary synthesis and phase approval.
    pub fn successful_outcomes(&self) -> impl Iterator<Item = &InferenceOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }
}

/// Timeouts and retry policy of the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Deadline for each persona's call, retries included.
    pub task_timeout: Duration,
    /// Deadline for the whole batch; must exceed `task_timeout`.
    pub batch_timeout: Duration,
    /// Deadline for the post-batch synthesis call.
    pub summary_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            task_timeout: Duration::from_secs(60),
            batch_timeout: Duration::from_secs(120),
            summary_timeout: Duration::from_secs(30),
            retry: RetryConfig::for_inference(),
        }
    }
}

/// Coordinates concurrent per-persona inference through the retry executor,
/// circuit breaker, and progress tracker.
pub struct InferenceOrchestrator {
    client: Arc<dyn InferenceClient>,
    health: Arc<HealthMonitor>,
    tracker: Arc<ProgressTracker>,
    config: OrchestratorConfig,
}

impl InferenceOrchestrator {
    pub fn new(
        client: Arc<dyn InferenceClient>,
        health: Arc<HealthMonitor>,
        tracker: Arc<ProgressTracker>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            client,
            health,
            tracker,
            config,
        }
    }

    pub fn health_monitor(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn progress_tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    /// Build one task per active persona by substituting the phase's prompt
    /// templates and appending each persona's custom fragment. Inactive
    /// personas are skipped.
    pub fn build_tasks(
        personas: &[Persona],
        user_prompt: &str,
        session_context: &str,
        phase: PhaseType,
    ) -> Vec<InferenceTask> {
        let spec = phase.spec();
        personas
            .iter()
            .filter(|persona| persona.is_active())
            .map(|persona| {
                let mut system_prompt = spec
                    .system_prompt_template
                    .replace("{roleType}", &persona.role_label);
                if let Some(fragment) = &persona.system_prompt_fragment {
                    if !fragment.trim().is_empty() {
                        system_prompt.push_str("\n\n");
                        system_prompt.push_str(fragment);
                    }
                }

                let final_user_prompt = spec
                    .user_prompt_template
                    .replace("{topic}", user_prompt)
                    .replace("{context}", session_context);

                InferenceTask {
                    persona_id: persona.id.clone(),
                    persona_name: persona.display_name.clone(),
                    role_label: persona.role_label.clone(),
                    system_prompt,
                    user_prompt: final_user_prompt,
                    session_context: session_context.to_string(),
                }
            })
            .collect()
    }

    /// Run one task outside of any batch. Reports the call outcome to the
    /// circuit breaker but not to the progress tracker.
    pub async fn run_single(&self, task: InferenceTask) -> InferenceOutcome {
        let (outcome, circuit_rejected) = execute_task(
            Arc::clone(&self.client),
            Arc::clone(&self.health),
            &self.config,
            task,
        )
        .await;
        if !circuit_rejected {
            if outcome.is_success() {
                self.health.record_success();
            } else {
                self.health.record_failure();
            }
        }
        outcome
    }

    /// Fan out one task per persona, wait for all of them (bounded by the
    /// batch deadline), synthesize a summary from the successes, and return
    /// the sealed [`BatchResult`].
    ///
    /// A batch with zero successes is not an error: it returns a result
    /// with `success_count == 0` and the caller decides what that blocks.
    /// Only systemic failures ([`InferenceError::NoPersonas`]) are thrown.
    pub async fn run_batch(
        &self,
        personas: &[Persona],
        user_prompt: &str,
        session_context: &str,
        session_id: &str,
        phase: PhaseType,
    ) -> Result<BatchResult, InferenceError> {
        let tasks = Self::build_tasks(personas, user_prompt, session_context, phase);
        if tasks.is_empty() {
            return Err(InferenceError::NoPersonas);
        }

        let started_at = Utc::now();
        let phase_key = phase.key();
        log::info!(
            "starting batch: session={}, phase={}, personas={}",
            session_id,
            phase_key,
            tasks.len()
        );

        self.tracker.start(session_id, phase_key, tasks.len() as u32);

        let mut workers = Vec::with_capacity(tasks.len());
        for task in tasks {
            // Claimed exactly once, either by the worker when it settles or
            // by the deadline path below; the loser's report is discarded.
            let settled = Arc::new(AtomicBool::new(false));
            let client = Arc::clone(&self.client);
            let health = Arc::clone(&self.health);
            let tracker = Arc::clone(&self.tracker);
            let config = self.config.clone();
            let guard = Arc::clone(&settled);
            let sid = session_id.to_string();
            let meta = (
                task.persona_id.clone(),
                task.persona_name.clone(),
                task.role_label.clone(),
            );

            let handle = tokio::spawn(async move {
                let (outcome, circuit_rejected) =
                    execute_task(client, health.clone(), &config, task).await;

                if guard
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    // The batch deadline already claimed this task; drop the
                    // late result without touching shared state.
                    return None;
                }

                if !circuit_rejected {
                    if outcome.is_success() {
                        health.record_success();
                    } else {
                        health.record_failure();
                    }
                }
                tracker.record_task_settled(&sid, phase_key, outcome.is_success());
                Some(outcome)
            });

            workers.push((meta, settled, handle));
        }

        let deadline = tokio::time::Instant::now() + self.config.batch_timeout;

        let mut outcomes = Vec::with_capacity(workers.len());
        for ((persona_id, persona_name, role_label), settled, handle) in workers {
            let outcome = match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(Some(outcome))) => outcome,
                // A worker only returns None when the deadline path claimed
                // its guard first, which cannot happen while we still hold
                // the handle; a panic inside the worker counts as a failure.
                Ok(Ok(None)) | Ok(Err(_)) => {
                    claim_and_record(&settled, &self.tracker, session_id, phase_key);
                    failed_outcome(
                        &persona_id,
                        &persona_name,
                        &role_label,
                        "worker task aborted",
                    )
                }
                Err(_) => {
                    log::warn!(
                        "batch deadline exceeded: session={}, phase={}, persona={}",
                        session_id,
                        phase_key,
                        persona_id
                    );
                    claim_and_record(&settled, &self.tracker, session_id, phase_key);
                    timeout_outcome(&persona_id, &persona_name, &role_label)
                }
            };
            outcomes.push(outcome);
        }

        let mut result = BatchResult::seal(outcomes, started_at);

        if result.has_successes() {
            result.summary_text = Some(self.synthesize_summary(&result, phase).await);
        }

        log::info!(
            "batch finished: session={}, phase={}, success_rate={:.2}, duration={}ms",
            session_id,
            phase_key,
            result.success_rate,
            result.total_duration_ms
        );

        Ok(result)
    }

    /// Condense all successful outcomes into a short summary with one more
    /// upstream call through the usual availability check and retry path.
    /// A failed synthesis yields a placeholder string, never an error.
    async fn synthesize_summary(&self, result: &BatchResult, phase: PhaseType) -> String {
        let mut content = format!(
            "The following are the per-persona outputs of the {} stage:\n\n",
            phase.display_name()
        );
        for outcome in result.successful_outcomes() {
            content.push_str(&format!(
                "[{} - {}]\n{}\n\n",
                outcome.role_label,
                outcome.persona_name,
                outcome.content.as_deref().unwrap_or_default()
            ));
        }

        let system_prompt = "You are a professional brainstorm summarization assistant. \
             Given the outputs of several personas, produce a concise stage summary that \
             distills the key points, collects shared recommendations, highlights novel \
             ideas, and stays neutral.";
        let user_prompt = format!(
            "{}\nPlease write a summary report for the {} stage results above.",
            content,
            phase.display_name()
        );

        if !self.health.is_available() {
            let err = InferenceError::ServiceUnavailable;
            log::error!("summary synthesis skipped: {}", err);
            return format!("Summary generation failed: {}", err);
        }

        let client = Arc::clone(&self.client);
        let call = execute_with_retry(
            || client.send(system_prompt, &user_prompt),
            &self.config.retry,
            "summary synthesis",
        );

        match tokio::time::timeout(self.config.summary_timeout, call).await {
            Ok(Ok(summary)) => summary,
            Ok(Err(err)) => {
                log::error!("summary synthesis failed: {}", err);
                format!("Summary generation failed: {}", err)
            }
            Err(_) => {
                log::error!("summary synthesis timed out");
                format!("Summary generation failed: {}", InferenceError::Timeout)
            }
        }
    }
}

/// Claim a task's settle guard from the deadline path; if we win, the task
/// is counted as failed in the tracker so the record can finalize, and the
/// worker's eventual report is discarded.
fn claim_and_record(
    settled: &AtomicBool,
    tracker: &ProgressTracker,
    session_id: &str,
    phase_key: &str,
) {
    if settled
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
    {
        tracker.record_task_settled(session_id, phase_key, false);
    }
}

/// Execute one task: circuit pre-check, then the retry-wrapped upstream
/// call under the per-task timeout. Returns the outcome plus whether the
/// circuit rejected the call before it reached the upstream (in which case
/// no health outcome should be recorded).
async fn execute_task(
    client: Arc<dyn InferenceClient>,
    health: Arc<HealthMonitor>,
    config: &OrchestratorConfig,
    task: InferenceTask,
) -> (InferenceOutcome, bool) {
    let started_at = Utc::now();

    if !health.is_available() {
        let err = InferenceError::ServiceUnavailable;
        log::warn!("task rejected by circuit breaker: persona={}", task.persona_id);
        return (
            settle(
                &task,
                started_at,
                OutcomeStatus::Failed,
                None,
                Some(err.to_string()),
            ),
            true,
        );
    }

    let operation_name = format!("inference[{}]", task.persona_id);
    let call = execute_with_retry(
        || client.send(&task.system_prompt, &task.user_prompt),
        &config.retry,
        &operation_name,
    );

    let outcome = match tokio::time::timeout(config.task_timeout, call).await {
        Ok(Ok(content)) => {
            settle(&task, started_at, OutcomeStatus::Success, Some(content), None)
        }
        Ok(Err(err)) => {
            log::error!("task failed: persona={}, error={}", task.persona_id, err);
            settle(
                &task,
                started_at,
                OutcomeStatus::Failed,
                None,
                Some(err.to_string()),
            )
        }
        Err(_) => {
            log::warn!("task timed out: persona={}", task.persona_id);
            settle(
                &task,
                started_at,
                OutcomeStatus::Timeout,
                None,
                Some(InferenceError::Timeout.to_string()),
            )
        }
    };

    (outcome, false)
}

fn settle(
    task: &InferenceTask,
    started_at: DateTime<Utc>,
    status: OutcomeStatus,
    content: Option<String>,
    error_message: Option<String>,
) -> InferenceOutcome {
    let ended_at = Utc::now();
    InferenceOutcome {
        persona_id: task.persona_id.clone(),
        persona_name: task.persona_name.clone(),
        role_label: task.role_label.clone(),
        status,
        content,
        error_message,
        started_at,
        ended_at,
        duration_ms: (ended_at - started_at).num_milliseconds().max(0) as u64,
    }
}

fn timeout_outcome(persona_id: &str, persona_name: &str, role_label: &str) -> InferenceOutcome {
    let now = Utc::now();
    InferenceOutcome {
        persona_id: persona_id.to_string(),
        persona_name: persona_name.to_string(),
        role_label: role_label.to_string(),
        status: OutcomeStatus::Timeout,
        content: None,
        error_message: Some(InferenceError::Timeout.to_string()),
        started_at: now,
        ended_at: now,
        duration_ms: 0,
    }
}

fn failed_outcome(
    persona_id: &str,
    persona_name: &str,
    role_label: &str,
    message: &str,
) -> InferenceOutcome {
    let now = Utc::now();
    InferenceOutcome {
        persona_id: persona_id.to_string(),
        persona_name: persona_name.to_string(),
        role_label: role_label.to_string(),
        status: OutcomeStatus::Failed,
        content: None,
        error_message: Some(message.to_string()),
        started_at: now,
        ended_at: now,
        duration_ms: 0,
    }
}
