//! Session and phase workflow engine.
//!
//! A session walks the three brainstorm phases in order. Each phase runs a
//! batch, waits for a human review, and only an approved phase unlocks the
//! next one. Rejection discards the phase's outcomes so it can be retried
//! from scratch.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::ideastorm::error::WorkflowError;
use crate::ideastorm::orchestrator::{BatchResult, InferenceOutcome};
use crate::ideastorm::phase::{PhaseStatus, PhaseType, SessionStatus};

/// One brainstorm session and where it stands.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub topic: String,
    pub status: SessionStatus,
    pub current_phase: Option<PhaseType>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One phase of one session: its status, the batch outcomes recorded for
/// it, and the summary frozen at approval time.
#[derive(Debug, Clone)]
pub struct PhaseRecord {
    pub session_id: String,
    pub phase: PhaseType,
    pub status: PhaseStatus,
    pub summary: Option<String>,
    pub outcomes: Vec<InferenceOutcome>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// In-memory store driving the session/phase state machine. All guards
/// live here; callers never mutate records directly.
pub struct WorkflowEngine {
    sessions: Mutex<HashMap<String, SessionRecord>>,
    phases: Mutex<HashMap<(String, PhaseType), PhaseRecord>>,
}

impl WorkflowEngine {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            phases: Mutex::new(HashMap::new()),
        }
    }

    /// Create a session with all three phases initialized to
    /// [`PhaseStatus::NotStarted`]. The session itself starts as
    /// [`SessionStatus::Created`] and runs nothing yet.
    pub fn create_session(
        &self,
        title: impl Into<String>,
        description: impl Into<String>,
        topic: impl Into<String>,
    ) -> SessionRecord {
        let now = Utc::now();
        let session = SessionRecord {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            description: description.into(),
            topic: topic.into(),
            status: SessionStatus::Created,
            current_phase: None,
            created_at: now,
            updated_at: now,
        };

        let mut phases = self.phases.lock().unwrap();
        for phase in PhaseType::all() {
            phases.insert(
                (session.id.clone(), phase),
                PhaseRecord {
                    session_id: session.id.clone(),
                    phase,
                    status: PhaseStatus::NotStarted,
                    summary: None,
                    outcomes: Vec::new(),
                    started_at: None,
                    completed_at: None,
                },
            );
        }
        drop(phases);

        log::info!("session created: id={}, title={}", session.id, session.title);
        self.sessions.lock().unwrap().insert(session.id.clone(), session.clone());
        session
    }

    /// Start (or resume) a session and open its first phase.
    pub fn start_session(&self, session_id: &str) -> Result<SessionRecord, WorkflowError> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| WorkflowError::SessionNotFound(session_id.to_string()))?;
        if !session.status.can_start() {
            return Err(WorkflowError::IllegalSessionTransition {
                status: session.status,
                action: "start",
            });
        }

        let resuming = session.status == SessionStatus::Paused;
        session.status = SessionStatus::InProgress;
        session.updated_at = Utc::now();
        if session.current_phase.is_none() {
            session.current_phase = Some(PhaseType::first());
        }
        let snapshot = session.clone();
        drop(sessions);

        if !resuming {
            self.open_phase(session_id, PhaseType::first())?;
        }
        log::info!("session started: id={}", session_id);
        Ok(snapshot)
    }

    pub fn pause_session(&self, session_id: &str) -> Result<SessionRecord, WorkflowError> {
        self.transition_session(session_id, "pause", |status| status.can_pause(), SessionStatus::Paused)
    }

    /// Resume a paused session without touching any phase state.
    pub fn resume_session(&self, session_id: &str) -> Result<SessionRecord, WorkflowError> {
        self.transition_session(
            session_id,
            "resume",
            |status| status == SessionStatus::Paused,
            SessionStatus::InProgress,
        )
    }

    /// Cancel a session in any non-terminal state.
    pub fn cancel_session(&self, session_id: &str) -> Result<SessionRecord, WorkflowError> {
        self.transition_session(
            session_id,
            "cancel",
            |status| !status.is_terminated(),
            SessionStatus::Cancelled,
        )
    }

    /// Open a phase for execution. The first phase is gated only by its own
    /// status; every later phase also requires its predecessor to be
    /// approved or completed.
    pub fn start_phase(
        &self,
        session_id: &str,
        phase: PhaseType,
    ) -> Result<PhaseRecord, WorkflowError> {
        {
            let sessions = self.sessions.lock().unwrap();
            let session = sessions
                .get(session_id)
                .ok_or_else(|| WorkflowError::SessionNotFound(session_id.to_string()))?;
            if session.status != SessionStatus::InProgress {
                return Err(WorkflowError::IllegalSessionTransition {
                    status: session.status,
                    action: "run phase",
                });
            }
        }

        if let Some(predecessor) = phase.previous() {
            let phases = self.phases.lock().unwrap();
            let prior = phases
                .get(&(session_id.to_string(), predecessor))
                .ok_or_else(|| WorkflowError::PhaseNotFound {
                    session_id: session_id.to_string(),
                    phase: predecessor,
                })?;
            if !prior.status.is_settled() {
                return Err(WorkflowError::IllegalPhaseTransition {
                    phase,
                    status: prior.status,
                    action: "start before predecessor approval",
                });
            }
        }

        let record = self.open_phase(session_id, phase)?;
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(session) = sessions.get_mut(session_id) {
            session.current_phase = Some(phase);
            session.updated_at = Utc::now();
        }
        Ok(record)
    }

    /// Attach a finished batch's outcomes to a running phase. Overwrites
    /// whatever a previous attempt of the same phase left behind.
    pub fn record_batch(
        &self,
        session_id: &str,
        phase: PhaseType,
        batch: &BatchResult,
    ) -> Result<PhaseRecord, WorkflowError> {
        let mut phases = self.phases.lock().unwrap();
        let record = get_phase_mut(&mut phases, session_id, phase)?;
        if record.status != PhaseStatus::InProgress {
            return Err(WorkflowError::IllegalPhaseTransition {
                phase,
                status: record.status,
                action: "record batch",
            });
        }
        record.outcomes = batch.outcomes.clone();
        record.summary = batch.summary_text.clone();
        Ok(record.clone())
    }

    /// Move a running phase to [`PhaseStatus::WaitingApproval`]. Requires
    /// at least one successful outcome; a fully failed batch keeps the
    /// phase in progress so it can be rerun.
    pub fn submit_for_approval(
        &self,
        session_id: &str,
        phase: PhaseType,
    ) -> Result<PhaseRecord, WorkflowError> {
        let mut phases = self.phases.lock().unwrap();
        let record = get_phase_mut(&mut phases, session_id, phase)?;
        if !record.status.can_submit_for_approval() {
            return Err(WorkflowError::IllegalPhaseTransition {
                phase,
                status: record.status,
                action: "submit for approval",
            });
        }
        if !record.outcomes.iter().any(|o| o.is_success()) {
            return Err(WorkflowError::NoSuccessfulOutcomes(phase));
        }
        record.status = PhaseStatus::WaitingApproval;
        log::info!(
            "phase awaiting approval: session={}, phase={}",
            session_id,
            phase.key()
        );
        Ok(record.clone())
    }

    /// Approve a reviewed phase: freeze its summary, complete it, and
    /// either open the next phase or complete the whole session.
    pub fn approve_phase(
        &self,
        session_id: &str,
        phase: PhaseType,
    ) -> Result<PhaseRecord, WorkflowError> {
        {
            let mut phases = self.phases.lock().unwrap();
            let record = get_phase_mut(&mut phases, session_id, phase)?;
            if !record.status.can_review() {
                return Err(WorkflowError::IllegalPhaseTransition {
                    phase,
                    status: record.status,
                    action: "approve",
                });
            }
            if record.summary.is_none() {
                record.summary = Some(compose_summary(&record.outcomes));
            }
            record.status = PhaseStatus::Approved;
            record.completed_at = Some(Utc::now());
        }
        log::info!("phase approved: session={}, phase={}", session_id, phase.key());

        // An approved phase stays Approved until the workflow moves past
        // it: opening the next phase (or finishing the session) marks it
        // Completed.
        match phase.next() {
            Some(next) => {
                self.start_phase(session_id, next)?;
            }
            None => {
                let mut sessions = self.sessions.lock().unwrap();
                if let Some(session) = sessions.get_mut(session_id) {
                    session.status = SessionStatus::Completed;
                    session.updated_at = Utc::now();
                    log::info!("session completed: id={}", session_id);
                }
            }
        }
        {
            let mut phases = self.phases.lock().unwrap();
            let record = get_phase_mut(&mut phases, session_id, phase)?;
            record.status = PhaseStatus::Completed;
        }
        self.phase(session_id, phase)
    }

    /// Reject a reviewed phase and discard its outcomes and summary.
    pub fn reject_phase(
        &self,
        session_id: &str,
        phase: PhaseType,
    ) -> Result<PhaseRecord, WorkflowError> {
        let mut phases = self.phases.lock().unwrap();
        let record = get_phase_mut(&mut phases, session_id, phase)?;
        if !record.status.can_review() {
            return Err(WorkflowError::IllegalPhaseTransition {
                phase,
                status: record.status,
                action: "reject",
            });
        }
        record.status = PhaseStatus::Rejected;
        record.outcomes.clear();
        record.summary = None;
        log::info!("phase rejected: session={}, phase={}", session_id, phase.key());
        Ok(record.clone())
    }

    /// Rerun a rejected phase from a clean slate.
    pub fn retry_phase(
        &self,
        session_id: &str,
        phase: PhaseType,
    ) -> Result<PhaseRecord, WorkflowError> {
        {
            let phases = self.phases.lock().unwrap();
            let record = phases
                .get(&(session_id.to_string(), phase))
                .ok_or_else(|| WorkflowError::PhaseNotFound {
                    session_id: session_id.to_string(),
                    phase,
                })?;
            if record.status != PhaseStatus::Rejected {
                return Err(WorkflowError::IllegalPhaseTransition {
                    phase,
                    status: record.status,
                    action: "retry",
                });
            }
        }
        self.start_phase(session_id, phase)
    }

    pub fn session(&self, session_id: &str) -> Result<SessionRecord, WorkflowError> {
        self.sessions.lock().unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| WorkflowError::SessionNotFound(session_id.to_string()))
    }

    pub fn phase(
        &self,
        session_id: &str,
        phase: PhaseType,
    ) -> Result<PhaseRecord, WorkflowError> {
        self.phases.lock().unwrap()
            .get(&(session_id.to_string(), phase))
            .cloned()
            .ok_or_else(|| WorkflowError::PhaseNotFound {
                session_id: session_id.to_string(),
                phase,
            })
    }

    /// All three phase records of a session in canonical order.
    pub fn session_phases(
        &self,
        session_id: &str,
    ) -> Result<Vec<PhaseRecord>, WorkflowError> {
        PhaseType::all()
            .map(|phase| self.phase(session_id, phase))
            .collect()
    }

    /// Share of settled phases, 0-100.
    pub fn progress_percentage(&self, session_id: &str) -> Result<u32, WorkflowError> {
        let phases = self.session_phases(session_id)?;
        let settled = phases.iter().filter(|p| p.status.is_settled()).count();
        Ok((settled * 100 / phases.len()) as u32)
    }

    /// Context string passed into later phases: the session framing plus
    /// the summaries of every phase settled so far.
    pub fn session_context(&self, session_id: &str) -> Result<String, WorkflowError> {
        let session = self.session(session_id)?;
        let mut context = format!("Session: {}\n{}", session.title, session.description);
        for record in self.session_phases(session_id)? {
            if record.status.is_settled() {
                if let Some(summary) = &record.summary {
                    context.push_str(&format!(
                        "\n\n[{} summary]\n{}",
                        record.phase.display_name(),
                        summary
                    ));
                }
            }
        }
        Ok(context)
    }

    fn open_phase(
        &self,
        session_id: &str,
        phase: PhaseType,
    ) -> Result<PhaseRecord, WorkflowError> {
        let mut phases = self.phases.lock().unwrap();
        let record = get_phase_mut(&mut phases, session_id, phase)?;
        if !record.status.can_start() {
            return Err(WorkflowError::IllegalPhaseTransition {
                phase,
                status: record.status,
                action: "start",
            });
        }
        record.status = PhaseStatus::InProgress;
        record.started_at = Some(Utc::now());
        record.completed_at = None;
        record.outcomes.clear();
        record.summary = None;
        log::info!("phase started: session={}, phase={}", session_id, phase.key());
        Ok(record.clone())
    }

    fn transition_session(
        &self,
        session_id: &str,
        action: &'static str,
        allowed: impl Fn(SessionStatus) -> bool,
        target: SessionStatus,
    ) -> Result<SessionRecord, WorkflowError> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| WorkflowError::SessionNotFound(session_id.to_string()))?;
        if !allowed(session.status) {
            return Err(WorkflowError::IllegalSessionTransition {
                status: session.status,
                action,
            });
        }
        session.status = target;
        session.updated_at = Utc::now();
        log::info!("session {}: id={}", action, session_id);
        Ok(session.clone())
    }
}

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn compose_summary(outcomes: &[InferenceOutcome]) -> String {
    let mut summary = String::new();
    for outcome in outcomes.iter().filter(|o| o.is_success()) {
        summary.push_str(&format!(
            "[{} - {}]\n{}\n\n",
            outcome.role_label,
            outcome.persona_name,
            outcome.content.as_deref().unwrap_or_default()
        ));
    }
    summary.trim_end().to_string()
}

fn get_phase_mut<'a>(
    phases: &'a mut HashMap<(String, PhaseType), PhaseRecord>,
    session_id: &str,
    phase: PhaseType,
) -> Result<&'a mut PhaseRecord, WorkflowError> {
    phases
        .get_mut(&(session_id.to_string(), phase))
        .ok_or_else(|| WorkflowError::PhaseNotFound {
            session_id: session_id.to_string(),
            phase,
        })
}
