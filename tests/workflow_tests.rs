use chrono::Utc;
use ideastorm::{
    BatchResult, InferenceOutcome, OutcomeStatus, PhaseStatus, PhaseType, SessionStatus,
    WorkflowError, WorkflowEngine,
};

fn outcome(persona_id: &str, status: OutcomeStatus, content: Option<&str>) -> InferenceOutcome {
    let now = Utc::now();
    InferenceOutcome {
        persona_id: persona_id.to_string(),
        persona_name: format!("persona {}", persona_id),
        role_label: "Analyst".to_string(),
        status,
        content: content.map(str::to_string),
        error_message: if status == OutcomeStatus::Success {
            None
        } else {
            Some("mock failure".to_string())
        },
        started_at: now,
        ended_at: now,
        duration_ms: 5,
    }
}

fn batch_of(outcomes: Vec<InferenceOutcome>, summary: Option<&str>) -> BatchResult {
    let now = Utc::now();
    let total_count = outcomes.len();
    let success_count = outcomes
        .iter()
        .filter(|o| o.status == OutcomeStatus::Success)
        .count();
    BatchResult {
        started_at: now,
        ended_at: now,
        total_duration_ms: 10,
        total_count,
        success_count,
        fail_count: total_count - success_count,
        success_rate: if total_count > 0 {
            success_count as f64 / total_count as f64
        } else {
            0.0
        },
        outcomes,
        summary_text: summary.map(str::to_string),
    }
}

fn good_batch(summary: &str) -> BatchResult {
    batch_of(
        vec![
            outcome("p1", OutcomeStatus::Success, Some("an idea")),
            outcome("p2", OutcomeStatus::Success, Some("another idea")),
        ],
        Some(summary),
    )
}

/// Drive one phase through run, review, and approval.
fn approve_current(engine: &WorkflowEngine, session_id: &str, phase: PhaseType) {
    engine
        .record_batch(session_id, phase, &good_batch("summary"))
        .unwrap();
    engine.submit_for_approval(session_id, phase).unwrap();
    engine.approve_phase(session_id, phase).unwrap();
}

#[test]
fn created_session_has_three_fresh_phases() {
    let engine = WorkflowEngine::new();
    let session = engine.create_session("Library", "Attract younger visitors", "libraries");

    assert_eq!(session.status, SessionStatus::Created);
    assert!(session.current_phase.is_none());

    let phases = engine.session_phases(&session.id).unwrap();
    assert_eq!(phases.len(), 3);
    assert!(phases.iter().all(|p| p.status == PhaseStatus::NotStarted));
    assert_eq!(engine.progress_percentage(&session.id).unwrap(), 0);
}

#[test]
fn unknown_session_is_reported() {
    let engine = WorkflowEngine::new();
    assert!(matches!(
        engine.start_session("missing"),
        Err(WorkflowError::SessionNotFound(_))
    ));
}

#[test]
fn starting_a_session_opens_the_first_phase() {
    let engine = WorkflowEngine::new();
    let session = engine.create_session("t", "d", "topic");
    let started = engine.start_session(&session.id).unwrap();

    assert_eq!(started.status, SessionStatus::InProgress);
    assert_eq!(started.current_phase, Some(PhaseType::IdeaGeneration));

    let first = engine
        .phase(&session.id, PhaseType::IdeaGeneration)
        .unwrap();
    assert_eq!(first.status, PhaseStatus::InProgress);
    assert!(first.started_at.is_some());
}

#[test]
fn completed_session_cannot_restart() {
    let engine = WorkflowEngine::new();
    let session = engine.create_session("t", "d", "topic");
    engine.start_session(&session.id).unwrap();
    for phase in [
        PhaseType::IdeaGeneration,
        PhaseType::FeasibilityAnalysis,
        PhaseType::DrawbackDiscussion,
    ] {
        approve_current(&engine, &session.id, phase);
    }

    assert!(matches!(
        engine.start_session(&session.id),
        Err(WorkflowError::IllegalSessionTransition { .. })
    ));
}

#[test]
fn later_phase_is_gated_on_predecessor_approval() {
    let engine = WorkflowEngine::new();
    let session = engine.create_session("t", "d", "topic");
    engine.start_session(&session.id).unwrap();

    let err = engine
        .start_phase(&session.id, PhaseType::FeasibilityAnalysis)
        .unwrap_err();
    assert!(matches!(err, WorkflowError::IllegalPhaseTransition { .. }));
}

#[test]
fn submit_requires_at_least_one_success() {
    let engine = WorkflowEngine::new();
    let session = engine.create_session("t", "d", "topic");
    engine.start_session(&session.id).unwrap();

    let all_failed = batch_of(
        vec![
            outcome("p1", OutcomeStatus::Failed, None),
            outcome("p2", OutcomeStatus::Timeout, None),
        ],
        None,
    );
    engine
        .record_batch(&session.id, PhaseType::IdeaGeneration, &all_failed)
        .unwrap();

    let err = engine
        .submit_for_approval(&session.id, PhaseType::IdeaGeneration)
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::NoSuccessfulOutcomes(PhaseType::IdeaGeneration)
    ));

    // The phase stays runnable so the batch can be retried.
    let record = engine
        .phase(&session.id, PhaseType::IdeaGeneration)
        .unwrap();
    assert_eq!(record.status, PhaseStatus::InProgress);
}

#[test]
fn record_batch_requires_a_running_phase() {
    let engine = WorkflowEngine::new();
    let session = engine.create_session("t", "d", "topic");

    let err = engine
        .record_batch(&session.id, PhaseType::IdeaGeneration, &good_batch("s"))
        .unwrap_err();
    assert!(matches!(err, WorkflowError::IllegalPhaseTransition { .. }));
}

#[test]
fn approval_advances_to_the_next_phase() {
    let engine = WorkflowEngine::new();
    let session = engine.create_session("t", "d", "topic");
    engine.start_session(&session.id).unwrap();

    approve_current(&engine, &session.id, PhaseType::IdeaGeneration);

    let first = engine
        .phase(&session.id, PhaseType::IdeaGeneration)
        .unwrap();
    assert_eq!(first.status, PhaseStatus::Completed);
    assert_eq!(first.summary.as_deref(), Some("summary"));
    assert!(first.completed_at.is_some());

    let second = engine
        .phase(&session.id, PhaseType::FeasibilityAnalysis)
        .unwrap();
    assert_eq!(second.status, PhaseStatus::InProgress);

    let current = engine.session(&session.id).unwrap();
    assert_eq!(current.status, SessionStatus::InProgress);
    assert_eq!(current.current_phase, Some(PhaseType::FeasibilityAnalysis));
    assert_eq!(engine.progress_percentage(&session.id).unwrap(), 33);
}

#[test]
fn approving_the_last_phase_completes_the_session() {
    let engine = WorkflowEngine::new();
    let session = engine.create_session("t", "d", "topic");
    engine.start_session(&session.id).unwrap();

    approve_current(&engine, &session.id, PhaseType::IdeaGeneration);
    approve_current(&engine, &session.id, PhaseType::FeasibilityAnalysis);
    approve_current(&engine, &session.id, PhaseType::DrawbackDiscussion);

    let finished = engine.session(&session.id).unwrap();
    assert_eq!(finished.status, SessionStatus::Completed);
    assert_eq!(engine.progress_percentage(&session.id).unwrap(), 100);

    let phases = engine.session_phases(&session.id).unwrap();
    assert!(phases.iter().all(|p| p.status == PhaseStatus::Completed));
}

#[test]
fn approval_of_an_unreviewed_phase_is_rejected() {
    let engine = WorkflowEngine::new();
    let session = engine.create_session("t", "d", "topic");
    engine.start_session(&session.id).unwrap();

    let err = engine
        .approve_phase(&session.id, PhaseType::IdeaGeneration)
        .unwrap_err();
    assert!(matches!(err, WorkflowError::IllegalPhaseTransition { .. }));
}

#[test]
fn approval_without_a_batch_summary_composes_one() {
    let engine = WorkflowEngine::new();
    let session = engine.create_session("t", "d", "topic");
    engine.start_session(&session.id).unwrap();

    engine
        .record_batch(
            &session.id,
            PhaseType::IdeaGeneration,
            &batch_of(
                vec![
                    outcome("p1", OutcomeStatus::Success, Some("first idea")),
                    outcome("p2", OutcomeStatus::Failed, None),
                ],
                None,
            ),
        )
        .unwrap();
    engine
        .submit_for_approval(&session.id, PhaseType::IdeaGeneration)
        .unwrap();
    let approved = engine
        .approve_phase(&session.id, PhaseType::IdeaGeneration)
        .unwrap();

    let summary = approved.summary.unwrap();
    assert!(summary.contains("first idea"));
    assert!(summary.contains("persona p1"));
    assert!(!summary.contains("persona p2"));
}

#[test]
fn rejection_discards_outcomes_and_allows_retry() {
    let engine = WorkflowEngine::new();
    let session = engine.create_session("t", "d", "topic");
    engine.start_session(&session.id).unwrap();

    engine
        .record_batch(&session.id, PhaseType::IdeaGeneration, &good_batch("s"))
        .unwrap();
    engine
        .submit_for_approval(&session.id, PhaseType::IdeaGeneration)
        .unwrap();
    let rejected = engine
        .reject_phase(&session.id, PhaseType::IdeaGeneration)
        .unwrap();

    assert_eq!(rejected.status, PhaseStatus::Rejected);
    assert!(rejected.outcomes.is_empty());
    assert!(rejected.summary.is_none());

    let retried = engine
        .retry_phase(&session.id, PhaseType::IdeaGeneration)
        .unwrap();
    assert_eq!(retried.status, PhaseStatus::InProgress);
    assert!(retried.outcomes.is_empty());
}

#[test]
fn retry_is_only_valid_from_rejected() {
    let engine = WorkflowEngine::new();
    let session = engine.create_session("t", "d", "topic");
    engine.start_session(&session.id).unwrap();

    let err = engine
        .retry_phase(&session.id, PhaseType::IdeaGeneration)
        .unwrap_err();
    assert!(matches!(err, WorkflowError::IllegalPhaseTransition { .. }));
}

#[test]
fn pause_and_resume_preserve_phase_state() {
    let engine = WorkflowEngine::new();
    let session = engine.create_session("t", "d", "topic");
    engine.start_session(&session.id).unwrap();
    approve_current(&engine, &session.id, PhaseType::IdeaGeneration);

    let paused = engine.pause_session(&session.id).unwrap();
    assert_eq!(paused.status, SessionStatus::Paused);

    // Pausing twice is illegal.
    assert!(matches!(
        engine.pause_session(&session.id),
        Err(WorkflowError::IllegalSessionTransition { .. })
    ));

    let resumed = engine.resume_session(&session.id).unwrap();
    assert_eq!(resumed.status, SessionStatus::InProgress);
    assert_eq!(resumed.current_phase, Some(PhaseType::FeasibilityAnalysis));
    let second = engine
        .phase(&session.id, PhaseType::FeasibilityAnalysis)
        .unwrap();
    assert_eq!(second.status, PhaseStatus::InProgress);
}

#[test]
fn cancel_is_terminal() {
    let engine = WorkflowEngine::new();
    let session = engine.create_session("t", "d", "topic");
    engine.start_session(&session.id).unwrap();

    let cancelled = engine.cancel_session(&session.id).unwrap();
    assert_eq!(cancelled.status, SessionStatus::Cancelled);

    assert!(matches!(
        engine.cancel_session(&session.id),
        Err(WorkflowError::IllegalSessionTransition { .. })
    ));
    assert!(matches!(
        engine.start_session(&session.id),
        Err(WorkflowError::IllegalSessionTransition { .. })
    ));
}

#[test]
fn session_context_accumulates_settled_summaries() {
    let engine = WorkflowEngine::new();
    let session = engine.create_session("Library", "Attract younger visitors", "topic");
    engine.start_session(&session.id).unwrap();

    let early = engine.session_context(&session.id).unwrap();
    assert!(early.contains("Library"));
    assert!(!early.contains("summary one"));

    engine
        .record_batch(
            &session.id,
            PhaseType::IdeaGeneration,
            &good_batch("summary one"),
        )
        .unwrap();
    engine
        .submit_for_approval(&session.id, PhaseType::IdeaGeneration)
        .unwrap();
    engine
        .approve_phase(&session.id, PhaseType::IdeaGeneration)
        .unwrap();

    let later = engine.session_context(&session.id).unwrap();
    assert!(later.contains("summary one"));
}
