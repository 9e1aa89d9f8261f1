//! Error types shared across the inference and workflow layers.
//!
//! Per-persona failures are never surfaced as errors from the orchestrator;
//! they are captured inside [`InferenceOutcome`](crate::orchestrator::InferenceOutcome)
//! records. The variants here cover the systemic failures that *are* thrown,
//! plus the guard violations raised by the workflow state machine.

use std::error::Error;
use std::fmt;

use crate::ideastorm::phase::{PhaseStatus, PhaseType, SessionStatus};

/// Failures that can occur while talking to the upstream inference service.
#[derive(Debug)]
pub enum InferenceError {
    /// Network-level failure (connect, TLS, mid-body I/O). Retryable.
    Transport(String),

    /// The upstream returned a successful response with missing or empty
    /// content. Distinct from a transport error; the executor may retry it.
    EmptyResponse,

    /// A per-task or per-batch deadline fired before the call settled.
    Timeout,

    /// The circuit breaker is open; the call was rejected without reaching
    /// the upstream at all. Not retryable.
    ServiceUnavailable,

    /// All retry attempts were consumed. Wraps the last underlying failure.
    RetryExhausted {
        attempts: u32,
        source: Box<InferenceError>,
    },

    /// `run_batch` was called with an empty persona list.
    NoPersonas,

    /// The upstream answered with a non-2xx status or a malformed body.
    Upstream(String),
}

impl InferenceError {
    /// Whether a caller-side retry policy should consider this failure
    /// transient. The retry executor itself is failure-kind-agnostic; this
    /// classification is for callers deciding *whether* to wrap a call.
    pub fn is_retryable(&self) -> bool {
        match self {
            InferenceError::Transport(_)
            | InferenceError::Timeout
            | InferenceError::EmptyResponse
            | InferenceError::Upstream(_) => true,
            InferenceError::ServiceUnavailable
            | InferenceError::RetryExhausted { .. }
            | InferenceError::NoPersonas => false,
        }
    }
}

impl fmt::Display for InferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceError::Transport(msg) => write!(f, "transport failure: {}", msg),
            InferenceError::EmptyResponse => write!(f, "upstream returned an empty response"),
            InferenceError::Timeout => write!(f, "inference timed out"),
            InferenceError::ServiceUnavailable => {
                write!(f, "inference service unavailable: circuit breaker is open")
            }
            InferenceError::RetryExhausted { attempts, source } => {
                write!(f, "retries exhausted after {} attempts: {}", attempts, source)
            }
            InferenceError::NoPersonas => write!(f, "no personas supplied for batch"),
            InferenceError::Upstream(msg) => write!(f, "upstream error: {}", msg),
        }
    }
}

impl Error for InferenceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            InferenceError::RetryExhausted { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Guard violations and lookup failures raised by the workflow engine.
///
/// Callers must not retry a guard violation without first correcting state.
#[derive(Debug)]
pub enum WorkflowError {
    SessionNotFound(String),

    PhaseNotFound {
        session_id: String,
        phase: PhaseType,
    },

    /// The requested phase operation is not legal from the current status.
    IllegalPhaseTransition {
        phase: PhaseType,
        status: PhaseStatus,
        action: &'static str,
    },

    /// The requested session operation is not legal from the current status.
    IllegalSessionTransition {
        status: SessionStatus,
        action: &'static str,
    },

    /// Submitting a phase for approval requires at least one successful
    /// persona outcome in the batch that produced it.
    NoSuccessfulOutcomes(PhaseType),
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowError::SessionNotFound(id) => write!(f, "session not found: {}", id),
            WorkflowError::PhaseNotFound { session_id, phase } => {
                write!(f, "phase {:?} not found for session {}", phase, session_id)
            }
            WorkflowError::IllegalPhaseTransition {
                phase,
                status,
                action,
            } => write!(
                f,
                "cannot {} phase {:?} while it is {:?}",
                action, phase, status
            ),
            WorkflowError::IllegalSessionTransition { status, action } => {
                write!(f, "cannot {} session while it is {:?}", action, status)
            }
            WorkflowError::NoSuccessfulOutcomes(phase) => write!(
                f,
                "phase {:?} has no successful persona outcomes; approval submission blocked",
                phase
            ),
        }
    }
}

impl Error for WorkflowError {}
