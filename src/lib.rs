//! # IdeaStorm
//!
//! IdeaStorm is the inference core of a multi-persona brainstorming engine. A session walks
//! three fixed discussion phases (idea generation, feasibility analysis, drawback
//! discussion); in each phase every configured persona is asked the same question in
//! parallel, the successful answers are condensed into a summary, and a human reviewer
//! approves or rejects the phase before the next one may run.
//!
//! The crate provides carefully layered abstractions for:
//!
//! * **Upstream Access**: the [`InferenceClient`] trait with an HTTP implementation
//!   ([`upstream::HttpInferenceClient`]) that speaks an OpenAI-compatible chat API,
//!   supports SSE streaming, and falls back to a backup endpoint
//! * **Resilience**: a retry executor with exponential backoff and jitter
//!   ([`retry::execute_with_retry`]) and a lock-free circuit breaker
//!   ([`HealthMonitor`]) that sheds load while the upstream is unhealthy
//! * **Parallel Fan-out**: [`InferenceOrchestrator`] runs one task per persona on the
//!   tokio runtime under per-task and per-batch deadlines and synthesizes a phase summary
//! * **Progress Visibility**: [`ProgressTracker`] exposes live per-batch counters and
//!   system-wide statistics while a batch is in flight
//! * **Approval Workflow**: [`WorkflowEngine`] drives the session and phase state
//!   machines, gating each phase behind the previous phase's approval
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ideastorm::{
//!     HealthMonitor, InferenceOrchestrator, OrchestratorConfig, Persona, PhaseType,
//!     ProgressTracker, UpstreamConfig,
//! };
//! use ideastorm::upstream::HttpInferenceClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     ideastorm::init_logger();
//!
//!     let config = UpstreamConfig::new(
//!         "https://api.example.com/v1",
//!         "https://backup.example.com/v1",
//!         std::env::var("INFERENCE_API_KEY")?,
//!         "deepseek-v3",
//!     );
//!     let client = Arc::new(HttpInferenceClient::new(config));
//!     let orchestrator = InferenceOrchestrator::new(
//!         client,
//!         Arc::new(HealthMonitor::with_defaults()),
//!         Arc::new(ProgressTracker::new()),
//!         OrchestratorConfig::default(),
//!     );
//!
//!     let personas = vec![
//!         Persona::new("p1", "Ada", "Product Strategist"),
//!         Persona::new("p2", "Grace", "Lead Engineer"),
//!     ];
//!     let batch = orchestrator
//!         .run_batch(
//!             &personas,
//!             "How could a city library attract younger visitors?",
//!             "",
//!             "session-1",
//!             PhaseType::IdeaGeneration,
//!         )
//!         .await?;
//!
//!     println!("{} of {} personas answered", batch.success_count, batch.total_count);
//!     if let Some(summary) = &batch.summary_text {
//!         println!("Summary: {}", summary);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Continue exploring the modules re-exported from the crate root for the full workflow:
//! [`workflow::WorkflowEngine`] ties batches into the approval-gated session lifecycle.

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Lightweight on purpose so that applications embedding IdeaStorm can opt in to simple
/// `RUST_LOG` driven diagnostics without committing to a logging backend of their own.
///
/// ```rust
/// ideastorm::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `ideastorm` module.
pub mod ideastorm;

// Re-exporting key items for easier external access.
pub use ideastorm::config::UpstreamConfig;
pub use ideastorm::error;
pub use ideastorm::error::{InferenceError, WorkflowError};
pub use ideastorm::health;
pub use ideastorm::health::{CircuitState, HealthConfig, HealthMonitor, HealthReport};
pub use ideastorm::orchestrator;
pub use ideastorm::orchestrator::{
    BatchResult, InferenceOrchestrator, InferenceOutcome, InferenceTask, OrchestratorConfig,
    OutcomeStatus,
};
pub use ideastorm::persona::{Persona, PersonaStatus};
pub use ideastorm::phase;
pub use ideastorm::phase::{PhaseSpec, PhaseStatus, PhaseType, SessionStatus, PHASE_TABLE};
pub use ideastorm::progress;
pub use ideastorm::progress::{ProgressRecord, ProgressStatus, ProgressTracker, SystemStatistics};
pub use ideastorm::retry;
pub use ideastorm::retry::{execute_with_retry, RetryConfig};
pub use ideastorm::upstream;
pub use ideastorm::upstream::{EventStream, InferenceClient, StreamEvent};
pub use ideastorm::workflow;
pub use ideastorm::workflow::{PhaseRecord, SessionRecord, WorkflowEngine};
