// src/ideastorm/mod.rs

pub mod config;
pub mod error;
pub mod health;
pub mod http_pool;
pub mod orchestrator;
pub mod persona;
pub mod phase;
pub mod progress;
pub mod retry;
pub mod upstream;
pub mod workflow;

// Explicitly export the workhorse types so callers reach them as
// ideastorm::InferenceOrchestrator instead of ideastorm::orchestrator::InferenceOrchestrator.
pub use orchestrator::InferenceOrchestrator;
pub use workflow::WorkflowEngine;
