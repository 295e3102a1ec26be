//! custodia-saga
//!
//! Saga Orchestrator (C7): ordered steps with per-step compensation,
//! idempotent reruns keyed by saga id.

pub mod orchestrator;
pub mod step;

pub use orchestrator::{SagaOrchestrator, SagaResult};
pub use step::{Saga, SagaContext, Step};
