//! custodia-recovery
//!
//! Recovery Framework (C9): a domain-agnostic reconciliation dispatcher
//! sitting between `custodia-opstate`'s stuck-operation discovery and
//! whichever crate owns the operation (ledger, bonus, …). Domains plug
//! in by implementing `RecoveryHandler` for their own operation type;
//! this crate never learns their concrete schema.
//!
//! Grounded structurally on `chronx-recovery`'s service-layer role:
//! `query::RecoveryQuery` becomes `engine::recover`'s read/describe path,
//! `verifier::VerifierRegistry`'s registry-of-callers shape becomes
//! `job::RecoveryJob`, and `fee::distribute_recovery_fees`'s
//! one-atomic-scope-per-item loop becomes `RecoveryJob::recover_stuck`.

pub mod engine;
pub mod handler;
pub mod job;

pub use engine::{recover, RecoveryOutcome};
pub use handler::{RecoveryHandler, RecoveryStatus};
pub use job::RecoveryJob;
