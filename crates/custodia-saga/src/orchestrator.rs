//! Saga orchestrator (C7), grounded on
//! `chronx-consensus::finality::FinalityTracker`'s "tracked state progresses
//! toward a threshold, with cleanup on completion" shape (here: steps
//! completed rather than confirmations received) and
//! `chronx-consensus::validator::ValidatorSet`'s ordered-collection pattern
//! (here: an ordered `Vec<Step>` walked front-to-back, then reversed for
//! compensation).

use std::time::Duration;

use moka::sync::Cache;
use tracing::{error, info, warn};

use custodia_core::error::CustodiaError;
use custodia_core::value::Value;

use crate::step::{Saga, SagaContext};

#[derive(Debug, Clone)]
pub struct SagaResult {
    pub success: bool,
    pub output: Value,
    pub errors: Vec<String>,
    pub failed_step: Option<String>,
    pub compensated: bool,
}

pub struct SagaOrchestrator {
    idempotency: Cache<String, SagaResult>,
}

impl SagaOrchestrator {
    pub fn new() -> Self {
        Self {
            idempotency: Cache::builder()
                .time_to_live(Duration::from_secs(
                    custodia_core::constants::SAGA_IDEMPOTENCY_CACHE_TTL_SECS,
                ))
                .build(),
        }
    }

    /// Run `saga` under `saga_id`. A repeat call with the same `saga_id`
    /// short-circuits to the first run's cached result rather than
    /// re-executing any step.
    pub fn run(&self, saga_id: &str, saga: &Saga, input: Value) -> SagaResult {
        if let Some(cached) = self.idempotency.get(saga_id) {
            info!(saga_id, "saga run short-circuited by idempotency cache");
            return cached;
        }

        let mut ctx = SagaContext::new(input);
        let mut executed: Vec<&str> = Vec::new();

        for step in &saga.steps {
            match (step.execute)(&mut ctx) {
                Ok(()) => {
                    executed.push(&step.name);
                }
                Err(e) => {
                    if !step.critical {
                        warn!(saga_id, step = %step.name, error = %e, "non-critical step failed, continuing");
                        ctx.errors.push(format!("{}: {}", step.name, e));
                        executed.push(&step.name);
                        continue;
                    }

                    error!(saga_id, step = %step.name, error = %e, "critical step failed, compensating");
                    self.compensate(&mut ctx, saga, &executed);

                    let result = SagaResult {
                        success: false,
                        output: ctx.clone().into_value(),
                        errors: vec![format!("{}: {}", step.name, e)],
                        failed_step: Some(step.name.clone()),
                        compensated: true,
                    };
                    self.idempotency.insert(saga_id.to_string(), result.clone());
                    return result;
                }
            }
        }

        let result = SagaResult {
            success: true,
            output: ctx.clone().into_value(),
            errors: ctx.errors.clone(),
            failed_step: None,
            compensated: false,
        };
        self.idempotency.insert(saga_id.to_string(), result.clone());
        result
    }

    /// Run every previously-executed step's compensation, in reverse
    /// order. A compensation failure is logged, never propagated — the
    /// remaining compensations still must run.
    fn compensate(&self, ctx: &mut SagaContext, saga: &Saga, executed: &[&str]) {
        for name in executed.iter().rev() {
            let Some(step) = saga.steps.iter().find(|s| s.name == *name) else {
                continue;
            };
            let Some(compensate) = &step.compensate else {
                continue;
            };
            if let Err(e) = compensate(ctx) {
                error!(step = %step.name, error = %e, "compensation failed");
            }
        }
    }
}

impl Default for SagaOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}
