//! `RecoveryJob`: a periodic ticker driving `recover` against every
//! operation `custodia-opstate::find_stuck` surfaces for a handler's
//! operation type. Grounded on
//! `chronx-recovery::verifier::VerifierRegistry`'s registry-of-callers
//! shape and `chronx-recovery::fee::distribute_recovery_fees`'s "one
//! atomic scope per item, continue on a single failure" loop structure.

use std::time::Duration;

use tracing::{error, info};

use custodia_core::types::Timestamp;
use custodia_opstate::OperationStateTracker;

use crate::engine::recover;
use crate::handler::RecoveryHandler;

pub struct RecoveryJob<'a, H: RecoveryHandler> {
    handler: H,
    opstate: &'a OperationStateTracker,
    max_age_secs: i64,
}

impl<'a, H: RecoveryHandler> RecoveryJob<'a, H> {
    pub fn new(handler: H, opstate: &'a OperationStateTracker, max_age_secs: i64) -> Self {
        Self { handler, opstate, max_age_secs }
    }

    /// One sweep: find every stuck operation of this handler's type and
    /// attempt recovery, logging (never aborting the sweep on) a single
    /// failure.
    pub fn recover_stuck(&self, now: Timestamp) -> Result<usize, custodia_core::error::CustodiaError> {
        let stuck = self.opstate.find_stuck(self.handler.operation_type(), self.max_age_secs, now)?;
        let mut recovered = 0;
        for state in stuck {
            match recover(&self.handler, &state.operation_id) {
                Ok(outcome) => {
                    info!(operation_id = %state.operation_id, outcome = ?outcome, "stuck operation recovered");
                    recovered += 1;
                }
                Err(e) => {
                    error!(operation_id = %state.operation_id, error = %e, "recovery attempt failed");
                }
            }
        }
        Ok(recovered)
    }

    /// Run `recover_stuck` every `interval` until the returned task is
    /// dropped/aborted. `now_fn` abstracts the clock so callers can
    /// inject deterministic time in tests.
    pub async fn run(self, interval: Duration, mut now_fn: impl FnMut() -> Timestamp)
    where
        H: Send + Sync + 'static,
        Self: 'static,
    {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.recover_stuck(now_fn()) {
                error!(error = %e, "recovery sweep failed");
            }
        }
    }
}
