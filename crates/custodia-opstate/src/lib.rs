//! custodia-opstate
//!
//! Operation State Tracker (C8): short-TTL per-operation heartbeats
//! fronting the ledger/saga/recovery machinery's "is this still running"
//! question, with non-blocking stuck-operation discovery.
//!
//! Grounded structurally on `chronx-recovery::query::RecoveryQuery`'s
//! read/describe role and `chronx-state::db`'s meta-tree counter pattern,
//! re-pointed at a prefix-scoped sled tree instead of a single counter key.

use custodia_core::entity::Entity;
use custodia_core::error::CustodiaError;
use custodia_core::opstate::{OperationState, OperationStatus};
use custodia_core::types::{OperationId, Timestamp};
use custodia_repository::Repository;

pub struct OperationStateTracker {
    repo: Repository<OperationState>,
    tree: sled::Tree,
}

impl OperationStateTracker {
    pub fn open(db: &sled::Db) -> Result<Self, CustodiaError> {
        let repo = Repository::open(db)?;
        let tree = db
            .open_tree(OperationState::collection())
            .map_err(|e| CustodiaError::Storage(e.to_string()))?;
        Ok(Self { repo, tree })
    }

    pub fn set_state(
        &self,
        operation_id: OperationId,
        operation_type: impl Into<String>,
        status: OperationStatus,
        steps: Vec<String>,
        now: Timestamp,
    ) -> Result<OperationState, CustodiaError> {
        let state = OperationState {
            operation_id,
            operation_type: operation_type.into(),
            status,
            started_at: now,
            last_heartbeat: now,
            steps,
            current_step: None,
            error: None,
        };
        self.repo.create(state, now, true)
    }

    fn get(&self, operation_type: &str, operation_id: &OperationId) -> Result<Option<OperationState>, CustodiaError> {
        self.repo.find_by_id(&OperationState::storage_key(operation_type, operation_id))
    }

    pub fn update_heartbeat(
        &self,
        operation_type: &str,
        operation_id: &OperationId,
        current_step: Option<String>,
        now: Timestamp,
    ) -> Result<Option<OperationState>, CustodiaError> {
        let Some(mut state) = self.get(operation_type, operation_id)? else {
            return Ok(None);
        };
        state.last_heartbeat = now;
        if current_step.is_some() {
            state.current_step = current_step;
        }
        Ok(Some(self.repo.update(state, now, true)?))
    }

    pub fn mark_completed(
        &self,
        operation_type: &str,
        operation_id: &OperationId,
        now: Timestamp,
    ) -> Result<Option<OperationState>, CustodiaError> {
        self.transition(operation_type, operation_id, OperationStatus::Completed, None, now)
    }

    pub fn mark_failed(
        &self,
        operation_type: &str,
        operation_id: &OperationId,
        error: impl Into<String>,
        now: Timestamp,
    ) -> Result<Option<OperationState>, CustodiaError> {
        self.transition(operation_type, operation_id, OperationStatus::Failed, Some(error.into()), now)
    }

    fn transition(
        &self,
        operation_type: &str,
        operation_id: &OperationId,
        status: OperationStatus,
        error: Option<String>,
        now: Timestamp,
    ) -> Result<Option<OperationState>, CustodiaError> {
        let Some(mut state) = self.get(operation_type, operation_id)? else {
            return Ok(None);
        };
        state.status = status;
        state.last_heartbeat = now;
        if error.is_some() {
            state.error = error;
        }
        Ok(Some(self.repo.update(state, now, true)?))
    }

    pub fn delete_state(&self, operation_type: &str, operation_id: &OperationId) -> Result<(), CustodiaError> {
        self.repo.delete(&OperationState::storage_key(operation_type, operation_id))
    }

    /// Non-blocking prefix scan over `operation_state:<type>:`, returning
    /// every entry whose status is a stuck candidate and whose heartbeat
    /// is older than `max_age_secs`. Never enumerates the whole keyspace.
    pub fn find_stuck(
        &self,
        operation_type: &str,
        max_age_secs: i64,
        now: Timestamp,
    ) -> Result<Vec<OperationState>, CustodiaError> {
        let prefix = format!("operation_state:{operation_type}:");
        let mut stuck = Vec::new();
        for item in self.tree.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item.map_err(|e| CustodiaError::Storage(e.to_string()))?;
            let state: OperationState =
                bincode::deserialize(&bytes).map_err(|e| CustodiaError::Serialization(e.to_string()))?;
            if state.is_stuck(now, max_age_secs) {
                stuck.push(state);
            }
        }
        Ok(stuck)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_tracker() -> OperationStateTracker {
        let dir = std::env::temp_dir().join(format!(
            "custodia_opstate_test_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .subsec_nanos()
        ));
        let db = custodia_repository::open_db(&dir).unwrap();
        OperationStateTracker::open(&db).unwrap()
    }

    #[test]
    fn set_then_heartbeat_then_complete() {
        let tracker = temp_tracker();
        let op_id = OperationId::new();
        tracker
            .set_state(op_id.clone(), "transfer", OperationStatus::Pending, vec!["debit".into()], 0)
            .unwrap();

        let updated = tracker
            .update_heartbeat("transfer", &op_id, Some("credit".into()), 10)
            .unwrap()
            .unwrap();
        assert_eq!(updated.last_heartbeat, 10);
        assert_eq!(updated.current_step, Some("credit".to_string()));

        let completed = tracker.mark_completed("transfer", &op_id, 20).unwrap().unwrap();
        assert_eq!(completed.status, OperationStatus::Completed);
    }

    #[test]
    fn find_stuck_returns_only_stale_active_operations() {
        let tracker = temp_tracker();
        let stuck_id = OperationId::new();
        let fresh_id = OperationId::new();
        let done_id = OperationId::new();

        tracker
            .set_state(stuck_id.clone(), "transfer", OperationStatus::InProgress, vec![], 0)
            .unwrap();
        tracker
            .set_state(fresh_id.clone(), "transfer", OperationStatus::InProgress, vec![], 95)
            .unwrap();
        tracker
            .set_state(done_id.clone(), "transfer", OperationStatus::Completed, vec![], 0)
            .unwrap();

        let stuck = tracker.find_stuck("transfer", 60, 100).unwrap();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].operation_id, stuck_id);
    }

    #[test]
    fn delete_state_removes_the_entry() {
        let tracker = temp_tracker();
        let op_id = OperationId::new();
        tracker
            .set_state(op_id.clone(), "bonus", OperationStatus::Pending, vec![], 0)
            .unwrap();
        tracker.delete_state("bonus", &op_id).unwrap();
        assert!(tracker.update_heartbeat("bonus", &op_id, None, 10).unwrap().is_none());
    }
}
