use serde::{Deserialize, Serialize};
use tracing::info;

use custodia_core::error::CustodiaError;
use custodia_core::types::OperationId;

use crate::handler::{RecoveryHandler, RecoveryStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryOutcome {
    NoActionNeeded(&'static str),
    Deleted,
    Reversed { recovery_operation_id: OperationId },
    AlreadyFailed,
}

/// Dispatch table from spec §4.9, executed as a single atomic scope from
/// the handler's point of view — each handler method is expected to
/// perform its own storage write atomically; this function only chooses
/// which ones to call and in what order.
pub fn recover<H: RecoveryHandler>(
    handler: &H,
    operation_id: &OperationId,
) -> Result<RecoveryOutcome, CustodiaError> {
    let Some(operation) = handler.find_operation(operation_id)? else {
        return Ok(RecoveryOutcome::NoActionNeeded("operation_not_found"));
    };

    let postings = handler.find_related_postings(&operation)?;

    if !handler.needs_recovery(&operation, &postings) {
        return Ok(RecoveryOutcome::NoActionNeeded("operation_consistent"));
    }

    let status = handler.status(&operation);
    let outcome = match status {
        RecoveryStatus::Approved | RecoveryStatus::Completed => reverse(handler, operation_id, &operation)?,
        RecoveryStatus::Pending if !postings.is_empty() => reverse(handler, operation_id, &operation)?,
        RecoveryStatus::Pending => {
            handler.delete_operation(operation_id)?;
            RecoveryOutcome::Deleted
        }
        RecoveryStatus::Failed if !postings.is_empty() => reverse(handler, operation_id, &operation)?,
        RecoveryStatus::Failed => RecoveryOutcome::AlreadyFailed,
    };

    info!(
        operation_type = handler.operation_type(),
        operation_id = %operation_id,
        outcome = ?outcome,
        "recovery dispatched"
    );
    Ok(outcome)
}

fn reverse<H: RecoveryHandler>(
    handler: &H,
    operation_id: &OperationId,
    operation: &H::Operation,
) -> Result<RecoveryOutcome, CustodiaError> {
    let recovery_operation_id = handler.reverse_operation(operation)?;
    handler.update_status(operation_id, RecoveryStatus::Completed, Some(recovery_operation_id.clone()))?;
    Ok(RecoveryOutcome::Reversed { recovery_operation_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Clone)]
    struct FakeOp {
        status: RecoveryStatus,
        has_postings: bool,
    }

    struct FakeHandler {
        ops: RefCell<HashMap<String, FakeOp>>,
        deleted: RefCell<Vec<String>>,
    }

    impl RecoveryHandler for FakeHandler {
        type Operation = FakeOp;
        type Posting = ();

        fn operation_type(&self) -> &'static str {
            "transfer"
        }

        fn find_operation(&self, operation_id: &OperationId) -> Result<Option<FakeOp>, CustodiaError> {
            Ok(self.ops.borrow().get(&operation_id.to_string()).cloned())
        }

        fn find_related_postings(&self, operation: &FakeOp) -> Result<Vec<()>, CustodiaError> {
            Ok(if operation.has_postings { vec![()] } else { vec![] })
        }

        fn status(&self, operation: &FakeOp) -> RecoveryStatus {
            operation.status
        }

        fn reverse_operation(&self, _operation: &FakeOp) -> Result<OperationId, CustodiaError> {
            Ok(OperationId::new())
        }

        fn delete_operation(&self, operation_id: &OperationId) -> Result<(), CustodiaError> {
            self.deleted.borrow_mut().push(operation_id.to_string());
            self.ops.borrow_mut().remove(&operation_id.to_string());
            Ok(())
        }

        fn update_status(
            &self,
            operation_id: &OperationId,
            new_status: RecoveryStatus,
            _recovery_operation_id: Option<OperationId>,
        ) -> Result<(), CustodiaError> {
            if let Some(op) = self.ops.borrow_mut().get_mut(&operation_id.to_string()) {
                op.status = new_status;
            }
            Ok(())
        }
    }

    #[test]
    fn missing_operation_is_a_no_op() {
        let handler = FakeHandler { ops: RefCell::new(HashMap::new()), deleted: RefCell::new(vec![]) };
        let outcome = recover(&handler, &OperationId::new()).unwrap();
        assert_eq!(outcome, RecoveryOutcome::NoActionNeeded("operation_not_found"));
    }

    #[test]
    fn pending_without_postings_is_deleted() {
        let op_id = OperationId::new();
        let mut ops = HashMap::new();
        ops.insert(op_id.to_string(), FakeOp { status: RecoveryStatus::Pending, has_postings: false });
        let handler = FakeHandler { ops: RefCell::new(ops), deleted: RefCell::new(vec![]) };

        let outcome = recover(&handler, &op_id).unwrap();
        assert_eq!(outcome, RecoveryOutcome::Deleted);
        assert_eq!(handler.deleted.borrow().len(), 1);
    }

    #[test]
    fn pending_with_postings_is_reversed() {
        let op_id = OperationId::new();
        let mut ops = HashMap::new();
        ops.insert(op_id.to_string(), FakeOp { status: RecoveryStatus::Pending, has_postings: true });
        let handler = FakeHandler { ops: RefCell::new(ops), deleted: RefCell::new(vec![]) };

        let outcome = recover(&handler, &op_id).unwrap();
        assert!(matches!(outcome, RecoveryOutcome::Reversed { .. }));
    }

    #[test]
    fn failed_without_postings_is_already_failed() {
        let op_id = OperationId::new();
        let mut ops = HashMap::new();
        ops.insert(op_id.to_string(), FakeOp { status: RecoveryStatus::Failed, has_postings: false });
        let handler = FakeHandler { ops: RefCell::new(ops), deleted: RefCell::new(vec![]) };

        let outcome = recover(&handler, &op_id).unwrap();
        assert_eq!(outcome, RecoveryOutcome::AlreadyFailed);
    }

    #[test]
    fn completed_is_always_reversed() {
        let op_id = OperationId::new();
        let mut ops = HashMap::new();
        ops.insert(op_id.to_string(), FakeOp { status: RecoveryStatus::Completed, has_postings: false });
        let handler = FakeHandler { ops: RefCell::new(ops), deleted: RefCell::new(vec![]) };

        let outcome = recover(&handler, &op_id).unwrap();
        assert!(matches!(outcome, RecoveryOutcome::Reversed { .. }));
    }
}
