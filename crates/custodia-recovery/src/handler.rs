use custodia_core::error::CustodiaError;
use custodia_core::types::OperationId;

/// Abstract status an operation can be in from the recovery framework's
/// point of view. Concrete domains (transfers, bonus conversions, …) map
/// their own status enums onto this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStatus {
    Pending,
    Approved,
    Completed,
    Failed,
}

/// Per-operation-type plug-in the recovery engine dispatches through.
/// Direct continuation of `chronx-recovery`'s role: a narrow service
/// layer over whatever store owns the operation, never the store itself.
pub trait RecoveryHandler {
    type Operation: Clone;
    type Posting;

    fn operation_type(&self) -> &'static str;

    fn find_operation(&self, operation_id: &OperationId) -> Result<Option<Self::Operation>, CustodiaError>;

    fn find_related_postings(&self, operation: &Self::Operation) -> Result<Vec<Self::Posting>, CustodiaError>;

    fn status(&self, operation: &Self::Operation) -> RecoveryStatus;

    /// Default rule (spec §4.9): pending-with-postings OR
    /// failed-with-postings OR approved/completed (caller-driven).
    /// Handlers may override for domain-specific exceptions.
    fn needs_recovery(&self, operation: &Self::Operation, postings: &[Self::Posting]) -> bool {
        match self.status(operation) {
            RecoveryStatus::Approved | RecoveryStatus::Completed => true,
            RecoveryStatus::Pending | RecoveryStatus::Failed => !postings.is_empty(),
        }
    }

    /// Create the compensating operation and return its id. Must be
    /// idempotent: calling it twice for the same `operation` must not
    /// double-reverse.
    fn reverse_operation(&self, operation: &Self::Operation) -> Result<OperationId, CustodiaError>;

    fn delete_operation(&self, operation_id: &OperationId) -> Result<(), CustodiaError>;

    fn update_status(
        &self,
        operation_id: &OperationId,
        new_status: RecoveryStatus,
        recovery_operation_id: Option<OperationId>,
    ) -> Result<(), CustodiaError>;
}
