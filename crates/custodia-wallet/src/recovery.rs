//! `RecoveryHandler` for `Transfer` (spec §4.9 Testable Scenario #6).
//!
//! `create_transfer` ties the `custodia-opstate` operation id to the
//! transfer's own ulid (see `transfer.rs`), so `find_operation` can go
//! straight from an operation id back to the owning `Transfer`.
//! `find_related_postings`/`reverse_operation` reconstruct the
//! deterministic debit/credit/fee account ids `build_transfer_saga` used
//! and look up (or reverse) each leg by the same `{sagaId}:debit`/
//! `:credit`/`:fee` external-ref convention it posted under.

use std::str::FromStr;
use std::sync::Arc;

use custodia_core::account::{AccountOwner, LedgerTransaction};
use custodia_core::error::CustodiaError;
use custodia_core::types::{OperationId, Timestamp, TransferId};
use custodia_core::wallet::{Transfer, TransferStatus};
use custodia_ledger::LedgerEngine;
use custodia_opstate::OperationStateTracker;
use custodia_recovery::{recover, RecoveryHandler, RecoveryJob, RecoveryOutcome, RecoveryStatus};
use custodia_repository::Repository;

use crate::wallet::{subtype_for, WalletEngine};

fn recovery_status(status: TransferStatus) -> RecoveryStatus {
    match status {
        TransferStatus::Pending => RecoveryStatus::Pending,
        TransferStatus::Approved => RecoveryStatus::Approved,
        TransferStatus::Completed => RecoveryStatus::Completed,
        TransferStatus::Failed | TransferStatus::Canceled | TransferStatus::Recovered => RecoveryStatus::Failed,
    }
}

/// `now` is injected rather than read from the wall clock inside each
/// method, so a single sweep reasons about one consistent instant.
pub struct TransferRecoveryHandler<'a> {
    pub transfers: &'a Repository<Transfer>,
    pub ledger: &'a Arc<LedgerEngine>,
    pub now: Timestamp,
}

impl<'a> TransferRecoveryHandler<'a> {
    fn saga_id(transfer: &Transfer) -> String {
        transfer.meta.external_ref.clone().unwrap_or_else(|| transfer.id.to_string())
    }

    /// The three (fee optional) `(from, to, tx_type, external_ref)` legs
    /// `build_transfer_saga` posts under, in posting order.
    fn legs(&self, transfer: &Transfer) -> Result<Vec<(custodia_core::types::AccountId, custodia_core::types::AccountId, &'static str, String)>, CustodiaError> {
        let saga_id = Self::saga_id(transfer);
        let currency = transfer.currency.clone();

        let from_account = self.ledger.get_or_create_account(
            AccountOwner::User(transfer.from_user_id),
            subtype_for(transfer.meta.from_balance_type),
            currency.clone(),
            false,
            self.now,
        )?;
        let clearing = self.ledger.get_or_create_account(AccountOwner::System("transfer_clearing".into()), "clearing", currency.clone(), true, self.now)?;
        let to_account = self.ledger.get_or_create_account(
            AccountOwner::User(transfer.to_user_id),
            subtype_for(transfer.meta.to_balance_type),
            currency.clone(),
            false,
            self.now,
        )?;

        let mut legs = vec![
            (from_account.id, clearing.id, "transfer_out", format!("{saga_id}:debit")),
            (clearing.id, to_account.id, "transfer_in", format!("{saga_id}:credit")),
        ];
        if transfer.meta.fee_amount.is_some() {
            let fee_sink = self.ledger.get_or_create_account(AccountOwner::System("fees".into()), "main", currency.clone(), true, self.now)?;
            legs.push((from_account.id, fee_sink.id, "transfer_fee", format!("{saga_id}:fee")));
        }
        Ok(legs)
    }
}

impl<'a> RecoveryHandler for TransferRecoveryHandler<'a> {
    type Operation = Transfer;
    type Posting = LedgerTransaction;

    fn operation_type(&self) -> &'static str {
        "transfer"
    }

    fn find_operation(&self, operation_id: &OperationId) -> Result<Option<Transfer>, CustodiaError> {
        let Ok(transfer_id) = TransferId::from_str(&operation_id.to_string()) else {
            return Ok(None);
        };
        self.transfers.find_by_id(transfer_id.as_bytes())
    }

    fn find_related_postings(&self, transfer: &Transfer) -> Result<Vec<LedgerTransaction>, CustodiaError> {
        let mut postings = Vec::new();
        for (from, to, tx_type, external_ref) in self.legs(transfer)? {
            if let Some(posting) = self.ledger.find_posting_by_ref(from, to, tx_type, &external_ref)? {
                postings.push(posting);
            }
        }
        Ok(postings)
    }

    fn status(&self, transfer: &Transfer) -> RecoveryStatus {
        recovery_status(transfer.status)
    }

    fn needs_recovery(&self, transfer: &Transfer, postings: &[LedgerTransaction]) -> bool {
        if transfer.status == TransferStatus::Recovered {
            return false;
        }
        match self.status(transfer) {
            RecoveryStatus::Approved | RecoveryStatus::Completed => true,
            RecoveryStatus::Pending | RecoveryStatus::Failed => !postings.is_empty(),
        }
    }

    fn reverse_operation(&self, transfer: &Transfer) -> Result<OperationId, CustodiaError> {
        let recovery_operation_id = OperationId::new();
        let currency = transfer.currency.clone();

        for (from, to, tx_type, external_ref) in self.legs(transfer)? {
            if self.ledger.find_posting_by_ref(from, to, tx_type, &external_ref)?.is_some() {
                let amount = if tx_type == "transfer_fee" {
                    transfer.meta.fee_amount.unwrap_or(0)
                } else {
                    transfer.amount
                };
                if amount <= 0 {
                    continue;
                }
                let reverse_ref = format!("{external_ref}:recovered:{recovery_operation_id}");
                self.ledger.post(to, from, amount, currency.clone(), format!("{tx_type}_reversed"), Some(reverse_ref), self.now)?;
            }
        }

        Ok(recovery_operation_id)
    }

    fn delete_operation(&self, operation_id: &OperationId) -> Result<(), CustodiaError> {
        let Ok(transfer_id) = TransferId::from_str(&operation_id.to_string()) else {
            return Ok(());
        };
        self.transfers.delete(transfer_id.as_bytes())
    }

    fn update_status(&self, operation_id: &OperationId, _new_status: RecoveryStatus, recovery_operation_id: Option<OperationId>) -> Result<(), CustodiaError> {
        let Some(mut transfer) = self.find_operation(operation_id)? else {
            return Err(CustodiaError::OperationNotFound(operation_id.to_string()));
        };
        transfer.status = TransferStatus::Recovered;
        transfer.recovery_operation_id = recovery_operation_id;
        self.transfers.update(transfer, self.now, false)?;
        Ok(())
    }
}

impl WalletEngine {
    /// Drives a single transfer through `custodia-recovery` (spec §8
    /// Testable Scenario #6). Exposed for an operator-invoked
    /// `wallet.recover` call, not the periodic sweep.
    pub fn recover_transfer(&self, operation_id: OperationId, now: Timestamp) -> Result<RecoveryOutcome, CustodiaError> {
        let handler = TransferRecoveryHandler { transfers: &self.transfers, ledger: &self.ledger, now };
        recover(&handler, &operation_id)
    }

    /// Sweeps `custodia-opstate` for stuck transfers and recovers every
    /// one found, returning the count actually recovered.
    pub fn recover_stuck_transfers(&self, opstate: &OperationStateTracker, max_age_secs: i64, now: Timestamp) -> Result<usize, CustodiaError> {
        let handler = TransferRecoveryHandler { transfers: &self.transfers, ledger: &self.ledger, now };
        let job = RecoveryJob::new(handler, opstate, max_age_secs);
        job.recover_stuck(now)
    }
}
