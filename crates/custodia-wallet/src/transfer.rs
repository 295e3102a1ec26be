//! `CreateTransfer` (spec §4.6): a compound debit/credit/optional-fee
//! operation run as a `custodia-saga`, heartbeating through
//! `custodia-opstate` on each leg. Debit and credit route through a
//! system "transfer_clearing" account rather than posting source-to-
//! destination directly, so each leg is independently compensable — a
//! failed credit reverses only the debit, not a single already-atomic
//! posting.
//!
//! Fee, when present, is an extra debit from the sender's account to a
//! system fee sink, so the recipient always receives the full `amount`
//! (spec §9 Open Question: unresolved which side bears the fee — this
//! crate resolves it sender-pays).

use std::str::FromStr;
use std::sync::Arc;

use custodia_core::account::AccountOwner;
use custodia_core::error::CustodiaError;
use custodia_core::opstate::OperationStatus;
use custodia_core::types::{AccountId, Currency, MinorUnits, OperationId, Timestamp, TransferId, UserId};
use custodia_core::value::Value;
use custodia_core::wallet::{BalanceType, Transfer, TransferMeta, TransferStatus};
use custodia_ledger::LedgerEngine;
use custodia_opstate::OperationStateTracker;
use custodia_saga::{Saga, Step};

use crate::wallet::{subtype_for, WalletEngine};

fn parse_account_id(value: Option<&Value>) -> Option<AccountId> {
    value.and_then(Value::as_str).and_then(|s| AccountId::from_str(s).ok())
}

impl WalletEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn create_transfer(
        &self,
        from_user_id: UserId,
        to_user_id: UserId,
        amount: MinorUnits,
        currency: Currency,
        fee_amount: Option<MinorUnits>,
        from_balance_type: BalanceType,
        to_balance_type: BalanceType,
        external_ref: Option<String>,
        now: Timestamp,
    ) -> Result<Transfer, CustodiaError> {
        let transfer = Transfer {
            id: TransferId::new(),
            from_user_id,
            to_user_id,
            amount,
            currency: currency.clone(),
            status: TransferStatus::Pending,
            meta: TransferMeta {
                from_balance_type,
                to_balance_type,
                fee_amount,
                method: None,
                external_ref: external_ref.clone(),
            },
            created_at: now,
            updated_at: now,
            recovery_operation_id: None,
        };
        let transfer = self.transfers.create(transfer, now, true)?;

        // The operation id tracked in `custodia-opstate` is the transfer's
        // own ulid reinterpreted as an `OperationId`, not an unrelated
        // fresh one — this is what lets a recovery handler go from a
        // stuck/targeted operation id straight back to the `Transfer` that
        // owns it (see `custodia-wallet::recovery`).
        let operation_id = OperationId::from_str(&transfer.id.to_string()).expect("TransferId and OperationId are both ulids");
        let mut step_names = vec!["debit".to_string(), "credit".to_string()];
        if fee_amount.is_some() {
            step_names.push("fee".to_string());
        }
        self.opstate
            .set_state(operation_id, "transfer", OperationStatus::InProgress, step_names, now)?;

        let saga = build_transfer_saga(
            self.ledger.clone(),
            self.opstate.clone(),
            operation_id,
            from_user_id,
            to_user_id,
            from_balance_type,
            to_balance_type,
            amount,
            fee_amount,
            currency,
            external_ref.clone(),
            now,
        );

        let saga_id = external_ref.unwrap_or_else(|| transfer.id.to_string());
        let result = self.sagas.run(&saga_id, &saga, Value::Null);

        let mut updated = transfer;
        updated.status = if result.success { TransferStatus::Approved } else { TransferStatus::Failed };
        let updated = self.transfers.update(updated, now, false)?;

        if result.success {
            self.opstate.mark_completed("transfer", &operation_id, now)?;
            tracing::info!(transfer_id = %updated.id, "transfer approved");
        } else {
            self.opstate
                .mark_failed("transfer", &operation_id, result.errors.join("; "), now)?;
            tracing::warn!(transfer_id = %updated.id, errors = ?result.errors, "transfer failed, compensated");
        }

        Ok(updated)
    }
}

#[allow(clippy::too_many_arguments)]
fn build_transfer_saga(
    ledger: Arc<LedgerEngine>,
    opstate: Arc<OperationStateTracker>,
    operation_id: OperationId,
    from_user_id: UserId,
    to_user_id: UserId,
    from_balance_type: BalanceType,
    to_balance_type: BalanceType,
    amount: MinorUnits,
    fee_amount: Option<MinorUnits>,
    currency: Currency,
    external_ref: Option<String>,
    now: Timestamp,
) -> Saga {
    let mut steps = Vec::new();

    {
        let debit_ref = external_ref.clone().map(|r| format!("{r}:debit"));

        let ledger_x = ledger.clone();
        let opstate_x = opstate.clone();
        let currency_x = currency.clone();
        let debit_ref_x = debit_ref.clone();

        let ledger_c = ledger.clone();
        let currency_c = currency.clone();
        let debit_ref_c = debit_ref.clone();

        steps.push(
            Step::new("debit", move |ctx| {
                let _ = opstate_x.update_heartbeat("transfer", &operation_id, Some("debit".into()), now);
                let from_account = ledger_x.get_or_create_account(
                    AccountOwner::User(from_user_id),
                    subtype_for(from_balance_type),
                    currency_x.clone(),
                    false,
                    now,
                )?;
                let clearing = ledger_x.get_or_create_account(
                    AccountOwner::System("transfer_clearing".into()),
                    "clearing",
                    currency_x.clone(),
                    true,
                    now,
                )?;
                ledger_x.post(from_account.id, clearing.id, amount, currency_x.clone(), "transfer_out", debit_ref_x.clone(), now)?;
                ctx.set("from_account_id", Value::String(from_account.id.to_string()));
                ctx.set("clearing_account_id", Value::String(clearing.id.to_string()));
                Ok(())
            })
            .with_compensate(move |ctx| {
                let (Some(from_id), Some(clearing_id)) = (parse_account_id(ctx.get("from_account_id")), parse_account_id(ctx.get("clearing_account_id"))) else {
                    return Ok(());
                };
                let reverse_ref = debit_ref_c.clone().map(|r| format!("{r}:reversed"));
                ledger_c.post(clearing_id, from_id, amount, currency_c.clone(), "transfer_out_reversed", reverse_ref, now)?;
                Ok(())
            }),
        );
    }

    {
        let credit_ref = external_ref.clone().map(|r| format!("{r}:credit"));

        let ledger_x = ledger.clone();
        let opstate_x = opstate.clone();
        let currency_x = currency.clone();
        let credit_ref_x = credit_ref.clone();

        let ledger_c = ledger.clone();
        let currency_c = currency.clone();
        let credit_ref_c = credit_ref.clone();

        steps.push(
            Step::new("credit", move |ctx| {
                let _ = opstate_x.update_heartbeat("transfer", &operation_id, Some("credit".into()), now);
                let Some(clearing_id) = parse_account_id(ctx.get("clearing_account_id")) else {
                    return Err(CustodiaError::Other("missing clearing account from debit step".into()));
                };
                let to_account = ledger_x.get_or_create_account(
                    AccountOwner::User(to_user_id),
                    subtype_for(to_balance_type),
                    currency_x.clone(),
                    false,
                    now,
                )?;
                ledger_x.post(clearing_id, to_account.id, amount, currency_x.clone(), "transfer_in", credit_ref_x.clone(), now)?;
                ctx.set("to_account_id", Value::String(to_account.id.to_string()));
                Ok(())
            })
            .with_compensate(move |ctx| {
                let (Some(to_id), Some(clearing_id)) = (parse_account_id(ctx.get("to_account_id")), parse_account_id(ctx.get("clearing_account_id"))) else {
                    return Ok(());
                };
                let reverse_ref = credit_ref_c.clone().map(|r| format!("{r}:reversed"));
                ledger_c.post(to_id, clearing_id, amount, currency_c.clone(), "transfer_in_reversed", reverse_ref, now)?;
                Ok(())
            }),
        );
    }

    if let Some(fee_amount) = fee_amount {
        let fee_ref = external_ref.clone().map(|r| format!("{r}:fee"));

        let ledger_x = ledger.clone();
        let opstate_x = opstate.clone();
        let currency_x = currency.clone();
        let fee_ref_x = fee_ref.clone();

        let ledger_c = ledger.clone();
        let currency_c = currency.clone();
        let fee_ref_c = fee_ref.clone();

        steps.push(
            Step::new("fee", move |ctx| {
                let _ = opstate_x.update_heartbeat("transfer", &operation_id, Some("fee".into()), now);
                let from_account = ledger_x.get_or_create_account(
                    AccountOwner::User(from_user_id),
                    subtype_for(from_balance_type),
                    currency_x.clone(),
                    false,
                    now,
                )?;
                let fee_sink = ledger_x.get_or_create_account(AccountOwner::System("fees".into()), "main", currency_x.clone(), true, now)?;
                ledger_x.post(from_account.id, fee_sink.id, fee_amount, currency_x.clone(), "transfer_fee", fee_ref_x.clone(), now)?;
                ctx.set("fee_from_account_id", Value::String(from_account.id.to_string()));
                ctx.set("fee_sink_account_id", Value::String(fee_sink.id.to_string()));
                Ok(())
            })
            .with_compensate(move |ctx| {
                let (Some(from_id), Some(sink_id)) = (parse_account_id(ctx.get("fee_from_account_id")), parse_account_id(ctx.get("fee_sink_account_id"))) else {
                    return Ok(());
                };
                let reverse_ref = fee_ref_c.clone().map(|r| format!("{r}:reversed"));
                ledger_c.post(sink_id, from_id, fee_amount, currency_c.clone(), "transfer_fee_reversed", reverse_ref, now)?;
                Ok(())
            }),
        );
    }

    Saga::new(steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_engine() -> WalletEngine {
        let dir = std::env::temp_dir().join(format!("custodia_transfer_test_{}_{}", std::process::id(), rand_suffix()));
        let db = custodia_repository::open_db(&dir).unwrap();
        let ledger = Arc::new(LedgerEngine::open(&db).unwrap());
        let opstate = Arc::new(OperationStateTracker::open(&db).unwrap());
        WalletEngine::open(&db, ledger, opstate).unwrap()
    }

    fn rand_suffix() -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().subsec_nanos() as u64
    }

    fn eur() -> Currency {
        Currency::new("eur")
    }

    #[test]
    fn successful_transfer_moves_balance_between_users() {
        let engine = temp_engine();
        let sender = UserId::new();
        let recipient = UserId::new();

        let sender_wallet = engine.create_wallet(sender, eur(), "main", 0).unwrap();
        engine
            .create_wallet_transaction(sender_wallet.id, sender, custodia_core::wallet::WalletTransactionType::Deposit, BalanceType::Real, 1_000, eur(), None, 5)
            .unwrap();

        let transfer = engine
            .create_transfer(sender, recipient, 500, eur(), None, BalanceType::Real, BalanceType::Real, None, 10)
            .unwrap();

        assert_eq!(transfer.status, TransferStatus::Approved);
        assert_eq!(
            engine
                .ledger
                .balance_by_owner(&AccountOwner::User(sender), "main", &eur())
                .unwrap(),
            500
        );
        assert_eq!(
            engine
                .ledger
                .balance_by_owner(&AccountOwner::User(recipient), "main", &eur())
                .unwrap(),
            500
        );
    }

    #[test]
    fn transfer_with_insufficient_funds_fails_and_compensates() {
        let engine = temp_engine();
        let sender = UserId::new();
        let recipient = UserId::new();

        let transfer = engine
            .create_transfer(sender, recipient, 500, eur(), None, BalanceType::Real, BalanceType::Real, None, 10)
            .unwrap();

        assert_eq!(transfer.status, TransferStatus::Failed);
        assert_eq!(
            engine
                .ledger
                .balance_by_owner(&AccountOwner::User(sender), "main", &eur())
                .unwrap(),
            0
        );
    }
}
