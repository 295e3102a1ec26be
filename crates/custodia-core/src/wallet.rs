//! User-facing wallet entities: [`Wallet`], [`WalletTransaction`], [`Transfer`].
//! A wallet is a thin projection over three ledger accounts (real, bonus,
//! locked) for the same `(owner, currency)` — the ledger, not the wallet, is
//! the source of truth for balances.

use serde::{Deserialize, Serialize};

use crate::types::{Currency, MinorUnits, OperationId, Timestamp, TransferId, UserId, WalletId, WalletTransactionId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletStatus {
    Active,
    Suspended,
    Closed,
}

impl WalletStatus {
    /// Monotone transition check for the Wallet state machine
    /// (active → suspended → closed).
    pub fn can_transition_to(self, next: WalletStatus) -> bool {
        matches!(
            (self, next),
            (WalletStatus::Active, WalletStatus::Suspended)
                | (WalletStatus::Active, WalletStatus::Closed)
                | (WalletStatus::Suspended, WalletStatus::Closed)
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceType {
    Real,
    Bonus,
    Locked,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub owner: UserId,
    pub currency: Currency,
    pub category: String,
    pub balance: MinorUnits,
    pub bonus_balance: MinorUnits,
    pub locked_balance: MinorUnits,
    pub lifetime_deposits: MinorUnits,
    pub lifetime_withdrawals: MinorUnits,
    pub status: WalletStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletTransactionType {
    Deposit,
    Withdrawal,
    TransferIn,
    TransferOut,
    BonusCredit,
    Refund,
    Bet,
    Win,
}

impl WalletTransactionType {
    /// `true` if this type credits the target balance, `false` if it debits.
    pub fn is_credit(self) -> bool {
        matches!(
            self,
            WalletTransactionType::Deposit
                | WalletTransactionType::TransferIn
                | WalletTransactionType::Win
                | WalletTransactionType::Refund
                | WalletTransactionType::BonusCredit
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: WalletTransactionId,
    pub wallet_id: WalletId,
    pub user_id: UserId,
    pub tx_type: WalletTransactionType,
    pub balance_type: BalanceType,
    pub amount: MinorUnits,
    pub balance_before: MinorUnits,
    pub balance_after: MinorUnits,
    pub currency: Currency,
    pub description: Option<String>,
    pub created_at: Timestamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Approved,
    Completed,
    Canceled,
    Failed,
    Recovered,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferMeta {
    pub from_balance_type: BalanceType,
    pub to_balance_type: BalanceType,
    pub fee_amount: Option<MinorUnits>,
    pub method: Option<String>,
    pub external_ref: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub amount: MinorUnits,
    pub currency: Currency,
    pub status: TransferStatus,
    pub meta: TransferMeta,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub recovery_operation_id: Option<OperationId>,
}

impl crate::entity::Entity for Wallet {
    fn collection() -> &'static str {
        "wallets"
    }
    fn id_bytes(&self) -> Vec<u8> {
        self.id.as_bytes().to_vec()
    }
    fn set_created_at(&mut self, ts: Timestamp) {
        self.created_at = ts;
    }
    fn set_updated_at(&mut self, ts: Timestamp) {
        self.updated_at = ts;
    }
}

impl crate::entity::Entity for WalletTransaction {
    fn collection() -> &'static str {
        "wallet_transactions"
    }
    fn id_bytes(&self) -> Vec<u8> {
        self.id.as_bytes().to_vec()
    }
    fn set_created_at(&mut self, ts: Timestamp) {
        self.created_at = ts;
    }
    fn set_updated_at(&mut self, _ts: Timestamp) {}
}

impl crate::entity::Entity for Transfer {
    fn collection() -> &'static str {
        "transfers"
    }
    fn id_bytes(&self) -> Vec<u8> {
        self.id.as_bytes().to_vec()
    }
    fn set_created_at(&mut self, ts: Timestamp) {
        self.created_at = ts;
    }
    fn set_updated_at(&mut self, ts: Timestamp) {
        self.updated_at = ts;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_status_transitions_are_monotone() {
        assert!(WalletStatus::Active.can_transition_to(WalletStatus::Suspended));
        assert!(WalletStatus::Suspended.can_transition_to(WalletStatus::Closed));
        assert!(!WalletStatus::Closed.can_transition_to(WalletStatus::Active));
        assert!(!WalletStatus::Suspended.can_transition_to(WalletStatus::Active));
    }

    #[test]
    fn credit_types_are_classified_correctly() {
        assert!(WalletTransactionType::Deposit.is_credit());
        assert!(!WalletTransactionType::Withdrawal.is_credit());
        assert!(!WalletTransactionType::Bet.is_credit());
    }
}
