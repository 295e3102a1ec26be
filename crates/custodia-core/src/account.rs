//! Ledger-side entities: [`LedgerAccount`] and [`LedgerTransaction`].
//!
//! An account's balance is never stored as a mutable counter mutated in
//! place by callers outside `custodia-ledger` — it is the signed sum of all
//! committed postings against it. These types are the storage shape; the
//! invariant is enforced by the engine that writes them.

use serde::{Deserialize, Serialize};

use crate::types::{AccountId, Currency, MinorUnits, Timestamp, UserId};

/// What an account belongs to. A ledger account's owner is a user, a
/// provider (external collaborator), or the system itself (fee sinks,
/// suspense accounts).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountOwner {
    User(UserId),
    Provider(String),
    System(String),
}

/// Which wallet balance, if any, this account backs. `"main"` accounts are
/// not wallet-backed (fee sinks, external settlement accounts).
pub type AccountSubtype = String;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerAccount {
    pub id: AccountId,
    pub owner: AccountOwner,
    pub subtype: AccountSubtype,
    pub currency: Currency,
    pub balance: MinorUnits,
    pub allow_negative: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl LedgerAccount {
    pub fn new(owner: AccountOwner, subtype: impl Into<String>, currency: Currency, allow_negative: bool, now: Timestamp) -> Self {
        Self {
            id: AccountId::new(),
            owner,
            subtype: subtype.into(),
            currency,
            balance: 0,
            allow_negative,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: crate::types::LedgerTransactionId,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: MinorUnits,
    pub currency: Currency,
    pub tx_type: String,
    pub external_ref: Option<String>,
    pub created_at: Timestamp,
}

impl crate::entity::Entity for LedgerAccount {
    fn collection() -> &'static str {
        "ledger_accounts"
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

impl crate::entity::Entity for LedgerTransaction {
    fn collection() -> &'static str {
        "ledger_transactions"
    }
    fn id_bytes(&self) -> Vec<u8> {
        self.id.as_bytes().to_vec()
    }
    fn set_created_at(&mut self, ts: Timestamp) {
        self.created_at = ts;
    }
    fn set_updated_at(&mut self, _ts: Timestamp) {}
}
