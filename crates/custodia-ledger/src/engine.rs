//! The ledger engine's four operations (spec §4.5): `get_or_create_account`,
//! `post`, `balance`, `balance_by_owner`.
//!
//! Grounded structurally on `chronx-state::engine::StateEngine::apply`'s
//! stage-then-commit shape, but `post` trades that engine's sequential
//! "write each staged mutation in turn" commit for a genuine sled
//! multi-tree transaction: both account updates and the transaction record
//! land in one `Transactional` closure, so a validation failure midway
//! through leaves no partial write behind.

use std::thread;
use std::time::Duration;

use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use tracing::{info, warn};

use custodia_core::account::{AccountOwner, LedgerAccount, LedgerTransaction};
use custodia_core::constants::{LEDGER_RETRY_ATTEMPTS, LEDGER_RETRY_BASE_BACKOFF_MS};
use custodia_core::error::CustodiaError;
use custodia_core::types::{AccountId, Currency, LedgerTransactionId, MinorUnits, Timestamp};

fn owner_key(owner: &AccountOwner) -> String {
    match owner {
        AccountOwner::User(id) => format!("user:{id}"),
        AccountOwner::Provider(name) => format!("provider:{name}"),
        AccountOwner::System(name) => format!("system:{name}"),
    }
}

fn account_index_key(owner: &AccountOwner, subtype: &str, currency: &Currency) -> Vec<u8> {
    format!("{}|{}|{}", owner_key(owner), subtype, currency.0).into_bytes()
}

fn external_ref_index_key(from: &AccountId, to: &AccountId, tx_type: &str, external_ref: &str) -> Vec<u8> {
    format!("{from}|{to}|{tx_type}|{external_ref}").into_bytes()
}

pub struct LedgerEngine {
    accounts: sled::Tree,
    account_index: sled::Tree,
    transactions: sled::Tree,
    external_ref_index: sled::Tree,
}

/// Result of a committed (or idempotently repeated) posting, carrying the
/// authoritative post-commit balances read inside the same transaction —
/// callers must not compute "before"/"after" from an external read.
#[derive(Debug, Clone)]
pub struct PostResult {
    pub transaction: LedgerTransaction,
    pub from_balance_after: MinorUnits,
    pub to_balance_after: MinorUnits,
}

enum PostOutcome {
    Created(PostResult),
    Existing(PostResult),
}

impl LedgerEngine {
    pub fn open(db: &sled::Db) -> Result<Self, CustodiaError> {
        let storage_err = |e: sled::Error| CustodiaError::Storage(e.to_string());
        Ok(Self {
            accounts: db.open_tree("ledger_accounts").map_err(storage_err)?,
            account_index: db.open_tree("ledger_account_index").map_err(storage_err)?,
            transactions: db.open_tree("ledger_transactions").map_err(storage_err)?,
            external_ref_index: db.open_tree("ledger_external_ref_index").map_err(storage_err)?,
        })
    }

    fn load_account(tree: &sled::Tree, id: &AccountId) -> Result<Option<LedgerAccount>, CustodiaError> {
        match tree.get(id.as_bytes()).map_err(|e| CustodiaError::Storage(e.to_string()))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(|e| CustodiaError::Serialization(e.to_string()))?)),
            None => Ok(None),
        }
    }

    /// Look up the account for `(owner, subtype, currency)`, creating it
    /// with a zero balance on first use. The lookup and the possible
    /// creation happen in one transaction so two concurrent first-uses of
    /// the same owner/subtype/currency can't each create their own account.
    pub fn get_or_create_account(
        &self,
        owner: AccountOwner,
        subtype: impl Into<String>,
        currency: Currency,
        allow_negative: bool,
        now: Timestamp,
    ) -> Result<LedgerAccount, CustodiaError> {
        let subtype = subtype.into();
        let index_key = account_index_key(&owner, &subtype, &currency);

        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = (&self.accounts, &self.account_index).transaction(|(accounts, index)| {
                if let Some(existing_id) = index.get(&index_key)? {
                    let bytes = accounts
                        .get(&existing_id)?
                        .ok_or_else(|| ConflictableTransactionError::Abort(CustodiaError::Storage("account index points at missing account".into())))?;
                    let account: LedgerAccount = bincode::deserialize(&bytes)
                        .map_err(|e| ConflictableTransactionError::Abort(CustodiaError::Serialization(e.to_string())))?;
                    return Ok(account);
                }

                let account = LedgerAccount::new(owner.clone(), subtype.clone(), currency.clone(), allow_negative, now);
                let bytes = bincode::serialize(&account)
                    .map_err(|e| ConflictableTransactionError::Abort(CustodiaError::Serialization(e.to_string())))?;
                accounts.insert(account.id.as_bytes().to_vec(), bytes)?;
                index.insert(index_key.clone(), account.id.as_bytes().to_vec())?;
                Ok(account)
            });

            match result {
                Ok(account) => return Ok(account),
                Err(TransactionError::Abort(e)) => return Err(e),
                Err(TransactionError::Storage(e)) => {
                    if attempts >= LEDGER_RETRY_ATTEMPTS {
                        return Err(CustodiaError::WriteConflict { attempts });
                    }
                    warn!(error = %e, attempts, "get_or_create_account write conflict, retrying");
                    thread::sleep(Duration::from_millis(LEDGER_RETRY_BASE_BACKOFF_MS * attempts as u64));
                }
            }
        }
    }

    /// Post a double-entry transfer: debit `from_account_id`, credit
    /// `to_account_id`, both inside one sled transaction across the
    /// accounts and transactions trees. Currency mismatches, non-positive
    /// amounts, and balance violations abort the transaction with no
    /// partial write. A repeated `external_ref` for the same
    /// `(from, to, type)` triple is idempotent: the prior posting is
    /// returned rather than re-applied.
    #[allow(clippy::too_many_arguments)]
    pub fn post(
        &self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: MinorUnits,
        currency: Currency,
        tx_type: impl Into<String>,
        external_ref: Option<String>,
        now: Timestamp,
    ) -> Result<PostResult, CustodiaError> {
        if amount <= 0 {
            return Err(CustodiaError::InvalidAmount);
        }
        if from_account_id == to_account_id {
            return Err(CustodiaError::SameAccount(from_account_id.to_string()));
        }
        let tx_type = tx_type.into();
        let ref_index_key = external_ref.as_ref().map(|r| external_ref_index_key(&from_account_id, &to_account_id, &tx_type, r));

        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = (&self.accounts, &self.transactions, &self.external_ref_index).transaction(
                |(accounts, transactions, ref_index)| {
                    if let Some(key) = &ref_index_key {
                        if let Some(existing_tx_id) = ref_index.get(key)? {
                            let bytes = transactions
                                .get(&existing_tx_id)?
                                .ok_or_else(|| ConflictableTransactionError::Abort(CustodiaError::Storage("external ref index points at missing transaction".into())))?;
                            let existing: LedgerTransaction = bincode::deserialize(&bytes)
                                .map_err(|e| ConflictableTransactionError::Abort(CustodiaError::Serialization(e.to_string())))?;

                            let from_after = accounts
                                .get(existing.from_account_id.as_bytes())?
                                .map(|b| bincode::deserialize::<LedgerAccount>(&b).map(|a| a.balance))
                                .transpose()
                                .map_err(|e| ConflictableTransactionError::Abort(CustodiaError::Serialization(e.to_string())))?
                                .unwrap_or(0);
                            let to_after = accounts
                                .get(existing.to_account_id.as_bytes())?
                                .map(|b| bincode::deserialize::<LedgerAccount>(&b).map(|a| a.balance))
                                .transpose()
                                .map_err(|e| ConflictableTransactionError::Abort(CustodiaError::Serialization(e.to_string())))?
                                .unwrap_or(0);

                            return Ok(PostOutcome::Existing(PostResult {
                                transaction: existing,
                                from_balance_after: from_after,
                                to_balance_after: to_after,
                            }));
                        }
                    }

                    let from_bytes = accounts.get(from_account_id.as_bytes())?.ok_or_else(|| {
                        ConflictableTransactionError::Abort(CustodiaError::UnknownAccount(from_account_id.to_string()))
                    })?;
                    let mut from: LedgerAccount = bincode::deserialize(&from_bytes)
                        .map_err(|e| ConflictableTransactionError::Abort(CustodiaError::Serialization(e.to_string())))?;

                    let to_bytes = accounts.get(to_account_id.as_bytes())?.ok_or_else(|| {
                        ConflictableTransactionError::Abort(CustodiaError::UnknownAccount(to_account_id.to_string()))
                    })?;
                    let mut to: LedgerAccount = bincode::deserialize(&to_bytes)
                        .map_err(|e| ConflictableTransactionError::Abort(CustodiaError::Serialization(e.to_string())))?;

                    if from.currency != currency {
                        return Err(ConflictableTransactionError::Abort(CustodiaError::CurrencyMismatch {
                            account: from.currency.to_string(),
                            posting: currency.to_string(),
                        }));
                    }
                    if to.currency != currency {
                        return Err(ConflictableTransactionError::Abort(CustodiaError::CurrencyMismatch {
                            account: to.currency.to_string(),
                            posting: currency.to_string(),
                        }));
                    }

                    let new_from_balance = from.balance - amount;
                    if new_from_balance < 0 && !from.allow_negative {
                        return Err(ConflictableTransactionError::Abort(CustodiaError::InsufficientFunds {
                            need: amount,
                            have: from.balance,
                        }));
                    }

                    from.balance = new_from_balance;
                    from.updated_at = now;
                    to.balance += amount;
                    to.updated_at = now;

                    let tx = LedgerTransaction {
                        id: LedgerTransactionId::new(),
                        from_account_id,
                        to_account_id,
                        amount,
                        currency: currency.clone(),
                        tx_type: tx_type.clone(),
                        external_ref: external_ref.clone(),
                        created_at: now,
                    };

                    let from_bytes = bincode::serialize(&from)
                        .map_err(|e| ConflictableTransactionError::Abort(CustodiaError::Serialization(e.to_string())))?;
                    let to_bytes = bincode::serialize(&to)
                        .map_err(|e| ConflictableTransactionError::Abort(CustodiaError::Serialization(e.to_string())))?;
                    let tx_bytes = bincode::serialize(&tx)
                        .map_err(|e| ConflictableTransactionError::Abort(CustodiaError::Serialization(e.to_string())))?;

                    accounts.insert(from.id.as_bytes().to_vec(), from_bytes)?;
                    accounts.insert(to.id.as_bytes().to_vec(), to_bytes)?;
                    transactions.insert(tx.id.as_bytes().to_vec(), tx_bytes)?;
                    if let Some(key) = &ref_index_key {
                        ref_index.insert(key.clone(), tx.id.as_bytes().to_vec())?;
                    }

                    Ok(PostOutcome::Created(PostResult {
                        from_balance_after: from.balance,
                        to_balance_after: to.balance,
                        transaction: tx,
                    }))
                },
            );

            match result {
                Ok(PostOutcome::Created(result)) => {
                    let tx = &result.transaction;
                    info!(from = %tx.from_account_id, to = %tx.to_account_id, amount = tx.amount, tx_type = %tx.tx_type, "ledger posting committed");
                    return Ok(result);
                }
                Ok(PostOutcome::Existing(result)) => return Ok(result),
                Err(TransactionError::Abort(e)) => return Err(e),
                Err(TransactionError::Storage(e)) => {
                    if attempts >= LEDGER_RETRY_ATTEMPTS {
                        return Err(CustodiaError::WriteConflict { attempts });
                    }
                    warn!(error = %e, attempts, "ledger posting write conflict, retrying");
                    thread::sleep(Duration::from_millis(LEDGER_RETRY_BASE_BACKOFF_MS * attempts as u64));
                }
            }
        }
    }

    /// Look up a previously committed posting by the same
    /// `(from, to, tx_type, external_ref)` key `post`'s idempotency check
    /// uses, without attempting to create or re-apply anything. Recovery
    /// handlers use this to discover which legs of a multi-step operation
    /// actually landed.
    pub fn find_posting_by_ref(
        &self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        tx_type: &str,
        external_ref: &str,
    ) -> Result<Option<LedgerTransaction>, CustodiaError> {
        let key = external_ref_index_key(&from_account_id, &to_account_id, tx_type, external_ref);
        match self.external_ref_index.get(&key).map_err(|e| CustodiaError::Storage(e.to_string()))? {
            Some(tx_id) => {
                let bytes = self
                    .transactions
                    .get(&tx_id)
                    .map_err(|e| CustodiaError::Storage(e.to_string()))?
                    .ok_or_else(|| CustodiaError::Storage("external ref index points at missing transaction".into()))?;
                let tx: LedgerTransaction = bincode::deserialize(&bytes).map_err(|e| CustodiaError::Serialization(e.to_string()))?;
                Ok(Some(tx))
            }
            None => Ok(None),
        }
    }

    pub fn balance(&self, account_id: &AccountId) -> Result<MinorUnits, CustodiaError> {
        match Self::load_account(&self.accounts, account_id)? {
            Some(account) => Ok(account.balance),
            None => Err(CustodiaError::UnknownAccount(account_id.to_string())),
        }
    }

    /// Balance for `(owner, subtype, currency)`. An account that has never
    /// been posted against doesn't exist yet, so this returns `0` rather
    /// than an error.
    pub fn balance_by_owner(&self, owner: &AccountOwner, subtype: &str, currency: &Currency) -> Result<MinorUnits, CustodiaError> {
        let index_key = account_index_key(owner, subtype, currency);
        match self
            .account_index
            .get(&index_key)
            .map_err(|e| CustodiaError::Storage(e.to_string()))?
        {
            Some(account_id_bytes) => {
                let bytes = self
                    .accounts
                    .get(&account_id_bytes)
                    .map_err(|e| CustodiaError::Storage(e.to_string()))?
                    .ok_or_else(|| CustodiaError::Storage("account index points at missing account".into()))?;
                let account: LedgerAccount = bincode::deserialize(&bytes).map_err(|e| CustodiaError::Serialization(e.to_string()))?;
                Ok(account.balance)
            }
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_engine() -> LedgerEngine {
        let dir = std::env::temp_dir().join(format!("custodia_ledger_test_{}_{}", std::process::id(), rand_suffix()));
        let db = sled::open(&dir).unwrap();
        LedgerEngine::open(&db).unwrap()
    }

    fn rand_suffix() -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().subsec_nanos() as u64
    }

    fn eur() -> Currency {
        Currency::new("eur")
    }

    #[test]
    fn get_or_create_account_is_idempotent_for_the_same_owner_subtype_currency() {
        let engine = temp_engine();
        let owner = AccountOwner::System("fees".into());
        let a = engine.get_or_create_account(owner.clone(), "main", eur(), true, 100).unwrap();
        let b = engine.get_or_create_account(owner, "main", eur(), true, 200).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.created_at, 100);
    }

    #[test]
    fn post_moves_balance_from_source_to_destination() {
        let engine = temp_engine();
        let source = engine
            .get_or_create_account(AccountOwner::System("treasury".into()), "main", eur(), true, 0)
            .unwrap();
        let dest = engine
            .get_or_create_account(AccountOwner::User(custodia_core::types::UserId::new()), "main", eur(), false, 0)
            .unwrap();

        engine
            .post(source.id, dest.id, 500, eur(), "deposit", None, 10)
            .unwrap();

        assert_eq!(engine.balance(&source.id).unwrap(), -500);
        assert_eq!(engine.balance(&dest.id).unwrap(), 500);
    }

    #[test]
    fn post_rejects_overdraft_on_an_account_that_disallows_negative_balance() {
        let engine = temp_engine();
        let source = engine
            .get_or_create_account(AccountOwner::User(custodia_core::types::UserId::new()), "main", eur(), false, 0)
            .unwrap();
        let dest = engine
            .get_or_create_account(AccountOwner::System("treasury".into()), "main", eur(), true, 0)
            .unwrap();

        let err = engine.post(source.id, dest.id, 100, eur(), "withdrawal", None, 10).unwrap_err();
        assert!(matches!(err, CustodiaError::InsufficientFunds { need: 100, have: 0 }));
    }

    #[test]
    fn post_rejects_identical_from_and_to_accounts() {
        let engine = temp_engine();
        let account = engine
            .get_or_create_account(AccountOwner::System("treasury".into()), "main", eur(), true, 0)
            .unwrap();

        let err = engine.post(account.id, account.id, 100, eur(), "deposit", None, 10).unwrap_err();
        assert!(matches!(err, CustodiaError::SameAccount(_)));
    }

    #[test]
    fn post_rejects_currency_mismatch() {
        let engine = temp_engine();
        let source = engine
            .get_or_create_account(AccountOwner::System("treasury".into()), "main", eur(), true, 0)
            .unwrap();
        let dest = engine
            .get_or_create_account(AccountOwner::User(custodia_core::types::UserId::new()), "main", Currency::new("usd"), false, 0)
            .unwrap();

        let err = engine.post(source.id, dest.id, 100, eur(), "deposit", None, 10).unwrap_err();
        assert!(matches!(err, CustodiaError::CurrencyMismatch { .. }));
    }

    #[test]
    fn post_is_idempotent_on_repeated_external_ref() {
        let engine = temp_engine();
        let source = engine
            .get_or_create_account(AccountOwner::System("treasury".into()), "main", eur(), true, 0)
            .unwrap();
        let dest = engine
            .get_or_create_account(AccountOwner::User(custodia_core::types::UserId::new()), "main", eur(), false, 0)
            .unwrap();

        let first = engine
            .post(source.id, dest.id, 300, eur(), "deposit", Some("stripe-evt-1".into()), 10)
            .unwrap();
        let second = engine
            .post(source.id, dest.id, 300, eur(), "deposit", Some("stripe-evt-1".into()), 20)
            .unwrap();

        assert_eq!(first.transaction.id, second.transaction.id);
        assert_eq!(engine.balance(&dest.id).unwrap(), 300);
    }

    #[test]
    fn find_posting_by_ref_locates_a_committed_leg_and_nothing_else() {
        let engine = temp_engine();
        let source = engine
            .get_or_create_account(AccountOwner::System("treasury".into()), "main", eur(), true, 0)
            .unwrap();
        let dest = engine
            .get_or_create_account(AccountOwner::User(custodia_core::types::UserId::new()), "main", eur(), false, 0)
            .unwrap();

        assert!(engine.find_posting_by_ref(source.id, dest.id, "deposit", "evt-1").unwrap().is_none());

        engine
            .post(source.id, dest.id, 500, eur(), "deposit", Some("evt-1".into()), 10)
            .unwrap();

        let found = engine.find_posting_by_ref(source.id, dest.id, "deposit", "evt-1").unwrap().unwrap();
        assert_eq!(found.amount, 500);
        assert!(engine.find_posting_by_ref(source.id, dest.id, "deposit", "evt-2").unwrap().is_none());
    }

    #[test]
    fn balance_by_owner_is_zero_before_any_account_exists() {
        let engine = temp_engine();
        let owner = AccountOwner::User(custodia_core::types::UserId::new());
        assert_eq!(engine.balance_by_owner(&owner, "main", &eur()).unwrap(), 0);
    }
}
