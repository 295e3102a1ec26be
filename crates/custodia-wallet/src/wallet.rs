//! `CreateWallet` and `CreateWalletTransaction` (spec §4.6). The wallet
//! engine never mutates a balance field directly — every transaction
//! posts through `custodia-ledger::post` and reads the authoritative
//! post-commit balance back out of the same transaction.

use std::sync::Arc;

use custodia_core::account::AccountOwner;
use custodia_core::error::CustodiaError;
use custodia_core::types::{Currency, MinorUnits, Timestamp, UserId, WalletId, WalletTransactionId};
use custodia_core::wallet::{BalanceType, Wallet, WalletStatus, WalletTransaction, WalletTransactionType};
use custodia_ledger::LedgerEngine;
use custodia_opstate::OperationStateTracker;
use custodia_repository::Repository;
use custodia_saga::SagaOrchestrator;

/// The ledger account subtype backing each wallet balance.
pub fn subtype_for(balance_type: BalanceType) -> &'static str {
    match balance_type {
        BalanceType::Real => "main",
        BalanceType::Bonus => "bonus",
        BalanceType::Locked => "locked",
    }
}

fn status_label(status: WalletStatus) -> String {
    match status {
        WalletStatus::Active => "active",
        WalletStatus::Suspended => "suspended",
        WalletStatus::Closed => "closed",
    }
    .to_string()
}

pub struct WalletEngine {
    pub(crate) wallets: Repository<Wallet>,
    pub(crate) wallet_transactions: Repository<WalletTransaction>,
    pub(crate) transfers: Repository<custodia_core::wallet::Transfer>,
    pub(crate) ledger: Arc<LedgerEngine>,
    pub(crate) opstate: Arc<OperationStateTracker>,
    pub(crate) sagas: SagaOrchestrator,
}

impl WalletEngine {
    pub fn open(db: &sled::Db, ledger: Arc<LedgerEngine>, opstate: Arc<OperationStateTracker>) -> Result<Self, CustodiaError> {
        Ok(Self {
            wallets: Repository::open(db)?,
            wallet_transactions: Repository::open(db)?,
            transfers: Repository::open(db)?,
            ledger,
            opstate,
            sagas: SagaOrchestrator::new(),
        })
    }

    /// Idempotent by `(owner, currency, category)`: a repeat call returns
    /// the existing wallet rather than minting a second one.
    pub fn create_wallet(
        &self,
        owner: UserId,
        currency: Currency,
        category: impl Into<String>,
        now: Timestamp,
    ) -> Result<Wallet, CustodiaError> {
        let category = category.into();
        if let Some(existing) = self
            .wallets
            .find_one(|w| w.owner == owner && w.currency == currency && w.category == category)?
        {
            return Ok(existing);
        }

        self.ledger.get_or_create_account(AccountOwner::User(owner), "main", currency.clone(), false, now)?;
        self.ledger.get_or_create_account(AccountOwner::User(owner), "bonus", currency.clone(), false, now)?;
        self.ledger.get_or_create_account(AccountOwner::User(owner), "locked", currency.clone(), false, now)?;

        let wallet = Wallet {
            id: WalletId::new(),
            owner,
            currency,
            category,
            balance: 0,
            bonus_balance: 0,
            locked_balance: 0,
            lifetime_deposits: 0,
            lifetime_withdrawals: 0,
            status: WalletStatus::Active,
            created_at: now,
            updated_at: now,
        };
        self.wallets.create(wallet, now, true)
    }

    /// Posts a single ledger entry between the wallet's balance-type
    /// account and a system "external" sink, and returns
    /// `{id, balanceBefore, balanceAfter}` derived from the authoritative
    /// post-commit balance `custodia-ledger::post` read inside its
    /// transaction.
    #[allow(clippy::too_many_arguments)]
    pub fn create_wallet_transaction(
        &self,
        wallet_id: WalletId,
        user_id: UserId,
        tx_type: WalletTransactionType,
        balance_type: BalanceType,
        amount: MinorUnits,
        currency: Currency,
        description: Option<String>,
        now: Timestamp,
    ) -> Result<WalletTransaction, CustodiaError> {
        let wallet = self
            .wallets
            .find_by_id(wallet_id.as_bytes())?
            .ok_or_else(|| CustodiaError::UnknownWallet(wallet_id.to_string()))?;
        if wallet.status != WalletStatus::Active {
            return Err(CustodiaError::WalletNotUsable { status: status_label(wallet.status) });
        }

        let subtype = subtype_for(balance_type);
        let account = self
            .ledger
            .get_or_create_account(AccountOwner::User(wallet.owner), subtype, currency.clone(), false, now)?;
        let external = self
            .ledger
            .get_or_create_account(AccountOwner::System("external".into()), "external", currency.clone(), true, now)?;

        let tx_label = format!("{tx_type:?}").to_ascii_lowercase();
        let (balance_before, balance_after) = if tx_type.is_credit() {
            let posted = self.ledger.post(external.id, account.id, amount, currency.clone(), tx_label, None, now)?;
            (posted.to_balance_after - amount, posted.to_balance_after)
        } else {
            let posted = self.ledger.post(account.id, external.id, amount, currency.clone(), tx_label, None, now)?;
            (posted.from_balance_after + amount, posted.from_balance_after)
        };

        let wallet_tx = WalletTransaction {
            id: WalletTransactionId::new(),
            wallet_id,
            user_id,
            tx_type,
            balance_type,
            amount,
            balance_before,
            balance_after,
            currency,
            description,
            created_at: now,
        };

        let mut cached = wallet;
        match balance_type {
            BalanceType::Real => cached.balance = balance_after,
            BalanceType::Bonus => cached.bonus_balance = balance_after,
            BalanceType::Locked => cached.locked_balance = balance_after,
        }
        match tx_type {
            WalletTransactionType::Deposit => cached.lifetime_deposits += amount,
            WalletTransactionType::Withdrawal => cached.lifetime_withdrawals += amount,
            _ => {}
        }
        self.wallets.update(cached, now, true)?;

        self.wallet_transactions.create(wallet_tx, now, true)
    }

    /// Authoritative balance read for a wallet's balance-type account,
    /// sourced from `custodia-ledger` rather than the wallet's cached field.
    pub fn balance(&self, wallet_id: WalletId, balance_type: BalanceType) -> Result<MinorUnits, CustodiaError> {
        let wallet = self
            .wallets
            .find_by_id(wallet_id.as_bytes())?
            .ok_or_else(|| CustodiaError::UnknownWallet(wallet_id.to_string()))?;
        let subtype = subtype_for(balance_type);
        self.ledger.balance_by_owner(&AccountOwner::User(wallet.owner), subtype, &wallet.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_engine() -> WalletEngine {
        let dir = std::env::temp_dir().join(format!("custodia_wallet_test_{}_{}", std::process::id(), rand_suffix()));
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
    fn create_wallet_is_idempotent_per_owner_currency_category() {
        let engine = temp_engine();
        let owner = UserId::new();
        let a = engine.create_wallet(owner, eur(), "main", 0).unwrap();
        let b = engine.create_wallet(owner, eur(), "main", 100).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.created_at, 0);
    }

    #[test]
    fn deposit_credits_real_balance_and_reports_authoritative_balances() {
        let engine = temp_engine();
        let owner = UserId::new();
        let wallet = engine.create_wallet(owner, eur(), "main", 0).unwrap();

        let tx = engine
            .create_wallet_transaction(
                wallet.id,
                owner,
                WalletTransactionType::Deposit,
                BalanceType::Real,
                1_000,
                eur(),
                Some("first deposit".into()),
                10,
            )
            .unwrap();

        assert_eq!(tx.balance_before, 0);
        assert_eq!(tx.balance_after, 1_000);
        assert_eq!(engine.balance(wallet.id, BalanceType::Real).unwrap(), 1_000);
    }

    #[test]
    fn withdrawal_debits_real_balance() {
        let engine = temp_engine();
        let owner = UserId::new();
        let wallet = engine.create_wallet(owner, eur(), "main", 0).unwrap();
        engine
            .create_wallet_transaction(wallet.id, owner, WalletTransactionType::Deposit, BalanceType::Real, 1_000, eur(), None, 10)
            .unwrap();

        let tx = engine
            .create_wallet_transaction(wallet.id, owner, WalletTransactionType::Withdrawal, BalanceType::Real, 400, eur(), None, 20)
            .unwrap();

        assert_eq!(tx.balance_before, 1_000);
        assert_eq!(tx.balance_after, 600);
    }

    #[test]
    fn transaction_against_unknown_wallet_is_rejected() {
        let engine = temp_engine();
        let err = engine
            .create_wallet_transaction(WalletId::new(), UserId::new(), WalletTransactionType::Deposit, BalanceType::Real, 100, eur(), None, 0)
            .unwrap_err();
        assert!(matches!(err, CustodiaError::UnknownWallet(_)));
    }
}
