//! custodia-wallet
//!
//! Wallet/Transfer Engine (C6): `CreateWallet`, `CreateWalletTransaction`,
//! `CreateTransfer`. A wallet is a thin projection over three
//! `custodia-ledger` accounts (real/bonus/locked) for the same
//! `(owner, currency)` — the ledger, not this crate, is the source of
//! truth for balances. `CreateTransfer` is a `custodia-saga` consumer:
//! debit, credit, and an optional fee leg run as saga steps with
//! ledger-reversal compensations, heartbeating through `custodia-opstate`.
//! `TransferRecoveryHandler` plugs `Transfer` into `custodia-recovery`
//! for the case a crash leaves one stuck or an operator invokes recovery
//! on an already-approved transfer directly.

pub mod recovery;
pub mod transfer;
pub mod wallet;

pub use recovery::TransferRecoveryHandler;
pub use wallet::{subtype_for, WalletEngine};
