//! custodia-ledger
//!
//! Ledger Engine (C5): `GetOrCreateAccount`, `Post`, `Balance`,
//! `BalanceByOwner`. Every double-entry posting runs inside one sled
//! multi-tree transaction, so an invariant violation aborts with no
//! partial effect — the genuinely atomic counterpart to
//! `chronx-state::engine::StateEngine::apply`'s stage-then-commit shape.

pub mod engine;

pub use engine::{LedgerEngine, PostResult};
