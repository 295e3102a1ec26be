use thiserror::Error;

/// The abstract error kind surfaced on the wire (`{success:false, errors}`).
/// User-facing responses reveal only `kind` + `message`, never internal context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    InsufficientFunds,
    CurrencyMismatch,
    DuplicateOperation,
    DependencyUnavailable,
    TransientConflict,
    Expired,
    RateLimited,
    Fatal,
}

#[derive(Debug, Error)]
pub enum CustodiaError {
    // ── Config store (C1) ────────────────────────────────────────────────────
    #[error("config entry not found: service={service} key={key}")]
    ConfigNotFound { service: String, key: String },

    #[error("sensitive path not present on entry: {0}")]
    SensitivePathNotFound(String),

    #[error("config version conflict: expected {expected}, got {got}")]
    ConfigVersionConflict { expected: u64, got: u64 },

    // ── Repository (C2) ───────────────────────────────────────────────────────
    #[error("entity not found in {collection}: {id}")]
    EntityNotFound { collection: String, id: String },

    #[error("invalid pagination cursor")]
    InvalidCursor,

    // ── Session/token engine (C4) ─────────────────────────────────────────────
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("two-factor authentication required")]
    TwoFactorRequired,

    #[error("invalid two-factor code")]
    InvalidTwoFactorCode,

    #[error("invalid refresh token")]
    InvalidRefresh,

    #[error("refresh token has expired")]
    RefreshExpired,

    #[error("session has expired")]
    SessionExpired,

    #[error("account is {status}")]
    AccountNotUsable { status: String },

    // ── Ledger engine (C5) ────────────────────────────────────────────────────
    #[error("insufficient funds: need {need}, have {have}")]
    InsufficientFunds { need: i64, have: i64 },

    #[error("currency mismatch: account is {account}, posting is {posting}")]
    CurrencyMismatch { account: String, posting: String },

    #[error("amount must be a strictly positive integer")]
    InvalidAmount,

    #[error("from and to accounts must be distinct: {0}")]
    SameAccount(String),

    #[error("write conflict on account after {attempts} attempts")]
    WriteConflict { attempts: u32 },

    #[error("unknown ledger account: {0}")]
    UnknownAccount(String),

    // ── Wallet/transfer engine (C6) ───────────────────────────────────────────
    #[error("wallet is {status}, cannot transact")]
    WalletNotUsable { status: String },

    #[error("unknown wallet: {0}")]
    UnknownWallet(String),

    // ── Saga orchestrator (C7) ────────────────────────────────────────────────
    #[error("saga step '{step}' failed: {reason}")]
    SagaStepFailed { step: String, reason: String },

    // ── Operation state / recovery (C8, C9) ───────────────────────────────────
    #[error("operation not found: {0}")]
    OperationNotFound(String),

    #[error("no recovery handler registered for operation type: {0}")]
    NoRecoveryHandler(String),

    // ── Bonus engine (C10) ────────────────────────────────────────────────────
    #[error("user is not eligible for this bonus: {0}")]
    BonusNotEligible(String),

    #[error("bonus template not found: {0}")]
    BonusTemplateNotFound(String),

    // ── Gateway (C11) ─────────────────────────────────────────────────────────
    #[error("rate limit exceeded")]
    RateLimited,

    #[error("missing required role")]
    MissingRole,

    // ── Notification dispatcher (C12) ─────────────────────────────────────────
    #[error("unsupported notification channel: {0}")]
    UnsupportedChannel(String),

    #[error("channel '{channel}' requires a resolvable recipient")]
    UnresolvedRecipient { channel: String },

    // ── Cross-cutting ─────────────────────────────────────────────────────────
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Other(String),
}

impl CustodiaError {
    pub fn kind(&self) -> ErrorKind {
        use CustodiaError::*;
        match self {
            ConfigNotFound { .. } | EntityNotFound { .. } | UnknownAccount(_)
            | UnknownWallet(_) | OperationNotFound(_) | BonusTemplateNotFound(_) => {
                ErrorKind::NotFound
            }
            SensitivePathNotFound(_) | InvalidCursor | InvalidAmount | InvalidTwoFactorCode
            | SameAccount(_) | UnsupportedChannel(_) | UnresolvedRecipient { .. } => ErrorKind::InvalidInput,
            ConfigVersionConflict { .. } | WalletNotUsable { .. } | AccountNotUsable { .. } => {
                ErrorKind::Conflict
            }
            InvalidCredentials => ErrorKind::Unauthenticated,
            TwoFactorRequired => ErrorKind::Unauthenticated,
            InvalidRefresh | RefreshExpired | SessionExpired => ErrorKind::Expired,
            InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            CurrencyMismatch { .. } => ErrorKind::CurrencyMismatch,
            WriteConflict { .. } => ErrorKind::TransientConflict,
            SagaStepFailed { .. } => ErrorKind::Conflict,
            NoRecoveryHandler(_) => ErrorKind::InvalidInput,
            BonusNotEligible(_) => ErrorKind::Forbidden,
            RateLimited => ErrorKind::RateLimited,
            MissingRole => ErrorKind::Forbidden,
            DependencyUnavailable(_) => ErrorKind::DependencyUnavailable,
            Serialization(_) | Storage(_) | Other(_) => ErrorKind::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_funds_maps_to_its_own_kind() {
        let e = CustodiaError::InsufficientFunds { need: 10, have: 5 };
        assert_eq!(e.kind(), ErrorKind::InsufficientFunds);
    }

    #[test]
    fn write_conflict_is_transient() {
        let e = CustodiaError::WriteConflict { attempts: 3 };
        assert_eq!(e.kind(), ErrorKind::TransientConflict);
    }
}
