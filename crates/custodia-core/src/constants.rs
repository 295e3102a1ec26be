//! ─── Platform constants ─────────────────────────────────────────────────────
//!
//! Values here are defaults only. Most are themselves overridable through the
//! config store (`custodia-config`) under the named service; the constant is
//! what a service registers as its default at startup via `register_defaults`.

// ── Operation state TTLs (C8) ────────────────────────────────────────────────

/// TTL for `pending`/`in_progress` operation-state entries (seconds).
pub const OPSTATE_ACTIVE_TTL_SECS: i64 = 60;

/// TTL for `completed`/`failed`/`recovered` operation-state entries (seconds).
pub const OPSTATE_TERMINAL_TTL_SECS: i64 = 300;

// ── Config store (C1) ────────────────────────────────────────────────────────

/// In-process resolved-tuple cache TTL.
pub const CONFIG_CACHE_TTL_SECS: u64 = 300;

// ── Repository (C2) ───────────────────────────────────────────────────────────

pub const REPO_CACHE_SINGLE_TTL_SECS: u64 = 300;
pub const REPO_CACHE_LIST_TTL_SECS: u64 = 60;
pub const REPO_CACHE_COUNT_TTL_SECS: u64 = 30;

/// Cap on a single `find_many`/`paginate` page.
pub const MAX_PAGE_SIZE: usize = 100;

// ── Ledger (C5) ───────────────────────────────────────────────────────────────

/// Write-conflict retry attempts for a single `post`.
pub const LEDGER_RETRY_ATTEMPTS: u32 = 3;

/// Base backoff before the first retry (doubles each attempt).
pub const LEDGER_RETRY_BASE_BACKOFF_MS: u64 = 100;

// ── Session/token engine (C4) ────────────────────────────────────────────────

/// Default access-token lifetime (seconds). Overridable via `custodia-config`.
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;

/// Default refresh-token lifetime (seconds): 30 days.
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: i64 = 30 * 24 * 3600;

/// Default session lifetime ceiling (seconds): 90 days.
pub const DEFAULT_SESSION_TTL_SECS: i64 = 90 * 24 * 3600;

/// Invalidated sessions older than this are purged by `CleanupExpiredSessions`.
pub const INVALIDATED_SESSION_RETENTION_SECS: i64 = 30 * 24 * 3600;

/// Default soft cap on simultaneously active sessions per user.
pub const DEFAULT_MAX_ACTIVE_SESSIONS: usize = 10;

// ── OTP ───────────────────────────────────────────────────────────────────────

pub const DEFAULT_OTP_LENGTH: u8 = 6;
pub const MIN_OTP_LENGTH: u8 = 4;
pub const MAX_OTP_LENGTH: u8 = 10;
pub const DEFAULT_OTP_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_OTP_EXPIRY_SECS: i64 = 10 * 60;

// ── Password hashing ──────────────────────────────────────────────────────────

/// Minimum Argon2 iteration count accepted (≥ spec's "12 iteration-equivalent").
pub const MIN_PASSWORD_HASH_COST: u32 = 12;

// ── Saga orchestrator (C7) ────────────────────────────────────────────────────

/// Window during which a repeat `Run(sagaId)` short-circuits to the cached result.
pub const SAGA_IDEMPOTENCY_CACHE_TTL_SECS: u64 = 24 * 3600;

// ── Recovery framework (C9) ───────────────────────────────────────────────────

/// Default polling interval for `RecoveryJob` ticks (seconds).
pub const RECOVERY_JOB_INTERVAL_SECS: u64 = 30;

/// Default staleness window passed to `RecoverStuck` (seconds).
pub const RECOVERY_STUCK_MAX_AGE_SECS: i64 = 120;

// ── Gateway (C11) ─────────────────────────────────────────────────────────────

/// Default per-request timeout at the gateway.
pub const GATEWAY_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Fixed-window rate limit: requests allowed per `(tenant, user)` per window.
pub const RATE_LIMIT_DEFAULT_MAX_REQUESTS: u32 = 120;
pub const RATE_LIMIT_DEFAULT_WINDOW_SECS: u64 = 60;

// ── Circuit breaker (dependency calls) ────────────────────────────────────────

pub const CIRCUIT_BREAKER_FAILURE_THRESHOLD: u32 = 5;
pub const CIRCUIT_BREAKER_RESET_WINDOW_SECS: u64 = 30;
pub const CIRCUIT_BREAKER_MONITORING_WINDOW_SECS: u64 = 60;

// ── Exit codes (CLI utilities) ────────────────────────────────────────────────

pub const EXIT_OK: i32 = 0;
pub const EXIT_CONFIG_ERROR: i32 = 1;
pub const EXIT_DEPENDENCY_UNAVAILABLE: i32 = 2;
pub const EXIT_VALIDATION_FAILURE: i32 = 3;
pub const EXIT_FATAL: i32 = 4;
