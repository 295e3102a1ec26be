//! custodia-node — the service binary wiring every module together.
//!
//! Startup sequence:
//!   1. Open the sled stores (repository/ledger/opstate/config/session)
//!   2. Register each service's config defaults via custodia-config
//!   3. Start the event bus and the notification dispatcher's subscriptions
//!   4. Start the gateway's JSON-RPC listener
//!   5. Run the background loop: periodic session cleanup + recovery sweeps

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use custodia_bonus::{BonusContext, BonusEngine};
use custodia_config::ConfigStore;
use custodia_core::constants::{
    DEFAULT_ACCESS_TOKEN_TTL_SECS, DEFAULT_MAX_ACTIVE_SESSIONS, DEFAULT_REFRESH_TOKEN_TTL_SECS, DEFAULT_SESSION_TTL_SECS,
    RATE_LIMIT_DEFAULT_MAX_REQUESTS, RATE_LIMIT_DEFAULT_WINDOW_SECS, RECOVERY_JOB_INTERVAL_SECS, RECOVERY_STUCK_MAX_AGE_SECS,
};
use custodia_core::error::CustodiaError;
use custodia_core::notification::NotificationChannel;
use custodia_core::session::{Session, User};
use custodia_core::types::{Currency, TenantId, UserId, WalletId};
use custodia_core::value::Value;
use custodia_core::wallet::BalanceType;
use custodia_eventbus::EventBus;
use custodia_gateway::{GatewayServer, OperationSpec, RateLimiter, Router, RpcServer, RpcServerState};
use custodia_ledger::LedgerEngine;
use custodia_notify::{EventBusAdapter, NotificationDispatcher, SendRequest};
use custodia_opstate::OperationStateTracker;
use custodia_repository::Repository;
use custodia_session::SessionEngine;
use custodia_wallet::WalletEngine;

#[derive(Parser, Debug)]
#[command(name = "custodia-node", version, about = "Custodia backend — ledger, wallets, sessions, bonuses, notifications, behind one gateway")]
struct Args {
    /// Directory for the persistent sled stores.
    #[arg(long, default_value = "~/.custodia/data")]
    data_dir: PathBuf,

    /// JSON-RPC gateway listen address.
    #[arg(long, default_value = "127.0.0.1:8645")]
    rpc_addr: SocketAddr,

    /// HS256 secret used to sign/verify access tokens. Defaults to an
    /// ephemeral value — only usable for local development, since tokens
    /// signed by one run can't be verified by the next.
    #[arg(long)]
    token_secret: Option<String>,
}

fn parse_id<T: FromStr>(s: &str) -> Result<T, CustodiaError> {
    T::from_str(s).map_err(|_| CustodiaError::Other(format!("invalid id: {s}")))
}

fn to_wire<T: serde::Serialize>(value: &T) -> Result<Value, CustodiaError> {
    let json = serde_json::to_value(value).map_err(|e| CustodiaError::Serialization(e.to_string()))?;
    serde_json::from_value(json).map_err(|e| CustodiaError::Serialization(e.to_string()))
}

fn from_params<T: serde::de::DeserializeOwned>(params: &Value) -> Result<T, CustodiaError> {
    let json = serde_json::to_value(params).map_err(|e| CustodiaError::Serialization(e.to_string()))?;
    serde_json::from_value(json).map_err(|e| CustodiaError::Serialization(e.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,custodia=debug".parse().unwrap()))
        .init();

    let args = Args::parse();
    info!("custodia node starting");

    // ── Stores ────────────────────────────────────────────────────────────
    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir).with_context(|| format!("creating data dir {}", data_dir.display()))?;

    let db = custodia_repository::open_db(&data_dir).context("opening repository store")?;

    let opstate = Arc::new(OperationStateTracker::open(&db).context("opening operation state tracker")?);
    let ledger = Arc::new(LedgerEngine::open(&db).context("opening ledger")?);
    let wallet = Arc::new(WalletEngine::open(&db, Arc::clone(&ledger), Arc::clone(&opstate)).context("opening wallet engine")?);
    let bonus = Arc::new(BonusEngine::open(&db, Arc::clone(&wallet)).context("opening bonus engine")?);

    let users: Repository<User> = Repository::open(&db).context("opening user repository")?;
    let sessions: Repository<Session> = Repository::open(&db).context("opening session repository")?;

    // ── Config defaults (write-once-per-key, safe across restarts) ─────────
    let now = chrono::Utc::now().timestamp();
    let config_store = Arc::new(ConfigStore::open(data_dir.join("config")).context("opening config store")?);
    register_service_defaults(&config_store, now);

    // ── Event bus + notification subscriptions ──────────────────────────────
    // socket/sse are served by this process's own live connections, so they
    // publish to the in-process bus rather than an outbound webhook.
    let bus = Arc::new(EventBus::default());
    let mut dispatcher = NotificationDispatcher::new(&db).context("opening notification dispatcher")?;
    dispatcher.register_adapter(NotificationChannel::Socket, Arc::new(EventBusAdapter::new(Arc::clone(&bus), "notifications")));
    dispatcher.register_adapter(NotificationChannel::Sse, Arc::new(EventBusAdapter::new(Arc::clone(&bus), "notifications")));
    let notify = Arc::new(dispatcher);
    custodia_notify::subscribe_all(&bus, Arc::clone(&notify));

    // ── Gateway ──────────────────────────────────────────────────────────
    let token_secret = args.token_secret.clone().unwrap_or_else(|| {
        warn!("no --token-secret provided; generating an ephemeral one — tokens won't survive a restart");
        custodia_crypto::generate_refresh_secret()
    });
    let token_secret_bytes = token_secret.into_bytes();

    let router = build_router(Arc::clone(&wallet), Arc::clone(&bonus), Arc::clone(&notify));
    let rate_limiter = RateLimiter::new(RATE_LIMIT_DEFAULT_MAX_REQUESTS, RATE_LIMIT_DEFAULT_WINDOW_SECS);
    let gateway = Arc::new(GatewayServer::new(token_secret_bytes.clone(), Arc::clone(&config_store), router, rate_limiter));

    let rpc_state = Arc::new(RpcServerState { gateway });
    let _rpc_handle = RpcServer::new(rpc_state).start(args.rpc_addr).await.context("starting gateway RPC server")?;
    info!(addr = %args.rpc_addr, "gateway listening");

    // ── Session engine for the cleanup loop ─────────────────────────────────
    // SessionEngine borrows a ConfigStore rather than owning an Arc of one.
    // It runs inline in main rather than as a spawned task, so borrowing
    // straight out of `config_store` (Arc derefs to &ConfigStore) never
    // needs to outlive this function.
    let session_engine = SessionEngine::new(users, sessions, &config_store, token_secret_bytes);

    run_background_loop(&session_engine, &opstate, &wallet).await;

    Ok(())
}

fn build_router(wallet: Arc<WalletEngine>, bonus: Arc<BonusEngine>, notify: Arc<NotificationDispatcher>) -> Router {
    let mut router = Router::new();

    #[derive(serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct GetBalanceParams {
        wallet_id: String,
        balance_type: BalanceType,
    }
    {
        let wallet = Arc::clone(&wallet);
        router.register(
            "wallet.getBalance",
            OperationSpec::new("wallet", true, move |_ctx, _cfg, params| {
                let p: GetBalanceParams = from_params(&params)?;
                let wallet_id: WalletId = parse_id(&p.wallet_id)?;
                let balance = wallet.balance(wallet_id, p.balance_type)?;
                to_wire(&balance)
            }),
        );
    }

    #[derive(serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct CreateTransferParams {
        from_user_id: String,
        to_user_id: String,
        amount: i64,
        currency: String,
        fee_amount: Option<i64>,
        from_balance_type: BalanceType,
        to_balance_type: BalanceType,
        external_ref: Option<String>,
    }
    {
        let wallet = Arc::clone(&wallet);
        router.register(
            "wallet.createTransfer",
            OperationSpec::new("wallet", true, move |_ctx, _cfg, params| {
                let p: CreateTransferParams = from_params(&params)?;
                let now = chrono::Utc::now().timestamp();
                let from_user_id: UserId = parse_id(&p.from_user_id)?;
                let to_user_id: UserId = parse_id(&p.to_user_id)?;
                let transfer = wallet.create_transfer(
                    from_user_id,
                    to_user_id,
                    p.amount,
                    Currency::new(&p.currency),
                    p.fee_amount,
                    p.from_balance_type,
                    p.to_balance_type,
                    p.external_ref,
                    now,
                )?;
                to_wire(&transfer)
            }),
        );
    }

    #[derive(serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct AwardBonusParams {
        code: String,
        user_id: String,
    }
    {
        let bonus = Arc::clone(&bonus);
        router.register(
            "bonus.award",
            OperationSpec::new("bonus", true, move |_ctx, _cfg, params| {
                let p: AwardBonusParams = from_params(&params)?;
                let now = chrono::Utc::now().timestamp();
                let owner: UserId = parse_id(&p.user_id)?;
                let ctx = BonusContext::new(owner, now);
                let awarded = bonus.award(&p.code, ctx)?;
                to_wire(&awarded)
            })
            .with_roles(vec!["admin".to_string(), "system".to_string()]),
        );
    }

    #[derive(serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct RecoverParams {
        operation_id: String,
    }
    {
        let wallet = Arc::clone(&wallet);
        router.register(
            "wallet.recover",
            OperationSpec::new("wallet", true, move |_ctx, _cfg, params| {
                let p: RecoverParams = from_params(&params)?;
                let now = chrono::Utc::now().timestamp();
                let operation_id = parse_id(&p.operation_id)?;
                let outcome = wallet.recover_transfer(operation_id, now)?;
                to_wire(&outcome)
            })
            .with_roles(vec!["admin".to_string(), "system".to_string()]),
        );
    }

    #[derive(serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct SendNotificationParams {
        user_id: String,
        tenant_id: String,
        channel: NotificationChannel,
        body: String,
        subject: Option<String>,
    }
    {
        let notify = Arc::clone(&notify);
        router.register(
            "notify.send",
            OperationSpec::new("notify", true, move |_ctx, _cfg, params| {
                let p: SendNotificationParams = from_params(&params)?;
                let now = chrono::Utc::now().timestamp();
                let tenant_id: TenantId = parse_id(&p.tenant_id)?;
                let user_id: UserId = parse_id(&p.user_id)?;
                let mut request = SendRequest::new(tenant_id, p.channel, p.body).with_user(user_id);
                if let Some(subject) = p.subject {
                    request = request.with_subject(subject);
                }
                let notification = notify.send(&request, now)?;
                to_wire(&notification)
            }),
        );
    }

    router
}

fn register_service_defaults(config: &ConfigStore, now: i64) {
    let defaults: &[(&str, &[(&str, Value)])] = &[
        (
            "auth",
            &[
                ("accessTokenTtlSecs", Value::Int(DEFAULT_ACCESS_TOKEN_TTL_SECS)),
                ("refreshTokenTtlSecs", Value::Int(DEFAULT_REFRESH_TOKEN_TTL_SECS)),
                ("sessionTtlSecs", Value::Int(DEFAULT_SESSION_TTL_SECS)),
                ("maxActiveSessions", Value::Int(DEFAULT_MAX_ACTIVE_SESSIONS as i64)),
            ],
        ),
        ("wallet", &[]),
        ("bonus", &[]),
        ("notify", &[]),
    ];

    for (service, entries) in defaults {
        let values = entries.iter().map(|(key, value)| ((*key).to_string(), value.clone(), Vec::new())).collect();
        if let Err(e) = config.register_defaults(service, values, now) {
            warn!(service, error = %e, "failed to register config defaults");
        }
    }
}

async fn run_background_loop(session_engine: &SessionEngine<'_>, opstate: &OperationStateTracker, wallet: &WalletEngine) {
    let mut cleanup_ticker = tokio::time::interval(Duration::from_secs(3600));
    let mut recovery_ticker = tokio::time::interval(Duration::from_secs(RECOVERY_JOB_INTERVAL_SECS));

    info!("node ready");
    loop {
        tokio::select! {
            _ = cleanup_ticker.tick() => {
                let now = chrono::Utc::now().timestamp();
                match session_engine.cleanup_expired_sessions(now) {
                    Ok(removed) if removed > 0 => info!(removed, "expired sessions cleaned up"),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "session cleanup failed"),
                }
            }
            _ = recovery_ticker.tick() => {
                let now = chrono::Utc::now().timestamp();
                match wallet.recover_stuck_transfers(opstate, RECOVERY_STUCK_MAX_AGE_SECS, now) {
                    Ok(recovered) if recovered > 0 => info!(recovered, "stuck transfers recovered"),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "transfer recovery sweep failed"),
                }
                // No RecoveryHandler exists for bonus awards yet: surface
                // stuck counts so an operator can investigate manually.
                match opstate.find_stuck("bonus_award", RECOVERY_STUCK_MAX_AGE_SECS, now) {
                    Ok(stuck) if !stuck.is_empty() => warn!(count = stuck.len(), "stuck bonus awards found, no handler registered to recover them"),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "bonus-award stuck scan failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
