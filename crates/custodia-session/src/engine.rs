//! `SessionEngine`: the C4 public surface — `Login`, `RefreshToken`,
//! `Logout`, `LogoutAll`, `CleanupExpiredSessions` — wired over
//! `custodia-repository`'s generic store and `custodia-config`'s
//! per-tenant policy lookups.

use custodia_config::{Capability, ConfigStore, Ctx};
use custodia_core::error::CustodiaError;
use custodia_core::session::{Session, User};
use custodia_core::types::{SessionId, Timestamp, UserId};
use custodia_core::value::Value;
use custodia_crypto::{
    generate_refresh_secret, hash_refresh_secret, sign_access_token, verify_access_token,
    AccessTokenClaims,
};
use custodia_repository::Repository;
use tracing::{info, warn};

use crate::login::{activate_if_pending, check_password_and_status, check_two_factor, load_user, DeviceInfo};

const AUTH_SERVICE: &str = "auth";

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub access: String,
    pub refresh: String,
    pub expires_in: i64,
    pub refresh_expires_in: i64,
}

pub struct SessionEngine<'a> {
    users: Repository<User>,
    sessions: Repository<Session>,
    config: &'a ConfigStore,
    token_secret: Vec<u8>,
}

impl<'a> SessionEngine<'a> {
    pub fn new(
        users: Repository<User>,
        sessions: Repository<Session>,
        config: &'a ConfigStore,
        token_secret: Vec<u8>,
    ) -> Self {
        Self { users, sessions, config, token_secret }
    }

    fn ctx(&self, tenant_id: &str) -> Ctx {
        Ctx::new().with_tenant(tenant_id).with_capability(Capability::System)
    }

    fn config_i64(&self, tenant_id: &str, key: &str, default: i64) -> i64 {
        self.config
            .get(AUTH_SERVICE, key, &self.ctx(tenant_id), false, Some(Value::Int(default)))
            .ok()
            .flatten()
            .and_then(|v| v.as_i64())
            .unwrap_or(default)
    }

    fn issue_access_token(&self, user: &User, now: Timestamp) -> Result<(String, i64), CustodiaError> {
        let ttl = self.config_i64(
            &user.tenant_id.to_string(),
            "accessTokenTtlSecs",
            custodia_core::constants::DEFAULT_ACCESS_TOKEN_TTL_SECS,
        );
        let roles: Vec<String> = user.active_roles(now).into_iter().map(str::to_string).collect();
        let permissions =
            serde_json::to_value(&user.permissions).map_err(|e| CustodiaError::Serialization(e.to_string()))?;
        let claims = AccessTokenClaims::new(&user.id.to_string(), &user.tenant_id.to_string(), roles, permissions, now, ttl);
        let token = sign_access_token(&self.token_secret, &claims)
            .map_err(|e| CustodiaError::Serialization(e.to_string()))?;
        Ok((token, ttl))
    }

    /// `Login(identifier, password, tenantId, deviceInfo)` — spec §4.4.
    pub fn login(
        &self,
        identifier: &str,
        password: &str,
        tenant_id: &str,
        two_factor_code: Option<&str>,
        device: &DeviceInfo,
        now: Timestamp,
    ) -> Result<LoginResult, CustodiaError> {
        let user = load_user(&self.users, identifier, tenant_id)?;
        check_password_and_status(&user, password)?;
        check_two_factor(&user, two_factor_code)?;
        let user = activate_if_pending(&self.users, user, now)?;

        let device_id = device.resolve();
        let refresh_secret = generate_refresh_secret();
        let refresh_hash = hash_refresh_secret(&refresh_secret);

        let refresh_ttl = self.config_i64(
            tenant_id,
            "refreshTokenTtlSecs",
            custodia_core::constants::DEFAULT_REFRESH_TOKEN_TTL_SECS,
        );
        let session_ttl = self.config_i64(
            tenant_id,
            "sessionTtlSecs",
            custodia_core::constants::DEFAULT_SESSION_TTL_SECS,
        );

        let existing = self
            .sessions
            .find_one(|s| s.user_id == user.id && s.device_id == device_id && s.is_valid)?;

        let session = match existing {
            Some(mut session) => {
                session.refresh_token_hash = refresh_hash;
                session.refresh_token_expires_at = now + refresh_ttl;
                session.session_expires_at = now + session_ttl;
                session.last_used_at = now;
                self.sessions.update(session, now, true)?
            }
            None => {
                let session = Session {
                    id: SessionId::new(),
                    user_id: user.id,
                    tenant_id: user.tenant_id.clone(),
                    device_id,
                    refresh_token_hash: refresh_hash,
                    created_at: now,
                    refresh_token_expires_at: now + refresh_ttl,
                    session_expires_at: now + session_ttl,
                    last_used_at: now,
                    is_valid: true,
                    revocation_reason: None,
                };
                self.sessions.create(session, now, true)?
            }
        };

        self.prune_excess_sessions(&user.id, tenant_id, now);

        let (access, expires_in) = self.issue_access_token(&user, now)?;
        info!(user_id = %user.id, session_id = %session.id, "login succeeded");
        Ok(LoginResult { access, refresh: refresh_secret, expires_in, refresh_expires_in: refresh_ttl })
    }

    /// Soft cap: prune oldest-`last_used_at` valid sessions beyond
    /// `maxActiveSessions`. Logged, never fails the login.
    fn prune_excess_sessions(&self, user_id: &UserId, tenant_id: &str, now: Timestamp) {
        let max_sessions = self.config_i64(
            tenant_id,
            "maxActiveSessions",
            custodia_core::constants::DEFAULT_MAX_ACTIVE_SESSIONS as i64,
        )
        .max(1) as usize;

        let result = self.sessions.find_many(|s| s.user_id == *user_id && s.is_valid, 0, usize::MAX);
        let mut valid = match result {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "failed to list sessions for pruning");
                return;
            }
        };
        if valid.len() <= max_sessions {
            return;
        }
        valid.sort_by_key(|s| s.last_used_at);
        let excess = valid.len() - max_sessions;
        for mut session in valid.into_iter().take(excess) {
            session.is_valid = false;
            session.revocation_reason = Some("max_active_sessions_exceeded".to_string());
            if let Err(e) = self.sessions.update(session, now, true) {
                warn!(error = %e, "failed to prune excess session");
            }
        }
    }

    /// `RefreshToken(refreshSecret, tenantId)` — spec §4.4.
    pub fn refresh_token(
        &self,
        refresh_secret: &str,
        tenant_id: &str,
        now: Timestamp,
    ) -> Result<LoginResult, CustodiaError> {
        let hash = hash_refresh_secret(refresh_secret);
        let mut session = self
            .sessions
            .find_one(|s| s.refresh_token_hash == hash && s.tenant_id.to_string() == tenant_id)?
            .ok_or(CustodiaError::InvalidRefresh)?;

        if !session.is_valid {
            return Err(CustodiaError::InvalidRefresh);
        }
        if now >= session.refresh_token_expires_at {
            session.is_valid = false;
            session.revocation_reason = Some("refresh_expired".to_string());
            self.sessions.update(session, now, true)?;
            return Err(CustodiaError::RefreshExpired);
        }
        if now >= session.session_expires_at {
            session.is_valid = false;
            session.revocation_reason = Some("session_expired".to_string());
            self.sessions.update(session, now, true)?;
            return Err(CustodiaError::SessionExpired);
        }

        let user = self
            .users
            .find_by_id(&session.user_id.as_bytes())?
            .ok_or(CustodiaError::InvalidCredentials)?;

        session.last_used_at = now;
        self.sessions.update(session, now, true)?;

        let (access, expires_in) = self.issue_access_token(&user, now)?;
        Ok(LoginResult {
            access,
            refresh: refresh_secret.to_string(),
            expires_in,
            refresh_expires_in: 0,
        })
    }

    /// `Logout(userId, refreshSecret)` — invalidate by token hash.
    pub fn logout(&self, refresh_secret: &str, now: Timestamp) -> Result<(), CustodiaError> {
        let hash = hash_refresh_secret(refresh_secret);
        let Some(mut session) = self.sessions.find_one(|s| s.refresh_token_hash == hash)? else {
            return Ok(());
        };
        session.is_valid = false;
        session.revocation_reason = Some("logout".to_string());
        self.sessions.update(session, now, true)?;
        Ok(())
    }

    /// `LogoutAll(userId, tenantId)` — invalidate every session for the user.
    pub fn logout_all(&self, user_id: &UserId, tenant_id: &str, now: Timestamp) -> Result<usize, CustodiaError> {
        let sessions = self
            .sessions
            .find_many(|s| s.user_id == *user_id && s.tenant_id.to_string() == tenant_id && s.is_valid, 0, usize::MAX)?;
        let count = sessions.len();
        for mut session in sessions {
            session.is_valid = false;
            session.revocation_reason = Some("logout_all".to_string());
            self.sessions.update(session, now, true)?;
        }
        Ok(count)
    }

    /// `CleanupExpiredSessions()` — delete sessions past either expiry, plus
    /// invalidated sessions older than the retention window.
    pub fn cleanup_expired_sessions(&self, now: Timestamp) -> Result<usize, CustodiaError> {
        let retention = custodia_core::constants::INVALIDATED_SESSION_RETENTION_SECS;
        let stale = self.sessions.find_many(
            |s| {
                now >= s.refresh_token_expires_at
                    || now >= s.session_expires_at
                    || (!s.is_valid && now - s.last_used_at > retention)
            },
            0,
            usize::MAX,
        )?;
        let count = stale.len();
        for session in stale {
            self.sessions.delete(&session.id.as_bytes())?;
        }
        if count > 0 {
            info!(count, "cleaned up expired sessions");
        }
        Ok(count)
    }

    /// Verify an access token and return its claims, for resource services
    /// that only hold the signing secret (spec §4.4: "access tokens remain
    /// honoured until their `exp` regardless of revocation").
    pub fn verify_access_token(&self, token: &str, now: Timestamp) -> Result<AccessTokenClaims, CustodiaError> {
        verify_access_token(&self.token_secret, token, now).map_err(|_| CustodiaError::InvalidCredentials)
    }
}
