//! The `Login` pipeline (spec §4.4): a sequence of fallible stages run in
//! order, first failure wins — grounded on
//! `chronx-dag::validation::validate_vertex`'s numbered-checks shape,
//! generalised here from "is this vertex admissible" to "is this login
//! admissible, and what session/token results from it".

use custodia_core::error::CustodiaError;
use custodia_core::session::{User, UserStatus};
use custodia_core::types::Timestamp;
use custodia_crypto::{device_id, verify_otp, verify_password};
use custodia_repository::Repository;

use crate::identifier::normalize_identifier;

#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    pub device_id: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl DeviceInfo {
    /// Resolve the effective device id: the caller-supplied one, else the
    /// user-agent/IP fingerprint.
    pub fn resolve(&self) -> String {
        self.device_id
            .clone()
            .unwrap_or_else(|| device_id(self.user_agent.as_deref(), self.ip_address.as_deref()))
    }
}

/// Stage 1: normalise `identifier`, detect its kind, and load the matching
/// user within `tenant_id`.
pub fn load_user(
    users: &Repository<User>,
    identifier: &str,
    tenant_id: &str,
) -> Result<User, CustodiaError> {
    let (_, normalised) = normalize_identifier(identifier);
    let user = users.find_one(|u| {
        u.tenant_id.to_string() == tenant_id
            && (u.email.as_deref() == Some(normalised.as_str())
                || u.phone.as_deref() == Some(normalised.as_str())
                || u.username.as_deref() == Some(normalised.as_str()))
    })?;
    user.ok_or(CustodiaError::InvalidCredentials)
}

/// Stage 2: password and account-status checks.
pub fn check_password_and_status(user: &User, password: &str) -> Result<(), CustodiaError> {
    if verify_password(password, &user.password_hash).is_err() {
        return Err(CustodiaError::InvalidCredentials);
    }
    match user.status {
        UserStatus::Suspended | UserStatus::Locked | UserStatus::Deleted => {
            Err(CustodiaError::InvalidCredentials)
        }
        UserStatus::Pending | UserStatus::Active => Ok(()),
    }
}

/// Stage 3: two-factor check. `code` is `None` when the caller didn't
/// supply one.
pub fn check_two_factor(user: &User, code: Option<&str>) -> Result<(), CustodiaError> {
    if !user.two_factor_enabled {
        return Ok(());
    }
    let Some(code) = code else {
        return Err(CustodiaError::TwoFactorRequired);
    };
    let expected = user.two_factor_secret.as_deref().unwrap_or("");
    if verify_otp(code, expected) {
        Ok(())
    } else {
        Err(CustodiaError::InvalidTwoFactorCode)
    }
}

/// Stage 4: if this is the user's first successful login, transition
/// `pending` -> `active` and persist it.
pub fn activate_if_pending(
    users: &Repository<User>,
    mut user: User,
    now: Timestamp,
) -> Result<User, CustodiaError> {
    if user.status == UserStatus::Pending {
        user.status = UserStatus::Active;
        user = users.update(user, now, false)?;
    }
    Ok(user)
}
