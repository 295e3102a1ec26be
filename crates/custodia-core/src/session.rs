//! Session/token and user entities (C4).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{SessionId, TenantId, Timestamp, UserId};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub device_id: String,
    pub refresh_token_hash: String,
    pub created_at: Timestamp,
    pub refresh_token_expires_at: Timestamp,
    pub session_expires_at: Timestamp,
    pub last_used_at: Timestamp,
    pub is_valid: bool,
    pub revocation_reason: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Pending,
    Active,
    Suspended,
    Locked,
    Deleted,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role: String,
    pub active: bool,
    pub expires_at: Option<Timestamp>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub username: Option<String>,
    pub password_hash: String,
    pub roles: Vec<RoleGrant>,
    pub permissions: BTreeMap<String, bool>,
    pub status: UserStatus,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub two_factor_enabled: bool,
    pub two_factor_secret: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl User {
    pub fn active_roles(&self, now: Timestamp) -> Vec<&str> {
        self.roles
            .iter()
            .filter(|r| r.active && r.expires_at.map(|e| e > now).unwrap_or(true))
            .map(|r| r.role.as_str())
            .collect()
    }

    pub fn has_any_role(&self, wanted: &[&str], now: Timestamp) -> bool {
        let active = self.active_roles(now);
        wanted.iter().any(|w| active.contains(w))
    }
}

impl crate::entity::Entity for Session {
    fn collection() -> &'static str {
        "sessions"
    }
    fn id_bytes(&self) -> Vec<u8> {
        self.id.as_bytes().to_vec()
    }
    fn set_created_at(&mut self, ts: Timestamp) {
        self.created_at = ts;
    }
    fn set_updated_at(&mut self, _ts: Timestamp) {}
    fn indexes() -> &'static [&'static str] {
        &["refresh_token_hash", "user_id,device_id,is_valid"]
    }
}

impl crate::entity::Entity for User {
    fn collection() -> &'static str {
        "users"
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
    fn indexes() -> &'static [&'static str] {
        &["email,tenant_id", "phone,tenant_id"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_any_role_respects_expiry() {
        let user = User {
            id: UserId::new(),
            tenant_id: TenantId::new(),
            email: Some("a@example.com".into()),
            phone: None,
            username: None,
            password_hash: "x".into(),
            roles: vec![RoleGrant {
                role: "admin".into(),
                active: true,
                expires_at: Some(100),
            }],
            permissions: Default::default(),
            status: UserStatus::Active,
            email_verified: true,
            phone_verified: false,
            two_factor_enabled: false,
            two_factor_secret: None,
            created_at: 0,
            updated_at: 0,
        };
        assert!(user.has_any_role(&["admin"], 50));
        assert!(!user.has_any_role(&["admin"], 200));
    }
}
