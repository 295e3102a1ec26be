//! Resolver context extracted from a verified access token (spec §4.11).

use custodia_core::types::{TenantId, UserId};

#[derive(Clone, Debug)]
pub struct RequestContext {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub roles: Vec<String>,
    pub permissions: serde_json::Value,
}

impl RequestContext {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn has_any_role(&self, roles: &[String]) -> bool {
        roles.iter().any(|r| self.has_role(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(roles: &[&str]) -> RequestContext {
        RequestContext {
            user_id: UserId::new(),
            tenant_id: TenantId::new(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            permissions: serde_json::json!([]),
        }
    }

    #[test]
    fn has_any_role_matches_on_overlap() {
        let c = ctx(&["player", "admin"]);
        assert!(c.has_any_role(&["admin".to_string(), "system".to_string()]));
    }

    #[test]
    fn has_any_role_is_false_with_no_overlap() {
        let c = ctx(&["player"]);
        assert!(!c.has_any_role(&["admin".to_string(), "system".to_string()]));
    }
}
