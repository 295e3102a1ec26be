//! Token authentication (spec §4.11: "validates the access token's
//! signature and `exp`, extracts `{userId, tenantId, roles, permissions}`
//! into a resolver context"). The signature/`exp` check itself lives in
//! `custodia-crypto::token`; this module only maps its claims onto typed
//! ids and a domain error.

use std::str::FromStr;

use custodia_core::error::CustodiaError;
use custodia_core::types::{TenantId, Timestamp, UserId};
use custodia_crypto::verify_access_token;

use crate::context::RequestContext;

pub fn authenticate(secret: &[u8], token: &str, now: Timestamp) -> Result<RequestContext, CustodiaError> {
    let claims = verify_access_token(secret, token, now).map_err(|_| CustodiaError::InvalidCredentials)?;
    let user_id = UserId::from_str(&claims.sub).map_err(|_| CustodiaError::InvalidCredentials)?;
    let tenant_id = TenantId::from_str(&claims.tid).map_err(|_| CustodiaError::InvalidCredentials)?;
    Ok(RequestContext {
        user_id,
        tenant_id,
        roles: claims.roles,
        permissions: claims.permissions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodia_crypto::{sign_access_token, AccessTokenClaims};

    #[test]
    fn valid_token_resolves_to_a_context() {
        let secret = b"gateway-test-secret";
        let user_id = UserId::new();
        let tenant_id = TenantId::new();
        let claims = AccessTokenClaims::new(
            &user_id.to_string(),
            &tenant_id.to_string(),
            vec!["player".to_string()],
            serde_json::json!(["wallet.read"]),
            0,
            900,
        );
        let token = sign_access_token(secret, &claims).unwrap();

        let ctx = authenticate(secret, &token, 100).unwrap();
        assert_eq!(ctx.user_id, user_id);
        assert_eq!(ctx.tenant_id, tenant_id);
        assert!(ctx.has_role("player"));
    }

    #[test]
    fn expired_token_is_rejected() {
        let secret = b"gateway-test-secret";
        let claims = AccessTokenClaims::new(&UserId::new().to_string(), &TenantId::new().to_string(), vec![], serde_json::json!([]), 0, 100);
        let token = sign_access_token(secret, &claims).unwrap();
        assert!(matches!(authenticate(secret, &token, 500), Err(CustodiaError::InvalidCredentials)));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let claims = AccessTokenClaims::new(&UserId::new().to_string(), &TenantId::new().to_string(), vec![], serde_json::json!([]), 0, 900);
        let token = sign_access_token(b"secret-a", &claims).unwrap();
        assert!(matches!(authenticate(b"secret-b", &token, 100), Err(CustodiaError::InvalidCredentials)));
    }
}
