use std::net::SocketAddr;
use std::sync::Arc;

use jsonrpsee::server::{Server, ServerHandle};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use custodia_config::{Capability, ConfigStore, Ctx};
use custodia_core::error::CustodiaError;
use custodia_core::types::Timestamp;
use custodia_core::value::Value;

use crate::api::CustodiaApiServer;
use crate::auth;
use crate::ratelimit::RateLimiter;
use crate::router::Router;
use crate::types::ExecuteResponse;

/// Business logic behind the single `execute` entry point, independent of
/// the jsonrpsee transport so it can be exercised directly in tests.
pub struct GatewayServer {
    token_secret: Vec<u8>,
    config: Arc<ConfigStore>,
    router: Router,
    rate_limiter: RateLimiter,
}

impl GatewayServer {
    pub fn new(token_secret: Vec<u8>, config: Arc<ConfigStore>, router: Router, rate_limiter: RateLimiter) -> Self {
        Self { token_secret, config, router, rate_limiter }
    }

    /// Never fails: any error along the way is folded into the wire
    /// `{success:false, errors:[...]}` shape (spec §6).
    pub fn execute(&self, token: Option<&str>, operation: &str, params: Value, now: Timestamp) -> ExecuteResponse {
        match self.dispatch(token, operation, params, now) {
            Ok(resp) => resp,
            Err(e) => ExecuteResponse::err(e),
        }
    }

    fn dispatch(&self, token: Option<&str>, operation: &str, params: Value, now: Timestamp) -> Result<ExecuteResponse, CustodiaError> {
        let spec = self
            .router
            .get(operation)
            .ok_or_else(|| CustodiaError::Other(format!("unknown operation: {operation}")))?;

        let ctx = match token {
            Some(token) => Some(auth::authenticate(&self.token_secret, token, now)?),
            None => None,
        };

        if spec.requires_auth && ctx.is_none() {
            return Err(CustodiaError::InvalidCredentials);
        }

        if let Some(allowed_roles) = &spec.allowed_roles {
            let ctx = ctx.as_ref().ok_or(CustodiaError::MissingRole)?;
            if !ctx.has_any_role(allowed_roles) {
                return Err(CustodiaError::MissingRole);
            }
        }

        if let Some(ctx) = &ctx {
            self.rate_limiter.check(ctx.tenant_id, ctx.user_id, now)?;
        }

        let is_privileged = ctx.as_ref().map(|c| c.has_any_role(&["admin".to_string(), "system".to_string()])).unwrap_or(false);
        let capability = if is_privileged { Capability::Admin } else { Capability::None };

        let mut tenant_ctx = Ctx::new().with_capability(capability);
        if let Some(ctx) = &ctx {
            tenant_ctx = tenant_ctx.with_tenant(ctx.tenant_id.to_string());
        }

        let brand = self
            .config
            .get(&spec.service, "brand", &tenant_ctx, false, None)?
            .and_then(|v| v.as_str().map(|s| s.to_string()));

        let config_ctx = match brand {
            Some(brand) => tenant_ctx.with_brand(brand),
            None => tenant_ctx,
        };

        let data = spec.handler.handle(ctx.as_ref(), &config_ctx, params)?;
        Ok(ExecuteResponse::ok(data))
    }
}

/// Shared state passed to the RPC server.
pub struct RpcServerState {
    pub gateway: Arc<GatewayServer>,
}

/// The jsonrpsee transport wrapper; kept to the teacher's CORS/tower setup.
pub struct RpcServer {
    pub(crate) state: Arc<RpcServerState>,
}

impl RpcServer {
    pub fn new(state: Arc<RpcServerState>) -> Self {
        Self { state }
    }

    /// Start the JSON-RPC server on `addr` with permissive CORS headers. Returns a handle to stop it.
    pub async fn start(self, addr: SocketAddr) -> anyhow::Result<ServerHandle> {
        let cors = CorsLayer::new().allow_methods(Any).allow_origin(Any).allow_headers(Any);

        let server = Server::builder().set_http_middleware(tower::ServiceBuilder::new().layer(cors)).build(addr).await?;

        let module = self.into_rpc();
        let handle = server.start(module);
        info!(%addr, "gateway RPC server started");
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::OperationSpec;
    use custodia_core::types::{TenantId, UserId};
    use custodia_crypto::{sign_access_token, AccessTokenClaims};

    fn store() -> Arc<ConfigStore> {
        let path = std::env::temp_dir().join(format!("custodia-gateway-test-{}", custodia_core::types::UserId::new()));
        Arc::new(ConfigStore::open(path).unwrap())
    }

    fn gateway_with(router: Router) -> GatewayServer {
        GatewayServer::new(b"gw-secret".to_vec(), store(), router, RateLimiter::new(100, 60))
    }

    fn token_for(user_id: UserId, tenant_id: TenantId, roles: Vec<String>) -> String {
        let claims = AccessTokenClaims::new(&user_id.to_string(), &tenant_id.to_string(), roles, serde_json::json!([]), 0, 900);
        sign_access_token(b"gw-secret", &claims).unwrap()
    }

    #[test]
    fn unauthenticated_call_to_a_public_operation_succeeds() {
        let mut router = Router::new();
        router.register("ping", OperationSpec::new("health", false, |_ctx, _cfg, _params| Ok(Value::String("pong".into()))));
        let gw = gateway_with(router);

        let resp = gw.execute(None, "ping", Value::Null, 0);
        assert!(resp.success);
    }

    #[test]
    fn auth_required_operation_without_token_fails() {
        let mut router = Router::new();
        router.register("wallet.getBalance", OperationSpec::new("wallet", true, |_ctx, _cfg, _params| Ok(Value::Null)));
        let gw = gateway_with(router);

        let resp = gw.execute(None, "wallet.getBalance", Value::Null, 0);
        assert!(!resp.success);
    }

    #[test]
    fn role_restricted_operation_rejects_wrong_role() {
        let mut router = Router::new();
        router.register(
            "bonus.award",
            OperationSpec::new("bonus", true, |_ctx, _cfg, _params| Ok(Value::Null)).with_roles(vec!["admin".to_string()]),
        );
        let gw = gateway_with(router);
        let token = token_for(UserId::new(), TenantId::new(), vec!["player".to_string()]);

        let resp = gw.execute(Some(&token), "bonus.award", Value::Null, 0);
        assert!(!resp.success);
    }

    #[test]
    fn role_restricted_operation_allows_matching_role() {
        let mut router = Router::new();
        router.register(
            "bonus.award",
            OperationSpec::new("bonus", true, |_ctx, _cfg, _params| Ok(Value::Null)).with_roles(vec!["admin".to_string()]),
        );
        let gw = gateway_with(router);
        let token = token_for(UserId::new(), TenantId::new(), vec!["admin".to_string()]);

        let resp = gw.execute(Some(&token), "bonus.award", Value::Null, 0);
        assert!(resp.success);
    }

    #[test]
    fn unknown_operation_fails() {
        let gw = gateway_with(Router::new());
        let resp = gw.execute(None, "nope", Value::Null, 0);
        assert!(!resp.success);
    }

    #[test]
    fn rate_limit_is_enforced_per_tenant_user() {
        let mut router = Router::new();
        router.register("ping", OperationSpec::new("health", true, |_ctx, _cfg, _params| Ok(Value::Null)));
        let gw = GatewayServer::new(b"gw-secret".to_vec(), store(), router, RateLimiter::new(1, 60));
        let user_id = UserId::new();
        let tenant_id = TenantId::new();
        let token = token_for(user_id, tenant_id, vec![]);

        assert!(gw.execute(Some(&token), "ping", Value::Null, 0).success);
        assert!(!gw.execute(Some(&token), "ping", Value::Null, 0).success);
    }
}
