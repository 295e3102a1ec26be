use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::proc_macros::rpc;

use custodia_core::value::Value;

use crate::server::RpcServer;
use crate::types::ExecuteResponse;

/// The JSON-over-HTTP query endpoint (spec §6): one method taking
/// `{operation, params}` plus an optional bearer token, returning the
/// `{success, data?, errors?, sagaId?}` wire shape. Named operations are
/// dispatched internally by `GatewayServer::execute` rather than exposed as
/// separate RPC methods.
#[rpc(server, namespace = "custodia")]
pub trait CustodiaApi {
    #[method(name = "execute")]
    async fn execute(&self, token: Option<String>, operation: String, params: Value) -> RpcResult<ExecuteResponse>;
}

#[async_trait]
impl CustodiaApiServer for RpcServer {
    async fn execute(&self, token: Option<String>, operation: String, params: Value) -> RpcResult<ExecuteResponse> {
        let now = chrono::Utc::now().timestamp();
        Ok(self.state.gateway.execute(token.as_deref(), &operation, params, now))
    }
}
