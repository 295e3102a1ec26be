//! custodia-gateway
//!
//! The query/mutation gateway (C11): a `jsonrpsee` JSON-RPC 2.0 server
//! exposing a single `execute` method that validates a bearer token,
//! resolves `{userId, tenantId, roles, permissions}` into a resolver
//! context, enforces auth/role/rate-limit policy per operation, resolves a
//! per-service config context via `custodia-config`, and routes to the
//! registered handler. `GatewayServer` carries the dispatch logic so it can
//! be exercised without a network round trip; `RpcServer` is the thin
//! jsonrpsee transport wrapper around it.

pub mod api;
pub mod auth;
pub mod context;
pub mod ratelimit;
pub mod router;
pub mod server;
pub mod types;

pub use api::CustodiaApiServer;
pub use context::RequestContext;
pub use ratelimit::RateLimiter;
pub use router::{OperationHandler, OperationSpec, Router};
pub use server::{GatewayServer, RpcServer, RpcServerState};
pub use types::ExecuteResponse;
