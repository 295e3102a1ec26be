//! Operation registry (spec §4.11): each operation declares its owning
//! service (for config-context resolution), whether it requires auth, and
//! which roles may call it.

use std::collections::HashMap;
use std::sync::Arc;

use custodia_core::error::CustodiaError;
use custodia_core::value::Value;
use custodia_config::Ctx;

use crate::context::RequestContext;

pub trait OperationHandler: Send + Sync {
    fn handle(&self, ctx: Option<&RequestContext>, config_ctx: &Ctx, params: Value) -> Result<Value, CustodiaError>;
}

impl<F> OperationHandler for F
where
    F: Fn(Option<&RequestContext>, &Ctx, Value) -> Result<Value, CustodiaError> + Send + Sync,
{
    fn handle(&self, ctx: Option<&RequestContext>, config_ctx: &Ctx, params: Value) -> Result<Value, CustodiaError> {
        self(ctx, config_ctx, params)
    }
}

pub struct OperationSpec {
    pub service: String,
    pub requires_auth: bool,
    pub allowed_roles: Option<Vec<String>>,
    pub handler: Arc<dyn OperationHandler>,
}

impl OperationSpec {
    pub fn new(service: impl Into<String>, requires_auth: bool, handler: impl OperationHandler + 'static) -> Self {
        Self { service: service.into(), requires_auth, allowed_roles: None, handler: Arc::new(handler) }
    }

    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.allowed_roles = Some(roles);
        self
    }
}

#[derive(Default)]
pub struct Router {
    operations: HashMap<String, OperationSpec>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, spec: OperationSpec) {
        self.operations.insert(name.into(), spec);
    }

    pub fn get(&self, name: &str) -> Option<&OperationSpec> {
        self.operations.get(name)
    }
}
