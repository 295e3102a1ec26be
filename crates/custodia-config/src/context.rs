/// Caller identity and data-isolation context for a config operation.
#[derive(Clone, Debug, Default)]
pub struct Ctx {
    pub brand: Option<String>,
    pub tenant_id: Option<String>,
    pub capability: Capability,
}

impl Ctx {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capability = capability;
        self
    }

    pub fn may_see_sensitive(&self, include_sensitive: bool) -> bool {
        include_sensitive && matches!(self.capability, Capability::Admin | Capability::System)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Capability {
    #[default]
    None,
    Admin,
    System,
}
