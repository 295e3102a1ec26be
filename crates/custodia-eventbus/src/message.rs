use custodia_core::value::Value;
use serde::{Deserialize, Serialize};

/// Envelope carried over every `integration:<publisher>` channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_type: String,
    pub data: Value,
    pub user_id: Option<String>,
    pub tenant_id: Option<String>,
    pub correlation_id: String,
    pub timestamp: i64,
}

impl EventEnvelope {
    pub fn new(event_type: impl Into<String>, data: Value, correlation_id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            user_id: None,
            tenant_id: None,
            correlation_id: correlation_id.into(),
            timestamp,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }
}
