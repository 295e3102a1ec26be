//! Dynamic configuration entry (C1).

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;
use crate::value::Value;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigKey {
    pub service: String,
    pub brand: Option<String>,
    pub tenant_id: Option<String>,
    pub key: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub key: ConfigKey,
    pub value: Value,
    pub sensitive_paths: Vec<String>,
    pub description: Option<String>,
    pub version: u64,
    pub updated_by: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ConfigKey {
    /// Composite sled key: `service\x00brand\x00tenant\x00key`, with each
    /// optional component replaced by an empty segment when absent.
    pub fn storage_key(&self) -> Vec<u8> {
        [
            self.service.as_str(),
            self.brand.as_deref().unwrap_or(""),
            self.tenant_id.as_deref().unwrap_or(""),
            self.key.as_str(),
        ]
        .join("\u{0}")
        .into_bytes()
    }
}

impl crate::entity::Entity for ConfigEntry {
    fn collection() -> &'static str {
        "service_configs"
    }
    fn id_bytes(&self) -> Vec<u8> {
        self.key.storage_key()
    }
    fn set_created_at(&mut self, ts: Timestamp) {
        self.created_at = ts;
    }
    fn set_updated_at(&mut self, ts: Timestamp) {
        self.updated_at = ts;
    }
}
