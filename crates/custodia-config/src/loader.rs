//! Boot-time precedence chain (spec §6): base file → brand file →
//! environment file → configuration store → remote URL → environment
//! variables. Each layer is a `Value` document merged shallowly over the
//! previous one; the result seeds `ConfigStore::register_defaults`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use custodia_core::error::CustodiaError;
use custodia_core::value::Value;
use tracing::debug;

/// Layers documents in increasing precedence and produces the flattened
/// defaults a service passes to `ConfigStore::register_defaults`.
pub struct ConfigLoader {
    service: String,
    config_dir: PathBuf,
    brand: Option<String>,
    environment: Option<String>,
    remote: Option<Value>,
}

impl ConfigLoader {
    pub fn new(service: impl Into<String>, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            service: service.into(),
            config_dir: config_dir.into(),
            brand: None,
            environment: None,
            remote: None,
        }
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Feed in a document already fetched from a remote config source.
    /// Fetching itself is the caller's concern; the loader only merges it
    /// at the correct precedence slot.
    pub fn with_remote(mut self, remote: Value) -> Self {
        self.remote = Some(remote);
        self
    }

    fn read_file(path: &Path) -> Result<Option<Value>, CustodiaError> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path).map_err(|e| CustodiaError::Storage(e.to_string()))?;
        let value: Value =
            serde_json::from_str(&raw).map_err(|e| CustodiaError::Serialization(e.to_string()))?;
        Ok(Some(value))
    }

    fn merge(base: &mut Value, overlay: Value) {
        match (base, overlay) {
            (Value::Map(base_map), Value::Map(overlay_map)) => {
                for (k, v) in overlay_map {
                    match base_map.get_mut(&k) {
                        Some(existing) => Self::merge(existing, v),
                        None => {
                            base_map.insert(k, v);
                        }
                    }
                }
            }
            (slot, overlay) => *slot = overlay,
        }
    }

    /// Resolve the layered document for `self.service`.
    pub fn load(&self) -> Result<Value, CustodiaError> {
        let mut doc = Value::Map(BTreeMap::new());

        if let Some(base) = Self::read_file(&self.config_dir.join(format!("{}.json", self.service)))? {
            debug!(service = %self.service, "loaded base config file");
            Self::merge(&mut doc, base);
        }

        if let Some(brand) = &self.brand {
            let path = self
                .config_dir
                .join(format!("{}.{}.json", self.service, brand));
            if let Some(brand_doc) = Self::read_file(&path)? {
                debug!(service = %self.service, brand, "loaded brand config file");
                Self::merge(&mut doc, brand_doc);
            }
        }

        if let Some(env) = &self.environment {
            let path = self.config_dir.join(format!("{}.{}.json", self.service, env));
            if let Some(env_doc) = Self::read_file(&path)? {
                debug!(service = %self.service, environment = %env, "loaded environment config file");
                Self::merge(&mut doc, env_doc);
            }
        }

        if let Some(remote) = &self.remote {
            debug!(service = %self.service, "merged remote config document");
            Self::merge(&mut doc, remote.clone());
        }

        let env_overrides = self.load_env_vars();
        if !matches!(&env_overrides, Value::Map(m) if m.is_empty()) {
            debug!(service = %self.service, "merged environment variable overrides");
            Self::merge(&mut doc, env_overrides);
        }

        Ok(doc)
    }

    /// `<SERVICE_UPPER>_<KEY>` and `<SERVICE_UPPER>_<KEY>__<NESTED>` become
    /// top-level / dotted-path overrides, with the key segment converted
    /// from `SCREAMING_SNAKE` back to `camelCase`.
    fn load_env_vars(&self) -> Value {
        let prefix = format!("{}_", self.service.to_uppercase());
        let mut doc = Value::Map(BTreeMap::new());
        let mut found = false;
        for (name, raw) in std::env::vars() {
            let Some(rest) = name.strip_prefix(&prefix) else {
                continue;
            };
            let path = rest
                .split("__")
                .map(snake_to_camel)
                .collect::<Vec<_>>()
                .join(".");
            if path.is_empty() {
                continue;
            }
            found = true;
            doc.set_path(&path, parse_env_value(&raw));
        }
        if !found {
            debug!(prefix, "no environment variable overrides found");
        }
        doc
    }
}

fn snake_to_camel(segment: &str) -> String {
    let mut result = String::with_capacity(segment.len());
    let mut capitalize_next = false;
    for ch in segment.to_lowercase().chars() {
        if ch == '_' {
            capitalize_next = true;
            continue;
        }
        if capitalize_next {
            result.extend(ch.to_uppercase());
            capitalize_next = false;
        } else {
            result.push(ch);
        }
    }
    result
}

fn parse_env_value(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Value::Float(f);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}
