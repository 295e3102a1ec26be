//! The Config Store (C1): dynamic, sensitivity-filtered key/value storage
//! per `(service, brand?, tenantId?)`, with a resolved-tuple TTL cache.
//!
//! One `sled` tree (`service_configs`), entities bincode-encoded, grounded
//! directly on `chronx-state::db::StateDb`'s "one tree, get/put pair,
//! `ChronxError::Storage`-wrapped sled calls" shape.

use std::path::Path;
use std::time::Duration;

use custodia_core::config::{ConfigEntry, ConfigKey};
use custodia_core::error::CustodiaError;
use custodia_core::value::Value;
use moka::sync::Cache;
use tracing::{info, warn};

use crate::context::Ctx;

pub struct ConfigStore {
    _db: sled::Db,
    tree: sled::Tree,
    cache: Cache<Vec<u8>, ConfigEntry>,
}

impl ConfigStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CustodiaError> {
        let db = sled::open(path).map_err(|e| CustodiaError::Storage(e.to_string()))?;
        let tree = db
            .open_tree("service_configs")
            .map_err(|e| CustodiaError::Storage(e.to_string()))?;
        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(
                custodia_core::constants::CONFIG_CACHE_TTL_SECS,
            ))
            .build();
        Ok(Self {
            _db: db,
            tree,
            cache,
        })
    }

    fn candidate_keys(service: &str, key: &str, ctx: &Ctx) -> Vec<ConfigKey> {
        let mut candidates = Vec::with_capacity(4);
        if let (Some(brand), Some(tenant)) = (&ctx.brand, &ctx.tenant_id) {
            candidates.push(ConfigKey {
                service: service.to_string(),
                brand: Some(brand.clone()),
                tenant_id: Some(tenant.clone()),
                key: key.to_string(),
            });
        }
        if let Some(brand) = &ctx.brand {
            candidates.push(ConfigKey {
                service: service.to_string(),
                brand: Some(brand.clone()),
                tenant_id: None,
                key: key.to_string(),
            });
        }
        if let Some(tenant) = &ctx.tenant_id {
            candidates.push(ConfigKey {
                service: service.to_string(),
                brand: None,
                tenant_id: Some(tenant.clone()),
                key: key.to_string(),
            });
        }
        candidates.push(ConfigKey {
            service: service.to_string(),
            brand: None,
            tenant_id: None,
            key: key.to_string(),
        });
        candidates
    }

    fn load_raw(&self, ck: &ConfigKey) -> Result<Option<ConfigEntry>, CustodiaError> {
        let storage_key = ck.storage_key();
        if let Some(hit) = self.cache.get(&storage_key) {
            return Ok(Some(hit));
        }
        let raw = self
            .tree
            .get(&storage_key)
            .map_err(|e| CustodiaError::Storage(e.to_string()))?;
        match raw {
            Some(bytes) => {
                let entry: ConfigEntry = bincode::deserialize(&bytes)
                    .map_err(|e| CustodiaError::Serialization(e.to_string()))?;
                self.cache.insert(storage_key, entry.clone());
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /// Resolve `(service, key)` against `ctx` using the first-hit-wins
    /// precedence order, returning a filtered value.
    pub fn get(
        &self,
        service: &str,
        key: &str,
        ctx: &Ctx,
        include_sensitive: bool,
        caller_default: Option<Value>,
    ) -> Result<Option<Value>, CustodiaError> {
        for candidate in Self::candidate_keys(service, key, ctx) {
            if let Some(entry) = self.load_raw(&candidate)? {
                let value = if entry.sensitive_paths.is_empty() || ctx.may_see_sensitive(include_sensitive) {
                    entry.value
                } else {
                    entry.value.strip_paths(&entry.sensitive_paths)
                };
                return Ok(Some(value));
            }
        }
        Ok(caller_default)
    }

    /// Return every entry for `service` visible to `ctx`, as a map keyed by
    /// the entry's `key`, most-specific tuple winning on key collisions.
    pub fn get_all(&self, service: &str, ctx: &Ctx, include_sensitive: bool) -> Result<Value, CustodiaError> {
        let mut out = std::collections::BTreeMap::new();
        for item in self.tree.scan_prefix(service.as_bytes()) {
            let (_, bytes) = item.map_err(|e| CustodiaError::Storage(e.to_string()))?;
            let entry: ConfigEntry = bincode::deserialize(&bytes)
                .map_err(|e| CustodiaError::Serialization(e.to_string()))?;
            if entry.key.service != service {
                continue;
            }
            let matches_brand = entry.key.brand.is_none() || entry.key.brand == ctx.brand;
            let matches_tenant = entry.key.tenant_id.is_none() || entry.key.tenant_id == ctx.tenant_id;
            if !matches_brand || !matches_tenant {
                continue;
            }
            let value = if entry.sensitive_paths.is_empty() || ctx.may_see_sensitive(include_sensitive) {
                entry.value
            } else {
                entry.value.strip_paths(&entry.sensitive_paths)
            };
            out.insert(entry.key.key.clone(), value);
        }
        Ok(Value::Map(out))
    }

    /// `Set` validates that `sensitive_paths` point at existing paths on
    /// `value`, then writes the entry with `version` bumped (optimistic
    /// per-tuple serialisation — a mismatched `expected_version` rejects
    /// the write as a conflict).
    pub fn set(
        &self,
        key: ConfigKey,
        value: Value,
        sensitive_paths: Vec<String>,
        description: Option<String>,
        updated_by: Option<String>,
        expected_version: Option<u64>,
        now: i64,
    ) -> Result<u64, CustodiaError> {
        for path in &sensitive_paths {
            if value.get_path(path).is_none() {
                return Err(CustodiaError::SensitivePathNotFound(path.clone()));
            }
        }

        let storage_key = key.storage_key();
        let existing = self.load_raw(&key)?;

        if let (Some(expected), Some(existing)) = (expected_version, &existing) {
            if existing.version != expected {
                return Err(CustodiaError::ConfigVersionConflict {
                    expected,
                    got: existing.version,
                });
            }
        }

        let version = existing.as_ref().map(|e| e.version + 1).unwrap_or(1);
        let created_at = existing.as_ref().map(|e| e.created_at).unwrap_or(now);

        let entry = ConfigEntry {
            key,
            value,
            sensitive_paths,
            description,
            version,
            updated_by,
            created_at,
            updated_at: now,
        };

        let bytes =
            bincode::serialize(&entry).map_err(|e| CustodiaError::Serialization(e.to_string()))?;
        self.tree
            .insert(&storage_key, bytes)
            .map_err(|e| CustodiaError::Storage(e.to_string()))?;
        self.cache.remove(&storage_key);
        Ok(version)
    }

    pub fn delete(&self, key: &ConfigKey) -> Result<(), CustodiaError> {
        let storage_key = key.storage_key();
        self.tree
            .remove(&storage_key)
            .map_err(|e| CustodiaError::Storage(e.to_string()))?;
        self.cache.remove(&storage_key);
        Ok(())
    }

    /// Invalidate the cache entry for `key`. A full `Reload` with no key
    /// invalidates every cached entry.
    pub fn reload(&self, key: Option<&ConfigKey>) {
        match key {
            Some(k) => {
                self.cache.remove(&k.storage_key());
            }
            None => self.cache.invalidate_all(),
        }
    }

    /// Register a service's defaults at startup: each `(key, value,
    /// sensitive_paths)` is written only if absent, grounded on
    /// `chronx-genesis::apply_genesis`'s "write the founding state once,
    /// never overwrite" discipline, generalised here from "write once ever"
    /// to "write once per key, safe to call every boot".
    pub fn register_defaults(
        &self,
        service: &str,
        defaults: Vec<(String, Value, Vec<String>)>,
        now: i64,
    ) -> Result<(), CustodiaError> {
        for (key, value, sensitive_paths) in defaults {
            let ck = ConfigKey {
                service: service.to_string(),
                brand: None,
                tenant_id: None,
                key: key.clone(),
            };
            if self.load_raw(&ck)?.is_some() {
                continue;
            }
            match self.set(ck, value, sensitive_paths, None, None, None, now) {
                Ok(_) => info!(service, key, "registered config default"),
                Err(e) => warn!(service, key, error = %e, "failed to register config default"),
            }
        }
        Ok(())
    }
}
