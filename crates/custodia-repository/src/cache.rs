use std::time::Duration;

use moka::sync::Cache;

/// Per-entity TTL configuration for the three cache tiers C2 fronts reads
/// with (defaults from spec §4.2: single/list/count = 300/60/30s).
#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub single_secs: u64,
    pub list_secs: u64,
    pub count_secs: u64,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            single_secs: custodia_core::constants::REPO_CACHE_SINGLE_TTL_SECS,
            list_secs: custodia_core::constants::REPO_CACHE_LIST_TTL_SECS,
            count_secs: custodia_core::constants::REPO_CACHE_COUNT_TTL_SECS,
        }
    }
}

pub struct RepoCaches<T: Clone + Send + Sync + 'static> {
    pub single: Cache<Vec<u8>, T>,
    pub list: Cache<String, Vec<T>>,
    pub count: Cache<String, u64>,
}

impl<T: Clone + Send + Sync + 'static> RepoCaches<T> {
    pub fn new(ttls: CacheTtls) -> Self {
        Self {
            single: Cache::builder()
                .time_to_live(Duration::from_secs(ttls.single_secs))
                .build(),
            list: Cache::builder()
                .time_to_live(Duration::from_secs(ttls.list_secs))
                .build(),
            count: Cache::builder()
                .time_to_live(Duration::from_secs(ttls.count_secs))
                .build(),
        }
    }

    /// Invalidate everything cached for a collection after any write.
    /// List/count results are tagged by collection, not by individual
    /// query, so a single write invalidates all outstanding list/count
    /// entries rather than tracking per-query dependencies.
    pub fn invalidate_all(&self) {
        self.list.invalidate_all();
        self.count.invalidate_all();
    }
}
