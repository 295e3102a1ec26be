//! Fixed-window rate limiting per `(tenant, userId)` (spec §4.11).

use std::collections::HashMap;
use std::sync::Mutex;

use custodia_core::constants::{RATE_LIMIT_DEFAULT_MAX_REQUESTS, RATE_LIMIT_DEFAULT_WINDOW_SECS};
use custodia_core::error::CustodiaError;
use custodia_core::types::{TenantId, Timestamp, UserId};

struct Window {
    started_at: Timestamp,
    count: u32,
}

pub struct RateLimiter {
    max_requests: u32,
    window_secs: u64,
    windows: Mutex<HashMap<(TenantId, UserId), Window>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self { max_requests, window_secs, windows: Mutex::new(HashMap::new()) }
    }

    pub fn check(&self, tenant_id: TenantId, user_id: UserId, now: Timestamp) -> Result<(), CustodiaError> {
        let mut windows = self.windows.lock().unwrap();
        let window = windows.entry((tenant_id, user_id)).or_insert(Window { started_at: now, count: 0 });

        if now - window.started_at >= self.window_secs as i64 {
            window.started_at = now;
            window.count = 0;
        }

        if window.count >= self.max_requests {
            return Err(CustodiaError::RateLimited);
        }
        window.count += 1;
        Ok(())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RATE_LIMIT_DEFAULT_MAX_REQUESTS, RATE_LIMIT_DEFAULT_WINDOW_SECS)
    }
}
