//! Ephemeral operation-state entity (C8). Cache-backed; TTLs are enforced by
//! the tracker that reads/writes this, not by storage-layer expiry, since
//! `sled` has no native TTL primitive.

use serde::{Deserialize, Serialize};

use crate::types::{OperationId, Timestamp};

/// `started_at`/`last_heartbeat` round-trip as ISO-8601 strings on the
/// wire and in storage; every other `Timestamp` field in this codebase
/// stays a plain Unix-seconds integer. This module exists because C8 is
/// the one place the spec calls out the ISO-8601 wire shape explicitly.
mod iso8601 {
    use chrono::{DateTime, Utc};
    use serde::{de::Error as _, ser::Error as _, Deserialize, Deserializer, Serializer};

    use crate::types::Timestamp;

    pub fn serialize<S: Serializer>(ts: &Timestamp, serializer: S) -> Result<S::Ok, S::Error> {
        let dt = DateTime::<Utc>::from_timestamp(*ts, 0).ok_or_else(|| S::Error::custom("timestamp out of range"))?;
        serializer.serialize_str(&dt.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Timestamp, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw).map(|dt| dt.timestamp()).map_err(D::Error::custom)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Recovered,
}

impl OperationStatus {
    pub fn is_stuck_candidate(self) -> bool {
        matches!(self, OperationStatus::Pending | OperationStatus::InProgress)
    }

    pub fn ttl_secs(self) -> i64 {
        match self {
            OperationStatus::Pending | OperationStatus::InProgress => {
                crate::constants::OPSTATE_ACTIVE_TTL_SECS
            }
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Recovered => {
                crate::constants::OPSTATE_TERMINAL_TTL_SECS
            }
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperationState {
    pub operation_id: OperationId,
    pub operation_type: String,
    pub status: OperationStatus,
    #[serde(with = "iso8601")]
    pub started_at: Timestamp,
    #[serde(with = "iso8601")]
    pub last_heartbeat: Timestamp,
    pub steps: Vec<String>,
    pub current_step: Option<String>,
    pub error: Option<String>,
}

impl OperationState {
    /// Composite key `operation_state:<type>:<id>` per spec §4.8, used both
    /// as the sled key and as the prefix `find_stuck` scans over.
    pub fn storage_key(operation_type: &str, operation_id: &OperationId) -> Vec<u8> {
        format!("operation_state:{operation_type}:{operation_id}").into_bytes()
    }

    pub fn is_stuck(&self, now: Timestamp, max_age_secs: i64) -> bool {
        self.status.is_stuck_candidate() && now - self.last_heartbeat > max_age_secs
    }
}

impl crate::entity::Entity for OperationState {
    fn collection() -> &'static str {
        "operation_states"
    }
    fn id_bytes(&self) -> Vec<u8> {
        Self::storage_key(&self.operation_type, &self.operation_id)
    }
    fn set_created_at(&mut self, _ts: Timestamp) {}
    fn set_updated_at(&mut self, ts: Timestamp) {
        self.last_heartbeat = ts;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stuck_detection_respects_status_and_age() {
        let st = OperationState {
            operation_id: OperationId::new(),
            operation_type: "transfer".into(),
            status: OperationStatus::InProgress,
            started_at: 0,
            last_heartbeat: 0,
            steps: vec![],
            current_step: None,
            error: None,
        };
        assert!(st.is_stuck(100, 60));
        assert!(!st.is_stuck(30, 60));

        let completed = OperationState {
            status: OperationStatus::Completed,
            ..st
        };
        assert!(!completed.is_stuck(1000, 60));
    }

    #[test]
    fn timestamps_round_trip_through_iso8601_json() {
        let st = OperationState {
            operation_id: OperationId::new(),
            operation_type: "transfer".into(),
            status: OperationStatus::Pending,
            started_at: 1_700_000_000,
            last_heartbeat: 1_700_000_030,
            steps: vec![],
            current_step: None,
            error: None,
        };

        let json = serde_json::to_value(&st).unwrap();
        assert_eq!(json["started_at"], serde_json::json!("2023-11-14T22:13:20+00:00"));
        assert_eq!(json["last_heartbeat"], serde_json::json!("2023-11-14T22:13:50+00:00"));

        let back: OperationState = serde_json::from_value(json).unwrap();
        assert_eq!(back.started_at, st.started_at);
        assert_eq!(back.last_heartbeat, st.last_heartbeat);
    }
}
