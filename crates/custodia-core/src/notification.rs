//! Notification entity (C12).

use serde::{Deserialize, Serialize};

use crate::types::{NotificationId, TenantId, Timestamp, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    Sms,
    Whatsapp,
    Push,
    Socket,
    Sse,
}

impl NotificationChannel {
    /// `socket`/`sse` are addressed by `userId`; other channels need a
    /// resolvable `to` address supplied by the caller.
    pub fn requires_user_id(self) -> bool {
        matches!(self, NotificationChannel::Socket | NotificationChannel::Sse)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Queued,
    Sent,
    Delivered,
    Failed,
    Bounced,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub channel: NotificationChannel,
    pub priority: NotificationPriority,
    pub subject: Option<String>,
    pub body: String,
    pub status: NotificationStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub error: Option<String>,
}

impl crate::entity::Entity for Notification {
    fn collection() -> &'static str {
        "notifications"
    }
    fn id_bytes(&self) -> Vec<u8> {
        self.id.as_bytes().to_vec()
    }
    fn set_created_at(&mut self, ts: Timestamp) {
        self.created_at = ts;
    }
    fn set_updated_at(&mut self, ts: Timestamp) {
        self.updated_at = ts;
    }
}
