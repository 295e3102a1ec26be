use custodia_core::notification::{NotificationChannel, NotificationPriority};
use custodia_core::types::{TenantId, UserId};

/// A single-channel send request, spec §4.12. `socket`/`sse` resolve the
/// recipient from `user_id`; every other channel needs a resolvable `to`.
#[derive(Clone, Debug)]
pub struct SendRequest {
    pub user_id: Option<UserId>,
    pub tenant_id: TenantId,
    pub channel: NotificationChannel,
    pub to: Option<String>,
    pub subject: Option<String>,
    pub body: String,
    pub priority: NotificationPriority,
}

impl SendRequest {
    pub fn new(tenant_id: TenantId, channel: NotificationChannel, body: impl Into<String>) -> Self {
        Self {
            user_id: None,
            tenant_id,
            channel,
            to: None,
            subject: None,
            body: body.into(),
            priority: NotificationPriority::Normal,
        }
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn for_channel(&self, channel: NotificationChannel) -> Self {
        let mut clone = self.clone();
        clone.channel = channel;
        clone
    }
}
