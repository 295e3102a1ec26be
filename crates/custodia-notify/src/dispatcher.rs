//! Notification dispatcher (C12): persist -> dispatch -> update, one
//! `ChannelAdapter` per `NotificationChannel`. Grounded on the
//! validate/persist/act shape `custodia-bonus::engine::BonusEngine::award`
//! runs, with "act" swapped from a ledger post for a channel send.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use custodia_core::error::CustodiaError;
use custodia_core::notification::{Notification, NotificationChannel, NotificationStatus};
use custodia_core::types::Timestamp;
use custodia_repository::Repository;

use crate::adapter::ChannelAdapter;
use crate::request::SendRequest;

pub struct NotificationDispatcher {
    notifications: Repository<Notification>,
    adapters: HashMap<NotificationChannel, Arc<dyn ChannelAdapter>>,
}

impl NotificationDispatcher {
    pub fn new(db: &sled::Db) -> Result<Self, CustodiaError> {
        Ok(Self {
            notifications: Repository::open(db)?,
            adapters: HashMap::new(),
        })
    }

    pub fn register_adapter(&mut self, channel: NotificationChannel, adapter: Arc<dyn ChannelAdapter>) {
        self.adapters.insert(channel, adapter);
    }

    /// Send on a single channel. Persists a `Pending` record before
    /// dispatching, then settles it to `Sent`/`Failed` — the adapter
    /// failing is reflected in the returned notification's status, not
    /// propagated as an `Err`, so a caller fanning out across channels
    /// never has to treat one channel's failure as fatal to the others.
    pub fn send(&self, request: &SendRequest, now: Timestamp) -> Result<Notification, CustodiaError> {
        let user_id = request
            .user_id
            .ok_or_else(|| CustodiaError::UnresolvedRecipient { channel: format!("{:?}", request.channel) })?;
        if !request.channel.requires_user_id() && request.to.is_none() {
            return Err(CustodiaError::UnresolvedRecipient { channel: format!("{:?}", request.channel) });
        }

        let notification = Notification {
            id: custodia_core::types::NotificationId::new(),
            user_id,
            tenant_id: request.tenant_id,
            channel: request.channel,
            priority: request.priority,
            subject: request.subject.clone(),
            body: request.body.clone(),
            status: NotificationStatus::Pending,
            created_at: now,
            updated_at: now,
            error: None,
        };
        let notification = self.notifications.create(notification, now, true)?;

        let adapter = match self.adapters.get(&request.channel) {
            Some(adapter) => adapter,
            None => {
                return self.settle(notification, now, Err(CustodiaError::UnsupportedChannel(format!("{:?}", request.channel))));
            }
        };

        let result = adapter.send(request, &notification.id.to_string(), now);
        self.settle(notification, now, result)
    }

    fn settle(&self, mut notification: Notification, now: Timestamp, result: Result<(), CustodiaError>) -> Result<Notification, CustodiaError> {
        match result {
            Ok(()) => {
                notification.status = NotificationStatus::Sent;
                notification.error = None;
            }
            Err(e) => {
                warn!(notification_id = %notification.id, channel = ?notification.channel, error = %e, "notification dispatch failed");
                notification.status = NotificationStatus::Failed;
                notification.error = Some(e.to_string());
            }
        }
        self.notifications.update(notification, now, true)
    }

    /// Fan out the same body across several channels. Spec §4.12: each
    /// channel attempt is independent, so one channel failing never stops
    /// the others from being attempted.
    pub fn send_multi_channel(&self, request: &SendRequest, channels: &[NotificationChannel], now: Timestamp) -> Vec<Result<Notification, CustodiaError>> {
        channels.iter().map(|channel| self.send(&request.for_channel(*channel), now)).collect()
    }

    pub fn get(&self, id: custodia_core::types::NotificationId) -> Result<Option<Notification>, CustodiaError> {
        self.notifications.find_by_id(&id.as_bytes())
    }

    pub fn find_for_user(&self, user_id: custodia_core::types::UserId) -> Result<Vec<Notification>, CustodiaError> {
        self.notifications.find_many(|n| n.user_id == user_id, 0, usize::MAX)
    }

    pub fn count_all(&self) -> Result<u64, CustodiaError> {
        self.notifications.count("all", |_| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodia_core::notification::NotificationPriority;
    use custodia_core::types::{TenantId, UserId};

    struct AlwaysOk;
    impl ChannelAdapter for AlwaysOk {
        fn send(&self, _request: &SendRequest, _notification_id: &str, _now: Timestamp) -> Result<(), CustodiaError> {
            Ok(())
        }
    }

    struct AlwaysFails;
    impl ChannelAdapter for AlwaysFails {
        fn send(&self, _request: &SendRequest, _notification_id: &str, _now: Timestamp) -> Result<(), CustodiaError> {
            Err(CustodiaError::DependencyUnavailable("provider down".into()))
        }
    }

    fn temp_dispatcher() -> NotificationDispatcher {
        let dir = std::env::temp_dir().join(format!("custodia_notify_test_{}_{}", std::process::id(), rand_suffix()));
        let db = custodia_repository::open_db(&dir).unwrap();
        NotificationDispatcher::new(&db).unwrap()
    }

    fn rand_suffix() -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().subsec_nanos() as u64
    }

    #[test]
    fn successful_send_settles_to_sent() {
        let mut dispatcher = temp_dispatcher();
        dispatcher.register_adapter(NotificationChannel::Email, Arc::new(AlwaysOk));

        let request = SendRequest::new(TenantId::new(), NotificationChannel::Email, "hello")
            .with_user(UserId::new())
            .with_to("user@example.com")
            .with_priority(NotificationPriority::Normal);

        let notification = dispatcher.send(&request, 100).unwrap();
        assert_eq!(notification.status, NotificationStatus::Sent);
        assert!(notification.error.is_none());
    }

    #[test]
    fn failing_adapter_settles_to_failed_without_erroring() {
        let mut dispatcher = temp_dispatcher();
        dispatcher.register_adapter(NotificationChannel::Sms, Arc::new(AlwaysFails));

        let request = SendRequest::new(TenantId::new(), NotificationChannel::Sms, "otp: 123456")
            .with_user(UserId::new())
            .with_to("+15555550100");

        let notification = dispatcher.send(&request, 100).unwrap();
        assert_eq!(notification.status, NotificationStatus::Failed);
        assert!(notification.error.is_some());
    }

    #[test]
    fn non_socket_channel_without_to_is_rejected() {
        let dispatcher = temp_dispatcher();
        let request = SendRequest::new(TenantId::new(), NotificationChannel::Email, "hello").with_user(UserId::new());
        let err = dispatcher.send(&request, 100).unwrap_err();
        assert!(matches!(err, CustodiaError::UnresolvedRecipient { .. }));
    }

    #[test]
    fn request_without_user_id_is_rejected() {
        let dispatcher = temp_dispatcher();
        let request = SendRequest::new(TenantId::new(), NotificationChannel::Email, "hello").with_to("user@example.com");
        let err = dispatcher.send(&request, 100).unwrap_err();
        assert!(matches!(err, CustodiaError::UnresolvedRecipient { .. }));
    }

    #[test]
    fn multi_channel_send_attempts_every_channel_independently() {
        let mut dispatcher = temp_dispatcher();
        dispatcher.register_adapter(NotificationChannel::Email, Arc::new(AlwaysOk));
        dispatcher.register_adapter(NotificationChannel::Sms, Arc::new(AlwaysFails));

        let request = SendRequest::new(TenantId::new(), NotificationChannel::Email, "hello")
            .with_user(UserId::new())
            .with_to("user@example.com");

        let results = dispatcher.send_multi_channel(&request, &[NotificationChannel::Email, NotificationChannel::Sms], 100);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().status, NotificationStatus::Sent);
        assert_eq!(results[1].as_ref().unwrap().status, NotificationStatus::Failed);
    }

    #[test]
    fn unregistered_channel_settles_to_failed() {
        let dispatcher = temp_dispatcher();
        let request = SendRequest::new(TenantId::new(), NotificationChannel::Push, "hello")
            .with_user(UserId::new())
            .with_to("device-token");
        let notification = dispatcher.send(&request, 100).unwrap();
        assert_eq!(notification.status, NotificationStatus::Failed);
    }
}
