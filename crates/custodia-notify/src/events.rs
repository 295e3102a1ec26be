//! Event-to-notification translation (spec §4.12): subscribes to the
//! integration channels other services publish on and turns known event
//! types into sends. Grounded on `custodia-eventbus::bus::subscribe_with_handler`'s
//! panic-isolated handler shape — a bad payload or a failed dispatch is
//! logged and swallowed here too, so a broken notification can never
//! propagate back to the publisher.

use std::str::FromStr;
use std::sync::Arc;

use tracing::{info, warn};

use custodia_core::notification::{NotificationChannel, NotificationPriority};
use custodia_core::types::{TenantId, UserId};
use custodia_core::value::Value;
use custodia_eventbus::{EventBus, EventEnvelope};

use crate::dispatcher::NotificationDispatcher;
use crate::request::SendRequest;

fn str_path<'a>(data: &'a Value, path: &str) -> Option<&'a str> {
    data.get_path(path).and_then(Value::as_str)
}

fn user_id_of(envelope: &EventEnvelope) -> Option<UserId> {
    envelope
        .user_id
        .as_deref()
        .or_else(|| str_path(&envelope.data, "userId"))
        .and_then(|s| UserId::from_str(s).ok())
}

fn tenant_id_of(envelope: &EventEnvelope) -> Option<TenantId> {
    envelope
        .tenant_id
        .as_deref()
        .or_else(|| str_path(&envelope.data, "tenantId"))
        .and_then(|s| TenantId::from_str(s).ok())
}

/// Translate one envelope into zero or more sends. Unknown event types on a
/// subscribed channel are ignored, not errors: new event types land on
/// these channels before this crate learns to react to them.
fn handle(dispatcher: &NotificationDispatcher, envelope: &EventEnvelope) {
    let Some(tenant_id) = tenant_id_of(envelope) else {
        warn!(event_type = %envelope.event_type, "notification event missing a resolvable tenant, dropping");
        return;
    };

    let requests: Vec<SendRequest> = match envelope.event_type.as_str() {
        "user.registered" => {
            let Some(user_id) = user_id_of(envelope) else {
                warn!(event_type = %envelope.event_type, "user.registered event missing a resolvable user, dropping");
                return;
            };
            let mut requests = vec![SendRequest::new(tenant_id, NotificationChannel::Socket, "Welcome! Your account is ready.").with_user(user_id)];
            if let Some(email) = str_path(&envelope.data, "email") {
                requests.push(
                    SendRequest::new(tenant_id, NotificationChannel::Email, "Welcome! Your account is ready.")
                        .with_user(user_id)
                        .with_to(email)
                        .with_subject("Welcome"),
                );
            }
            requests
        }
        "payment.completed" => {
            let Some(user_id) = user_id_of(envelope) else {
                warn!(event_type = %envelope.event_type, "payment.completed event missing a resolvable user, dropping");
                return;
            };
            vec![SendRequest::new(tenant_id, NotificationChannel::Socket, "Your payment has completed.")
                .with_user(user_id)
                .with_priority(NotificationPriority::High)]
        }
        "bonus.wagering_completed" => {
            let Some(user_id) = user_id_of(envelope) else {
                warn!(event_type = %envelope.event_type, "bonus.wagering_completed event missing a resolvable user, dropping");
                return;
            };
            vec![SendRequest::new(tenant_id, NotificationChannel::Socket, "Your bonus wagering requirement is complete, funds are now withdrawable.")
                .with_user(user_id)
                .with_priority(NotificationPriority::High)]
        }
        _ => return,
    };

    let now = chrono::Utc::now().timestamp();
    for request in &requests {
        if let Err(e) = dispatcher.send(request, now) {
            warn!(event_type = %envelope.event_type, error = %e, "failed to dispatch notification for event");
        } else {
            info!(event_type = %envelope.event_type, channel = ?request.channel, "dispatched notification for event");
        }
    }
}

/// Wire up subscriptions on the channels notification-relevant events are
/// published on. Each subscription runs on its own task; `dispatcher` is
/// shared across all of them.
pub fn subscribe_all(bus: &EventBus, dispatcher: Arc<NotificationDispatcher>) {
    for channel in ["integration:auth", "integration:payment", "integration:bonus"] {
        let dispatcher = dispatcher.clone();
        bus.subscribe_with_handler(channel, move |envelope| handle(&dispatcher, &envelope));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodia_core::notification::NotificationStatus;
    use std::sync::Arc as StdArc;

    struct AlwaysOk;
    impl crate::adapter::ChannelAdapter for AlwaysOk {
        fn send(&self, _request: &SendRequest, _notification_id: &str, _now: i64) -> Result<(), custodia_core::error::CustodiaError> {
            Ok(())
        }
    }

    fn temp_dispatcher() -> NotificationDispatcher {
        let dir = std::env::temp_dir().join(format!("custodia_notify_events_test_{}_{}", std::process::id(), rand_suffix()));
        let db = custodia_repository::open_db(&dir).unwrap();
        let mut dispatcher = NotificationDispatcher::new(&db).unwrap();
        dispatcher.register_adapter(NotificationChannel::Socket, StdArc::new(AlwaysOk));
        dispatcher.register_adapter(NotificationChannel::Email, StdArc::new(AlwaysOk));
        dispatcher
    }

    fn rand_suffix() -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().subsec_nanos() as u64
    }

    #[tokio::test]
    async fn user_registered_dispatches_a_socket_welcome() {
        let dispatcher = temp_dispatcher();
        let user_id = UserId::new();
        let tenant_id = TenantId::new();
        let mut data = Value::Map(Default::default());
        data.set_path("userId", Value::String(user_id.to_string()));
        data.set_path("tenantId", Value::String(tenant_id.to_string()));
        let envelope = EventEnvelope::new("user.registered", data, "corr-1", 0);

        handle(&dispatcher, &envelope);

        let page = dispatcher.find_for_user(user_id).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].channel, NotificationChannel::Socket);
        assert_eq!(page[0].status, NotificationStatus::Sent);
    }

    #[tokio::test]
    async fn unknown_event_type_is_ignored() {
        let dispatcher = temp_dispatcher();
        let envelope = EventEnvelope::new("something.else", Value::Null, "corr-1", 0).with_tenant(TenantId::new().to_string());
        handle(&dispatcher, &envelope);
        assert_eq!(dispatcher.count_all().unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_user_id_drops_the_event_without_panicking() {
        let dispatcher = temp_dispatcher();
        let envelope = EventEnvelope::new("payment.completed", Value::Null, "corr-1", 0).with_tenant(TenantId::new().to_string());
        handle(&dispatcher, &envelope);
        assert_eq!(dispatcher.count_all().unwrap(), 0);
    }
}
