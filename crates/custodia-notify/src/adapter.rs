//! Channel adapters. Email/SMS/WhatsApp/push post a JSON payload to a
//! configured provider webhook — the same "POST JSON, inspect the
//! response" shape `chronx-wallet::rpc_client::WalletRpcClient` uses for
//! its JSON-RPC calls, with the JSON-RPC envelope swapped for a plain
//! provider payload. Socket and SSE publish to the in-process event bus
//! instead of making a network call, since those channels are served by
//! this same process's live connections.

use std::sync::Arc;

use tracing::debug;

use custodia_core::error::CustodiaError;
use custodia_core::types::Timestamp;
use custodia_core::value::Value;
use custodia_eventbus::{EventBus, EventEnvelope};

use crate::request::SendRequest;

pub trait ChannelAdapter: Send + Sync {
    fn send(&self, request: &SendRequest, notification_id: &str, now: Timestamp) -> Result<(), CustodiaError>;
}

/// Posts `{to, subject, body}` to a provider webhook URL over HTTP.
pub struct WebhookAdapter {
    client: reqwest::blocking::Client,
    webhook_url: String,
}

impl WebhookAdapter {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            webhook_url: webhook_url.into(),
        }
    }
}

impl ChannelAdapter for WebhookAdapter {
    fn send(&self, request: &SendRequest, notification_id: &str, _now: Timestamp) -> Result<(), CustodiaError> {
        let to = request
            .to
            .as_deref()
            .ok_or_else(|| CustodiaError::UnresolvedRecipient { channel: format!("{:?}", request.channel) })?;

        let payload = serde_json::json!({
            "id": notification_id,
            "to": to,
            "subject": request.subject,
            "body": request.body,
        });

        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .map_err(|e| CustodiaError::DependencyUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(CustodiaError::DependencyUnavailable(format!("webhook returned {}", resp.status())));
        }
        Ok(())
    }
}

/// Publishes to the in-process event bus; an actually-connected socket/SSE
/// client is served downstream of this bus by the gateway layer.
pub struct EventBusAdapter {
    bus: Arc<EventBus>,
    channel: &'static str,
}

impl EventBusAdapter {
    pub fn new(bus: Arc<EventBus>, channel: &'static str) -> Self {
        Self { bus, channel }
    }
}

impl ChannelAdapter for EventBusAdapter {
    fn send(&self, request: &SendRequest, notification_id: &str, now: Timestamp) -> Result<(), CustodiaError> {
        let user_id = request
            .user_id
            .ok_or_else(|| CustodiaError::UnresolvedRecipient { channel: format!("{:?}", request.channel) })?;

        let mut data = Value::Map(Default::default());
        data.set_path("body", Value::String(request.body.clone()));
        if let Some(subject) = &request.subject {
            data.set_path("subject", Value::String(subject.clone()));
        }

        let envelope = EventEnvelope::new("notification.pushed", data, notification_id, now).with_user(user_id.to_string());
        self.bus.publish(self.channel, envelope);
        debug!(channel = self.channel, %user_id, "published realtime notification");
        Ok(())
    }
}
