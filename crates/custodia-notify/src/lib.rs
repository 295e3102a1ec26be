//! custodia-notify
//!
//! Notification dispatcher (C12): persists a `Notification` record for
//! every send, then hands it to the `ChannelAdapter` registered for its
//! channel. HTTP-backed channels (email/sms/whatsapp/push) post to a
//! provider webhook; `socket`/`sse` publish to the in-process event bus
//! for this process's live connections. `events` subscribes to the
//! integration channels other services publish domain events on and
//! translates the ones this crate knows about into sends.

pub mod adapter;
pub mod dispatcher;
pub mod events;
pub mod request;

pub use adapter::{ChannelAdapter, EventBusAdapter, WebhookAdapter};
pub use dispatcher::NotificationDispatcher;
pub use events::subscribe_all;
pub use request::SendRequest;
