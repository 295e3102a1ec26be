//! custodia-eventbus
//!
//! In-process pub/sub broker for cross-service integration events.
//!
//! `EventBus::publish` broadcasts typed envelopes on named
//! `integration:<service>` channels; `subscribe`/`subscribe_with_handler`
//! consume them at-most-once, with per-handler panic isolation.

pub mod bus;
pub mod config;
pub mod message;

pub use bus::EventBus;
pub use config::EventBusConfig;
pub use message::EventEnvelope;
