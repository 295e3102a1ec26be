//! custodia-bonus
//!
//! Bonus Engine (C10): `BonusTemplate` + `BonusHandler` per bonus type,
//! dispatched through a `BonusRegistry`, running the shared
//! `Validate -> Calculate -> Persist -> Award` pipeline. Award credits the
//! user's `bonus` balance type through `custodia-wallet`.

pub mod engine;
pub mod handler;
pub mod handlers;
pub mod registry;
pub mod template;

pub use engine::BonusEngine;
pub use handler::{BonusContext, BonusHandler, Eligibility};
pub use registry::BonusRegistry;
pub use template::{BonusTemplate, BonusType, BonusValueSpec, ReferralTier};
