//! custodia-session
//!
//! Session/Token Engine (C4): `Login`, `RefreshToken`, `Logout`,
//! `LogoutAll`, `CleanupExpiredSessions`. The login pipeline's sequence of
//! fallible stages is grounded on
//! `chronx-dag::validation::validate_vertex`'s "first failure wins"
//! checklist shape; the backing store is `custodia-repository`.

pub mod engine;
pub mod identifier;
pub mod login;

pub use engine::{LoginResult, SessionEngine};
pub use identifier::{normalize_identifier, IdentifierKind};
pub use login::DeviceInfo;
