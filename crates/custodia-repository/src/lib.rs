//! custodia-repository
//!
//! Generic document repository (C2): one sled tree per `Entity`, fronted
//! by per-entity single/list/count TTL caches, with opaque cursor
//! pagination over a monotone sort field.

pub mod cache;
pub mod cursor;
pub mod repository;

pub use cache::CacheTtls;
pub use cursor::Cursor;
pub use repository::{open_db, Page, Repository};
