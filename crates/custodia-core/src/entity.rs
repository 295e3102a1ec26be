//! The capability `custodia-repository::Repository<T>` is generic over.
//! Generalises `chronx-state/src/db.rs`'s fixed per-entity tree+key pattern
//! to an arbitrary collection of `T`.

use serde::{de::DeserializeOwned, Serialize};

pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The sled tree name this entity is stored under.
    fn collection() -> &'static str;

    /// The entity's primary key, encoded as sled key bytes.
    fn id_bytes(&self) -> Vec<u8>;

    /// Unix timestamp fields the repository injects/updates; entities that
    /// don't track both simply ignore the call they don't need.
    fn set_created_at(&mut self, ts: crate::types::Timestamp);
    fn set_updated_at(&mut self, ts: crate::types::Timestamp);

    /// Field names the repository logs as declared indexes at `open()`.
    /// Sled has no secondary-index support; `find_many`/`paginate` still
    /// scan the tree, but declaring the fields documents the access
    /// patterns a real index would serve and keeps the same call shape if
    /// the storage engine is ever swapped for one that has them.
    fn indexes() -> &'static [&'static str] {
        &[]
    }
}
