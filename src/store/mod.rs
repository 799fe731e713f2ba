//! The typed web-resource store (spec §4.2): a storage-agnostic contract
//! with two concrete backends, fanned out and merged by the P2P decorator
//! in [`p2p`].

mod memory;
mod p2p;
mod sql;

pub use memory::MemoryStore;
pub use p2p::P2pStore;
pub use sql::SqlStore;

use std::collections::HashSet;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::HybridServerError;
use crate::resource::{ResourceKind, WebResource};

/// The generic per-resource-kind storage contract (spec §4.2).
///
/// `put` is insert-only: a second `put` for an already-present UUID fails
/// with [`HybridServerError::Conflict`] and leaves the stored value
/// unchanged. Reads are weakly consistent across backends (never within a
/// single call).
#[async_trait]
pub trait WebResourceStore: Send + Sync {
    fn kind(&self) -> ResourceKind;

    async fn get(&self, uuid: Uuid) -> Result<Option<WebResource>, HybridServerError>;

    async fn put(&self, resource: WebResource) -> Result<(), HybridServerError>;

    /// Returns `true` if a resource was removed, `false` if absent.
    async fn remove(&self, uuid: Uuid) -> Result<bool, HybridServerError>;

    async fn uuid_set(&self) -> Result<HashSet<Uuid>, HybridServerError>;

    async fn web_resources(&self) -> Result<Vec<WebResource>, HybridServerError>;

    /// Releases whatever backend resources this store holds (connection
    /// pools, etc). A no-op for the in-memory backend.
    async fn close(&self) -> Result<(), HybridServerError>;
}

/// Generates a fresh v4 UUID guaranteed absent from `store`, retrying on
/// the astronomically unlikely collision (spec §3 "Lifecycle").
pub async fn fresh_uuid(
    store: &dyn WebResourceStore,
) -> Result<Uuid, HybridServerError> {
    loop {
        let candidate = Uuid::new_v4();
        if store.get(candidate).await?.is_none() {
            return Ok(candidate);
        }
    }
}
