//! The in-memory backend: a concurrent map keyed by UUID (spec §4.2).

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::HybridServerError;
use crate::resource::{ResourceKind, WebResource};

use super::WebResourceStore;

/// `put` takes the write lock once and uses the `Entry` API so the
/// presence check and the insert happen under a single critical section —
/// the Rust equivalent of a `ConcurrentHashMap::putIfAbsent`.
pub struct MemoryStore {
    kind: ResourceKind,
    resources: RwLock<HashMap<Uuid, WebResource>>,
}

impl MemoryStore {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            resources: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl WebResourceStore for MemoryStore {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    async fn get(&self, uuid: Uuid) -> Result<Option<WebResource>, HybridServerError> {
        Ok(self.resources.read().await.get(&uuid).cloned())
    }

    async fn put(&self, resource: WebResource) -> Result<(), HybridServerError> {
        let mut guard = self.resources.write().await;
        match guard.entry(resource.uuid) {
            std::collections::hash_map::Entry::Occupied(_) => Err(HybridServerError::Conflict),
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(resource);
                Ok(())
            }
        }
    }

    async fn remove(&self, uuid: Uuid) -> Result<bool, HybridServerError> {
        Ok(self.resources.write().await.remove(&uuid).is_some())
    }

    async fn uuid_set(&self) -> Result<HashSet<Uuid>, HybridServerError> {
        Ok(self.resources.read().await.keys().copied().collect())
    }

    async fn web_resources(&self) -> Result<Vec<WebResource>, HybridServerError> {
        Ok(self.resources.read().await.values().cloned().collect())
    }

    async fn close(&self) -> Result<(), HybridServerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn html(content: &str) -> WebResource {
        WebResource::new(ResourceKind::Html, Uuid::new_v4(), content.to_string(), None)
    }

    #[tokio::test]
    async fn put_is_insert_only() {
        let store = MemoryStore::new(ResourceKind::Html);
        let resource = html("hi");
        let uuid = resource.uuid;
        store.put(resource.clone()).await.unwrap();

        let err = store.put(resource).await.unwrap_err();
        assert!(matches!(err, HybridServerError::Conflict));

        let stored = store.get(uuid).await.unwrap().unwrap();
        assert_eq!(stored.content, "hi");
    }

    #[tokio::test]
    async fn get_after_remove_is_none() {
        let store = MemoryStore::new(ResourceKind::Html);
        let resource = html("hi");
        let uuid = resource.uuid;
        store.put(resource).await.unwrap();
        assert!(store.remove(uuid).await.unwrap());
        assert!(store.get(uuid).await.unwrap().is_none());
        assert!(!store.remove(uuid).await.unwrap());
    }

    #[tokio::test]
    async fn uuid_set_tracks_contents() {
        let store = MemoryStore::new(ResourceKind::Html);
        let a = html("a");
        let b = html("b");
        store.put(a.clone()).await.unwrap();
        store.put(b.clone()).await.unwrap();
        let set = store.uuid_set().await.unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains(&a.uuid));
        assert!(set.contains(&b.uuid));
    }
}
