//! The peer-to-peer decorator (spec §4.3): wraps a local store and fans
//! reads/writes out to a fixed set of remote peers over the RPC client in
//! [`crate::rpc`].
//!
//! `get` and `remove` race their peers against the local lookup and return
//! as soon as a positive answer is known, since a negative answer from one
//! peer says nothing about the rest. `uuid_set` and `web_resources` can't
//! race like that — they're unions, so every source has to report in
//! before the answer is complete.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::warn;
use uuid::Uuid;

use crate::error::HybridServerError;
use crate::resource::{ResourceKind, WebResource};
use crate::rpc::PeerClient;

use super::WebResourceStore;

pub struct P2pStore {
    local: Arc<dyn WebResourceStore>,
    peers: Vec<PeerClient>,
    semaphore: Arc<Semaphore>,
}

impl P2pStore {
    /// `semaphore` is the same worker-pool permit source the server core
    /// hands out to accepted connections (spec §4.3/§5: "peer fan-out
    /// reuses the worker pool"). A peer call that can't get a permit falls
    /// back to running synchronously rather than queuing.
    pub fn new(local: Arc<dyn WebResourceStore>, peers: Vec<PeerClient>, semaphore: Arc<Semaphore>) -> Self {
        Self {
            local,
            peers,
            semaphore,
        }
    }
}

/// Runs `fut` under a worker-pool permit when one is free; when the pool is
/// saturated, runs it inline on the calling task instead of queuing for one
/// (same fallback discipline as the acceptor's `try_acquire_owned` path in
/// `servers.rs`).
async fn bounded<F, T>(semaphore: &Arc<Semaphore>, fut: F) -> Result<T, HybridServerError>
where
    F: Future<Output = Result<T, HybridServerError>> + Send + 'static,
    T: Send + 'static,
{
    match Arc::clone(semaphore).try_acquire_owned() {
        Ok(permit) => {
            tokio::spawn(async move {
                let _permit = permit;
                fut.await
            })
            .await
            .unwrap_or_else(|err| Err(HybridServerError::Peer(format!("peer task panicked: {err}"))))
        }
        Err(_) => fut.await,
    }
}

#[async_trait]
impl WebResourceStore for P2pStore {
    fn kind(&self) -> ResourceKind {
        self.local.kind()
    }

    /// Checks the local store first, then races the peers. The first peer
    /// to report a hit wins; a peer error is logged and otherwise treated
    /// as a miss, since one unreachable peer shouldn't fail a read the
    /// others can answer. A hit pulled from a peer is opportunistically
    /// cached locally; a `Conflict` from that cache attempt (another
    /// request beat us to it) is not an error worth reporting.
    async fn get(&self, uuid: Uuid) -> Result<Option<WebResource>, HybridServerError> {
        if let Some(found) = self.local.get(uuid).await? {
            return Ok(Some(found));
        }
        if self.peers.is_empty() {
            return Ok(None);
        }

        let kind = self.kind();
        let mut calls: FuturesUnordered<_> = self
            .peers
            .iter()
            .map(|peer| {
                let peer = peer.clone();
                bounded(&self.semaphore, async move { peer.get(kind, uuid).await })
            })
            .collect();

        while let Some(result) = calls.next().await {
            match result {
                Ok(Some(resource)) => {
                    if let Err(err) = self.local.put(resource.clone()).await {
                        if !matches!(err, HybridServerError::Conflict) {
                            warn!(%err, "failed to cache peer-sourced resource locally");
                        }
                    }
                    return Ok(Some(resource));
                }
                Ok(None) => continue,
                Err(err) => {
                    warn!(%err, "peer get failed");
                    continue;
                }
            }
        }
        Ok(None)
    }

    /// Inserts locally only — an insert is an authoritative write against
    /// this node, not something peers vote on (spec §4.3).
    async fn put(&self, resource: WebResource) -> Result<(), HybridServerError> {
        self.local.put(resource).await
    }

    /// Removes locally first; if absent there, races the peers the same
    /// way `get` does, stopping at the first peer that reports a removal.
    async fn remove(&self, uuid: Uuid) -> Result<bool, HybridServerError> {
        if self.local.remove(uuid).await? {
            return Ok(true);
        }
        if self.peers.is_empty() {
            return Ok(false);
        }

        let kind = self.kind();
        let mut calls: FuturesUnordered<_> = self
            .peers
            .iter()
            .map(|peer| {
                let peer = peer.clone();
                bounded(&self.semaphore, async move { peer.remove(kind, uuid).await })
            })
            .collect();

        while let Some(result) = calls.next().await {
            match result {
                Ok(true) => return Ok(true),
                Ok(false) => continue,
                Err(err) => {
                    warn!(%err, "peer remove failed");
                    continue;
                }
            }
        }
        Ok(false)
    }

    /// A full union: every peer must report before the set is complete.
    /// A peer that errors contributes nothing rather than failing the
    /// whole call.
    async fn uuid_set(&self) -> Result<HashSet<Uuid>, HybridServerError> {
        let mut all = self.local.uuid_set().await?;
        if self.peers.is_empty() {
            return Ok(all);
        }

        let kind = self.kind();
        let results = futures::future::join_all(
            self.peers.iter().map(|peer| {
                let peer = peer.clone();
                bounded(&self.semaphore, async move { peer.uuid_set(kind).await })
            }),
        )
        .await;

        for result in results {
            match result {
                Ok(set) => all.extend(set),
                Err(err) => warn!(%err, "peer uuid_set failed"),
            }
        }
        Ok(all)
    }

    /// Same union discipline as `uuid_set`, deduplicated by the
    /// `WebResource` `(kind, content)` equality rule.
    async fn web_resources(&self) -> Result<Vec<WebResource>, HybridServerError> {
        let mut seen: Vec<WebResource> = self.local.web_resources().await?;
        if self.peers.is_empty() {
            return Ok(seen);
        }

        let kind = self.kind();
        let results = futures::future::join_all(
            self.peers.iter().map(|peer| {
                let peer = peer.clone();
                bounded(&self.semaphore, async move { peer.web_resources(kind).await })
            }),
        )
        .await;

        for result in results {
            match result {
                Ok(resources) => {
                    for resource in resources {
                        if !seen.contains(&resource) {
                            seen.push(resource);
                        }
                    }
                }
                Err(err) => warn!(%err, "peer web_resources failed"),
            }
        }
        Ok(seen)
    }

    async fn close(&self) -> Result<(), HybridServerError> {
        self.local.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn html(content: &str) -> WebResource {
        WebResource::new(ResourceKind::Html, Uuid::new_v4(), content.to_string(), None)
    }

    fn semaphore() -> Arc<Semaphore> {
        Arc::new(Semaphore::new(4))
    }

    #[tokio::test]
    async fn get_falls_through_to_local_when_no_peers() {
        let local = Arc::new(MemoryStore::new(ResourceKind::Html));
        let resource = html("hi");
        local.put(resource.clone()).await.unwrap();
        let store = P2pStore::new(local, Vec::new(), semaphore());
        let found = store.get(resource.uuid).await.unwrap().unwrap();
        assert_eq!(found.content, "hi");
    }

    #[tokio::test]
    async fn uuid_set_with_no_peers_matches_local() {
        let local = Arc::new(MemoryStore::new(ResourceKind::Html));
        let resource = html("hi");
        local.put(resource.clone()).await.unwrap();
        let store = P2pStore::new(local, Vec::new(), semaphore());
        let set = store.uuid_set().await.unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.contains(&resource.uuid));
    }

    /// A saturated pool (zero free permits) must still answer peer-backed
    /// calls by falling back to running them inline, not by stalling.
    #[tokio::test]
    async fn get_falls_back_to_synchronous_when_pool_is_saturated() {
        let local = Arc::new(MemoryStore::new(ResourceKind::Html));
        let saturated = Arc::new(Semaphore::new(1));
        let _permit = saturated.clone().try_acquire_owned().unwrap();
        let store = P2pStore::new(local, Vec::new(), saturated);
        let found = store.get(Uuid::new_v4()).await.unwrap();
        assert!(found.is_none());
    }
}
