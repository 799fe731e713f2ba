//! The peer federation wire protocol (spec §4.3/§4.6): a small JSON-RPC-
//! shaped call, `POST {rpc_endpoint}/{namespace}`, used both by the client
//! side in [`crate::store::P2pStore`] and the inbound endpoint served
//! alongside the main listener in [`crate::servers`].
//!
//! The wire shape is intentionally small and undocumented outside
//! `DESIGN.md` — spec.md leaves "a set of typed remote procedures" open,
//! and this is this project's concrete instantiation of it.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HybridServerError;
use crate::resource::{ResourceKind, WebResource};

const PEER_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RpcRequest {
    Get { kind: ResourceKind, uuid: Uuid },
    Remove { kind: ResourceKind, uuid: Uuid },
    UuidSet { kind: ResourceKind },
    WebResources { kind: ResourceKind },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub ok: bool,
    #[serde(default)]
    pub result: serde_json::Value,
    #[serde(default)]
    pub error: Option<String>,
}

impl RpcResponse {
    pub fn ok(result: serde_json::Value) -> Self {
        Self {
            ok: true,
            result,
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            result: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }
}

/// A handle to one configured peer, grounded in the client a node uses to
/// call out to itself under test.
#[derive(Clone)]
pub struct PeerClient {
    name: String,
    url: reqwest::Url,
    http_base: reqwest::Url,
    http: reqwest::Client,
}

impl PeerClient {
    pub fn new(
        name: impl Into<String>,
        rpc_endpoint: reqwest::Url,
        namespace: &str,
        http_base: reqwest::Url,
    ) -> Self {
        let url = rpc_endpoint
            .join(namespace)
            .unwrap_or_else(|_| rpc_endpoint.clone());
        Self {
            name: name.into(),
            url,
            http_base,
            http: reqwest::Client::builder()
                .timeout(PEER_TIMEOUT)
                .build()
                .expect("reqwest client with a fixed timeout never fails to build"),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The base URL this peer serves its own web-resource GETs under, used
    /// to build the anchor links in listing pages (spec §4.4).
    pub fn http_base(&self) -> &reqwest::Url {
        &self.http_base
    }

    async fn call(&self, request: RpcRequest) -> Result<RpcResponse, HybridServerError> {
        let send = self.http.post(self.url.clone()).json(&request).send();
        let response = tokio::time::timeout(PEER_TIMEOUT, send)
            .await
            .map_err(|_| HybridServerError::Peer(format!("{} timed out", self.name)))??;
        let body: RpcResponse = response.json().await?;
        Ok(body)
    }

    pub async fn get(
        &self,
        kind: ResourceKind,
        uuid: Uuid,
    ) -> Result<Option<WebResource>, HybridServerError> {
        let response = self.call(RpcRequest::Get { kind, uuid }).await?;
        if !response.ok {
            return Err(HybridServerError::Peer(
                response.error.unwrap_or_else(|| "peer returned ok=false".into()),
            ));
        }
        if response.result.is_null() {
            return Ok(None);
        }
        let resource: WebResource = serde_json::from_value(response.result)
            .map_err(|err| HybridServerError::Peer(err.to_string()))?;
        Ok(Some(resource))
    }

    pub async fn remove(&self, kind: ResourceKind, uuid: Uuid) -> Result<bool, HybridServerError> {
        let response = self.call(RpcRequest::Remove { kind, uuid }).await?;
        if !response.ok {
            return Err(HybridServerError::Peer(
                response.error.unwrap_or_else(|| "peer returned ok=false".into()),
            ));
        }
        Ok(response.result.as_bool().unwrap_or(false))
    }

    pub async fn uuid_set(
        &self,
        kind: ResourceKind,
    ) -> Result<std::collections::HashSet<Uuid>, HybridServerError> {
        let response = self.call(RpcRequest::UuidSet { kind }).await?;
        if !response.ok {
            return Err(HybridServerError::Peer(
                response.error.unwrap_or_else(|| "peer returned ok=false".into()),
            ));
        }
        serde_json::from_value(response.result).map_err(|err| HybridServerError::Peer(err.to_string()))
    }

    pub async fn web_resources(
        &self,
        kind: ResourceKind,
    ) -> Result<Vec<WebResource>, HybridServerError> {
        let response = self.call(RpcRequest::WebResources { kind }).await?;
        if !response.ok {
            return Err(HybridServerError::Peer(
                response.error.unwrap_or_else(|| "peer returned ok=false".into()),
            ));
        }
        serde_json::from_value(response.result).map_err(|err| HybridServerError::Peer(err.to_string()))
    }
}

/// Handles one decoded `RpcRequest` against a node's local (non-P2P)
/// stores, producing the response the inbound endpoint writes back.
pub async fn handle_request(
    store_for: impl Fn(ResourceKind) -> std::sync::Arc<dyn crate::store::WebResourceStore>,
    request: RpcRequest,
) -> RpcResponse {
    match request {
        RpcRequest::Get { kind, uuid } => match store_for(kind).get(uuid).await {
            Ok(resource) => RpcResponse::ok(serde_json::to_value(resource).unwrap_or_default()),
            Err(err) => RpcResponse::err(err.to_string()),
        },
        RpcRequest::Remove { kind, uuid } => match store_for(kind).remove(uuid).await {
            Ok(removed) => RpcResponse::ok(serde_json::Value::Bool(removed)),
            Err(err) => RpcResponse::err(err.to_string()),
        },
        RpcRequest::UuidSet { kind } => match store_for(kind).uuid_set().await {
            Ok(set) => RpcResponse::ok(serde_json::to_value(set).unwrap_or_default()),
            Err(err) => RpcResponse::err(err.to_string()),
        },
        RpcRequest::WebResources { kind } => match store_for(kind).web_resources().await {
            Ok(resources) => RpcResponse::ok(serde_json::to_value(resources).unwrap_or_default()),
            Err(err) => RpcResponse::err(err.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_tagged_op() {
        let request = RpcRequest::Get {
            kind: ResourceKind::Html,
            uuid: Uuid::nil(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["op"], "get");
        assert_eq!(value["kind"], "html");
    }

    #[test]
    fn response_round_trips_through_json() {
        let response = RpcResponse::ok(serde_json::json!({"hello": "world"}));
        let raw = serde_json::to_string(&response).unwrap();
        let parsed: RpcResponse = serde_json::from_str(&raw).unwrap();
        assert!(parsed.ok);
        assert_eq!(parsed.result["hello"], "world");
    }
}
