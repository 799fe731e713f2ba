//! The handler chain (spec §4.4): a fixed ordered table of
//! `(predicate, respond)` pairs, walked top to bottom, with a total
//! fallback. Collapses the twelve per-(method, kind) entries spec.md
//! enumerates into three kind-generic entries — each handler reads the
//! resource kind off the request itself — since the per-kind behavior is
//! otherwise identical; see `DESIGN.md`.

mod delete;
mod get;
mod post;
mod status;
pub mod templates;
mod welcome;

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use futures::future::BoxFuture;
use url::Url;

use crate::config::PeerConfig;
use crate::error::HybridServerError;
use crate::http::{HttpRequest, HttpResponse, Method, StatusCode};
use crate::resource::ResourceKind;
use crate::rpc::PeerClient;
use crate::store::WebResourceStore;

/// Everything a handler needs to answer a request: per-kind stores (the
/// P2P-decorated view used for reads/writes, plus the undecorated local
/// view used for listings where each peer's contribution must stay
/// distinct rather than merged), the configured peers, and this node's own
/// advertised base URL.
pub struct HandlerCtx {
    pub stores: HashMap<ResourceKind, Arc<dyn WebResourceStore>>,
    pub local_stores: HashMap<ResourceKind, Arc<dyn WebResourceStore>>,
    pub peer_clients: Vec<PeerClient>,
    pub peers: Vec<PeerConfig>,
    pub http_base: Url,
    /// The status the fallback handler answers with (spec §4.4: "a
    /// configurable status, 400 by default").
    pub fallback_status: StatusCode,
}

pub type HandlerFn = fn(&HandlerCtx, &HttpRequest) -> BoxFuture<'_, HttpResponse>;

type Predicate = fn(&HttpRequest) -> bool;

fn is_typed_path(request: &HttpRequest) -> Option<ResourceKind> {
    if request.resource_path.len() != 1 {
        return None;
    }
    ResourceKind::from_name(&request.resource_path[0])
}

fn is_typed_get(request: &HttpRequest) -> bool {
    request.method == Method::Get && is_typed_path(request).is_some()
}

fn is_typed_post(request: &HttpRequest) -> bool {
    request.method == Method::Post && is_typed_path(request).is_some()
}

fn is_typed_delete(request: &HttpRequest) -> bool {
    request.method == Method::Delete && is_typed_path(request).is_some()
}

fn is_welcome(request: &HttpRequest) -> bool {
    request.method == Method::Get && request.resource_name.is_empty()
}

fn is_anything(_request: &HttpRequest) -> bool {
    true
}

static CHAIN: LazyLock<Vec<(Predicate, HandlerFn)>> = LazyLock::new(|| {
    vec![
        (is_typed_get, get::respond),
        (is_typed_post, post::respond),
        (is_typed_delete, delete::respond),
        (is_welcome, welcome::respond),
        (is_anything, status::respond),
    ]
});

/// Walks the chain in order and invokes the first matching handler. The
/// status-code fallback always matches, so this always terminates with a
/// response (spec §8: "dispatch yields exactly one handler's response and
/// always terminates").
pub async fn dispatch(ctx: &HandlerCtx, request: &HttpRequest) -> HttpResponse {
    for (matches, respond) in CHAIN.iter() {
        if matches(request) {
            return respond(ctx, request).await;
        }
    }
    unreachable!("the status-code handler matches every request");
}

/// The one place a `HybridServerError` becomes a status code (spec §7).
pub fn error_status(error: &HybridServerError) -> StatusCode {
    match error {
        HybridServerError::Parse(parse_error) => match parse_error {
            crate::http::ParseError::UnsupportedHeader(_) => StatusCode::NOT_IMPLEMENTED,
            crate::http::ParseError::UnsupportedContentEncoding(_) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            crate::http::ParseError::MissingContentLength => StatusCode::LENGTH_REQUIRED,
            crate::http::ParseError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
        },
        HybridServerError::NotFound => StatusCode::NOT_FOUND,
        HybridServerError::Conflict => StatusCode::NOT_FOUND,
        HybridServerError::Validation(_) => StatusCode::BAD_REQUEST,
        HybridServerError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        HybridServerError::Peer(_) => StatusCode::INTERNAL_SERVER_ERROR,
        HybridServerError::Startup(_) => StatusCode::INTERNAL_SERVER_ERROR,
        HybridServerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Renders the status-code page for `status`, used both by the chain's own
/// fallback handler and by any handler that needs to emit a non-2xx page.
pub fn status_response(status: StatusCode) -> HttpResponse {
    let body = templates::StatusTemplate {
        code: status.0,
        reason: status.reason().to_string(),
    }
    .render()
    .unwrap_or_else(|_| format!("{} {}", status.0, status.reason()));
    HttpResponse::html(status, body)
}

use askama::Template;

#[cfg(test)]
mod tests {
    use super::*;

    fn get(path: &str) -> HttpRequest {
        HttpRequest {
            method: Method::Get,
            resource_chain: path.to_string(),
            resource_name: path.trim_start_matches('/').to_string(),
            resource_path: path
                .trim_start_matches('/')
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            resource_parameters: crate::http::OrderedParams::new(),
            header_parameters: crate::http::OrderedParams::new(),
            version: "HTTP/1.1".to_string(),
            content_length: 0,
            body_bytes: Vec::new(),
            text_body: None,
        }
    }

    #[test]
    fn typed_predicates_only_match_single_segment_known_kinds() {
        assert!(is_typed_get(&get("/html")));
        assert!(!is_typed_get(&get("/bogus")));
        assert!(!is_typed_get(&get("/html/extra")));
    }

    #[test]
    fn welcome_only_matches_empty_path() {
        assert!(is_welcome(&get("/")));
        assert!(!is_welcome(&get("/html")));
    }

    #[test]
    fn fallback_matches_everything() {
        assert!(is_anything(&get("/anything/at/all")));
    }
}
