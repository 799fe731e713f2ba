//! `GET <type>[?uuid=...[&xslt=...]]` (spec §4.4): a listing page when no
//! `uuid` is given, the raw resource on a hit, 404 on miss or malformed
//! UUID, and the XSLT pipeline (§4.5) when the request is a GET on XML
//! with an `xslt` parameter.

use futures::future::BoxFuture;
use tracing::warn;

use super::templates::{ListingSection, ListingTemplate};
use super::{error_status, is_typed_path, status_response, HandlerCtx};
use crate::error::HybridServerError;
use crate::http::{HttpResponse, StatusCode};
use crate::resource::ResourceKind;
use crate::utils::parse_uuid_param;
use askama::Template;

pub fn respond<'a>(
    ctx: &'a HandlerCtx,
    request: &'a crate::http::HttpRequest,
) -> BoxFuture<'a, HttpResponse> {
    Box::pin(async move {
        let kind = match is_typed_path(request) {
            Some(kind) => kind,
            None => return status_response(ctx.fallback_status),
        };

        match parse_uuid_param(request.param("uuid")) {
            None if request.param("uuid").is_none() => listing(ctx, kind, request).await,
            None => status_response(StatusCode::NOT_FOUND),
            Some(uuid) => single(ctx, kind, uuid, request).await,
        }
    })
}

/// Builds the listing page: local section first, then peers sorted
/// alphabetically by name (spec §5's ordering guarantee), one section per
/// server, each a flat list of `<base>/<type>?uuid=<uuid>` links.
async fn listing(
    ctx: &HandlerCtx,
    kind: ResourceKind,
    _request: &crate::http::HttpRequest,
) -> HttpResponse {
    let local_store = ctx
        .local_stores
        .get(&kind)
        .expect("every resource kind has a configured store");

    let local_links = match local_store.uuid_set().await {
        Ok(uuids) => links_for(&ctx.http_base, kind, uuids),
        Err(err) => {
            warn!(%err, "local uuid_set failed while building listing");
            Vec::new()
        }
    };

    let mut sections = vec![ListingSection {
        name: "local".to_string(),
        links: local_links,
    }];

    let mut peers: Vec<&crate::rpc::PeerClient> = ctx.peer_clients.iter().collect();
    peers.sort_by(|a, b| a.name().cmp(b.name()));

    for peer in peers {
        let links = match peer.uuid_set(kind).await {
            Ok(uuids) => links_for(peer.http_base(), kind, uuids),
            Err(err) => {
                warn!(%err, peer = peer.name(), "peer uuid_set failed while building listing");
                Vec::new()
            }
        };
        sections.push(ListingSection {
            name: peer.name().to_string(),
            links,
        });
    }

    let body = ListingTemplate {
        kind: kind.name().to_string(),
        sections,
    }
    .render()
    .unwrap_or_else(|_| "failed to render listing".to_string());
    HttpResponse::html(StatusCode::OK, body)
}

fn links_for(base: &url::Url, kind: ResourceKind, uuids: std::collections::HashSet<uuid::Uuid>) -> Vec<String> {
    let mut links: Vec<String> = uuids
        .into_iter()
        .map(|uuid| format!("{}{}?uuid={}", base, kind.name(), uuid))
        .collect();
    links.sort();
    links
}

async fn single(
    ctx: &HandlerCtx,
    kind: ResourceKind,
    uuid: uuid::Uuid,
    request: &crate::http::HttpRequest,
) -> HttpResponse {
    let store = ctx
        .stores
        .get(&kind)
        .expect("every resource kind has a configured store");

    let resource = match store.get(uuid).await {
        Ok(Some(resource)) => resource,
        Ok(None) => return status_response(StatusCode::NOT_FOUND),
        Err(err) => {
            warn!(%err, "backend get failed");
            return status_response(error_status(&err));
        }
    };

    if kind == ResourceKind::Xml {
        if let Some(xslt_uuid) = parse_uuid_param(request.param("xslt")) {
            return xml_with_transform(ctx, &resource.content, xslt_uuid).await;
        }
    }

    HttpResponse::new(StatusCode::OK).with_body(kind.mime_type(), resource.content)
}

async fn xml_with_transform(
    ctx: &HandlerCtx,
    xml_content: &str,
    xslt_uuid: uuid::Uuid,
) -> HttpResponse {
    match crate::xslt::transform(&ctx.stores, xml_content, xslt_uuid).await {
        Ok((mime_type, body)) => HttpResponse::new(StatusCode::OK).with_body(&mime_type, body),
        Err(HybridServerError::NotFound) => status_response(StatusCode::NOT_FOUND),
        Err(err @ HybridServerError::Validation(_)) => xslt_error_page(err),
        Err(err) => {
            warn!(%err, "xslt pipeline failed");
            status_response(error_status(&err))
        }
    }
}

fn xslt_error_page(error: HybridServerError) -> HttpResponse {
    let reason = error.to_string();
    let body = super::templates::XsltErrorTemplate { reason }
        .render()
        .unwrap_or_else(|_| "xslt transform failed".to_string());
    HttpResponse::html(StatusCode::BAD_REQUEST, body)
}
