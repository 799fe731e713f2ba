//! `POST <type>` (spec §4.4): inserts a new resource from a form-urlencoded
//! body, returning a confirmation page linking to it.

use askama::Template;
use futures::future::BoxFuture;
use tracing::warn;

use super::templates::CreatedTemplate;
use super::{error_status, is_typed_path, status_response, HandlerCtx};
use crate::error::HybridServerError;
use crate::http::{HttpRequest, HttpResponse, StatusCode};
use crate::resource::{ResourceKind, WebResource};
use crate::store::fresh_uuid;
use crate::utils::parse_uuid_param;

pub fn respond<'a>(ctx: &'a HandlerCtx, request: &'a HttpRequest) -> BoxFuture<'a, HttpResponse> {
    Box::pin(async move {
        let kind = match is_typed_path(request) {
            Some(kind) => kind,
            None => return status_response(ctx.fallback_status),
        };

        let content = match request.param(kind.name()) {
            Some(value) if !value.is_empty() => value.to_string(),
            _ => return status_response(StatusCode::BAD_REQUEST),
        };

        let xsd = if kind == ResourceKind::Xslt {
            let raw = match request.param("xsd") {
                Some(raw) => raw,
                None => return status_response(StatusCode::BAD_REQUEST),
            };
            let uuid = match parse_uuid_param(Some(raw)) {
                Some(uuid) => uuid,
                None => return status_response(StatusCode::BAD_REQUEST),
            };
            match xsd_exists(ctx, uuid).await {
                Ok(true) => Some(uuid),
                Ok(false) => return status_response(StatusCode::NOT_FOUND),
                Err(err) => {
                    warn!(%err, "failed to check xsd existence");
                    return status_response(error_status(&err));
                }
            }
        } else {
            None
        };

        let store = ctx
            .stores
            .get(&kind)
            .expect("every resource kind has a configured store");

        let uuid = match fresh_uuid(store.as_ref()).await {
            Ok(uuid) => uuid,
            Err(err) => {
                warn!(%err, "failed to generate a fresh uuid");
                return status_response(error_status(&err));
            }
        };

        let resource = WebResource::new(kind, uuid, content, xsd);
        if let Err(err) = store.put(resource).await {
            warn!(%err, "failed to store posted resource");
            return status_response(error_status(&err));
        }

        let body = CreatedTemplate {
            kind: kind.name().to_string(),
            uuid: uuid.to_string(),
        }
        .render()
        .unwrap_or_else(|_| format!("{}?uuid={}", kind.name(), uuid));
        HttpResponse::html(StatusCode::OK, body)
    })
}

async fn xsd_exists(ctx: &HandlerCtx, uuid: uuid::Uuid) -> Result<bool, HybridServerError> {
    let store = ctx
        .stores
        .get(&ResourceKind::Xsd)
        .expect("every resource kind has a configured store");
    Ok(store.get(uuid).await?.is_some())
}

