//! `DELETE <type>?uuid=...` (spec §4.4): removes a resource, cascading to
//! dependent XSLTs when an XSD is removed.

use askama::Template;
use futures::future::BoxFuture;
use tracing::warn;

use super::templates::DeletedTemplate;
use super::{error_status, is_typed_path, status_response, HandlerCtx};
use crate::http::{HttpRequest, HttpResponse, StatusCode};
use crate::resource::ResourceKind;
use crate::utils::parse_uuid_param;

pub fn respond<'a>(ctx: &'a HandlerCtx, request: &'a HttpRequest) -> BoxFuture<'a, HttpResponse> {
    Box::pin(async move {
        let kind = match is_typed_path(request) {
            Some(kind) => kind,
            None => return status_response(ctx.fallback_status),
        };

        let uuid = match request.param("uuid") {
            None => return status_response(StatusCode::BAD_REQUEST),
            Some(raw) => match parse_uuid_param(Some(raw)) {
                Some(uuid) => uuid,
                None => return status_response(StatusCode::NOT_FOUND),
            },
        };

        let store = ctx
            .stores
            .get(&kind)
            .expect("every resource kind has a configured store");

        let removed = match store.remove(uuid).await {
            Ok(removed) => removed,
            Err(err) => {
                warn!(%err, "backend remove failed");
                return status_response(error_status(&err));
            }
        };

        if !removed {
            return status_response(StatusCode::NOT_FOUND);
        }

        if kind == ResourceKind::Xsd {
            if let Err(status) = cascade_delete_dependents(ctx, uuid).await {
                return status_response(status);
            }
        }

        let body = DeletedTemplate {
            kind: kind.name().to_string(),
            uuid: uuid.to_string(),
        }
        .render()
        .unwrap_or_else(|_| format!("deleted {}?uuid={}", kind.name(), uuid));
        HttpResponse::html(StatusCode::OK, body)
    })
}

/// Removes every XSLT whose `xsd` link equals the just-deleted XSD's UUID.
/// Individual cascade failures are swallowed; the response is only
/// downgraded to 500 if *every* dependent failed to remove (spec §4.4,
/// §9 open question — see `DESIGN.md`).
async fn cascade_delete_dependents(ctx: &HandlerCtx, xsd_uuid: uuid::Uuid) -> Result<(), StatusCode> {
    let xslt_store = ctx
        .stores
        .get(&ResourceKind::Xslt)
        .expect("every resource kind has a configured store");

    let resources = match xslt_store.web_resources().await {
        Ok(resources) => resources,
        Err(err) => {
            warn!(%err, "failed to enumerate xslt resources for cascade delete");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let dependents: Vec<uuid::Uuid> = resources
        .into_iter()
        .filter(|r| r.xsd == Some(xsd_uuid))
        .map(|r| r.uuid)
        .collect();

    if dependents.is_empty() {
        return Ok(());
    }

    let mut failures = 0usize;
    for uuid in &dependents {
        match xslt_store.remove(*uuid).await {
            Ok(_) => {}
            Err(err) => {
                warn!(%err, %uuid, "cascade delete of dependent xslt failed");
                failures += 1;
            }
        }
    }

    if failures == dependents.len() {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    Ok(())
}
