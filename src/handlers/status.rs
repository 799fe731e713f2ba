//! The status-code fallback handler: always matches, always terminates the
//! chain (spec §4.4).

use futures::future::BoxFuture;

use super::{status_response, HandlerCtx};
use crate::http::{HttpRequest, HttpResponse};

pub fn respond<'a>(ctx: &'a HandlerCtx, _request: &'a HttpRequest) -> BoxFuture<'a, HttpResponse> {
    Box::pin(async move { status_response(ctx.fallback_status) })
}
