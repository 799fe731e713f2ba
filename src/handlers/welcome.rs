//! `GET /` — the welcome page (spec §4.4).

use askama::Template;
use futures::future::BoxFuture;
use tracing::error;

use super::templates::WelcomeTemplate;
use super::{status_response, HandlerCtx};
use crate::http::{HttpRequest, HttpResponse, StatusCode};

pub fn respond<'a>(_ctx: &'a HandlerCtx, _request: &'a HttpRequest) -> BoxFuture<'a, HttpResponse> {
    Box::pin(async move {
        match WelcomeTemplate.render() {
            Ok(body) => HttpResponse::html(StatusCode::OK, body),
            Err(err) => {
                error!(%err, "failed to render welcome template");
                status_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    })
}
