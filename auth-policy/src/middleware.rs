//! axum middleware that gives every request an [`AuthzContext`] and checks on
//! the way out that the handler actually authorized something.
//!
//! The authentication layer in front of this middleware is expected to put
//! the caller's [`Subject`] into the request extensions; requests without one
//! are treated as anonymous. Handlers reach the context through
//! `Extension<Arc<AuthzContext>>`.
//!
//! With `expose_error_meta` set, internal errors returned by handlers as
//! [`AuthzError`](crate::error::AuthzError) are rendered again with their cause.

use crate::{
    config::AuthzConfig, enforcement::AuthzContext, models::Subject, response::reveal_cause,
};
use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

pub async fn enforce_authorization(
    State(config): State<Arc<AuthzConfig>>,
    mut request: Request,
    next: Next,
) -> Response {
    let subject = request.extensions().get::<Subject>().cloned();
    let ctx = Arc::new(AuthzContext::new(subject));
    let handler = handler_identity(&request);
    request.extensions_mut().insert(Arc::clone(&ctx));

    let mut response = next.run(request).await;
    if config.expose_error_meta {
        response = reveal_cause(response);
    }
    let status = response.status();
    let is_error_response = status.is_client_error() || status.is_server_error();

    match ctx.verify_authorized(&handler, is_error_response) {
        Ok(()) => response,
        Err(_) if !config.enforce_authorization => {
            warn!(handler = %handler, "Enforcement disabled, passing unauthorized response through");
            response
        }
        Err(err) => err.render(config.expose_error_meta),
    }
}

fn handler_identity(request: &Request) -> String {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    format!("{} {}", request.method(), path)
}
