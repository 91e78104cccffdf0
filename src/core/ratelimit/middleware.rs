//! Axum admission layer
//!
//! Derives the caller's [`ClientIdentity`], charges it against the shared
//! [`ClientRateLimiter`] and either rejects with 429 or forwards the request
//! with the identity attached as an extension for handlers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::core::auth::error::AuthError;
use crate::core::ratelimit::client::ClientIdentity;
use crate::core::ratelimit::limiter::ClientRateLimiter;

pub async fn admission(
    State(limiter): State<Arc<ClientRateLimiter>>,
    mut request: Request,
    next: Next,
) -> Response {
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = ClientIdentity::from_request(request.headers(), remote, limiter.proxy_trust());

    if let Err(exceeded) = limiter.check(&client) {
        warn!(client = %client, path = %request.uri().path(), "request rejected by rate limiter");
        return AuthError::from(exceeded).into_response();
    }

    request.extensions_mut().insert(client);
    next.run(request).await
}
