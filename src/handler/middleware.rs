use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use std::{sync::Arc, time::Instant};
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use super::error_response;
use crate::{service::token::TokenError, state::AppState};

const REQUEST_ID: &str = "x-request-id";

/// Account id taken from a validated bearer token.
#[derive(Clone, Copy, Debug)]
pub struct AuthenticatedAccount(pub Uuid);

fn bearer_token(request: &Request) -> Option<&str> {
    let value = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Rejects requests without a valid bearer token and records activity for the rest.
pub async fn require_bearer(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&request) else {
        return error_response(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing bearer token",
        );
    };

    let claims = match state.tokens().validate(token) {
        Ok(claims) => claims,
        Err(TokenError::Expired) => {
            return error_response(StatusCode::UNAUTHORIZED, "token_expired", "token expired");
        }
        Err(err) => {
            debug!(error = %err, "bearer token rejected");
            return error_response(StatusCode::UNAUTHORIZED, "invalid_token", "invalid token");
        }
    };

    let Ok(account_id) = claims.sub.parse::<Uuid>() else {
        return error_response(StatusCode::UNAUTHORIZED, "invalid_token", "invalid token");
    };

    state.activity().touch(account_id).await;
    request
        .extensions_mut()
        .insert(AuthenticatedAccount(account_id));
    next.run(request).await
}

/// Wraps each request in a span carrying its request id and logs completion.
pub async fn trace_requests(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let span = info_span!(
        "request",
        %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    let started = Instant::now();
    let mut response = next.run(request).instrument(span.clone()).await;
    span.in_scope(|| {
        info!(
            status = response.status().as_u16(),
            latency_ms = started.elapsed().as_millis() as u64,
            "request completed"
        )
    });

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID), value);
    }
    response
}
