//! Authentication, rate limiting and metrics middleware for API routes.

use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{request::Parts, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use gateway_core::{AuthError, AuthRequest, Identity, RateLimitError, ANONYMOUS_ACCOUNT};
use tracing::debug;

use super::error::{insert_rate_limit_headers, ApiError};
use crate::metrics::{
    normalize_path, AUTH_FAILURES_TOTAL, HTTP_REQUESTS_IN_FLIGHT, HTTP_REQUESTS_TOTAL,
    HTTP_REQUEST_DURATION, RATE_LIMITED_TOTAL,
};
use crate::state::AppState;

/// Metrics middleware that tracks HTTP request duration and counts.
///
/// This middleware records:
/// - Request duration (histogram)
/// - Request count (counter)
/// - Requests in flight (gauge)
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());

    HTTP_REQUESTS_IN_FLIGHT.inc();

    let response = next.run(request).await;

    HTTP_REQUESTS_IN_FLIGHT.dec();

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &path, &status])
        .observe(duration);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    response
}

/// Authentication middleware that validates requests using the configured authenticator.
///
/// On success the resolved [`Identity`] is stored in the request extensions.
/// Missing or wrong credentials yield 401.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let authenticator = state.authenticator();

    if !authenticator.requires_credentials() {
        request.extensions_mut().insert(Identity::anonymous());
        return Ok(next.run(request).await);
    }

    // Extract headers into HashMap for AuthRequest
    let headers: HashMap<String, String> = request
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect();

    // Get source IP (default to localhost if not available)
    let source_ip = request
        .extensions()
        .get::<ConnectInfo<std::net::SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or_else(|| std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST));

    let auth_request = AuthRequest { headers, source_ip };

    match authenticator.authenticate(&auth_request).await {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            Ok(next.run(request).await)
        }
        Err(e) => {
            AUTH_FAILURES_TOTAL.with_label_values(&[e.reason()]).inc();
            match e {
                AuthError::MissingCredentials => {
                    Err(ApiError::unauthorized("Authentication required"))
                }
                AuthError::InvalidCredentials(_) => Err(ApiError::unauthorized("Invalid API key")),
                AuthError::ConfigurationError(_) => Err(ApiError::internal(e)),
            }
        }
    }
}

/// Per-credential rate limiting. Must run after [`auth_middleware`].
///
/// The limit comes from the account's tier. Admitted responses carry the
/// `X-RateLimit-*` headers; rejected requests get 429 before reaching a
/// handler.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let identity = request
        .extensions()
        .get::<Identity>()
        .cloned()
        .unwrap_or_else(Identity::anonymous);

    let tier = state.tier_of(&identity.account_id);
    let limit = state.config().rate_limit.limit_for(tier);
    let key = identity.rate_limit_key();

    match state.rate_limiter().check(&key, limit) {
        Ok(status) => {
            let mut response = next.run(request).await;
            insert_rate_limit_headers(
                response.headers_mut(),
                status.limit,
                status.remaining,
                status.reset_at,
            );
            response
        }
        Err(err) => {
            let RateLimitError::Exceeded {
                retry_after_secs, ..
            } = err;
            debug!(key = %key, tier = %tier, retry_after_secs, "Request rate limited");
            RATE_LIMITED_TOTAL.with_label_values(&[tier.as_str()]).inc();
            ApiError::from(err).into_response()
        }
    }
}

/// Extractor for the authenticated account id.
///
/// Extracts the account_id from the Identity stored in request extensions.
/// Falls back to the anonymous account if no identity is present (shouldn't
/// happen if auth middleware is properly configured).
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let account_id = parts
            .extensions
            .get::<Identity>()
            .map(|id| id.account_id.clone())
            .unwrap_or_else(|| ANONYMOUS_ACCOUNT.to_string());
        std::future::ready(Ok(AuthUser(account_id)))
    }
}
