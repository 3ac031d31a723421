//! Bearer token check shared by both RPC listeners.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};

/// Token a request must present as `Authorization: Bearer <token>`.
#[derive(Clone)]
pub struct BearerToken(Arc<str>);

impl BearerToken {
    pub fn new(token: impl AsRef<str>) -> Self {
        Self(Arc::from(token.as_ref()))
    }

    fn matches(&self, header_value: &str) -> bool {
        header_value
            .strip_prefix("Bearer ")
            .is_some_and(|presented| presented == &*self.0)
    }
}

pub async fn require_bearer(
    State(token): State<BearerToken>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    if let Some(auth_val) = auth_header {
        if token.matches(auth_val) {
            return Ok(next.run(request).await);
        }
    }

    tracing::debug!(uri = %request.uri(), "Rejected unauthenticated RPC request");
    Err(StatusCode::UNAUTHORIZED)
}
