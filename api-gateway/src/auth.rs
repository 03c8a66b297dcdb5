//! Bearer-token gate
//!
//! One middleware layer wraps the whole router, fallback included, so the
//! REST route, the MCP endpoint and unknown paths are all checked by the
//! same code. Only the documentation pages in [`PUBLIC_PATHS`] bypass it.

use std::fmt;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use subtle::ConstantTimeEq;
use tracing::warn;

/// Paths served without authentication so API documentation can render
pub const PUBLIC_PATHS: [&str; 3] = ["/openapi.json", "/docs", "/docs/oauth2-redirect"];

/// Exact-match check against the documentation allow-list
pub fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Missing Bearer token")]
    MissingToken,
    #[error("Authorization scheme must be Bearer")]
    WrongScheme,
    #[error("Invalid Bearer token")]
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Bearer")],
            Json(json!({ "detail": self.to_string() })),
        )
            .into_response()
    }
}

/// The configured shared secret
#[derive(Clone)]
pub struct BearerAuth {
    token: Arc<[u8]>,
}

impl fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuth").field("token", &"<redacted>").finish()
    }
}

impl BearerAuth {
    pub fn new(token: &str) -> Self {
        Self {
            token: Arc::from(token.as_bytes()),
        }
    }

    /// Check the `Authorization` header of a request
    pub fn verify(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let value = headers
            .get(header::AUTHORIZATION)
            .ok_or(AuthError::MissingToken)?
            .to_str()
            .map_err(|_| AuthError::WrongScheme)?;

        let (scheme, token) = value.split_once(' ').unwrap_or((value, ""));
        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(AuthError::WrongScheme);
        }

        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        if bool::from(token.as_bytes().ct_eq(&self.token[..])) {
            Ok(())
        } else {
            Err(AuthError::InvalidToken)
        }
    }
}

/// Middleware enforcing the bearer token on every non-public path
pub async fn require_bearer(
    State(auth): State<BearerAuth>,
    request: Request,
    next: Next,
) -> Response {
    if is_public_path(request.uri().path()) {
        return next.run(request).await;
    }

    match auth.verify(request.headers()) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            warn!(
                "Rejected {} {}: {e}",
                request.method(),
                request.uri().path()
            );
            e.into_response()
        }
    }
}
