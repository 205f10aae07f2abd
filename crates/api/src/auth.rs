//! Optional bearer-key guard.
//!
//! Installed only when `DEVBOT_API_KEY` is set; `/health` stays open so
//! probes work without credentials.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::routes::ApiError;

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "DEVBOT_API_KEY";

/// The key clients must present as `Authorization: Bearer <key>`.
#[derive(Clone)]
pub struct ApiKey(Arc<[u8]>);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into().into_bytes().into())
    }

    /// Compare without short-circuiting on the first differing byte.
    fn matches(&self, presented: &str) -> bool {
        let presented = presented.as_bytes();
        presented.len() == self.0.len()
            && self
                .0
                .iter()
                .zip(presented)
                .fold(0u8, |diff, (a, b)| diff | (a ^ b))
                == 0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(..)")
    }
}

fn bearer(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

pub async fn require_api_key(State(key): State<ApiKey>, request: Request, next: Next) -> Response {
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    match bearer(&request).map(|token| key.matches(token)) {
        Some(true) => next.run(request).await,
        Some(false) => {
            warn!(path = %request.uri().path(), "Rejected request with wrong API key");
            ApiError::unauthorized("invalid API key", "INVALID_API_KEY").into_response()
        }
        None => ApiError::unauthorized(
            "missing Authorization: Bearer <key> header",
            "MISSING_API_KEY",
        )
        .into_response(),
    }
}
