//! API token auth
//!
//! A thin bearer-token layer over the whole API surface. Three modes:
//! disabled (local development), a fixed token from config or environment,
//! or a random token generated at startup and printed to the log.
//! The WebSocket upgrade also accepts the token as a `?token=` query
//! parameter, since browsers cannot set headers on WS handshakes.

use crate::config::AuthConfig;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use rand::{distributions::Alphanumeric, Rng};
use tracing::info;

const TOKEN_ENV: &str = "HOSTDECK_API_TOKEN";

#[derive(Debug, Clone)]
pub enum AuthMode {
    Disabled,
    Token(String),
}

impl AuthMode {
    /// Resolve the auth mode: explicit disable, env var, config token, or a
    /// generated dev token (logged once at startup).
    pub fn from_config(config: &AuthConfig) -> Self {
        if config.disabled {
            return Self::Disabled;
        }

        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.trim().is_empty() {
                return Self::Token(token);
            }
        }

        if let Some(token) = &config.token {
            if !token.trim().is_empty() {
                return Self::Token(token.clone());
            }
        }

        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        info!("Generated API token: {}", token);
        Self::Token(token)
    }

    /// Check a request. `query_token` carries the WS `?token=` fallback.
    pub fn permits(&self, headers: &HeaderMap, query_token: Option<&str>) -> bool {
        match self {
            Self::Disabled => true,
            Self::Token(expected) => {
                bearer_token(headers).as_deref() == Some(expected.as_str())
                    || query_token == Some(expected.as_str())
            }
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
}

/// Middleware guarding the REST API.
pub async fn require_auth(State(auth): State<AuthMode>, req: Request, next: Next) -> Response {
    if auth.permits(req.headers(), None) {
        next.run(req).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "unauthorized"})),
        )
            .into_response()
    }
}
