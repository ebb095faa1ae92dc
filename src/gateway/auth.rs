//! Bearer token authentication for the gateway.
//!
//! Every configured token maps to a user id. The middleware resolves the
//! caller and stores an [`AuthUser`] in the request extensions for the
//! handlers.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use secrecy::ExposeSecret;
use subtle::ConstantTimeEq;

use crate::config::ApiToken;

/// The authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub i64);

/// Shared auth state injected via axum middleware state.
#[derive(Clone)]
pub struct AuthState {
    tokens: Arc<Vec<ApiToken>>,
}

impl AuthState {
    pub fn new(tokens: Vec<ApiToken>) -> Self {
        Self {
            tokens: Arc::new(tokens),
        }
    }

    /// Resolve a presented token to its user.
    ///
    /// Every configured token is compared in constant time, with no early
    /// exit on a match.
    pub fn authenticate(&self, presented: &str) -> Option<i64> {
        let mut user = None;
        for entry in self.tokens.iter() {
            let matches: bool = entry
                .token
                .expose_secret()
                .as_bytes()
                .ct_eq(presented.as_bytes())
                .into();
            if matches && user.is_none() {
                user = Some(entry.user_id);
            }
        }
        user
    }
}

/// Pull the token from the `Authorization` header, or from `?token=` since
/// `EventSource` cannot set headers.
fn presented_token(request: &Request) -> Option<&str> {
    let from_header = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if from_header.is_some() {
        return from_header;
    }

    request
        .uri()
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
}

/// Axum middleware that authenticates the caller.
///
/// Wire up with `axum::middleware::from_fn_with_state(auth_state, auth_middleware)`.
pub async fn auth_middleware(
    State(auth): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let user_id = presented_token(&request)
        .and_then(|token| auth.authenticate(token))
        .ok_or_else(|| {
            tracing::debug!(path = %request.uri().path(), "Rejected unauthenticated request");
            StatusCode::UNAUTHORIZED
        })?;

    request.extensions_mut().insert(AuthUser(user_id));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use secrecy::SecretString;

    use super::*;

    fn state() -> AuthState {
        AuthState::new(vec![
            ApiToken {
                token: SecretString::from("alpha".to_string()),
                user_id: 1,
            },
            ApiToken {
                token: SecretString::from("beta".to_string()),
                user_id: 2,
            },
        ])
    }

    #[test]
    fn test_authenticate() {
        let auth = state();
        assert_eq!(auth.authenticate("alpha"), Some(1));
        assert_eq!(auth.authenticate("beta"), Some(2));
        assert_eq!(auth.authenticate("alph"), None);
        assert_eq!(auth.authenticate(""), None);
    }

    #[test]
    fn test_token_from_header_or_query() {
        let request = Request::builder()
            .uri("/conversations/x/events")
            .header("Authorization", "Bearer alpha")
            .body(Body::empty())
            .unwrap();
        assert_eq!(presented_token(&request), Some("alpha"));

        let request = Request::builder()
            .uri("/conversations/x/events?connectionId=abc&token=beta")
            .body(Body::empty())
            .unwrap();
        assert_eq!(presented_token(&request), Some("beta"));

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        assert_eq!(presented_token(&request), None);
    }
}
