//! API key authentication.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::HashMap;

use super::AppState;
use crate::config::ApiKeyEntry;

/// Authenticated user info, added to request extensions after auth
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub user_id: String,
}

/// API key store - maps key -> AuthUser
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    keys: HashMap<String, AuthUser>,
}

impl ApiKeyStore {
    pub fn from_entries(entries: Vec<ApiKeyEntry>) -> Self {
        let keys = entries
            .into_iter()
            .map(|entry| {
                (
                    entry.key,
                    AuthUser {
                        user_id: entry.user_id,
                    },
                )
            })
            .collect();
        Self { keys }
    }

    /// With no keys every request is let through.
    pub fn is_open(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Validate an API key and return the associated user
    pub fn validate(&self, key: &str) -> Option<AuthUser> {
        self.keys.get(key).cloned()
    }
}

/// Auth error response
#[derive(Serialize)]
struct AuthError {
    error: &'static str,
    message: &'static str,
}

fn unauthorized(error: &'static str, message: &'static str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(AuthError { error, message })).into_response()
}

/// `key` query parameter, used by WebSocket clients that cannot set headers.
fn query_key(request: &Request) -> Option<String> {
    request.uri().query()?.split('&').find_map(|pair| {
        let value = pair.strip_prefix("key=")?;
        urlencoding::decode(value).ok().map(|v| v.into_owned())
    })
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if state.api_keys.is_open() {
        request.extensions_mut().insert(AuthUser {
            user_id: "anonymous".to_string(),
        });
        return next.run(request).await;
    }

    // Extract Authorization header, falling back to ?key=
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let api_key = match auth_header {
        Some(h) => match h.strip_prefix("Bearer ") {
            Some(key) => key.to_string(),
            None => {
                return unauthorized(
                    "invalid_auth",
                    "Authorization header must use Bearer scheme",
                )
            }
        },
        None => match query_key(&request) {
            Some(key) => key,
            None => return unauthorized("missing_auth", "Authorization header required"),
        },
    };

    // Validate API key
    match state.api_keys.validate(&api_key) {
        Some(user) => {
            tracing::debug!("authenticated {}", user.user_id);
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => unauthorized("invalid_key", "Invalid API key"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_validate() {
        let store = ApiKeyStore::from_entries(vec![ApiKeyEntry {
            key: "secret".into(),
            user_id: "alex".into(),
        }]);
        assert!(!store.is_open());
        assert_eq!(
            store.validate("secret"),
            Some(AuthUser {
                user_id: "alex".into()
            })
        );
        assert_eq!(store.validate("guess"), None);
    }

    #[test]
    fn test_query_key() {
        let request = Request::builder()
            .uri("/realtime/shopping_items?key=a%2Bb&x=1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(query_key(&request), Some("a+b".to_string()));

        let request = Request::builder()
            .uri("/realtime/shopping_items")
            .body(Body::empty())
            .unwrap();
        assert_eq!(query_key(&request), None);
    }
}
