//! Per-request authentication context
//!
//! Maps an optional bearer token to an optional authenticated user.
//! Context construction never fails; consuming procedures decide whether
//! an anonymous caller is acceptable.

use axum::http::HeaderMap;

use crate::jwt::JwtManager;

pub const AUTH_HEADER: &str = "authorization";

/// The authenticated principal, as asserted by a valid session token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

/// Request context: `user` is None for anonymous, invalid or expired
/// credentials alike.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub user: Option<AuthenticatedUser>,
}

impl RequestContext {
    pub fn from_headers(jwt: &JwtManager, headers: &HeaderMap) -> Self {
        let user = extract_bearer_token(headers)
            .and_then(|token| jwt.verify(token).ok())
            .map(|data| AuthenticatedUser {
                user_id: data.claims.sub,
            });
        Self { user }
    }
}

/// Pull the token out of an `Authorization: Bearer …` header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTH_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::JwtConfig;
    use axum::http::HeaderValue;

    fn test_jwt() -> JwtManager {
        JwtManager::new(JwtConfig::new("test-secret".to_string(), 1))
    }

    #[test]
    fn test_context_with_valid_token() {
        let jwt = test_jwt();
        let token = jwt.issue("user_123").unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTH_HEADER,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );

        let ctx = RequestContext::from_headers(&jwt, &headers);
        assert_eq!(ctx.user.unwrap().user_id, "user_123");
    }

    #[test]
    fn test_context_with_missing_header() {
        let ctx = RequestContext::from_headers(&test_jwt(), &HeaderMap::new());
        assert!(ctx.user.is_none());
    }

    #[test]
    fn test_context_with_garbage_token_is_anonymous_not_error() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTH_HEADER, HeaderValue::from_static("Bearer not.a.jwt"));

        let ctx = RequestContext::from_headers(&test_jwt(), &headers);
        assert!(ctx.user.is_none());
    }

    #[test]
    fn test_context_with_non_bearer_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTH_HEADER, HeaderValue::from_static("Basic dXNlcjpwdw=="));

        let ctx = RequestContext::from_headers(&test_jwt(), &headers);
        assert!(ctx.user.is_none());
    }
}
