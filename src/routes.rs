//! Authentication REST API routes
//!
//! Thin transport layer: validates input shapes, delegates to the
//! orchestrator, maps classified failures to status codes.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

use crate::database::AuthDatabase;
use crate::email::EmailSender;
use crate::error::AuthError;
use crate::jwt::{JwtConfig, JwtManager};
use crate::middleware::RequestContext;
use crate::models::{
    LoginRequest, OAuthCallback, ResendVerificationRequest, SignupRequest, VerifyEmailRequest,
};
use crate::oauth::{GithubClient, GithubOAuthConfig};
use crate::password::validate_password;
use crate::service::AuthService;

/// Shared authentication state
pub struct AuthState {
    pub service: AuthService,
}

impl AuthState {
    /// Load all component configs from the environment, once, and wire
    /// the orchestrator. Missing secrets fail here, at startup.
    pub fn from_env(db_path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let db = AuthDatabase::new(db_path)?;
        let jwt = JwtManager::new(JwtConfig::from_env()?);
        let github = GithubClient::new(GithubOAuthConfig::from_env()?);
        let email = Arc::new(EmailSender::from_env());

        Ok(Self {
            service: AuthService::new(db, jwt, github, email),
        })
    }
}

/// Create auth router
pub fn auth_router(state: Arc<AuthState>) -> Router {
    Router::new()
        // Password flows
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/verify-email", get(verify_email))
        .route("/auth/resend-verification", post(resend_verification))
        // OAuth
        .route("/auth/oauth/github", get(oauth_redirect))
        .route("/auth/callback/github", get(oauth_callback))
        // User info
        .route("/auth/me", get(get_current_user))
        .with_state(state)
}

/// POST /auth/signup - create an unverified account
async fn signup(
    State(state): State<Arc<AuthState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, AuthError> {
    validate_email(&req.email)?;
    validate_password(&req.password).map_err(|e| AuthError::Validation(e.to_string()))?;

    let response = state.service.signup(&req.email, &req.password)?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /auth/login - password login
async fn login(
    State(state): State<Arc<AuthState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    validate_email(&req.email)?;
    validate_password(&req.password).map_err(|e| AuthError::Validation(e.to_string()))?;

    let response = state.service.login(&req.email, &req.password)?;
    Ok(Json(response))
}

/// GET /auth/verify-email?token=xxx - consume a verification token
async fn verify_email(
    State(state): State<Arc<AuthState>>,
    Query(req): Query<VerifyEmailRequest>,
) -> Result<impl IntoResponse, AuthError> {
    if req.token.is_empty() {
        return Err(AuthError::Validation("Token must not be empty".to_string()));
    }

    let response = state.service.verify_email(&req.token)?;
    Ok(Json(response))
}

/// POST /auth/resend-verification - issue and send a fresh token
async fn resend_verification(
    State(state): State<Arc<AuthState>>,
    Json(req): Json<ResendVerificationRequest>,
) -> Result<impl IntoResponse, AuthError> {
    validate_email(&req.email)?;

    let response = state.service.resend_verification(&req.email).await?;
    Ok(Json(response))
}

/// GET /auth/oauth/github - redirect to the GitHub authorization page
async fn oauth_redirect(
    State(state): State<Arc<AuthState>>,
) -> Result<impl IntoResponse, AuthError> {
    // TODO: persist the CSRF state in a cookie and check it on callback
    let (url, _csrf_token) = state.service.github().authorize_url()?;
    Ok(Redirect::temporary(&url))
}

/// GET /auth/callback/github - OAuth callback
async fn oauth_callback(
    State(state): State<Arc<AuthState>>,
    Query(callback): Query<OAuthCallback>,
) -> Result<impl IntoResponse, AuthError> {
    if callback.code.is_empty() {
        return Err(AuthError::Validation("Code must not be empty".to_string()));
    }

    let response = state.service.github_auth(&callback.code).await?;
    Ok(Json(response))
}

/// GET /auth/me - current user from the bearer token
async fn get_current_user(
    State(state): State<Arc<AuthState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AuthError> {
    let ctx = RequestContext::from_headers(state.service.jwt(), &headers);
    let auth = ctx
        .user
        .ok_or_else(|| AuthError::Unauthorized("Invalid or missing token".to_string()))?;

    let user = state.service.find_user(&auth.user_id)?;
    Ok(Json(user))
}

/// Validate email shape: 5-40 chars, one @, dotted domain, no whitespace.
fn validate_email(email: &str) -> Result<(), AuthError> {
    let len = email.chars().count();
    if !(5..=40).contains(&len) {
        return Err(AuthError::Validation(
            "Email must be 5-40 characters".to_string(),
        ));
    }

    let mut parts = email.splitn(2, '@');
    let local = parts.next().unwrap_or("");
    let domain = parts.next().unwrap_or("");
    if local.is_empty()
        || domain.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || email.chars().any(char::is_whitespace)
    {
        return Err(AuthError::Validation("Invalid email format".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email_accepts_normal_addresses() {
        assert!(validate_email("a@b.com").is_ok());
        assert!(validate_email("user.name+tag@example.co.uk").is_ok());
    }

    #[test]
    fn test_validate_email_rejects_bad_shapes() {
        assert!(validate_email("a@b").is_err()); // no dotted domain
        assert!(validate_email("@b.com").is_err()); // empty local part
        assert!(validate_email("a@.com").is_err()); // leading dot domain
        assert!(validate_email("a b@c.com").is_err()); // whitespace
        assert!(validate_email("a@@b.com").is_err()); // double @
        assert!(validate_email("a@b.").is_err()); // trailing dot
    }

    #[test]
    fn test_validate_email_length_bounds() {
        assert!(validate_email("a@b.c").is_ok()); // exactly 5
        let local = "a".repeat(34);
        assert!(validate_email(&format!("{local}@b.com")).is_ok()); // exactly 40
        assert!(validate_email(&format!("{local}x@b.com")).is_err()); // 41
    }
}
