//! Authentication data models

use serde::{Deserialize, Serialize};

/// User identity record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub email_verified: bool,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    /// True when the user carries a synthetic address minted for an
    /// emailless OAuth identity rather than a real one.
    pub fn has_placeholder_email(&self) -> bool {
        self.email.ends_with(PLACEHOLDER_EMAIL_DOMAIN)
    }
}

/// Domain suffix for synthetic addresses assigned to OAuth identities
/// that disclose no usable email.
pub const PLACEHOLDER_EMAIL_DOMAIN: &str = "@placeholder.local";

/// Synthetic address for a GitHub identity with no obtainable email.
pub fn placeholder_email(provider_account_id: &str) -> String {
    format!("github_{provider_account_id}{PLACEHOLDER_EMAIL_DOMAIN}")
}

/// Provider-linked credential, one-to-many from User.
///
/// (provider, provider_account_id) is globally unique: at most one
/// Account per external identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub user_id: String,
    pub provider: OAuthProvider,
    pub provider_account_id: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    pub created_at: String,
}

/// Supported OAuth providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Github,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Github => "github",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "github" => Some(OAuthProvider::Github),
            _ => None,
        }
    }
}

/// Single-use email-verification token. The token string itself is the
/// primary key; at most one live token exists per email.
#[derive(Debug, Clone)]
pub struct VerificationToken {
    pub token: String,
    pub email: String,
    pub expires_at: String,
}

/// JWT claims for a session token. Carries only the user id.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub exp: usize,  // expiration timestamp
    pub iat: usize,  // issued at timestamp
}

/// Partial update for a User; only `Some` fields are written.
#[derive(Debug, Default, Clone)]
pub struct UserPatch {
    pub email: Option<String>,
    pub email_verified: Option<bool>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Partial update for an Account.
#[derive(Debug, Default, Clone)]
pub struct AccountPatch {
    pub access_token: Option<String>,
}

/// API request/response types
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ResendVerificationRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub message: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// OAuth callback data
#[derive(Debug, Deserialize)]
pub struct OAuthCallback {
    pub code: String,
    pub state: Option<String>,
}

/// GitHub profile as returned by `GET /user`
#[derive(Debug, Clone, Deserialize)]
pub struct GithubProfile {
    pub id: i64,
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

/// Entry from `GET /user/emails`
#[derive(Debug, Clone, Deserialize)]
pub struct GithubEmail {
    pub email: String,
    pub primary: bool,
    pub verified: bool,
}

/// Fully resolved GitHub identity after the three-step exchange.
#[derive(Debug, Clone)]
pub struct GithubIdentity {
    pub provider_account_id: String,
    pub login: String,
    pub name: Option<String>,
    /// Verified primary email per the selection policy; None when GitHub
    /// disclosed no usable address.
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub access_token: String,
}
