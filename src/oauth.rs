//! GitHub OAuth exchange
//!
//! The handshake is three sequential calls: authorization code to access
//! token, token to profile, token to the email list. The email list call
//! is best effort; the other two classify their own failures.

use oauth2::{basic::BasicClient, AuthUrl, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope};
use reqwest::Client as HttpClient;
use serde::Deserialize;

use crate::error::AuthError;
use crate::models::{GithubEmail, GithubIdentity, GithubProfile};

const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_API_USER_URL: &str = "https://api.github.com/user";
const GITHUB_API_EMAILS_URL: &str = "https://api.github.com/user/emails";
const USER_AGENT: &str = "gatekeep";

/// OAuth client credentials, loaded once at startup
#[derive(Clone)]
pub struct GithubOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_base_url: String,
}

impl GithubOAuthConfig {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            client_id: std::env::var("GITHUB_CLIENT_ID")
                .map_err(|_| "GITHUB_CLIENT_ID must be set".to_string())?,
            client_secret: std::env::var("GITHUB_CLIENT_SECRET")
                .map_err(|_| "GITHUB_CLIENT_SECRET must be set".to_string())?,
            redirect_base_url: std::env::var("OAUTH_REDIRECT_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        })
    }
}

#[derive(Deserialize)]
struct TokenExchangeResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// GitHub OAuth client
#[derive(Clone)]
pub struct GithubClient {
    config: GithubOAuthConfig,
    http_client: HttpClient,
}

impl GithubClient {
    pub fn new(config: GithubOAuthConfig) -> Self {
        Self {
            config,
            http_client: HttpClient::new(),
        }
    }

    /// Build the authorization URL the user is redirected to.
    pub fn authorize_url(&self) -> Result<(String, CsrfToken), AuthError> {
        let redirect_url = format!("{}/auth/callback/github", self.config.redirect_base_url);

        let client = BasicClient::new(ClientId::new(self.config.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.config.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new(GITHUB_AUTHORIZE_URL.to_string())
                    .map_err(|e| AuthError::Internal(e.to_string()))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(redirect_url).map_err(|e| AuthError::Internal(e.to_string()))?,
            );

        let (url, csrf_token) = client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new("read:user".to_string()))
            .add_scope(Scope::new("user:email".to_string()))
            .url();

        Ok((url.to_string(), csrf_token))
    }

    /// Step 1: exchange the authorization code for an access token.
    ///
    /// GitHub reports a bad code as HTTP 200 with an `error` body, so the
    /// body is inspected rather than the status.
    pub async fn exchange_code(&self, code: &str) -> Result<String, AuthError> {
        let response = self
            .http_client
            .post(GITHUB_TOKEN_URL)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Upstream(format!("token exchange request failed: {}", e)))?;

        let body: TokenExchangeResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Upstream(format!("token exchange response invalid: {}", e)))?;

        if let Some(error) = body.error {
            return Err(AuthError::BadRequest(
                body.error_description.unwrap_or(error),
            ));
        }
        body.access_token
            .ok_or_else(|| AuthError::BadRequest("OAuth exchange returned no access token".to_string()))
    }

    /// Step 2: fetch the user profile.
    pub async fn fetch_profile(&self, access_token: &str) -> Result<GithubProfile, AuthError> {
        let response = self
            .http_client
            .get(GITHUB_API_USER_URL)
            .bearer_auth(access_token)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| AuthError::Upstream(format!("failed to fetch GitHub profile: {}", e)))?;

        if !response.status().is_success() {
            return Err(AuthError::Upstream(format!(
                "GitHub profile request returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::Upstream(format!("failed to parse GitHub profile: {}", e)))
    }

    /// Step 3: fetch the email list.
    pub async fn fetch_emails(&self, access_token: &str) -> Result<Vec<GithubEmail>, AuthError> {
        let response = self
            .http_client
            .get(GITHUB_API_EMAILS_URL)
            .bearer_auth(access_token)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| AuthError::Upstream(format!("failed to fetch GitHub emails: {}", e)))?;

        if !response.status().is_success() {
            return Err(AuthError::Upstream(format!(
                "GitHub emails request returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::Upstream(format!("failed to parse GitHub emails: {}", e)))
    }

    /// Run the full three-step exchange, resolving the primary email.
    pub async fn fetch_identity(&self, code: &str) -> Result<GithubIdentity, AuthError> {
        let access_token = self.exchange_code(code).await?;
        let profile = self.fetch_profile(&access_token).await?;

        // best effort: a failure here falls back to the profile email
        let emails = match self.fetch_emails(&access_token).await {
            Ok(emails) => emails,
            Err(e) => {
                log::warn!("GitHub email lookup failed, using profile email: {}", e);
                Vec::new()
            }
        };

        let email = resolve_primary_email(profile.email.clone(), &emails);

        Ok(GithubIdentity {
            provider_account_id: profile.id.to_string(),
            login: profile.login,
            name: profile.name,
            email,
            avatar_url: profile.avatar_url,
            access_token,
        })
    }
}

/// Pick the identity's email: primary+verified first, then any verified,
/// then whatever the profile exposed (possibly nothing).
pub fn resolve_primary_email(
    profile_email: Option<String>,
    emails: &[GithubEmail],
) -> Option<String> {
    if let Some(entry) = emails.iter().find(|e| e.primary && e.verified) {
        return Some(entry.email.clone());
    }
    if let Some(entry) = emails.iter().find(|e| e.verified) {
        return Some(entry.email.clone());
    }
    profile_email
}
