//! Auth orchestrator
//!
//! Composes the hasher, token minter, verification-token store, identity
//! repository and OAuth client into the signup, login, verification,
//! resend and GitHub-login flows. Holds no cross-request state; every
//! method is a self-contained request/response unit.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::database::AuthDatabase;
use crate::email::EmailSender;
use crate::error::AuthError;
use crate::jwt::JwtManager;
use crate::models::{
    placeholder_email, Account, AccountPatch, GithubIdentity, MessageResponse, OAuthProvider,
    SessionResponse, SignupResponse, User, UserPatch,
};
use crate::oauth::GithubClient;
use crate::password::{hash_password, verify_password};
use crate::tokens::VerificationTokens;

const SIGNUP_MESSAGE: &str = "Account created. Check your email to verify your address.";
const RESEND_MESSAGE: &str =
    "If an account exists for this address, a verification email has been sent.";

#[derive(Clone)]
pub struct AuthService {
    db: AuthDatabase,
    tokens: VerificationTokens,
    jwt: JwtManager,
    github: GithubClient,
    email: Arc<EmailSender>,
}

impl AuthService {
    pub fn new(
        db: AuthDatabase,
        jwt: JwtManager,
        github: GithubClient,
        email: Arc<EmailSender>,
    ) -> Self {
        let tokens = VerificationTokens::new(db.clone());
        Self {
            db,
            tokens,
            jwt,
            github,
            email,
        }
    }

    /// Create an unverified account and dispatch a verification email.
    ///
    /// The email goes out on a background task: signup must not fail, or
    /// block, on delivery problems. Send failures are logged only.
    pub fn signup(&self, email: &str, password: &str) -> Result<SignupResponse, AuthError> {
        if self.db.find_user_by_email(email)?.is_some() {
            return Err(AuthError::Conflict(
                "An account with this email already exists".to_string(),
            ));
        }

        let password_hash = hash_password(password)
            .map_err(|e| AuthError::Internal(format!("password hashing failed: {}", e)))?;

        let now = Utc::now().to_rfc3339();
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            password_hash: Some(password_hash),
            email_verified: false,
            display_name: None,
            avatar_url: None,
            created_at: now.clone(),
            updated_at: now,
        };

        // two racing signups can both pass the lookup above; the email
        // uniqueness constraint decides the winner
        self.db
            .create_user(&user)
            .map_err(|e| map_unique_violation(e, "An account with this email already exists"))?;

        let issued = self.tokens.issue(email)?;

        let mailer = Arc::clone(&self.email);
        let to = email.to_string();
        tokio::spawn(async move {
            if let Err(e) = mailer.send_verification_email(&to, &issued.token).await {
                log::error!("Failed to send verification email to {}: {}", to, e);
            }
        });

        Ok(SignupResponse {
            message: SIGNUP_MESSAGE.to_string(),
            email: email.to_string(),
        })
    }

    /// Consume a verification token, mark the user verified and open a
    /// session. Verification is terminal: there is no path back.
    pub fn verify_email(&self, token: &str) -> Result<SessionResponse, AuthError> {
        let email = self.tokens.consume(token)?;

        let user = self
            .db
            .find_user_by_email(&email)?
            .ok_or_else(|| AuthError::NotFound("user not found".to_string()))?;

        self.db.update_user(
            &user.id,
            &UserPatch {
                email_verified: Some(true),
                ..Default::default()
            },
        )?;

        self.issue_session(&user.id)
    }

    /// Issue a fresh verification token and send it.
    ///
    /// Unknown emails get the same success message as a real resend, so
    /// the response shape never discloses whether an account exists. The
    /// send is awaited here, unlike signup: the user explicitly asked for
    /// this mail, so a delivery failure is reported.
    pub async fn resend_verification(&self, email: &str) -> Result<MessageResponse, AuthError> {
        let user = match self.db.find_user_by_email(email)? {
            Some(user) => user,
            None => {
                return Ok(MessageResponse {
                    message: RESEND_MESSAGE.to_string(),
                })
            }
        };

        if user.email_verified {
            return Err(AuthError::BadRequest("Email already verified".to_string()));
        }

        let issued = self.tokens.issue(email)?;
        self.email
            .send_verification_email(email, &issued.token)
            .await
            .map_err(|e| {
                log::error!("Failed to send verification email to {}: {}", email, e);
                AuthError::Internal("Failed to send verification email".to_string())
            })?;

        Ok(MessageResponse {
            message: RESEND_MESSAGE.to_string(),
        })
    }

    /// Password login. A missing user and an OAuth-only user (no password
    /// hash) both report the same generic not-found.
    pub fn login(&self, email: &str, password: &str) -> Result<SessionResponse, AuthError> {
        let user = self.db.find_user_by_email(email)?;

        let (user, password_hash) = match user {
            Some(user) if user.password_hash.is_some() => {
                let hash = user.password_hash.clone().unwrap();
                (user, hash)
            }
            _ => return Err(AuthError::NotFound("user not found".to_string())),
        };

        if !user.email_verified {
            return Err(AuthError::Forbidden("Email not verified".to_string()));
        }

        let matches = verify_password(password, &password_hash)
            .map_err(|e| AuthError::Internal(format!("password verification failed: {}", e)))?;
        if !matches {
            return Err(AuthError::Unauthorized("Invalid Credentials".to_string()));
        }

        self.issue_session(&user.id)
    }

    /// GitHub login: run the three-step exchange, reconcile the external
    /// identity against local records, open a session. No separate email
    /// verification; trust is delegated to GitHub's verified-email claim.
    pub async fn github_auth(&self, code: &str) -> Result<SessionResponse, AuthError> {
        let identity = self.github.fetch_identity(code).await?;
        let user = self.reconcile_github(&identity)?;
        self.issue_session(&user.id)
    }

    /// Map a GitHub identity onto exactly one local user.
    ///
    /// Priority order: an existing Account link wins over an email match,
    /// which wins over creating a new user. Once linked, later logins
    /// never re-run the email-matching branch.
    pub fn reconcile_github(&self, identity: &GithubIdentity) -> Result<User, AuthError> {
        if let Some(account) = self
            .db
            .find_account(OAuthProvider::Github, &identity.provider_account_id)?
        {
            return self.refresh_linked_user(&account, identity);
        }

        if let Some(email) = &identity.email {
            if let Some(existing) = self.db.find_user_by_email(email)? {
                return self.link_to_existing_user(&existing, identity);
            }
        }

        self.create_github_user(identity)
    }

    /// Branch (a): the identity is already linked. Refresh profile fields
    /// and the stored access token. The email is only replaced when the
    /// user still carries a placeholder and a real one was obtained.
    fn refresh_linked_user(
        &self,
        account: &Account,
        identity: &GithubIdentity,
    ) -> Result<User, AuthError> {
        let user = self
            .db
            .find_user_by_id(&account.user_id)?
            .ok_or_else(|| AuthError::Internal("account references missing user".to_string()))?;

        let mut patch = UserPatch {
            display_name: Some(display_name_of(identity)),
            avatar_url: identity.avatar_url.clone(),
            ..Default::default()
        };
        if user.has_placeholder_email() && identity.email.is_some() {
            patch.email = identity.email.clone();
            patch.email_verified = Some(true);
        }
        self.db.update_user(&user.id, &patch)?;

        self.db.update_account(
            &account.id,
            &AccountPatch {
                access_token: Some(identity.access_token.clone()),
            },
        )?;

        self.db
            .find_user_by_id(&user.id)?
            .ok_or_else(|| AuthError::Internal("user disappeared during refresh".to_string()))
    }

    /// Branch (b): no link yet, but a user owns the resolved email. Link
    /// the identity to that user; backfill profile fields only where the
    /// user has none.
    fn link_to_existing_user(
        &self,
        existing: &User,
        identity: &GithubIdentity,
    ) -> Result<User, AuthError> {
        let account = new_account(&existing.id, identity);
        self.db
            .create_account(&account)
            .map_err(map_github_unique_violation)?;

        let mut patch = UserPatch::default();
        if existing.display_name.is_none() {
            patch.display_name = Some(display_name_of(identity));
        }
        if existing.avatar_url.is_none() {
            patch.avatar_url = identity.avatar_url.clone();
        }
        self.db.update_user(&existing.id, &patch)?;

        self.db
            .find_user_by_id(&existing.id)?
            .ok_or_else(|| AuthError::Internal("user disappeared during linking".to_string()))
    }

    /// Branch (c): brand-new identity. The user and its first account are
    /// written in one transaction. With no usable email the account gets
    /// a deterministic placeholder and stays unverified.
    fn create_github_user(&self, identity: &GithubIdentity) -> Result<User, AuthError> {
        let has_real_email = identity.email.is_some();
        let email = identity
            .email
            .clone()
            .unwrap_or_else(|| placeholder_email(&identity.provider_account_id));

        let now = Utc::now().to_rfc3339();
        let user = User {
            id: Uuid::new_v4().to_string(),
            email,
            password_hash: None,
            email_verified: has_real_email,
            display_name: Some(display_name_of(identity)),
            avatar_url: identity.avatar_url.clone(),
            created_at: now.clone(),
            updated_at: now,
        };
        let account = new_account(&user.id, identity);

        self.db
            .create_user_with_account(&user, &account)
            .map_err(map_github_unique_violation)?;

        Ok(user)
    }

    /// Verify a bearer token and return the user id it asserts.
    pub fn authenticate(&self, token: &str) -> Result<String, AuthError> {
        self.jwt
            .verify(token)
            .map(|data| data.claims.sub)
            .map_err(|_| AuthError::Unauthorized("Invalid or expired token".to_string()))
    }

    /// Load a user record by id.
    pub fn find_user(&self, user_id: &str) -> Result<User, AuthError> {
        self.db
            .find_user_by_id(user_id)?
            .ok_or_else(|| AuthError::NotFound("user not found".to_string()))
    }

    pub fn jwt(&self) -> &JwtManager {
        &self.jwt
    }

    pub fn github(&self) -> &GithubClient {
        &self.github
    }

    fn issue_session(&self, user_id: &str) -> Result<SessionResponse, AuthError> {
        let token = self
            .jwt
            .issue(user_id)
            .map_err(|e| AuthError::Internal(format!("token minting failed: {}", e)))?;
        Ok(SessionResponse { token })
    }
}

fn display_name_of(identity: &GithubIdentity) -> String {
    identity
        .name
        .clone()
        .unwrap_or_else(|| identity.login.clone())
}

fn new_account(user_id: &str, identity: &GithubIdentity) -> Account {
    Account {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        provider: OAuthProvider::Github,
        provider_account_id: identity.provider_account_id.clone(),
        access_token: identity.access_token.clone(),
        created_at: Utc::now().to_rfc3339(),
    }
}

fn map_unique_violation(e: rusqlite::Error, conflict_msg: &str) -> AuthError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            AuthError::Conflict(conflict_msg.to_string())
        }
        _ => AuthError::Database(e),
    }
}

/// Map a lost race in the GitHub flow to its declared failure kinds.
/// A violation on the accounts table means the identity got linked by a
/// concurrent login; one on the users table means the email got taken.
fn map_github_unique_violation(e: rusqlite::Error) -> AuthError {
    match &e {
        rusqlite::Error::SqliteFailure(err, Some(msg))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            if msg.contains("accounts.") {
                AuthError::BadRequest("GitHub identity already linked".to_string())
            } else {
                AuthError::BadRequest("An account with this email already exists".to_string())
            }
        }
        rusqlite::Error::SqliteFailure(err, None)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            AuthError::BadRequest("GitHub identity already linked".to_string())
        }
        _ => AuthError::Database(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn unique_violation(detail: &str) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ErrorCode::ConstraintViolation,
                extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
            },
            Some(format!("UNIQUE constraint failed: {detail}")),
        )
    }

    #[test]
    fn test_account_row_violation_maps_to_bad_request_with_link_message() {
        let err = map_github_unique_violation(unique_violation(
            "accounts.provider, accounts.provider_account_id",
        ));
        assert_matches!(err, AuthError::BadRequest(msg) => {
            assert_eq!(msg, "GitHub identity already linked");
        });
    }

    #[test]
    fn test_user_row_violation_maps_to_bad_request_with_email_message() {
        let err = map_github_unique_violation(unique_violation("users.email"));
        assert_matches!(err, AuthError::BadRequest(msg) => {
            assert_eq!(msg, "An account with this email already exists");
        });
    }

    #[test]
    fn test_non_constraint_errors_stay_database_errors() {
        let err = map_github_unique_violation(rusqlite::Error::InvalidQuery);
        assert_matches!(err, AuthError::Database(_));

        let err = map_unique_violation(rusqlite::Error::InvalidQuery, "dup");
        assert_matches!(err, AuthError::Database(_));
    }

    #[test]
    fn test_signup_violation_stays_conflict() {
        let err = map_unique_violation(
            unique_violation("users.email"),
            "An account with this email already exists",
        );
        assert_matches!(err, AuthError::Conflict(_));
    }
}
