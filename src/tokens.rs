//! Email-verification token store
//!
//! Single-use, short-lived tokens proving control of an email address.
//! At most one live token exists per email: issuing supersedes any prior
//! token, and consuming deletes the row.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};

use crate::database::AuthDatabase;
use crate::error::AuthError;
use crate::models::VerificationToken;

/// Token lifetime
const TOKEN_TTL_HOURS: i64 = 24;

/// Freshly issued token handed to the mailer
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: String,
}

/// Verification-token semantics over the database's token table.
#[derive(Clone)]
pub struct VerificationTokens {
    db: AuthDatabase,
}

impl VerificationTokens {
    pub fn new(db: AuthDatabase) -> Self {
        Self { db }
    }

    /// Issue a new token for `email`, deleting any prior tokens for it.
    pub fn issue(&self, email: &str) -> Result<IssuedToken, AuthError> {
        self.db.delete_verification_tokens_for_email(email)?;

        let token = generate_token();
        let expires_at = (Utc::now() + Duration::hours(TOKEN_TTL_HOURS)).to_rfc3339();

        self.db.create_verification_token(&VerificationToken {
            token: token.clone(),
            email: email.to_string(),
            expires_at: expires_at.clone(),
        })?;

        Ok(IssuedToken { token, expires_at })
    }

    /// Consume a token, returning the email it was issued for.
    ///
    /// An expired token is deleted before the error is returned, so a
    /// replay of the same token reports NotFound rather than Expired.
    pub fn consume(&self, token: &str) -> Result<String, AuthError> {
        let record = self
            .db
            .find_verification_token(token)?
            .ok_or_else(|| AuthError::NotFound("verification token not found".to_string()))?;

        if is_expired(&record.expires_at) {
            self.db.delete_verification_token(&record.token)?;
            return Err(AuthError::BadRequest(
                "verification token expired".to_string(),
            ));
        }

        self.db.delete_verification_token(&record.token)?;
        Ok(record.email)
    }
}

fn is_expired(expires_at: &str) -> bool {
    match DateTime::parse_from_rfc3339(expires_at) {
        Ok(ts) => ts < Utc::now(),
        // unparseable timestamp is treated as expired
        Err(_) => true,
    }
}

/// Generate a random 256-bit token, URL-safe base64 encoded.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    getrandom::getrandom(&mut bytes).expect("Failed to generate random bytes");
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn store() -> (VerificationTokens, AuthDatabase) {
        let db = AuthDatabase::in_memory().unwrap();
        (VerificationTokens::new(db.clone()), db)
    }

    #[test]
    fn test_issue_and_consume_round_trip() {
        let (store, _db) = store();

        let issued = store.issue("a@b.com").unwrap();
        assert!(issued.token.len() >= 40);

        let email = store.consume(&issued.token).unwrap();
        assert_eq!(email, "a@b.com");

        // single use: second consume is NotFound
        assert_matches!(store.consume(&issued.token), Err(AuthError::NotFound(_)));
    }

    #[test]
    fn test_issue_supersedes_prior_token() {
        let (store, db) = store();

        let first = store.issue("a@b.com").unwrap();
        let second = store.issue("a@b.com").unwrap();

        assert_eq!(db.count_verification_tokens_for_email("a@b.com").unwrap(), 1);
        assert_matches!(store.consume(&first.token), Err(AuthError::NotFound(_)));
        assert_eq!(store.consume(&second.token).unwrap(), "a@b.com");
    }

    #[test]
    fn test_expired_token_deleted_before_error() {
        let (store, db) = store();

        db.create_verification_token(&VerificationToken {
            token: "stale".to_string(),
            email: "a@b.com".to_string(),
            expires_at: (Utc::now() - Duration::hours(1)).to_rfc3339(),
        })
        .unwrap();

        assert_matches!(store.consume("stale"), Err(AuthError::BadRequest(_)));
        // the expired row is gone, so a replay is NotFound
        assert_matches!(store.consume("stale"), Err(AuthError::NotFound(_)));
    }

    #[test]
    fn test_tokens_are_unpredictable() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43); // 32 bytes, unpadded base64
    }
}
