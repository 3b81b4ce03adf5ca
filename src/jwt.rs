//! JWT session token handling

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::Claims;

/// JWT configuration
#[derive(Clone)]
pub struct JwtConfig {
    secret: String,
    expiration_hours: u64,
}

impl JwtConfig {
    pub fn new(secret: String, expiration_hours: u64) -> Self {
        Self {
            secret,
            expiration_hours,
        }
    }

    /// Load from the environment. JWT_SECRET is mandatory: a service that
    /// signs sessions with a guessable default is worse than one that
    /// refuses to start.
    pub fn from_env() -> Result<Self, String> {
        let secret = std::env::var("JWT_SECRET")
            .map_err(|_| "JWT_SECRET must be set".to_string())?;
        let expiration_hours = std::env::var("JWT_EXPIRATION_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);
        Ok(Self::new(secret, expiration_hours))
    }
}

/// Issues and verifies signed session tokens carrying only a user id.
#[derive(Clone)]
pub struct JwtManager {
    config: JwtConfig,
}

impl JwtManager {
    pub fn new(config: JwtConfig) -> Self {
        Self { config }
    }

    /// Create a new session token for a user
    pub fn issue(&self, user_id: &str) -> Result<String, jsonwebtoken::errors::Error> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards")
            .as_secs() as usize;

        let expiration = now + (self.config.expiration_hours as usize * 3600);

        let claims = Claims {
            sub: user_id.to_string(),
            exp: expiration,
            iat: now,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.secret.as_bytes()),
        )
    }

    /// Verify signature and expiry, returning the decoded claims
    pub fn verify(&self, token: &str) -> Result<TokenData<Claims>, jsonwebtoken::errors::Error> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.secret.as_bytes()),
            &Validation::default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify() {
        let manager = JwtManager::new(JwtConfig::new("test-secret".to_string(), 1));

        let token = manager.issue("user_123").unwrap();
        let verified = manager.verify(&token).unwrap();

        assert_eq!(verified.claims.sub, "user_123");
        assert!(verified.claims.exp > verified.claims.iat);
        assert_eq!(verified.claims.exp - verified.claims.iat, 3600);
    }

    #[test]
    fn test_invalid_token() {
        let manager = JwtManager::new(JwtConfig::new("test-secret".to_string(), 1));
        assert!(manager.verify("invalid.token.here").is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let signer = JwtManager::new(JwtConfig::new("secret-a".to_string(), 1));
        let verifier = JwtManager::new(JwtConfig::new("secret-b".to_string(), 1));

        let token = signer.issue("user_123").unwrap();
        assert!(verifier.verify(&token).is_err());
    }
}
