//! SQLite persistence for users, linked accounts and verification tokens

use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::sync::{Arc, Mutex};

use crate::models::{Account, AccountPatch, OAuthProvider, User, UserPatch, VerificationToken};

/// Database connection wrapper
pub struct AuthDatabase {
    conn: Arc<Mutex<Connection>>,
}

impl AuthDatabase {
    /// Create a new database connection and initialize tables
    pub fn new(path: &str) -> SqliteResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_tables()?;
        Ok(db)
    }

    /// Create in-memory database (for testing)
    pub fn in_memory() -> SqliteResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_tables()?;
        Ok(db)
    }

    /// Initialize database tables
    fn init_tables(&self) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT,
                email_verified INTEGER NOT NULL DEFAULT 0,
                display_name TEXT,
                avatar_url TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                provider_account_id TEXT NOT NULL,
                access_token TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                UNIQUE(provider, provider_account_id)
            );

            CREATE TABLE IF NOT EXISTS verification_tokens (
                token TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
            CREATE INDEX IF NOT EXISTS idx_accounts_provider ON accounts(provider, provider_account_id);
            CREATE INDEX IF NOT EXISTS idx_tokens_email ON verification_tokens(email);
            "#,
        )?;

        Ok(())
    }

    // ==================== User Operations ====================

    /// Create a new user
    pub fn create_user(&self, user: &User) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        Self::insert_user(&conn, user)
    }

    fn insert_user(conn: &Connection, user: &User) -> SqliteResult<()> {
        conn.execute(
            "INSERT INTO users (id, email, password_hash, email_verified, display_name, avatar_url, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                user.id,
                user.email,
                user.password_hash,
                user.email_verified as i32,
                user.display_name,
                user.avatar_url,
                user.created_at,
                user.updated_at,
            ],
        )?;
        Ok(())
    }

    fn user_from_row(row: &rusqlite::Row<'_>) -> SqliteResult<User> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            password_hash: row.get(2)?,
            email_verified: row.get::<_, i32>(3)? != 0,
            display_name: row.get(4)?,
            avatar_url: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    /// Find user by email
    pub fn find_user_by_email(&self, email: &str) -> SqliteResult<Option<User>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, email, password_hash, email_verified, display_name, avatar_url, created_at, updated_at
             FROM users WHERE email = ?1",
            params![email],
            Self::user_from_row,
        )
        .optional()
    }

    /// Find user by ID
    pub fn find_user_by_id(&self, id: &str) -> SqliteResult<Option<User>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, email, password_hash, email_verified, display_name, avatar_url, created_at, updated_at
             FROM users WHERE id = ?1",
            params![id],
            Self::user_from_row,
        )
        .optional()
    }

    /// Apply a partial update; only `Some` fields are written.
    pub fn update_user(&self, id: &str, patch: &UserPatch) -> SqliteResult<()> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(email) = &patch.email {
            sets.push("email = ?");
            values.push(Box::new(email.clone()));
        }
        if let Some(verified) = patch.email_verified {
            sets.push("email_verified = ?");
            values.push(Box::new(verified as i32));
        }
        if let Some(name) = &patch.display_name {
            sets.push("display_name = ?");
            values.push(Box::new(name.clone()));
        }
        if let Some(url) = &patch.avatar_url {
            sets.push("avatar_url = ?");
            values.push(Box::new(url.clone()));
        }
        if sets.is_empty() {
            return Ok(());
        }

        sets.push("updated_at = ?");
        values.push(Box::new(chrono::Utc::now().to_rfc3339()));
        values.push(Box::new(id.to_string()));

        let sql = format!("UPDATE users SET {} WHERE id = ?", sets.join(", "));
        let conn = self.conn.lock().unwrap();
        conn.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
        Ok(())
    }

    // ==================== Account Operations ====================

    /// Create account link
    pub fn create_account(&self, account: &Account) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        Self::insert_account(&conn, account)
    }

    fn insert_account(conn: &Connection, account: &Account) -> SqliteResult<()> {
        conn.execute(
            "INSERT INTO accounts (id, user_id, provider, provider_account_id, access_token, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                account.id,
                account.user_id,
                account.provider.as_str(),
                account.provider_account_id,
                account.access_token,
                account.created_at,
            ],
        )?;
        Ok(())
    }

    /// Create a user and its first account in one transaction, so a new
    /// OAuth identity never leaves a partial write behind.
    pub fn create_user_with_account(&self, user: &User, account: &Account) -> SqliteResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        Self::insert_user(&tx, user)?;
        Self::insert_account(&tx, account)?;
        tx.commit()
    }

    fn account_from_row(row: &rusqlite::Row<'_>) -> SqliteResult<Account> {
        let provider_str: String = row.get(2)?;
        let provider = OAuthProvider::from_str(&provider_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown provider: {provider_str}").into(),
            )
        })?;
        Ok(Account {
            id: row.get(0)?,
            user_id: row.get(1)?,
            provider,
            provider_account_id: row.get(3)?,
            access_token: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    /// Find account by provider and external identity id
    pub fn find_account(
        &self,
        provider: OAuthProvider,
        provider_account_id: &str,
    ) -> SqliteResult<Option<Account>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, user_id, provider, provider_account_id, access_token, created_at
             FROM accounts WHERE provider = ?1 AND provider_account_id = ?2",
            params![provider.as_str(), provider_account_id],
            Self::account_from_row,
        )
        .optional()
    }

    /// Apply a partial update to an account.
    pub fn update_account(&self, id: &str, patch: &AccountPatch) -> SqliteResult<()> {
        if let Some(token) = &patch.access_token {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "UPDATE accounts SET access_token = ?1 WHERE id = ?2",
                params![token, id],
            )?;
        }
        Ok(())
    }

    // ==================== Verification Token Operations ====================

    /// Persist a verification token row
    pub fn create_verification_token(&self, token: &VerificationToken) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO verification_tokens (token, email, expires_at)
             VALUES (?1, ?2, ?3)",
            params![token.token, token.email, token.expires_at],
        )?;
        Ok(())
    }

    /// Look up a token row regardless of expiry
    pub fn find_verification_token(&self, token: &str) -> SqliteResult<Option<VerificationToken>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT token, email, expires_at FROM verification_tokens WHERE token = ?1",
            params![token],
            |row| {
                Ok(VerificationToken {
                    token: row.get(0)?,
                    email: row.get(1)?,
                    expires_at: row.get(2)?,
                })
            },
        )
        .optional()
    }

    /// Look up the current token row for an email, if any
    pub fn find_verification_token_by_email(
        &self,
        email: &str,
    ) -> SqliteResult<Option<VerificationToken>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT token, email, expires_at FROM verification_tokens WHERE email = ?1",
            params![email],
            |row| {
                Ok(VerificationToken {
                    token: row.get(0)?,
                    email: row.get(1)?,
                    expires_at: row.get(2)?,
                })
            },
        )
        .optional()
    }

    /// Delete one token row
    pub fn delete_verification_token(&self, token: &str) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM verification_tokens WHERE token = ?1",
            params![token],
        )?;
        Ok(())
    }

    /// Delete every token for an email; a new issue supersedes old ones.
    pub fn delete_verification_tokens_for_email(&self, email: &str) -> SqliteResult<usize> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM verification_tokens WHERE email = ?1",
            params![email],
        )
    }

    /// Count live-or-dead token rows for an email (test support / metrics)
    pub fn count_verification_tokens_for_email(&self, email: &str) -> SqliteResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM verification_tokens WHERE email = ?1",
            params![email],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Delete expired tokens (maintenance sweep)
    pub fn cleanup_expired_tokens(&self) -> SqliteResult<usize> {
        let conn = self.conn.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "DELETE FROM verification_tokens WHERE expires_at < ?1",
            params![now],
        )
    }
}

impl Clone for AuthDatabase {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user(id: &str, email: &str) -> User {
        let now = chrono::Utc::now().to_rfc3339();
        User {
            id: id.to_string(),
            email: email.to_string(),
            password_hash: Some("hash123".to_string()),
            email_verified: false,
            display_name: None,
            avatar_url: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    #[test]
    fn test_create_and_find_user() {
        let db = AuthDatabase::in_memory().unwrap();
        db.create_user(&test_user("user_1", "test@example.com")).unwrap();

        let found = db.find_user_by_email("test@example.com").unwrap().unwrap();
        assert_eq!(found.id, "user_1");
        assert!(!found.email_verified);

        assert!(db.find_user_by_email("other@example.com").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let db = AuthDatabase::in_memory().unwrap();
        db.create_user(&test_user("user_1", "dup@example.com")).unwrap();
        assert!(db.create_user(&test_user("user_2", "dup@example.com")).is_err());
    }

    #[test]
    fn test_partial_user_update() {
        let db = AuthDatabase::in_memory().unwrap();
        db.create_user(&test_user("user_1", "patch@example.com")).unwrap();

        db.update_user(
            "user_1",
            &UserPatch {
                email_verified: Some(true),
                display_name: Some("Ada".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

        let found = db.find_user_by_id("user_1").unwrap().unwrap();
        assert!(found.email_verified);
        assert_eq!(found.display_name.as_deref(), Some("Ada"));
        // untouched fields survive
        assert_eq!(found.email, "patch@example.com");
        assert_eq!(found.password_hash.as_deref(), Some("hash123"));
    }

    #[test]
    fn test_account_uniqueness_per_provider_identity() {
        let db = AuthDatabase::in_memory().unwrap();
        db.create_user(&test_user("user_1", "a@example.com")).unwrap();
        db.create_user(&test_user("user_2", "b@example.com")).unwrap();

        let now = chrono::Utc::now().to_rfc3339();
        let account = Account {
            id: "acc_1".to_string(),
            user_id: "user_1".to_string(),
            provider: OAuthProvider::Github,
            provider_account_id: "12345".to_string(),
            access_token: "tok".to_string(),
            created_at: now.clone(),
        };
        db.create_account(&account).unwrap();

        let duplicate = Account {
            id: "acc_2".to_string(),
            user_id: "user_2".to_string(),
            created_at: now,
            ..account.clone()
        };
        assert!(db.create_account(&duplicate).is_err());

        let found = db.find_account(OAuthProvider::Github, "12345").unwrap().unwrap();
        assert_eq!(found.user_id, "user_1");
    }

    #[test]
    fn test_unknown_provider_row_is_a_decoding_error_not_a_default() {
        let db = AuthDatabase::in_memory().unwrap();
        db.create_user(&test_user("user_1", "a@example.com")).unwrap();

        let now = chrono::Utc::now().to_rfc3339();
        {
            let conn = db.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO accounts (id, user_id, provider, provider_account_id, access_token, created_at)
                 VALUES ('acc_1', 'user_1', 'gitlab', '555', 'tok', ?1)",
                params![now],
            )
            .unwrap();
        }

        // the provider filter never selects the foreign row
        assert!(db.find_account(OAuthProvider::Github, "555").unwrap().is_none());

        // decoding it directly fails instead of collapsing to a default
        let conn = db.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT id, user_id, provider, provider_account_id, access_token, created_at
             FROM accounts WHERE provider_account_id = '555'",
            [],
            AuthDatabase::account_from_row,
        );
        assert!(matches!(
            result,
            Err(rusqlite::Error::FromSqlConversionFailure(2, _, _))
        ));
    }

    #[test]
    fn test_create_user_with_account_rolls_back() {
        let db = AuthDatabase::in_memory().unwrap();
        db.create_user(&test_user("user_1", "taken@example.com")).unwrap();

        let now = chrono::Utc::now().to_rfc3339();
        let account = Account {
            id: "acc_1".to_string(),
            user_id: "user_1".to_string(),
            provider: OAuthProvider::Github,
            provider_account_id: "99".to_string(),
            access_token: "tok".to_string(),
            created_at: now,
        };
        db.create_account(&account).unwrap();

        // second account for the same GitHub identity must fail and roll
        // back the user insert with it
        let user = test_user("user_2", "new@example.com");
        let account2 = Account {
            id: "acc_2".to_string(),
            user_id: "user_2".to_string(),
            ..account
        };
        assert!(db.create_user_with_account(&user, &account2).is_err());
        assert!(db.find_user_by_email("new@example.com").unwrap().is_none());
    }

    #[test]
    fn test_token_supersede_and_delete() {
        let db = AuthDatabase::in_memory().unwrap();
        let expires = (chrono::Utc::now() + chrono::Duration::hours(24)).to_rfc3339();

        db.create_verification_token(&VerificationToken {
            token: "t1".to_string(),
            email: "x@example.com".to_string(),
            expires_at: expires.clone(),
        })
        .unwrap();
        db.delete_verification_tokens_for_email("x@example.com").unwrap();
        db.create_verification_token(&VerificationToken {
            token: "t2".to_string(),
            email: "x@example.com".to_string(),
            expires_at: expires,
        })
        .unwrap();

        assert_eq!(db.count_verification_tokens_for_email("x@example.com").unwrap(), 1);
        assert!(db.find_verification_token("t1").unwrap().is_none());
        assert!(db.find_verification_token("t2").unwrap().is_some());
    }

    #[test]
    fn test_cleanup_expired_tokens() {
        let db = AuthDatabase::in_memory().unwrap();
        db.create_verification_token(&VerificationToken {
            token: "old".to_string(),
            email: "x@example.com".to_string(),
            expires_at: (chrono::Utc::now() - chrono::Duration::hours(1)).to_rfc3339(),
        })
        .unwrap();
        db.create_verification_token(&VerificationToken {
            token: "live".to_string(),
            email: "y@example.com".to_string(),
            expires_at: (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339(),
        })
        .unwrap();

        assert_eq!(db.cleanup_expired_tokens().unwrap(), 1);
        assert!(db.find_verification_token("live").unwrap().is_some());
    }
}
