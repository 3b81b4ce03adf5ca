//! # Gatekeep
//!
//! Credential-and-session issuance service:
//!
//! - Email/password signup with mandatory email verification
//! - GitHub OAuth login and account linking
//! - JWT-based session bootstrapping
//!
//! The orchestrator ([`service::AuthService`]) owns all reconciliation and
//! error-mapping logic; persistence, hashing, token minting, the OAuth
//! exchange and email delivery are separate components injected into it.

pub mod database;
pub mod email;
pub mod error;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod oauth;
pub mod password;
pub mod routes;
pub mod service;
pub mod tokens;

pub use database::AuthDatabase;
pub use error::AuthError;
pub use jwt::{JwtConfig, JwtManager};
pub use routes::{auth_router, AuthState};
pub use service::AuthService;
