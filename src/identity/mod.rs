//! Credential checks and the auth-state stream.
//!
//! The rest of the crate talks to the identity provider only through
//! [`IdentityService`]; [`SqliteIdentityService`] is the bundled backend.

pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

pub use sqlite::SqliteIdentityService;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityId(pub String);

impl IdentityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Single-use secret handed to the user out of band to reset a password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetToken(pub String);

impl ResetToken {
    pub fn generate() -> Self {
        use rand::Rng;
        let bytes: [u8; 32] = rand::thread_rng().gen();
        Self(bytes.iter().map(|b| format!("{:02x}", b)).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Events on the auth-state stream. Every event names the identity it is about
/// so each client can ignore events for other people.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStateChange {
    SignedIn(IdentityId),
    /// The identity's claims changed server-side and must be re-validated.
    Refreshed(IdentityId),
    SignedOut(IdentityId),
}

impl AuthStateChange {
    pub fn identity(&self) -> &IdentityId {
        match self {
            Self::SignedIn(id) | Self::Refreshed(id) | Self::SignedOut(id) => id,
        }
    }
}

/// Backend-specific failure codes. Callers outside the auth layer never see
/// these; they are translated into [`crate::error::AppError`].
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("auth/invalid-email")]
    InvalidEmail,

    #[error("auth/user-disabled")]
    UserDisabled,

    #[error("auth/user-not-found")]
    UserNotFound,

    #[error("auth/wrong-password")]
    WrongPassword,

    #[error("auth/email-already-in-use")]
    EmailAlreadyInUse,

    #[error("auth/weak-password")]
    WeakPassword,

    #[error("auth/invalid-action-code")]
    InvalidResetToken,

    #[error("auth/network-request-failed: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Hash error: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Check credentials and publish [`AuthStateChange::SignedIn`].
    async fn authenticate(&self, email: &str, password: &str) -> Result<IdentityId, IdentityError>;

    /// Register credentials and publish [`AuthStateChange::SignedIn`].
    async fn create_identity(&self, email: &str, password: &str)
        -> Result<IdentityId, IdentityError>;

    async fn sign_out(&self, identity: &IdentityId) -> Result<(), IdentityError>;

    /// Force every client holding this identity to re-validate it.
    async fn refresh(&self, identity: &IdentityId) -> Result<(), IdentityError>;

    async fn delete_identity(&self, identity: &IdentityId) -> Result<(), IdentityError>;

    async fn issue_password_reset(&self, email: &str) -> Result<ResetToken, IdentityError>;

    async fn confirm_password_reset(
        &self,
        token: &ResetToken,
        new_password: &str,
    ) -> Result<(), IdentityError>;

    fn subscribe(&self) -> broadcast::Receiver<AuthStateChange>;
}

pub type DynIdentityService = Arc<dyn IdentityService>;

/// Lowercase and trim so lookups and the admin allow-list agree on spelling.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_token_is_64_hex_chars() {
        let token = ResetToken::generate();
        assert_eq!(token.as_str().len(), 64);
        assert!(token.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, ResetToken::generate());
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("survivor@example.org"));
        assert!(is_valid_email("a.b+c@mail.co.uk"));
        assert!(!is_valid_email("no-at-sign.org"));
        assert!(!is_valid_email("@example.org"));
        assert!(!is_valid_email("user@localhost"));
        assert!(!is_valid_email("user@.org"));
        assert!(!is_valid_email("us er@example.org"));
        assert!(!is_valid_email("a@b@c.org"));
    }

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email("  Admin@App.COM "), "admin@app.com");
    }

    #[test]
    fn auth_state_change_exposes_identity() {
        let id = IdentityId::new("abc");
        assert_eq!(AuthStateChange::Refreshed(id.clone()).identity(), &id);
    }
}
