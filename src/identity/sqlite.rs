use async_trait::async_trait;
use chrono::{Duration, Utc};
use rusqlite::{params, OptionalExtension};
use tokio::sync::broadcast;

use super::{
    is_valid_email, normalize_email, AuthStateChange, IdentityError, IdentityId, IdentityService,
    ResetToken,
};
use crate::config::IdentityConfig;
use crate::db::{decode_time, encode_time};
use crate::state::DbPool;

const AUTH_EVENT_CAPACITY: usize = 64;

/// Identity provider backed by the `identities` table. Passwords are stored
/// as bcrypt hashes.
pub struct SqliteIdentityService {
    pool: DbPool,
    config: IdentityConfig,
    events: broadcast::Sender<AuthStateChange>,
}

impl SqliteIdentityService {
    pub fn new(pool: DbPool, config: IdentityConfig) -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            pool,
            config,
            events,
        }
    }

    fn publish(&self, change: AuthStateChange) {
        // No subscribers is fine: nobody is signed in on a listening client.
        let _ = self.events.send(change);
    }

    fn check_password_strength(&self, password: &str) -> Result<(), IdentityError> {
        if password.chars().count() < self.config.min_password_len {
            return Err(IdentityError::WeakPassword);
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityService for SqliteIdentityService {
    async fn authenticate(&self, email: &str, password: &str) -> Result<IdentityId, IdentityError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(IdentityError::InvalidEmail);
        }

        let row: Option<(String, String, bool)> = {
            let conn = self.pool.get()?;
            conn.query_row(
                "SELECT id, password_hash, disabled FROM identities WHERE email = ?1",
                params![email],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?
        };

        let (id, hash, disabled) = row.ok_or(IdentityError::UserNotFound)?;
        if disabled {
            return Err(IdentityError::UserDisabled);
        }
        if !bcrypt::verify(password, &hash)? {
            return Err(IdentityError::WrongPassword);
        }

        let id = IdentityId::new(id);
        self.publish(AuthStateChange::SignedIn(id.clone()));
        Ok(id)
    }

    async fn create_identity(
        &self,
        email: &str,
        password: &str,
    ) -> Result<IdentityId, IdentityError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(IdentityError::InvalidEmail);
        }
        self.check_password_strength(password)?;

        let hash = bcrypt::hash(password, self.config.bcrypt_cost)?;
        let id = IdentityId::generate();

        {
            let conn = self.pool.get()?;
            let taken: bool = conn.query_row(
                "SELECT COUNT(*) > 0 FROM identities WHERE email = ?1",
                params![email],
                |row| row.get(0),
            )?;
            if taken {
                return Err(IdentityError::EmailAlreadyInUse);
            }

            // A concurrent signup can still win the race to the UNIQUE index.
            match conn.execute(
                "INSERT INTO identities (id, email, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id.as_str(), email, hash, encode_time(Utc::now())],
            ) {
                Ok(_) => {}
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    return Err(IdentityError::EmailAlreadyInUse);
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.publish(AuthStateChange::SignedIn(id.clone()));
        Ok(id)
    }

    async fn sign_out(&self, identity: &IdentityId) -> Result<(), IdentityError> {
        self.publish(AuthStateChange::SignedOut(identity.clone()));
        Ok(())
    }

    async fn refresh(&self, identity: &IdentityId) -> Result<(), IdentityError> {
        self.publish(AuthStateChange::Refreshed(identity.clone()));
        Ok(())
    }

    async fn delete_identity(&self, identity: &IdentityId) -> Result<(), IdentityError> {
        let deleted = {
            let conn = self.pool.get()?;
            conn.execute(
                "DELETE FROM identities WHERE id = ?1",
                params![identity.as_str()],
            )?
        };
        if deleted == 0 {
            return Err(IdentityError::UserNotFound);
        }

        self.publish(AuthStateChange::SignedOut(identity.clone()));
        Ok(())
    }

    async fn issue_password_reset(&self, email: &str) -> Result<ResetToken, IdentityError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(IdentityError::InvalidEmail);
        }

        let conn = self.pool.get()?;
        let identity_id: String = conn
            .query_row(
                "SELECT id FROM identities WHERE email = ?1",
                params![email],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(IdentityError::UserNotFound)?;

        let token = ResetToken::generate();
        let expires_at = Utc::now() + Duration::minutes(self.config.reset_token_minutes);
        conn.execute(
            "INSERT INTO password_resets (token, identity_id, expires_at) VALUES (?1, ?2, ?3)",
            params![token.as_str(), identity_id, encode_time(expires_at)],
        )?;

        tracing::info!("Issued password reset for identity {}", identity_id);
        Ok(token)
    }

    async fn confirm_password_reset(
        &self,
        token: &ResetToken,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        self.check_password_strength(new_password)?;

        let conn = self.pool.get()?;
        let row: Option<(String, String, bool)> = conn
            .query_row(
                "SELECT identity_id, expires_at, used FROM password_resets WHERE token = ?1",
                params![token.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let (identity_id, expires_at, used) = row.ok_or(IdentityError::InvalidResetToken)?;
        let expired = decode_time(&expires_at)
            .map(|at| at < Utc::now())
            .unwrap_or(true);
        if used || expired {
            return Err(IdentityError::InvalidResetToken);
        }

        let hash = bcrypt::hash(new_password, self.config.bcrypt_cost)?;

        conn.execute("BEGIN IMMEDIATE", [])?;
        let result: Result<(), rusqlite::Error> = (|| {
            conn.execute(
                "UPDATE password_resets SET used = 1 WHERE token = ?1",
                params![token.as_str()],
            )?;
            conn.execute(
                "UPDATE identities SET password_hash = ?1 WHERE id = ?2",
                params![hash, identity_id],
            )?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                conn.execute("COMMIT", [])?;
                Ok(())
            }
            Err(e) => {
                conn.execute("ROLLBACK", [])?;
                Err(e.into())
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthStateChange> {
        self.events.subscribe()
    }
}
