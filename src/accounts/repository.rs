// Repository pattern - isolates all `users` collection access
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;

use super::Account;
use crate::db::{decode_time, encode_time, RepositoryError};
use crate::identity::{normalize_email, IdentityId};
use crate::state::DbPool;

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn get(&self, id: &IdentityId) -> Result<Option<Account>, RepositoryError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, RepositoryError>;

    /// Insert a new account document. Fails with `Conflict` if the id or
    /// email is taken.
    async fn create(&self, account: &Account) -> Result<(), RepositoryError>;

    async fn set_blocked(&self, id: &IdentityId, blocked: bool) -> Result<(), RepositoryError>;

    /// All accounts, oldest first.
    async fn list(&self) -> Result<Vec<Account>, RepositoryError>;

    async fn delete(&self, id: &IdentityId) -> Result<bool, RepositoryError>;
}

pub struct SqliteAccountRepository {
    pool: DbPool,
}

impl SqliteAccountRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const ACCOUNT_COLUMNS: &str =
    "id, email, full_name, phone, national_id, role, is_blocked, created_at";

struct AccountRow {
    id: String,
    email: String,
    full_name: String,
    phone: String,
    national_id: String,
    role: String,
    is_blocked: bool,
    created_at: String,
}

impl AccountRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            full_name: row.get(2)?,
            phone: row.get(3)?,
            national_id: row.get(4)?,
            role: row.get(5)?,
            is_blocked: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn into_account(self) -> Result<Account, RepositoryError> {
        Ok(Account {
            id: IdentityId::new(self.id),
            email: self.email,
            full_name: self.full_name,
            phone: self.phone,
            national_id: self.national_id,
            role: self.role.parse().map_err(RepositoryError::Corrupt)?,
            is_blocked: self.is_blocked,
            created_at: decode_time(&self.created_at)?,
        })
    }
}

#[async_trait]
impl AccountRepository for SqliteAccountRepository {
    async fn get(&self, id: &IdentityId) -> Result<Option<Account>, RepositoryError> {
        let conn = self.pool.get()?;
        let raw = conn
            .query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE id = ?1"),
                params![id.as_str()],
                AccountRow::from_row,
            )
            .optional()?;
        raw.map(AccountRow::into_account).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, RepositoryError> {
        let conn = self.pool.get()?;
        let raw = conn
            .query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE email = ?1"),
                params![normalize_email(email)],
                AccountRow::from_row,
            )
            .optional()?;
        raw.map(AccountRow::into_account).transpose()
    }

    async fn create(&self, account: &Account) -> Result<(), RepositoryError> {
        let conn = self.pool.get()?;
        let result = conn.execute(
            &format!("INSERT INTO users ({ACCOUNT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                account.id.as_str(),
                normalize_email(&account.email),
                account.full_name,
                account.phone,
                account.national_id,
                account.role.as_str(),
                account.is_blocked,
                encode_time(account.created_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(RepositoryError::Conflict(format!(
                    "account {} already exists",
                    account.id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn set_blocked(&self, id: &IdentityId, blocked: bool) -> Result<(), RepositoryError> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "UPDATE users SET is_blocked = ?1 WHERE id = ?2",
            params![blocked, id.as_str()],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound(format!("users/{id}")));
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Account>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users ORDER BY created_at ASC, id ASC"
        ))?;
        let raw = stmt
            .query_map([], AccountRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(AccountRow::into_account).collect()
    }

    async fn delete(&self, id: &IdentityId) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM users WHERE id = ?1", params![id.as_str()])?;
        Ok(rows > 0)
    }
}

pub type DynAccountRepository = Arc<dyn AccountRepository>;
