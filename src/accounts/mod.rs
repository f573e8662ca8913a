pub mod repository;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::identity::{normalize_email, IdentityId};

pub use repository::{AccountRepository, DynAccountRepository, SqliteAccountRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// The `users` document for one identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: IdentityId,
    pub email: String,
    pub full_name: String,
    pub phone: String,
    pub national_id: String,
    pub role: Role,
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Emails that are granted the admin role when they sign up.
#[derive(Debug, Clone, Default)]
pub struct AdminAllowList {
    emails: Vec<String>,
}

impl AdminAllowList {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            emails: emails
                .into_iter()
                .map(|e| normalize_email(e.as_ref()))
                .collect(),
        }
    }

    pub fn role_for(&self, email: &str) -> Role {
        let email = normalize_email(email);
        if self.emails.iter().any(|admin| *admin == email) {
            Role::Admin
        } else {
            Role::User
        }
    }
}
