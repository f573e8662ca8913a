//! Moderation over every user and report. Each call checks for an admin
//! session first.

use serde::Serialize;
use std::str::FromStr;

use crate::accounts::Account;
use crate::auth::AccessControl;
use crate::error::{AppError, AppResult};
use crate::identity::{normalize_email, IdentityError, IdentityId};
use crate::reports::{DynReportRepository, Report, ReportId, ReportStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatusFilter {
    #[default]
    All,
    Active,
    Blocked,
}

impl FromStr for UserStatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "active" => Ok(Self::Active),
            "blocked" => Ok(Self::Blocked),
            other => Err(format!("unknown status filter: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub status: UserStatusFilter,
    /// Case-insensitive substring of the name or email.
    pub query: Option<String>,
}

impl UserFilter {
    pub fn matches(&self, account: &Account) -> bool {
        let status_ok = match self.status {
            UserStatusFilter::All => true,
            UserStatusFilter::Active => !account.is_blocked,
            UserStatusFilter::Blocked => account.is_blocked,
        };
        if !status_ok {
            return false;
        }

        match self.query.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(query) => {
                let query = query.to_lowercase();
                account.full_name.to_lowercase().contains(&query)
                    || account.email.to_lowercase().contains(&query)
            }
        }
    }
}

/// Privileged operations. Report deletion here goes straight to the
/// repository rather than through the owner-scoped report store.
#[derive(Clone)]
pub struct AdminModeration {
    access: AccessControl,
    reports: DynReportRepository,
}

impl AdminModeration {
    pub fn new(access: AccessControl, reports: DynReportRepository) -> Self {
        Self { access, reports }
    }

    /// Every non-admin account, oldest first.
    pub async fn list_users(&self) -> AppResult<Vec<Account>> {
        self.access.session().require_admin()?;
        let accounts = self.access.accounts().list().await?;
        Ok(accounts.into_iter().filter(|a| !a.is_admin()).collect())
    }

    pub async fn search_users(&self, filter: &UserFilter) -> AppResult<Vec<Account>> {
        let users = self.list_users().await?;
        Ok(users.into_iter().filter(|a| filter.matches(a)).collect())
    }

    /// Attributed reports filed by the user behind `email`, newest first.
    /// Anonymous reports never show up here.
    pub async fn list_reports_for_user(&self, email: &str) -> AppResult<Vec<Report>> {
        self.access.session().require_admin()?;
        let account = self.find_account(email).await?;
        let reports = self.reports.list_by_owner(&account.id).await?;
        Ok(reports.into_iter().filter(|r| !r.is_anonymous).collect())
    }

    pub async fn list_all_reports(&self) -> AppResult<Vec<Report>> {
        self.access.session().require_admin()?;
        Ok(self.reports.list_all().await?)
    }

    /// Remove the account and its credentials. Reports it filed are kept.
    pub async fn delete_user(&self, email: &str) -> AppResult<()> {
        let admin = self.access.session().require_admin()?;
        let account = self.find_account(email).await?;

        if !self.access.accounts().delete(&account.id).await? {
            return Err(AppError::NotFound);
        }
        match self.access.identity_service().delete_identity(&account.id).await {
            Ok(()) | Err(IdentityError::UserNotFound) => {}
            Err(e) => return Err(e.into()),
        }
        tracing::info!("{} deleted user {}", admin.id, account.id);

        if self.access.session().is_signed_in_as(&account.id) {
            self.access.logout().await?;
        }
        Ok(())
    }

    pub async fn block_user(&self, user_id: &IdentityId) -> AppResult<()> {
        self.access.set_blocked(user_id, true).await
    }

    pub async fn unblock_user(&self, user_id: &IdentityId) -> AppResult<()> {
        self.access.set_blocked(user_id, false).await
    }

    pub async fn delete_report(&self, id: &ReportId) -> AppResult<()> {
        let admin = self.access.session().require_admin()?;
        if !self.reports.delete(id).await? {
            return Err(AppError::NotFound);
        }
        tracing::info!("{} deleted report {}", admin.id, id);
        Ok(())
    }

    pub async fn set_report_status(&self, id: &ReportId, status: ReportStatus) -> AppResult<()> {
        let admin = self.access.session().require_admin()?;
        self.reports.set_status(id, status).await?;
        tracing::info!("{} marked report {} as {}", admin.id, id, status);
        Ok(())
    }

    async fn find_account(&self, email: &str) -> AppResult<Account> {
        self.access
            .accounts()
            .find_by_email(&normalize_email(email))
            .await?
            .ok_or(AppError::NotFound)
    }
}
