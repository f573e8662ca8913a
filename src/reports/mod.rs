pub mod repository;
pub mod store;
pub mod subscription;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::accounts::Account;
use crate::dispatch::location::Coordinates;
use crate::identity::IdentityId;

pub use repository::{DynReportRepository, ReportChange, ReportRepository, SqliteReportRepository};
pub use store::ReportStore;
pub use subscription::ReportSubscription;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportId(pub String);

impl ReportId {
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

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    #[default]
    Pending,
    InReview,
    Resolved,
    Dismissed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InReview => "in_review",
            Self::Resolved => "resolved",
            Self::Dismissed => "dismissed",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_review" => Ok(Self::InReview),
            "resolved" => Ok(Self::Resolved),
            "dismissed" => Ok(Self::Dismissed),
            other => Err(format!("unknown report status: {other}")),
        }
    }
}

/// Who filed an attributed report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReporterIdentity {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub national_id: String,
}

impl From<&Account> for ReporterIdentity {
    fn from(account: &Account) -> Self {
        Self {
            name: account.full_name.clone(),
            email: account.email.clone(),
            phone: account.phone.clone(),
            national_id: account.national_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportLocation {
    pub lat: f64,
    pub lng: f64,
    pub address: String,
}

impl ReportLocation {
    /// Location with a coordinate caption in place of a geocoded address.
    pub fn from_coordinates(coords: Coordinates) -> Self {
        Self {
            lat: coords.latitude,
            lng: coords.longitude,
            address: format!("Lat: {:.4}, Lng: {:.4}", coords.latitude, coords.longitude),
        }
    }
}

/// Caller-supplied report content, used for both creation and edits.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReportDraft {
    pub title: String,
    pub description: String,
    pub is_anonymous: bool,
    pub reporter: Option<ReporterIdentity>,
    /// URI of an attached photo.
    pub image: Option<String>,
    pub location: Option<ReportLocation>,
}

impl ReportDraft {
    /// Trim text, drop blank image URIs, and strip identity and location from
    /// anonymous drafts. `fallback_reporter` fills an attributed draft that
    /// names no reporter.
    pub fn prepare(
        mut self,
        fallback_reporter: Option<ReporterIdentity>,
    ) -> Result<Self, String> {
        self.title = self.title.trim().to_string();
        self.description = self.description.trim().to_string();
        self.image = self
            .image
            .map(|uri| uri.trim().to_string())
            .filter(|uri| !uri.is_empty());

        if self.title.is_empty() && self.description.is_empty() && self.image.is_none() {
            return Err("Please add a title, description, or image".to_string());
        }

        if self.is_anonymous {
            self.reporter = None;
            self.location = None;
        } else if self.reporter.is_none() {
            self.reporter = fallback_reporter;
        }

        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub owner_id: IdentityId,
    pub title: String,
    pub description: String,
    pub is_anonymous: bool,
    pub reporter: Option<ReporterIdentity>,
    pub image: Option<String>,
    pub location: Option<ReportLocation>,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
