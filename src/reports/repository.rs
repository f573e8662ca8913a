// Repository pattern - isolates all `reports` collection access
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;
use tokio::sync::broadcast;

use super::{Report, ReportDraft, ReportId, ReportLocation, ReportStatus, ReporterIdentity};
use crate::db::{decode_time, encode_time, RepositoryError};
use crate::identity::IdentityId;
use crate::state::DbPool;

const CHANGE_FEED_CAPACITY: usize = 256;

/// Notification that one owner's report set changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportChange {
    pub owner_id: IdentityId,
    pub report_id: ReportId,
}

#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// Store a prepared draft. Id, status and timestamps are assigned here.
    async fn insert(&self, owner: &IdentityId, draft: &ReportDraft)
        -> Result<Report, RepositoryError>;

    async fn get(&self, id: &ReportId) -> Result<Option<Report>, RepositoryError>;

    /// Replace the content fields. Owner, status and `created_at` are kept.
    async fn update_content(&self, id: &ReportId, draft: &ReportDraft)
        -> Result<(), RepositoryError>;

    async fn set_status(&self, id: &ReportId, status: ReportStatus)
        -> Result<(), RepositoryError>;

    async fn delete(&self, id: &ReportId) -> Result<bool, RepositoryError>;

    /// One owner's reports, newest first.
    async fn list_by_owner(&self, owner: &IdentityId) -> Result<Vec<Report>, RepositoryError>;

    /// Every report, newest first.
    async fn list_all(&self) -> Result<Vec<Report>, RepositoryError>;

    /// Change feed for live queries.
    fn subscribe(&self) -> broadcast::Receiver<ReportChange>;
}

pub type DynReportRepository = Arc<dyn ReportRepository>;

pub struct SqliteReportRepository {
    pool: DbPool,
    changes: broadcast::Sender<ReportChange>,
}

impl SqliteReportRepository {
    pub fn new(pool: DbPool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { pool, changes }
    }

    fn notify(&self, owner_id: IdentityId, report_id: ReportId) {
        let _ = self.changes.send(ReportChange {
            owner_id,
            report_id,
        });
    }

    fn owner_of(&self, id: &ReportId) -> Result<Option<IdentityId>, RepositoryError> {
        let conn = self.pool.get()?;
        let owner: Option<String> = conn
            .query_row(
                "SELECT owner_id FROM reports WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner.map(IdentityId::new))
    }

    fn query(&self, filter: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Report>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports {filter} ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt
            .query_map(args, ReportRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(ReportRow::into_report).collect()
    }
}

const REPORT_COLUMNS: &str = "id, owner_id, title, description, is_anonymous, \
     reporter_name, reporter_email, reporter_phone, reporter_national_id, \
     image, latitude, longitude, address, status, created_at, updated_at";

struct ReportRow {
    id: String,
    owner_id: String,
    title: String,
    description: String,
    is_anonymous: bool,
    reporter_name: Option<String>,
    reporter_email: Option<String>,
    reporter_phone: Option<String>,
    reporter_national_id: Option<String>,
    image: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    address: Option<String>,
    status: String,
    created_at: String,
    updated_at: String,
}

impl ReportRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            is_anonymous: row.get(4)?,
            reporter_name: row.get(5)?,
            reporter_email: row.get(6)?,
            reporter_phone: row.get(7)?,
            reporter_national_id: row.get(8)?,
            image: row.get(9)?,
            latitude: row.get(10)?,
            longitude: row.get(11)?,
            address: row.get(12)?,
            status: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    fn into_report(self) -> Result<Report, RepositoryError> {
        let reporter = match (
            self.reporter_name,
            self.reporter_email,
            self.reporter_phone,
            self.reporter_national_id,
        ) {
            (None, None, None, None) => None,
            (name, email, phone, national_id) => Some(ReporterIdentity {
                name: name.unwrap_or_default(),
                email: email.unwrap_or_default(),
                phone: phone.unwrap_or_default(),
                national_id: national_id.unwrap_or_default(),
            }),
        };

        let location = match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(ReportLocation {
                lat,
                lng,
                address: self.address.unwrap_or_default(),
            }),
            _ => None,
        };

        Ok(Report {
            id: ReportId::new(self.id),
            owner_id: IdentityId::new(self.owner_id),
            title: self.title,
            description: self.description,
            is_anonymous: self.is_anonymous,
            reporter,
            image: self.image,
            location,
            status: self.status.parse().map_err(RepositoryError::Corrupt)?,
            created_at: decode_time(&self.created_at)?,
            updated_at: decode_time(&self.updated_at)?,
        })
    }
}

#[async_trait]
impl ReportRepository for SqliteReportRepository {
    async fn insert(
        &self,
        owner: &IdentityId,
        draft: &ReportDraft,
    ) -> Result<Report, RepositoryError> {
        let id = ReportId::generate();
        let now = Utc::now();
        let reporter = draft.reporter.as_ref();
        let location = draft.location.as_ref();

        {
            let conn = self.pool.get()?;
            conn.execute(
                &format!(
                    "INSERT INTO reports ({REPORT_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)"
                ),
                params![
                    id.as_str(),
                    owner.as_str(),
                    draft.title,
                    draft.description,
                    draft.is_anonymous,
                    reporter.map(|r| r.name.as_str()),
                    reporter.map(|r| r.email.as_str()),
                    reporter.map(|r| r.phone.as_str()),
                    reporter.map(|r| r.national_id.as_str()),
                    draft.image,
                    location.map(|l| l.lat),
                    location.map(|l| l.lng),
                    location.map(|l| l.address.as_str()),
                    ReportStatus::Pending.as_str(),
                    encode_time(now),
                ],
            )?;
        }

        let report = self
            .get(&id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("reports/{id}")))?;
        self.notify(owner.clone(), id);
        Ok(report)
    }

    async fn get(&self, id: &ReportId) -> Result<Option<Report>, RepositoryError> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                &format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = ?1"),
                params![id.as_str()],
                ReportRow::from_row,
            )
            .optional()?;
        row.map(ReportRow::into_report).transpose()
    }

    async fn update_content(
        &self,
        id: &ReportId,
        draft: &ReportDraft,
    ) -> Result<(), RepositoryError> {
        let owner = self
            .owner_of(id)?
            .ok_or_else(|| RepositoryError::NotFound(format!("reports/{id}")))?;
        let reporter = draft.reporter.as_ref();
        let location = draft.location.as_ref();

        {
            let conn = self.pool.get()?;
            conn.execute(
                "UPDATE reports SET
                   title = ?2, description = ?3, is_anonymous = ?4,
                   reporter_name = ?5, reporter_email = ?6, reporter_phone = ?7,
                   reporter_national_id = ?8, image = ?9,
                   latitude = ?10, longitude = ?11, address = ?12,
                   updated_at = ?13
                 WHERE id = ?1",
                params![
                    id.as_str(),
                    draft.title,
                    draft.description,
                    draft.is_anonymous,
                    reporter.map(|r| r.name.as_str()),
                    reporter.map(|r| r.email.as_str()),
                    reporter.map(|r| r.phone.as_str()),
                    reporter.map(|r| r.national_id.as_str()),
                    draft.image,
                    location.map(|l| l.lat),
                    location.map(|l| l.lng),
                    location.map(|l| l.address.as_str()),
                    encode_time(Utc::now()),
                ],
            )?;
        }

        self.notify(owner, id.clone());
        Ok(())
    }

    async fn set_status(
        &self,
        id: &ReportId,
        status: ReportStatus,
    ) -> Result<(), RepositoryError> {
        let owner = self
            .owner_of(id)?
            .ok_or_else(|| RepositoryError::NotFound(format!("reports/{id}")))?;

        {
            let conn = self.pool.get()?;
            conn.execute(
                "UPDATE reports SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.as_str(), status.as_str(), encode_time(Utc::now())],
            )?;
        }

        self.notify(owner, id.clone());
        Ok(())
    }

    async fn delete(&self, id: &ReportId) -> Result<bool, RepositoryError> {
        let Some(owner) = self.owner_of(id)? else {
            return Ok(false);
        };

        let rows = {
            let conn = self.pool.get()?;
            conn.execute("DELETE FROM reports WHERE id = ?1", params![id.as_str()])?
        };

        if rows > 0 {
            self.notify(owner, id.clone());
        }
        Ok(rows > 0)
    }

    async fn list_by_owner(&self, owner: &IdentityId) -> Result<Vec<Report>, RepositoryError> {
        self.query("WHERE owner_id = ?1", &[&owner.as_str()])
    }

    async fn list_all(&self) -> Result<Vec<Report>, RepositoryError> {
        self.query("", &[])
    }

    fn subscribe(&self) -> broadcast::Receiver<ReportChange> {
        self.changes.subscribe()
    }
}
