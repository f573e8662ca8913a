use super::{DynReportRepository, Report, ReportDraft, ReportId, ReportSubscription, ReporterIdentity};
use crate::accounts::Account;
use crate::auth::session::SessionContext;
use crate::error::{AppError, AppResult};
use crate::identity::IdentityId;

/// Report operations on behalf of the signed-in user.
///
/// Every write goes through [`ReportDraft::prepare`], so anonymous reports are
/// stored without reporter identity or location whatever the caller sent.
/// Admin moderation deletes through the repository directly and does not pass
/// through here.
#[derive(Clone)]
pub struct ReportStore {
    repo: DynReportRepository,
    session: SessionContext,
}

impl ReportStore {
    pub fn new(repo: DynReportRepository, session: SessionContext) -> Self {
        Self { repo, session }
    }

    pub async fn add_report(&self, draft: ReportDraft) -> AppResult<ReportId> {
        let author = self.session.require()?;
        let draft = draft
            .prepare(Some(ReporterIdentity::from(&author)))
            .map_err(AppError::Validation)?;

        let report = self.repo.insert(&author.id, &draft).await?;
        tracing::info!(
            "Report {} filed by {} (anonymous: {})",
            report.id,
            author.id,
            report.is_anonymous
        );
        Ok(report.id)
    }

    pub async fn get_report(&self, id: &ReportId) -> AppResult<Report> {
        let (_, report) = self.load_authorized(id).await?;
        Ok(report)
    }

    pub async fn update_report(&self, id: &ReportId, draft: ReportDraft) -> AppResult<()> {
        let (_, existing) = self.load_authorized(id).await?;
        let draft = draft
            .prepare(existing.reporter)
            .map_err(AppError::Validation)?;

        self.repo.update_content(id, &draft).await?;
        tracing::info!("Report {} updated", id);
        Ok(())
    }

    pub async fn delete_report(&self, id: &ReportId) -> AppResult<()> {
        let (actor, _) = self.load_authorized(id).await?;
        if !self.repo.delete(id).await? {
            return Err(AppError::NotFound);
        }
        tracing::info!("Report {} deleted by {}", id, actor.id);
        Ok(())
    }

    /// Live, newest-first view of `owner`'s reports for the current session.
    /// Users may only watch their own reports; admins may watch anyone's.
    pub async fn watch_reports(&self, owner: &IdentityId) -> AppResult<ReportSubscription> {
        let viewer = self.session.require()?;
        if &viewer.id != owner && !viewer.is_admin() {
            tracing::warn!("{} tried to watch reports of {}", viewer.id, owner);
            return Err(AppError::Forbidden);
        }

        let subscription = ReportSubscription::open(
            self.repo.clone(),
            self.session.clone(),
            viewer.id,
            owner.clone(),
        )
        .await?;
        Ok(subscription)
    }

    /// Load a report and check that the session may act on it.
    async fn load_authorized(&self, id: &ReportId) -> AppResult<(Account, Report)> {
        let actor = self.session.require()?;
        let report = self.repo.get(id).await?.ok_or(AppError::NotFound)?;

        if report.owner_id != actor.id && !actor.is_admin() {
            tracing::warn!("{} denied access to report {}", actor.id, id);
            return Err(AppError::Forbidden);
        }
        Ok((actor, report))
    }
}
