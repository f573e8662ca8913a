use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::accounts::{AdminAllowList, DynAccountRepository, SqliteAccountRepository};
use crate::admin::AdminModeration;
use crate::auth::session::SessionContext;
use crate::auth::AccessControl;
use crate::config::Config;
use crate::db;
use crate::dispatch::channels::{DynLinkOpener, DynSmsGateway};
use crate::dispatch::location::DynLocationProvider;
use crate::dispatch::DispatchEngine;
use crate::identity::{DynIdentityService, SqliteIdentityService};
use crate::reports::{DynReportRepository, ReportStore, SqliteReportRepository};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Backend shared by every client: storage, identity provider and config.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub identity: DynIdentityService,
    pub accounts: DynAccountRepository,
    pub reports: DynReportRepository,
}

/// Services for one signed-in device. All of them share one session.
#[derive(Clone)]
pub struct Client {
    pub session: SessionContext,
    pub access: AccessControl,
    pub reports: ReportStore,
    pub admin: AdminModeration,
}

impl AppState {
    /// Open the database at the configured path and run migrations.
    pub fn open(config: &Config) -> anyhow::Result<Self> {
        let pool = db::create_pool(&config.db_path())?;
        db::run_migrations(&pool)?;
        Ok(Self::with_pool(pool, config.clone()))
    }

    pub fn with_pool(db: DbPool, config: Config) -> Self {
        let identity: DynIdentityService = Arc::new(SqliteIdentityService::new(
            db.clone(),
            config.identity.clone(),
        ));
        let accounts: DynAccountRepository = Arc::new(SqliteAccountRepository::new(db.clone()));
        let reports: DynReportRepository = Arc::new(SqliteReportRepository::new(db.clone()));

        Self {
            db,
            config,
            identity,
            accounts,
            reports,
        }
    }

    /// A fresh client with no session.
    pub fn client(&self) -> Client {
        let session = SessionContext::new();
        let access = AccessControl::new(
            self.identity.clone(),
            self.accounts.clone(),
            session.clone(),
            AdminAllowList::new(&self.config.access.admin_emails),
        );
        let reports = ReportStore::new(self.reports.clone(), session.clone());
        let admin = AdminModeration::new(access.clone(), self.reports.clone());

        Client {
            session,
            access,
            reports,
            admin,
        }
    }

    pub fn dispatch_engine(
        &self,
        location: DynLocationProvider,
        sms: DynSmsGateway,
        links: DynLinkOpener,
    ) -> DispatchEngine {
        DispatchEngine::new(location, sms, links, self.config.dispatch.clone())
    }
}
