use std::sync::Arc;
use tokio::sync::watch;

use crate::accounts::Account;
use crate::error::{AppError, AppResult};
use crate::identity::IdentityId;

/// The signed-in account of one client, shared by every component of that
/// client. Writes replace the previous value; the latest write wins.
#[derive(Clone)]
pub struct SessionContext {
    current: Arc<watch::Sender<Option<Account>>>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            current: Arc::new(current),
        }
    }

    pub fn current(&self) -> Option<Account> {
        self.current.borrow().clone()
    }

    pub fn identity(&self) -> Option<IdentityId> {
        self.current.borrow().as_ref().map(|a| a.id.clone())
    }

    pub fn is_signed_in_as(&self, id: &IdentityId) -> bool {
        self.current
            .borrow()
            .as_ref()
            .map(|a| &a.id == id)
            .unwrap_or(false)
    }

    pub fn establish(&self, account: Account) {
        tracing::debug!("Session established for {}", account.id);
        self.current.send_replace(Some(account));
    }

    /// Tear down the session, returning the account that was signed in.
    pub fn clear(&self) -> Option<Account> {
        let previous = self.current.send_replace(None);
        if let Some(ref account) = previous {
            tracing::debug!("Session cleared for {}", account.id);
        }
        previous
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Account>> {
        self.current.subscribe()
    }

    pub fn require(&self) -> AppResult<Account> {
        self.current().ok_or(AppError::Unauthenticated)
    }

    pub fn require_admin(&self) -> AppResult<Account> {
        let account = self.require()?;
        if !account.is_admin() {
            tracing::warn!("Non-admin {} attempted a moderation action", account.id);
            return Err(AppError::Forbidden);
        }
        Ok(account)
    }
}
