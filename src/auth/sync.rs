use tokio::sync::broadcast;

use super::session::SessionContext;
use crate::accounts::DynAccountRepository;
use crate::identity::{AuthStateChange, DynIdentityService, IdentityId};
use crate::task::TaskGuard;

/// Keeps a client's session in line with the identity provider. Dropping the
/// handle stops the listener.
pub struct SyncHandle {
    guard: TaskGuard,
}

impl SyncHandle {
    pub fn is_active(&self) -> bool {
        !self.guard.is_finished()
    }

    pub fn stop(self) {
        drop(self);
    }
}

pub(super) fn spawn(
    identity: DynIdentityService,
    accounts: DynAccountRepository,
    session: SessionContext,
) -> SyncHandle {
    // Subscribe here rather than inside the task so events published right
    // after this call are not missed.
    let events = identity.subscribe();
    let task = tokio::spawn(run(identity, accounts, session, events));
    SyncHandle {
        guard: TaskGuard::new(task),
    }
}

async fn run(
    identity: DynIdentityService,
    accounts: DynAccountRepository,
    session: SessionContext,
    mut events: broadcast::Receiver<AuthStateChange>,
) {
    loop {
        let change = match events.recv().await {
            Ok(change) => change,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!("Auth-state feed lagged by {} events", missed);
                if let Some(current) = session.identity() {
                    revalidate(&identity, &accounts, &session, &current).await;
                }
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        // Events about other people are not ours to act on.
        if !session.is_signed_in_as(change.identity()) {
            continue;
        }

        match change {
            AuthStateChange::SignedOut(id) => {
                session.clear();
                tracing::info!("Identity {} signed out by the backend", id);
            }
            AuthStateChange::SignedIn(id) | AuthStateChange::Refreshed(id) => {
                revalidate(&identity, &accounts, &session, &id).await;
            }
        }
    }

    tracing::debug!("Auth-state listener stopped");
}

/// Re-read the account behind the session and end the session if it is
/// blocked or gone.
async fn revalidate(
    identity: &DynIdentityService,
    accounts: &DynAccountRepository,
    session: &SessionContext,
    id: &IdentityId,
) {
    match accounts.get(id).await {
        Ok(Some(account)) if account.is_blocked => {
            if session.is_signed_in_as(id) {
                session.clear();
            }
            tracing::info!("Account {} is blocked, session ended", id);
            if let Err(e) = identity.sign_out(id).await {
                tracing::warn!("Sign-out of blocked identity {} failed: {}", id, e);
            }
        }
        Ok(Some(account)) => {
            // The user may have logged out while the read was in flight.
            if session.is_signed_in_as(id) {
                session.establish(account);
            }
        }
        Ok(None) => {
            if session.is_signed_in_as(id) {
                session.clear();
            }
            tracing::warn!("Account {} no longer exists, session ended", id);
        }
        Err(e) => tracing::error!("Could not re-validate session for {}: {}", id, e),
    }
}
