use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::WatchStream;

use super::{DynReportRepository, Report, ReportChange};
use crate::auth::session::SessionContext;
use crate::db::RepositoryError;
use crate::identity::IdentityId;
use crate::task::TaskGuard;

/// Live view of one owner's reports, newest first.
///
/// The view belongs to the session that opened it: once that session ends or
/// switches to another identity, a final empty snapshot is published and the
/// subscription stops.
pub struct ReportSubscription {
    snapshots: watch::Receiver<Vec<Report>>,
    guard: TaskGuard,
}

impl ReportSubscription {
    pub(crate) async fn open(
        repo: DynReportRepository,
        session: SessionContext,
        viewer: IdentityId,
        owner: IdentityId,
    ) -> Result<Self, RepositoryError> {
        // Subscribe before the first read so no change slips between the two.
        let changes = repo.subscribe();
        let initial = repo.list_by_owner(&owner).await?;
        let (tx, snapshots) = watch::channel(initial);

        let task = tokio::spawn(run(repo, session, viewer, owner, changes, tx));
        Ok(Self {
            snapshots,
            guard: TaskGuard::new(task),
        })
    }

    /// Most recent snapshot.
    pub fn latest(&self) -> Vec<Report> {
        self.snapshots.borrow().clone()
    }

    /// Wait for the next snapshot. `None` once the subscription has ended and
    /// every snapshot was seen.
    pub async fn next(&mut self) -> Option<Vec<Report>> {
        self.snapshots.changed().await.ok()?;
        Some(self.snapshots.borrow_and_update().clone())
    }

    pub fn is_active(&self) -> bool {
        !self.guard.is_finished()
    }

    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Stream of snapshots, starting with the current one.
    pub fn into_stream(self) -> ReportStream {
        ReportStream {
            inner: WatchStream::new(self.snapshots),
            _guard: self.guard,
        }
    }
}

pub struct ReportStream {
    inner: WatchStream<Vec<Report>>,
    _guard: TaskGuard,
}

impl Stream for ReportStream {
    type Item = Vec<Report>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

async fn run(
    repo: DynReportRepository,
    session: SessionContext,
    viewer: IdentityId,
    owner: IdentityId,
    mut changes: broadcast::Receiver<ReportChange>,
    tx: watch::Sender<Vec<Report>>,
) {
    let mut session_rx = session.subscribe();

    loop {
        if !session.is_signed_in_as(&viewer) {
            break;
        }

        tokio::select! {
            change = changes.recv() => {
                let relevant = match change {
                    Ok(change) => change.owner_id == owner,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!("Report feed lagged by {} changes, re-reading", missed);
                        true
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if relevant {
                    match repo.list_by_owner(&owner).await {
                        Ok(reports) => {
                            tx.send_replace(reports);
                        }
                        Err(e) => tracing::error!("Failed to refresh reports for {}: {}", owner, e),
                    }
                }
            }
            changed = session_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tx.closed() => return,
        }
    }

    tracing::debug!("Report subscription for {} ended", owner);
    tx.send_replace(Vec::new());
}
