use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

#[derive(Debug, Error)]
pub enum LocationError {
    #[error("Location services are disabled")]
    ServicesDisabled,

    #[error("Position unavailable: {0}")]
    Unavailable(String),

    #[error("No position fix within {0:?}")]
    Timeout(Duration),
}

/// Device location, behind the platform's foreground permission prompt.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn request_permission(&self) -> PermissionStatus;

    /// One best-effort position read.
    async fn current_position(&self) -> Result<Coordinates, LocationError>;
}

pub type DynLocationProvider = Arc<dyn LocationProvider>;

/// Read the current position, giving up after `limit`.
pub async fn read_position(
    provider: &dyn LocationProvider,
    limit: Duration,
) -> Result<Coordinates, LocationError> {
    match tokio::time::timeout(limit, provider.current_position()).await {
        Ok(result) => result,
        Err(_) => Err(LocationError::Timeout(limit)),
    }
}
