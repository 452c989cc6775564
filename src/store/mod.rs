//! Durable record store seam
//!
//! The relational database is an external collaborator; the hub sees it
//! only through the [`RecordStore`] trait. [`MemoryStore`] is the
//! in-process implementation used by tests and single-process deployments,
//! with the same unique-index semantics a constraint-backed store has, so
//! callers exercise the real insert-then-retry paths.

pub mod error;
pub mod memory;
pub mod record;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use record::{Device, DeviceId, Location, LocationId, VoterId};

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

/// Run a store call under a timeout, mapping failures into the crate
/// taxonomy
///
/// A stalled store must not wedge callers; an elapsed timeout surfaces as
/// `Error::StoreUnavailable`.
pub(crate) async fn bounded<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<T, StoreError>>,
) -> crate::error::Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.into()),
        Err(_) => Err(crate::error::Error::StoreUnavailable(
            "store call timed out".to_owned(),
        )),
    }
}

/// Find/create/update access to the persisted rows
///
/// Implementations must enforce unique indexes on `session_token` and
/// `code`, surfacing collisions as [`StoreError::UniqueViolation`]; the
/// code generator relies on that rather than pre-checking.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a device by surrogate key
    async fn find_device(&self, id: DeviceId) -> Result<Option<Device>, StoreError>;

    /// Fetch a device by its session token
    async fn find_device_by_token(&self, token: &str) -> Result<Option<Device>, StoreError>;

    /// Fetch a device by its code, case-insensitively
    async fn find_device_by_code(&self, code: &str) -> Result<Option<Device>, StoreError>;

    /// Atomically fetch the device holding `token`, creating the row if it
    /// does not exist yet
    ///
    /// Returns the device and whether it was created by this call. Two
    /// racing creates for the same token must resolve to one row (unique
    /// index on `session_token`), with the loser fetching the winner's row.
    async fn create_or_find_device(&self, token: &str) -> Result<(Device, bool), StoreError>;

    /// Write back a full device row
    async fn update_device(&self, device: &Device) -> Result<(), StoreError>;

    /// Set only the `connected` flag
    async fn set_connected(&self, id: DeviceId, connected: bool) -> Result<(), StoreError>;

    /// Assign a code to a device that does not have one yet
    ///
    /// Fails with [`StoreError::UniqueViolation`] if another device already
    /// holds `code`.
    async fn assign_code(&self, id: DeviceId, code: &str) -> Result<(), StoreError>;

    /// All devices attached to a location
    async fn devices_at(&self, location_id: LocationId) -> Result<Vec<Device>, StoreError>;

    /// Fetch a location by surrogate key
    async fn find_location(&self, id: LocationId) -> Result<Option<Location>, StoreError>;

    /// All locations
    async fn list_locations(&self) -> Result<Vec<Location>, StoreError>;

    /// Clear the `connected` flag on every device
    ///
    /// Called at process startup: live-connection state died with the
    /// previous process, so persisted flags from it are ghosts.
    async fn reset_connected(&self) -> Result<(), StoreError>;
}
