//! Location attachment registry
//!
//! Binds devices to locations and keeps every viewer's picture of "which
//! screens are attached where, and which are live" consistent. The merged
//! screen list joins persisted rows with live registry state: the registry
//! is authoritative for `connected` in every returned or broadcast view,
//! because the persisted flag may lag until the disconnect event settles.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::config::HubConfig;
use crate::error::{Error, Result};
use crate::identity::CallerIdentity;
use crate::registry::{Attached, ConnectionRegistry, Event, RoomId, ScreenView, ScreensList, SessionIdentity};
use crate::store::{bounded, Device, DeviceId, LocationId, RecordStore};

/// Attach/detach operations and the merged screen list
pub struct AttachmentRegistry {
    store: Arc<dyn RecordStore>,
    screens: Arc<ConnectionRegistry>,
    viewers: Arc<ConnectionRegistry>,

    /// Serializes the read-decide-write sections so two concurrent
    /// attaches for the same code settle deterministically: one wins, the
    /// other observes the winner's write.
    mutate: Mutex<()>,

    store_timeout: Duration,
}

impl AttachmentRegistry {
    pub fn new(
        store: Arc<dyn RecordStore>,
        screens: Arc<ConnectionRegistry>,
        viewers: Arc<ConnectionRegistry>,
        config: &HubConfig,
    ) -> Self {
        Self {
            store,
            screens,
            viewers,
            mutate: Mutex::new(()),
            store_timeout: config.store_timeout,
        }
    }

    /// The merged screen list for a location
    ///
    /// Persisted rows overlaid with live presence; a row whose connection
    /// is not actually in the room reads `connected: false` regardless of
    /// the stored flag.
    pub async fn list_screens(&self, location_id: LocationId) -> Result<Vec<ScreenView>> {
        bounded(self.store_timeout, self.store.find_location(location_id))
            .await?
            .ok_or_else(|| Error::not_found("location"))?;

        self.merged_view(location_id).await
    }

    /// Attach a connected, unattached device to a location by its code
    pub async fn attach(
        &self,
        location_id: LocationId,
        code: &str,
        name: &str,
        caller: &CallerIdentity,
    ) -> Result<ScreenView> {
        let _guard = self.mutate.lock().await;

        let location = bounded(self.store_timeout, self.store.find_location(location_id))
            .await?
            .ok_or_else(|| Error::not_found("location"))?;

        let device = bounded(self.store_timeout, self.store.find_device_by_code(code))
            .await?
            .ok_or_else(|| Error::not_found("screen"))?;

        if device.location_id.is_some() {
            return Err(Error::unavailable("screen is already attached"));
        }
        if !device.connected {
            return Err(Error::unavailable("screen is not connected"));
        }
        let connection_id = self
            .screens
            .find_by_token(&device.session_token)
            .await
            .ok_or_else(|| Error::unavailable("screen has no live connection"))?;

        let mut updated = device;
        updated.location_id = Some(location_id);
        updated.name = Some(name.to_owned());
        bounded(self.store_timeout, self.store.update_device(&updated)).await?;

        self.screens
            .join(connection_id, RoomId::location(location_id))
            .await;
        self.screens
            .send(
                connection_id,
                Event::Attached(Attached {
                    location_name: location.name.clone(),
                    device_name: updated.name.clone(),
                }),
            )
            .await;

        self.broadcast_screens(location_id).await?;

        tracing::info!(
            location_id = location_id,
            device_id = updated.id,
            code = %code,
            caller = %caller.username,
            "screen attached"
        );

        let connected = self.screens.is_live(connection_id).await;
        Ok(screen_view(&updated, connected))
    }

    /// Detach a device from its location
    ///
    /// A device with a voter assigned is mid-interaction and cannot be
    /// detached.
    pub async fn detach(
        &self,
        location_id: LocationId,
        screen_id: DeviceId,
        caller: &CallerIdentity,
    ) -> Result<()> {
        let _guard = self.mutate.lock().await;

        bounded(self.store_timeout, self.store.find_location(location_id))
            .await?
            .ok_or_else(|| Error::not_found("location"))?;

        let device = bounded(self.store_timeout, self.store.find_device(screen_id))
            .await?
            .filter(|d| d.is_at(location_id))
            .ok_or_else(|| Error::not_found("screen"))?;

        if device.voter_id.is_some() {
            return Err(Error::conflict("screen has a voting interaction in progress"));
        }

        let connection_id = self.screens.find_by_token(&device.session_token).await;
        if let Some(connection_id) = connection_id {
            self.screens
                .leave(connection_id, &RoomId::location(location_id))
                .await;
            self.screens
                .send(
                    connection_id,
                    Event::NewSession(SessionIdentity::from_device(&device)),
                )
                .await;
        }

        let mut updated = device;
        updated.location_id = None;
        updated.name = None;
        updated.connected = connection_id.is_some();
        bounded(self.store_timeout, self.store.update_device(&updated)).await?;

        self.broadcast_screens(location_id).await?;

        tracing::info!(
            location_id = location_id,
            device_id = screen_id,
            caller = %caller.username,
            "screen detached"
        );
        Ok(())
    }

    /// Recompute a location's merged list and broadcast it to the viewer
    /// room
    ///
    /// Called strictly after the triggering store write and registry
    /// update, so viewers never observe a list that contradicts a
    /// committed mutation.
    pub async fn broadcast_screens(&self, location_id: LocationId) -> Result<usize> {
        let screens = self.merged_view(location_id).await?;
        let delivered = self
            .viewers
            .broadcast(
                &RoomId::location(location_id),
                Event::ScreensList(ScreensList {
                    location_id,
                    screens,
                }),
            )
            .await;
        Ok(delivered)
    }

    /// Build the `screens-list` payload for one location without
    /// broadcasting it; the viewer protocol uses this for snapshots
    pub async fn snapshot(&self, location_id: LocationId) -> Result<ScreensList> {
        Ok(ScreensList {
            location_id,
            screens: self.merged_view(location_id).await?,
        })
    }

    async fn merged_view(&self, location_id: LocationId) -> Result<Vec<ScreenView>> {
        let devices = bounded(self.store_timeout, self.store.devices_at(location_id)).await?;
        let live = self.screens.devices_in(&RoomId::location(location_id)).await;
        Ok(overlay(devices, &live))
    }
}

/// Overlay live presence onto persisted rows
fn overlay(devices: Vec<Device>, live: &HashSet<DeviceId>) -> Vec<ScreenView> {
    devices
        .into_iter()
        .map(|d| {
            let connected = live.contains(&d.id);
            screen_view(&d, connected)
        })
        .collect()
}

fn screen_view(device: &Device, connected: bool) -> ScreenView {
    ScreenView {
        id: device.id,
        name: device.name.clone(),
        connected,
        voter_id: device.voter_id,
    }
}
