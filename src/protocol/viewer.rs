//! Viewer protocol
//!
//! Administrative-namespace connections subscribe to location rooms and
//! receive `screens-list` snapshots and broadcasts. A viewer whose caller
//! identity carries an assigned location is joined to that room on
//! connect; a privileged viewer may join every location room at once.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::HubConfig;
use crate::error::{Error, Result};
use crate::identity::CallerIdentity;
use crate::location::AttachmentRegistry;
use crate::registry::{ConnectionId, ConnectionRegistry, Event, EventReceiver, RoomId};
use crate::store::{bounded, LocationId, RecordStore};

/// Handles viewer subscriptions
pub struct ViewerProtocol {
    viewers: Arc<ConnectionRegistry>,
    store: Arc<dyn RecordStore>,
    attachments: Arc<AttachmentRegistry>,
    store_timeout: Duration,
}

impl ViewerProtocol {
    pub fn new(
        viewers: Arc<ConnectionRegistry>,
        store: Arc<dyn RecordStore>,
        attachments: Arc<AttachmentRegistry>,
        config: &HubConfig,
    ) -> Self {
        Self {
            viewers,
            store,
            attachments,
            store_timeout: config.store_timeout,
        }
    }

    /// Register a viewer connection
    ///
    /// Auto-joins the caller's assigned location, if any, delivering the
    /// initial snapshot.
    pub async fn connect(
        &self,
        connection_id: ConnectionId,
        caller: &CallerIdentity,
    ) -> Result<EventReceiver> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.viewers.register_viewer(connection_id, tx).await;

        if let Some(location_id) = caller.location_id {
            self.join_location(connection_id, location_id).await?;
        }

        tracing::info!(
            connection_id = connection_id,
            caller = %caller.username,
            "viewer connected"
        );
        Ok(rx)
    }

    /// Unregister a viewer connection
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        self.viewers.unregister(connection_id).await;
        tracing::debug!(connection_id = connection_id, "viewer disconnected");
    }

    /// Subscribe a viewer to one location's room
    ///
    /// Sends the current merged screen list immediately, so the dashboard
    /// renders without waiting for the next mutation.
    pub async fn join_location(
        &self,
        connection_id: ConnectionId,
        location_id: LocationId,
    ) -> Result<()> {
        bounded(self.store_timeout, self.store.find_location(location_id))
            .await?
            .ok_or_else(|| Error::not_found("location"))?;

        self.viewers
            .join(connection_id, RoomId::location(location_id))
            .await;

        let snapshot = self.attachments.snapshot(location_id).await?;
        self.viewers
            .send(connection_id, Event::ScreensList(snapshot))
            .await;
        Ok(())
    }

    /// Subscribe a privileged viewer to every location's room
    ///
    /// Returns the number of rooms joined. Each joined room delivers its
    /// initial snapshot.
    pub async fn join_all(
        &self,
        connection_id: ConnectionId,
        caller: &CallerIdentity,
    ) -> Result<usize> {
        if !caller.privileged {
            return Err(Error::unavailable("caller is not privileged"));
        }

        let locations = bounded(self.store_timeout, self.store.list_locations()).await?;
        for location in &locations {
            self.viewers
                .join(connection_id, RoomId::location(location.id))
                .await;
            let snapshot = self.attachments.snapshot(location.id).await?;
            self.viewers
                .send(connection_id, Event::ScreensList(snapshot))
                .await;
        }

        tracing::info!(
            connection_id = connection_id,
            caller = %caller.username,
            rooms = locations.len(),
            "viewer joined all location rooms"
        );
        Ok(locations.len())
    }
}
