//! Voting workflow signaling
//!
//! Targeted commands driving one terminal's voting interaction. Every
//! command re-resolves the device's live connection through the registry by
//! its current session token at call time; a connection reference is never
//! cached across calls, because a reconnect may have replaced the physical
//! connection between commands.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::HubConfig;
use crate::error::{Error, Result};
use crate::registry::{ConnectionId, ConnectionRegistry, Event};
use crate::store::{bounded, Device, DeviceId, LocationId, RecordStore, StoreError, VoterId};

use super::ballot::BallotProvider;

/// One entry in the append-only audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub action: String,
    pub location_id: LocationId,
    pub device_id: DeviceId,
    pub voter_id: Option<VoterId>,
}

/// External append-only audit log
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> std::result::Result<(), StoreError>;
}

/// Audit log that drops every entry; for deployments that audit upstream
pub struct NoopAuditLog;

#[async_trait]
impl AuditLog for NoopAuditLog {
    async fn append(&self, _entry: AuditEntry) -> std::result::Result<(), StoreError> {
        Ok(())
    }
}

/// Sends voting-workflow commands to terminals
pub struct VoteSignaling {
    store: Arc<dyn RecordStore>,
    screens: Arc<ConnectionRegistry>,
    ballots: Arc<dyn BallotProvider>,
    audit: Arc<dyn AuditLog>,
    store_timeout: Duration,
}

impl VoteSignaling {
    pub fn new(
        store: Arc<dyn RecordStore>,
        screens: Arc<ConnectionRegistry>,
        ballots: Arc<dyn BallotProvider>,
        audit: Arc<dyn AuditLog>,
        config: &HubConfig,
    ) -> Self {
        Self {
            store,
            screens,
            ballots,
            audit,
            store_timeout: config.store_timeout,
        }
    }

    /// Send the ballot to a device's terminal
    ///
    /// Requires an open location, an attached and connected device, and an
    /// assigned voter.
    pub async fn show_vote(&self, location_id: LocationId, screen_id: DeviceId) -> Result<()> {
        let (device, connection_id) = self.resolve(location_id, screen_id, true).await?;

        let ballot = bounded(self.store_timeout, self.ballots.ballot_for(location_id)).await?;

        if !self.screens.send(connection_id, Event::ShowVote { ballot }).await {
            return Err(Error::not_found("live connection"));
        }

        tracing::info!(
            location_id = location_id,
            device_id = device.id,
            voter_id = ?device.voter_id,
            "ballot shown"
        );
        Ok(())
    }

    /// Signal the terminal to commit the current interaction
    ///
    /// Appends an audit entry before signaling. Does not clear `voter_id`;
    /// the external voter-assignment workflow owns that.
    pub async fn submit_vote(&self, location_id: LocationId, screen_id: DeviceId) -> Result<()> {
        let (device, connection_id) = self.resolve(location_id, screen_id, true).await?;

        bounded(
            self.store_timeout,
            self.audit.append(AuditEntry {
                action: "submit-vote".to_owned(),
                location_id,
                device_id: device.id,
                voter_id: device.voter_id,
            }),
        )
        .await?;

        if !self.screens.send(connection_id, Event::SubmitVote).await {
            return Err(Error::not_found("live connection"));
        }

        tracing::info!(
            location_id = location_id,
            device_id = device.id,
            voter_id = ?device.voter_id,
            "vote submission signaled"
        );
        Ok(())
    }

    /// Signal the terminal to abort the current interaction
    pub async fn cancel_vote(&self, location_id: LocationId, screen_id: DeviceId) -> Result<()> {
        let (device, connection_id) = self.resolve(location_id, screen_id, false).await?;

        if !self.screens.send(connection_id, Event::CancelVote).await {
            return Err(Error::not_found("live connection"));
        }

        tracing::info!(
            location_id = location_id,
            device_id = device.id,
            "vote cancellation signaled"
        );
        Ok(())
    }

    /// Common precondition check for all three commands
    async fn resolve(
        &self,
        location_id: LocationId,
        screen_id: DeviceId,
        require_voter: bool,
    ) -> Result<(Device, ConnectionId)> {
        let location = bounded(self.store_timeout, self.store.find_location(location_id))
            .await?
            .ok_or_else(|| Error::not_found("location"))?;
        if !location.open {
            return Err(Error::unavailable("location is closed"));
        }

        let device = bounded(self.store_timeout, self.store.find_device(screen_id))
            .await?
            .filter(|d| d.is_at(location_id))
            .ok_or_else(|| Error::not_found("screen"))?;

        if require_voter && device.voter_id.is_none() {
            return Err(Error::conflict("no voter assigned to screen"));
        }

        let connection_id = self
            .screens
            .find_by_token(&device.session_token)
            .await
            .ok_or_else(|| Error::not_found("live connection"))?;

        Ok((device, connection_id))
    }
}
