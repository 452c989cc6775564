//! Reconciliation protocol
//!
//! Runs once per new terminal connection: resolve the presented session
//! token against the durable store (or issue a fresh identity), register
//! the connection, replay room membership, and emit the identity and
//! attach events in program order. The per-connection channel preserves
//! that order: identity before attach-replay before vote-replay.
//!
//! Lifecycle per connection:
//! `Connecting -> Reconciled -> (Attached | Unattached) -> Disconnected`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::HubConfig;
use crate::error::Result;
use crate::location::AttachmentRegistry;
use crate::registry::{
    Attached, ConnectionId, ConnectionRegistry, Event, EventReceiver, RoomId, SessionIdentity,
};
use crate::session::SessionStore;
use crate::store::{bounded, Device, LocationId, RecordStore};
use crate::vote::BallotProvider;

/// What a terminal presents when it opens a connection
///
/// `session_token` is absent on a first-ever connect.
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    pub session_token: Option<String>,
}

impl Handshake {
    /// Handshake presenting a previously issued token
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            session_token: Some(token.into()),
        }
    }
}

/// Drives the per-connection reconciliation lifecycle
pub struct Reconciler {
    sessions: Arc<SessionStore>,
    screens: Arc<ConnectionRegistry>,
    store: Arc<dyn RecordStore>,
    ballots: Arc<dyn BallotProvider>,
    attachments: Arc<AttachmentRegistry>,
    store_timeout: Duration,
}

impl Reconciler {
    pub fn new(
        sessions: Arc<SessionStore>,
        screens: Arc<ConnectionRegistry>,
        store: Arc<dyn RecordStore>,
        ballots: Arc<dyn BallotProvider>,
        attachments: Arc<AttachmentRegistry>,
        config: &HubConfig,
    ) -> Self {
        Self {
            sessions,
            screens,
            store,
            ballots,
            attachments,
            store_timeout: config.store_timeout,
        }
    }

    /// Reconcile a freshly opened terminal connection
    ///
    /// A store failure here rejects the connection attempt; the terminal
    /// retries the transport-level connect with backoff.
    pub async fn connect(
        &self,
        connection_id: ConnectionId,
        handshake: Handshake,
    ) -> Result<(Device, EventReceiver)> {
        let (device, epoch) = self
            .sessions
            .reconcile(handshake.session_token.as_deref())
            .await?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.screens
            .register_device(connection_id, &device, epoch, tx)
            .await;
        self.screens
            .send(
                connection_id,
                Event::SessionIdentity(SessionIdentity::from_device(&device)),
            )
            .await;

        if let Some(location_id) = device.location_id {
            self.replay_attachment(connection_id, &device, location_id)
                .await?;
        }

        tracing::info!(
            connection_id = connection_id,
            device_id = device.id,
            attached = device.location_id.is_some(),
            "terminal connected"
        );
        Ok((device, rx))
    }

    /// Handle a terminal connection closing
    ///
    /// The epoch stamped at registration guards the flag write: a
    /// disconnect that arrives after the terminal already reconnected is a
    /// no-op. Viewers of the device's location see the updated list either
    /// way once the flag settles.
    pub async fn disconnect(&self, connection_id: ConnectionId) -> Result<()> {
        let Some(entry) = self.screens.unregister(connection_id).await else {
            return Ok(());
        };
        let (Some(device_id), Some(epoch)) = (entry.device_id, entry.epoch) else {
            return Ok(());
        };

        self.sessions.mark_disconnected(device_id, epoch).await?;

        let device = bounded(self.store_timeout, self.store.find_device(device_id)).await?;
        if let Some(location_id) = device.and_then(|d| d.location_id) {
            self.attachments.broadcast_screens(location_id).await?;
        }

        tracing::info!(
            connection_id = connection_id,
            device_id = device_id,
            "terminal disconnected"
        );
        Ok(())
    }

    /// Rejoin a reconnecting terminal to its location room and replay the
    /// attach (and, mid-interaction, the ballot) so it resumes without
    /// operator intervention
    async fn replay_attachment(
        &self,
        connection_id: ConnectionId,
        device: &Device,
        location_id: LocationId,
    ) -> Result<()> {
        let location = bounded(self.store_timeout, self.store.find_location(location_id)).await?;
        let Some(location) = location else {
            // Data integrity issue, not fatal to the connection.
            tracing::warn!(
                device_id = device.id,
                location_id = location_id,
                "device references missing location, skipping attach replay"
            );
            return Ok(());
        };

        self.screens
            .join(connection_id, RoomId::location(location_id))
            .await;
        self.screens
            .send(
                connection_id,
                Event::Attached(Attached {
                    location_name: location.name,
                    device_name: device.name.clone(),
                }),
            )
            .await;

        if device.voter_id.is_some() {
            match bounded(self.store_timeout, self.ballots.ballot_for(location_id)).await {
                Ok(ballot) => {
                    self.screens
                        .send(connection_id, Event::ShowVote { ballot })
                        .await;
                }
                Err(err) => {
                    tracing::warn!(
                        device_id = device.id,
                        error = %err,
                        "ballot replay failed, terminal resumes without it"
                    );
                }
            }
        }

        // Reconnect flips the live side of the merged list; let the
        // location's viewers see it without waiting for the next mutation.
        self.attachments.broadcast_screens(location_id).await?;
        Ok(())
    }
}
