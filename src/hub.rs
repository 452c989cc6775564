//! Hub facade
//!
//! Owns the wiring: the durable store seam, one connection registry per
//! namespace, the session store, and the protocol components. The
//! embedding transport layer (out of scope here) accepts sockets, calls
//! `connect_screen`/`connect_viewer`, pumps each returned event receiver
//! to its peer, and reports closes back via the disconnect methods.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::HubConfig;
use crate::error::Result;
use crate::identity::CallerIdentity;
use crate::location::AttachmentRegistry;
use crate::protocol::{Handshake, Reconciler, ViewerProtocol};
use crate::registry::{ConnectionId, ConnectionRegistry, EventReceiver, ScreenView};
use crate::session::SessionStore;
use crate::store::{bounded, Device, DeviceId, LocationId, RecordStore};
use crate::vote::{AuditLog, BallotProvider, VoteSignaling};

/// A reconciled terminal connection, handed to the transport layer
#[derive(Debug)]
pub struct ScreenConnection {
    pub connection_id: ConnectionId,
    pub device: Device,
    pub events: EventReceiver,
}

/// A registered viewer connection
#[derive(Debug)]
pub struct ViewerConnection {
    pub connection_id: ConnectionId,
    pub events: EventReceiver,
}

/// Central coordination hub for screens, viewers, and the voting workflow
pub struct Hub {
    config: HubConfig,
    store: Arc<dyn RecordStore>,
    screens: Arc<ConnectionRegistry>,
    viewers: Arc<ConnectionRegistry>,
    sessions: Arc<SessionStore>,
    attachments: Arc<AttachmentRegistry>,
    reconciler: Reconciler,
    viewer_protocol: ViewerProtocol,
    signaling: VoteSignaling,
    next_connection_id: AtomicU64,
}

impl Hub {
    /// Wire a hub over the given collaborators
    pub fn new(
        config: HubConfig,
        store: Arc<dyn RecordStore>,
        ballots: Arc<dyn BallotProvider>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        let screens = Arc::new(ConnectionRegistry::new());
        let viewers = Arc::new(ConnectionRegistry::new());
        let sessions = Arc::new(SessionStore::new(store.clone(), &config));
        let attachments = Arc::new(AttachmentRegistry::new(
            store.clone(),
            screens.clone(),
            viewers.clone(),
            &config,
        ));
        let reconciler = Reconciler::new(
            sessions.clone(),
            screens.clone(),
            store.clone(),
            ballots.clone(),
            attachments.clone(),
            &config,
        );
        let viewer_protocol =
            ViewerProtocol::new(viewers.clone(), store.clone(), attachments.clone(), &config);
        let signaling = VoteSignaling::new(
            store.clone(),
            screens.clone(),
            ballots,
            audit,
            &config,
        );

        Self {
            config,
            store,
            screens,
            viewers,
            sessions,
            attachments,
            reconciler,
            viewer_protocol,
            signaling,
            next_connection_id: AtomicU64::new(1),
        }
    }

    /// The terminal-namespace registry
    pub fn screens(&self) -> &Arc<ConnectionRegistry> {
        &self.screens
    }

    /// The viewer-namespace registry
    pub fn viewers(&self) -> &Arc<ConnectionRegistry> {
        &self.viewers
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Reset persisted `connected` flags left over from a previous process
    ///
    /// Live-connection state dies with the process; run this before
    /// accepting the first connection so no ghost screens show connected.
    pub async fn startup(&self) -> Result<()> {
        bounded(self.config.store_timeout, self.store.reset_connected()).await?;
        tracing::info!("stale connected flags reset");
        Ok(())
    }

    /// Explicit teardown: drop all live-connection state and settle flags
    pub async fn shutdown(&self) -> Result<()> {
        self.screens.clear().await;
        self.viewers.clear().await;
        bounded(self.config.store_timeout, self.store.reset_connected()).await?;
        tracing::info!("hub shut down");
        Ok(())
    }

    /// Accept a terminal connection and run reconciliation
    pub async fn connect_screen(&self, handshake: Handshake) -> Result<ScreenConnection> {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let (device, events) = self.reconciler.connect(connection_id, handshake).await?;
        Ok(ScreenConnection {
            connection_id,
            device,
            events,
        })
    }

    /// Report a terminal connection close
    pub async fn disconnect_screen(&self, connection_id: ConnectionId) -> Result<()> {
        self.reconciler.disconnect(connection_id).await
    }

    /// Accept a viewer connection
    pub async fn connect_viewer(&self, caller: &CallerIdentity) -> Result<ViewerConnection> {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let events = self.viewer_protocol.connect(connection_id, caller).await?;
        Ok(ViewerConnection {
            connection_id,
            events,
        })
    }

    /// Report a viewer connection close
    pub async fn disconnect_viewer(&self, connection_id: ConnectionId) {
        self.viewer_protocol.disconnect(connection_id).await;
    }

    /// Subscribe a viewer to one location room
    pub async fn join_location(
        &self,
        connection_id: ConnectionId,
        location_id: LocationId,
    ) -> Result<()> {
        self.viewer_protocol
            .join_location(connection_id, location_id)
            .await
    }

    /// Subscribe a privileged viewer to every location room
    pub async fn join_all(
        &self,
        connection_id: ConnectionId,
        caller: &CallerIdentity,
    ) -> Result<usize> {
        self.viewer_protocol.join_all(connection_id, caller).await
    }

    /// The merged screen list for a location
    pub async fn list_screens(&self, location_id: LocationId) -> Result<Vec<ScreenView>> {
        self.attachments.list_screens(location_id).await
    }

    /// Attach a screen to a location by code
    pub async fn attach(
        &self,
        location_id: LocationId,
        code: &str,
        name: &str,
        caller: &CallerIdentity,
    ) -> Result<ScreenView> {
        self.attachments.attach(location_id, code, name, caller).await
    }

    /// Detach a screen from a location
    pub async fn detach(
        &self,
        location_id: LocationId,
        screen_id: DeviceId,
        caller: &CallerIdentity,
    ) -> Result<()> {
        self.attachments.detach(location_id, screen_id, caller).await
    }

    /// Display the ballot on a screen
    pub async fn show_vote(
        &self,
        location_id: LocationId,
        screen_id: DeviceId,
        caller: &CallerIdentity,
    ) -> Result<()> {
        tracing::debug!(caller = %caller.username, screen_id = screen_id, "show-vote requested");
        self.signaling.show_vote(location_id, screen_id).await
    }

    /// Signal a screen to commit the current voting interaction
    pub async fn submit_vote(
        &self,
        location_id: LocationId,
        screen_id: DeviceId,
        caller: &CallerIdentity,
    ) -> Result<()> {
        tracing::debug!(caller = %caller.username, screen_id = screen_id, "submit-vote requested");
        self.signaling.submit_vote(location_id, screen_id).await
    }

    /// Signal a screen to abort the current voting interaction
    pub async fn cancel_vote(
        &self,
        location_id: LocationId,
        screen_id: DeviceId,
        caller: &CallerIdentity,
    ) -> Result<()> {
        tracing::debug!(caller = %caller.username, screen_id = screen_id, "cancel-vote requested");
        self.signaling.cancel_vote(location_id, screen_id).await
    }

    /// The session store, for embedding layers that need epoch inspection
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Event;
    use crate::store::MemoryStore;
    use crate::vote::ballot::sample_ballot;
    use crate::vote::{NoopAuditLog, StaticBallotProvider};

    struct Fixture {
        store: Arc<MemoryStore>,
        hub: Hub,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let hub = Hub::new(
            HubConfig::default(),
            store.clone(),
            Arc::new(StaticBallotProvider::new(sample_ballot())),
            Arc::new(NoopAuditLog),
        );
        Fixture { store, hub }
    }

    fn overseer() -> CallerIdentity {
        CallerIdentity::privileged(1, "overseer")
    }

    #[tokio::test]
    async fn test_startup_clears_ghost_flags() {
        let fixture = fixture();

        let (device, _) = fixture.store.create_or_find_device("ghost").await.unwrap();
        fixture.store.set_connected(device.id, true).await.unwrap();

        fixture.hub.startup().await.unwrap();

        assert!(!fixture.store.find_device(device.id).await.unwrap().unwrap().connected);
    }

    #[tokio::test]
    async fn test_full_screen_lifecycle() {
        let fixture = fixture();
        let location = fixture.store.add_location("City Hall", true).await;

        // Fresh terminal connects and learns its identity.
        let mut screen = fixture
            .hub
            .connect_screen(Handshake::default())
            .await
            .unwrap();
        let identity = match screen.events.recv().await.unwrap() {
            Event::SessionIdentity(identity) => identity,
            other => panic!("unexpected event: {other:?}"),
        };
        let code = identity.code.clone().unwrap();

        // Operator attaches it by code.
        let view = fixture
            .hub
            .attach(location.id, &code, "Booth 3", &overseer())
            .await
            .unwrap();
        assert!(view.connected);
        assert!(matches!(
            screen.events.recv().await.unwrap(),
            Event::Attached(_)
        ));

        // Voting commands require an assigned voter.
        let err = fixture
            .hub
            .show_vote(location.id, screen.device.id, &overseer())
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::Conflict { .. }));

        // External voter workflow assigns a voter.
        let mut row = fixture
            .store
            .find_device(screen.device.id)
            .await
            .unwrap()
            .unwrap();
        row.voter_id = Some(99);
        fixture.store.update_device(&row).await.unwrap();

        fixture
            .hub
            .show_vote(location.id, screen.device.id, &overseer())
            .await
            .unwrap();
        assert!(matches!(
            screen.events.recv().await.unwrap(),
            Event::ShowVote { .. }
        ));

        fixture
            .hub
            .submit_vote(location.id, screen.device.id, &overseer())
            .await
            .unwrap();
        assert!(matches!(
            screen.events.recv().await.unwrap(),
            Event::SubmitVote
        ));
    }

    #[tokio::test]
    async fn test_reconnect_resumes_identity_and_attachment() {
        let fixture = fixture();
        let location = fixture.store.add_location("City Hall", true).await;

        let screen = fixture
            .hub
            .connect_screen(Handshake::default())
            .await
            .unwrap();
        let token = screen.device.session_token.clone();
        let code = screen.device.code.clone().unwrap();

        fixture
            .hub
            .attach(location.id, &code, "Booth 3", &overseer())
            .await
            .unwrap();
        fixture
            .hub
            .disconnect_screen(screen.connection_id)
            .await
            .unwrap();

        let mut resumed = fixture
            .hub
            .connect_screen(Handshake::with_token(&token))
            .await
            .unwrap();

        assert_eq!(resumed.device.id, screen.device.id);
        assert_eq!(resumed.device.code.as_deref(), Some(code.as_str()));
        assert!(matches!(
            resumed.events.recv().await.unwrap(),
            Event::SessionIdentity(_)
        ));
        assert!(matches!(
            resumed.events.recv().await.unwrap(),
            Event::Attached(_)
        ));
    }

    #[tokio::test]
    async fn test_viewer_sees_attach_and_drop() {
        let fixture = fixture();
        let location = fixture.store.add_location("City Hall", true).await;

        let mut viewer = fixture.hub.connect_viewer(&overseer()).await.unwrap();
        fixture
            .hub
            .join_location(viewer.connection_id, location.id)
            .await
            .unwrap();
        // Initial snapshot of the empty location.
        match viewer.events.recv().await.unwrap() {
            Event::ScreensList(list) => assert!(list.screens.is_empty()),
            other => panic!("unexpected event: {other:?}"),
        }

        let screen = fixture
            .hub
            .connect_screen(Handshake::default())
            .await
            .unwrap();
        let code = screen.device.code.clone().unwrap();
        fixture
            .hub
            .attach(location.id, &code, "Booth 3", &overseer())
            .await
            .unwrap();

        match viewer.events.recv().await.unwrap() {
            Event::ScreensList(list) => {
                assert_eq!(list.screens.len(), 1);
                assert!(list.screens[0].connected);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        fixture
            .hub
            .disconnect_screen(screen.connection_id)
            .await
            .unwrap();

        match viewer.events.recv().await.unwrap() {
            Event::ScreensList(list) => {
                assert_eq!(list.screens.len(), 1);
                assert!(!list.screens[0].connected);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_shutdown_clears_registries_and_flags() {
        let fixture = fixture();

        let screen = fixture
            .hub
            .connect_screen(Handshake::default())
            .await
            .unwrap();

        fixture.hub.shutdown().await.unwrap();

        assert_eq!(fixture.hub.screens().connection_count().await, 0);
        assert!(!fixture
            .store
            .find_device(screen.device.id)
            .await
            .unwrap()
            .unwrap()
            .connected);
    }
}
