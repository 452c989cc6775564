//! Session store
//!
//! Owns the mapping from an opaque session token to a durable device
//! identity. A terminal that presents a known token reclaims its device; a
//! terminal with no token (or one the store no longer knows) is issued a
//! fresh identity with a freshly generated unique code.
//!
//! Every reconcile stamps the device with a new epoch from a monotonic
//! counter. A disconnect only writes `connected = false` while its epoch is
//! still current, so a delayed disconnect from a replaced connection cannot
//! clobber a fresher reconnect.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::HubConfig;
use crate::error::{Error, Result};
use crate::store::{Device, DeviceId, RecordStore, StoreError};

use super::code::generate_code;

/// Connection generation number, monotonically increasing per process
pub type Epoch = u64;

/// Reconnection-aware wrapper over the durable store
pub struct SessionStore {
    store: Arc<dyn RecordStore>,
    epochs: RwLock<HashMap<DeviceId, Epoch>>,
    next_epoch: AtomicU64,
    store_timeout: Duration,
    code_length: usize,
    code_attempts: u32,
}

impl SessionStore {
    pub fn new(store: Arc<dyn RecordStore>, config: &HubConfig) -> Self {
        Self {
            store,
            epochs: RwLock::new(HashMap::new()),
            next_epoch: AtomicU64::new(1),
            store_timeout: config.store_timeout,
            code_length: config.code_length,
            code_attempts: config.code_attempts,
        }
    }

    /// Fetch the device holding `token`, if any
    pub async fn find_by_token(&self, token: &str) -> Result<Option<Device>> {
        self.bounded(self.store.find_device_by_token(token)).await
    }

    /// Match a connecting terminal to its device, or issue a new identity
    ///
    /// Returns the device and the epoch stamped for this connection. The
    /// epoch must be handed back to [`mark_disconnected`] when the
    /// connection closes.
    ///
    /// [`mark_disconnected`]: SessionStore::mark_disconnected
    pub async fn reconcile(&self, token: Option<&str>) -> Result<(Device, Epoch)> {
        if let Some(token) = token {
            if let Some(mut device) = self.find_by_token(token).await? {
                self.bounded(self.store.set_connected(device.id, true))
                    .await?;
                device.connected = true;

                let epoch = self.stamp(device.id).await;
                tracing::debug!(
                    device_id = device.id,
                    epoch = epoch,
                    "session reconciled to existing device"
                );
                return Ok((device, epoch));
            }
            tracing::debug!("presented session token is unknown, issuing new identity");
        }

        let fresh_token = Uuid::new_v4().simple().to_string();
        let (device, created) = self
            .bounded(self.store.create_or_find_device(&fresh_token))
            .await?;
        self.bounded(self.store.set_connected(device.id, true))
            .await?;

        let device = if device.code.is_none() {
            self.assign_fresh_code(device.id).await?
        } else {
            // A racing create for the same token won and already holds a
            // code; reload to pick it up.
            self.bounded(self.store.find_device(device.id))
                .await?
                .ok_or_else(|| Error::not_found("device"))?
        };

        let epoch = self.stamp(device.id).await;
        tracing::info!(
            device_id = device.id,
            code = device.code.as_deref().unwrap_or(""),
            created = created,
            epoch = epoch,
            "new session issued"
        );
        Ok((device, epoch))
    }

    /// Record a disconnect for the connection stamped with `epoch`
    ///
    /// Returns whether the flag was written. A stale epoch means a newer
    /// connection has reconciled since; the write is skipped so the fresher
    /// `connected = true` survives.
    pub async fn mark_disconnected(&self, device_id: DeviceId, epoch: Epoch) -> Result<bool> {
        {
            let mut epochs = self.epochs.write().await;
            match epochs.get(&device_id) {
                Some(current) if *current == epoch => {
                    epochs.remove(&device_id);
                }
                current => {
                    tracing::debug!(
                        device_id = device_id,
                        stale_epoch = epoch,
                        current_epoch = ?current,
                        "ignoring disconnect from replaced connection"
                    );
                    return Ok(false);
                }
            }
        }

        self.bounded(self.store.set_connected(device_id, false))
            .await?;
        tracing::debug!(device_id = device_id, epoch = epoch, "device disconnected");
        Ok(true)
    }

    /// The epoch currently stamped on a device, if it has a live connection
    pub async fn current_epoch(&self, device_id: DeviceId) -> Option<Epoch> {
        self.epochs.read().await.get(&device_id).copied()
    }

    async fn stamp(&self, device_id: DeviceId) -> Epoch {
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        self.epochs.write().await.insert(device_id, epoch);
        epoch
    }

    /// Unique-or-retry code assignment
    ///
    /// The unique index on `code` is the source of truth; a collision
    /// surfaces as a constraint violation and triggers a fresh draw rather
    /// than a check-then-insert.
    async fn assign_fresh_code(&self, device_id: DeviceId) -> Result<Device> {
        for _ in 0..self.code_attempts {
            let code = generate_code(self.code_length);
            match self
                .bounded_raw(self.store.assign_code(device_id, &code))
                .await?
            {
                Ok(()) => {
                    return self
                        .bounded(self.store.find_device(device_id))
                        .await?
                        .ok_or_else(|| Error::not_found("device"));
                }
                Err(StoreError::UniqueViolation { .. }) => {
                    tracing::debug!(device_id = device_id, code = %code, "code collision, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(Error::IdentityConflict {
            attempts: self.code_attempts,
        })
    }

    /// Run a store call under the configured timeout, mapping failures
    /// into the crate taxonomy
    async fn bounded<T>(
        &self,
        fut: impl Future<Output = std::result::Result<T, StoreError>>,
    ) -> Result<T> {
        Ok(self.bounded_raw(fut).await??)
    }

    /// Like `bounded`, but hands the store error back for callers that
    /// branch on it (code-collision retry)
    async fn bounded_raw<T>(
        &self,
        fut: impl Future<Output = std::result::Result<T, StoreError>>,
    ) -> Result<std::result::Result<T, StoreError>> {
        tokio::time::timeout(self.store_timeout, fut)
            .await
            .map_err(|_| Error::StoreUnavailable("store call timed out".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn session_store() -> SessionStore {
        SessionStore::new(Arc::new(MemoryStore::new()), &HubConfig::default())
    }

    #[tokio::test]
    async fn test_fresh_reconcile_issues_identity_with_code() {
        let sessions = session_store();

        let (device, _epoch) = sessions.reconcile(None).await.unwrap();

        assert!(device.connected);
        assert_eq!(device.code.as_ref().unwrap().len(), 5);
        assert!(!device.session_token.is_empty());
    }

    #[tokio::test]
    async fn test_reconnect_with_token_keeps_code() {
        let sessions = session_store();

        let (first, _) = sessions.reconcile(None).await.unwrap();
        let (second, _) = sessions
            .reconcile(Some(&first.session_token))
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.code, first.code);
        assert_eq!(second.session_token, first.session_token);
    }

    #[tokio::test]
    async fn test_unknown_token_issues_new_identity() {
        let sessions = session_store();

        let (device, _) = sessions.reconcile(Some("purged-token")).await.unwrap();

        assert_ne!(device.session_token, "purged-token");
        assert!(device.code.is_some());
    }

    #[tokio::test]
    async fn test_racing_fresh_registrations_get_distinct_codes() {
        let sessions = Arc::new(session_store());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let sessions = Arc::clone(&sessions);
            handles.push(tokio::spawn(
                async move { sessions.reconcile(None).await },
            ));
        }

        let mut codes = std::collections::HashSet::new();
        for handle in handles {
            let (device, _) = handle.await.unwrap().unwrap();
            assert!(codes.insert(device.code.unwrap()));
        }
        assert_eq!(codes.len(), 16);
    }

    #[tokio::test]
    async fn test_stale_disconnect_does_not_clobber_reconnect() {
        let sessions = session_store();

        let (device, old_epoch) = sessions.reconcile(None).await.unwrap();
        // Terminal reconnects before the old connection's disconnect lands.
        let (device, new_epoch) = sessions
            .reconcile(Some(&device.session_token))
            .await
            .unwrap();
        assert!(new_epoch > old_epoch);

        let wrote = sessions
            .mark_disconnected(device.id, old_epoch)
            .await
            .unwrap();
        assert!(!wrote);
        assert!(sessions
            .find_by_token(&device.session_token)
            .await
            .unwrap()
            .unwrap()
            .connected);
    }

    #[tokio::test]
    async fn test_current_disconnect_clears_flag() {
        let sessions = session_store();

        let (device, epoch) = sessions.reconcile(None).await.unwrap();
        let wrote = sessions.mark_disconnected(device.id, epoch).await.unwrap();

        assert!(wrote);
        assert!(!sessions
            .find_by_token(&device.session_token)
            .await
            .unwrap()
            .unwrap()
            .connected);
        assert_eq!(sessions.current_epoch(device.id).await, None);
    }

    #[tokio::test]
    async fn test_code_exhaustion_maps_to_identity_conflict() {
        // One-character codes over a 36-symbol alphabet with a tight retry
        // budget collide quickly once most symbols are taken.
        let store = Arc::new(MemoryStore::new());
        let config = HubConfig::default().code_length(1).code_attempts(2);
        let sessions = SessionStore::new(store, &config);

        let mut saw_conflict = false;
        for _ in 0..64 {
            match sessions.reconcile(None).await {
                Ok(_) => {}
                Err(Error::IdentityConflict { attempts }) => {
                    assert_eq!(attempts, 2);
                    saw_conflict = true;
                    break;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert!(saw_conflict);
    }
}
