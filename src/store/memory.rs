//! In-memory record store
//!
//! Backs the same [`RecordStore`] contract as the relational
//! implementation, including the unique indexes on `session_token` and
//! `code`. Codes are indexed in upper case; lookups normalize, so the
//! index has one canonical form.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::error::StoreError;
use super::record::{Device, DeviceId, Location, LocationId};
use super::RecordStore;

#[derive(Default)]
struct Inner {
    devices: HashMap<DeviceId, Device>,
    locations: HashMap<LocationId, Location>,
    by_token: HashMap<String, DeviceId>,
    by_code: HashMap<String, DeviceId>,
    next_device_id: DeviceId,
    next_location_id: LocationId,
}

/// In-process implementation of [`RecordStore`]
///
/// Thread-safe via a single `RwLock`; every mutation updates the row and
/// its indexes under one write guard, which is what makes
/// `create_or_find_device` atomic.
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                next_device_id: 1,
                next_location_id: 1,
                ..Inner::default()
            }),
        }
    }

    /// Insert a location row
    ///
    /// Locations are managed by an external administrative tool; this is
    /// the seeding hook for tests and small deployments.
    pub async fn add_location(&self, name: impl Into<String>, open: bool) -> Location {
        let mut inner = self.inner.write().await;
        let id = inner.next_location_id;
        inner.next_location_id += 1;

        let location = Location {
            id,
            name: name.into(),
            open,
        };
        inner.locations.insert(id, location.clone());
        location
    }

    /// Flip a location's `open` gate
    pub async fn set_location_open(&self, id: LocationId, open: bool) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let location = inner.locations.get_mut(&id).ok_or(StoreError::NotFound)?;
        location.open = open;
        Ok(())
    }

    /// Number of device rows, for diagnostics
    pub async fn device_count(&self) -> usize {
        self.inner.read().await.devices.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_device(&self, id: DeviceId) -> Result<Option<Device>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.devices.get(&id).cloned())
    }

    async fn find_device_by_token(&self, token: &str) -> Result<Option<Device>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_token
            .get(token)
            .and_then(|id| inner.devices.get(id))
            .cloned())
    }

    async fn find_device_by_code(&self, code: &str) -> Result<Option<Device>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_code
            .get(&code.to_ascii_uppercase())
            .and_then(|id| inner.devices.get(id))
            .cloned())
    }

    async fn create_or_find_device(&self, token: &str) -> Result<(Device, bool), StoreError> {
        let mut inner = self.inner.write().await;

        if let Some(id) = inner.by_token.get(token).copied() {
            let device = inner.devices.get(&id).cloned().ok_or(StoreError::NotFound)?;
            return Ok((device, false));
        }

        let id = inner.next_device_id;
        inner.next_device_id += 1;

        let device = Device {
            id,
            session_token: token.to_owned(),
            code: None,
            name: None,
            connected: false,
            location_id: None,
            voter_id: None,
        };
        inner.devices.insert(id, device.clone());
        inner.by_token.insert(token.to_owned(), id);

        Ok((device, true))
    }

    async fn update_device(&self, device: &Device) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;

        let existing = inner
            .devices
            .get(&device.id)
            .cloned()
            .ok_or(StoreError::NotFound)?;

        if existing.session_token != device.session_token {
            if inner
                .by_token
                .get(&device.session_token)
                .is_some_and(|id| *id != device.id)
            {
                return Err(StoreError::UniqueViolation {
                    field: "session_token",
                });
            }
            inner.by_token.remove(&existing.session_token);
            inner
                .by_token
                .insert(device.session_token.clone(), device.id);
        }

        if existing.code != device.code {
            if let Some(ref code) = device.code {
                let key = code.to_ascii_uppercase();
                if inner.by_code.get(&key).is_some_and(|id| *id != device.id) {
                    return Err(StoreError::UniqueViolation { field: "code" });
                }
                if let Some(ref old) = existing.code {
                    inner.by_code.remove(&old.to_ascii_uppercase());
                }
                inner.by_code.insert(key, device.id);
            } else if let Some(ref old) = existing.code {
                inner.by_code.remove(&old.to_ascii_uppercase());
            }
        }

        inner.devices.insert(device.id, device.clone());
        Ok(())
    }

    async fn set_connected(&self, id: DeviceId, connected: bool) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let device = inner.devices.get_mut(&id).ok_or(StoreError::NotFound)?;
        device.connected = connected;
        Ok(())
    }

    async fn assign_code(&self, id: DeviceId, code: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;

        let key = code.to_ascii_uppercase();
        if inner.by_code.contains_key(&key) {
            return Err(StoreError::UniqueViolation { field: "code" });
        }

        let device = inner.devices.get_mut(&id).ok_or(StoreError::NotFound)?;
        device.code = Some(key.clone());
        inner.by_code.insert(key, id);
        Ok(())
    }

    async fn devices_at(&self, location_id: LocationId) -> Result<Vec<Device>, StoreError> {
        let inner = self.inner.read().await;
        let mut devices: Vec<Device> = inner
            .devices
            .values()
            .filter(|d| d.location_id == Some(location_id))
            .cloned()
            .collect();
        devices.sort_by_key(|d| d.id);
        Ok(devices)
    }

    async fn find_location(&self, id: LocationId) -> Result<Option<Location>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.locations.get(&id).cloned())
    }

    async fn list_locations(&self) -> Result<Vec<Location>, StoreError> {
        let inner = self.inner.read().await;
        let mut locations: Vec<Location> = inner.locations.values().cloned().collect();
        locations.sort_by_key(|l| l.id);
        Ok(locations)
    }

    async fn reset_connected(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for device in inner.devices.values_mut() {
            device.connected = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_or_find_is_idempotent_per_token() {
        let store = MemoryStore::new();

        let (first, created) = store.create_or_find_device("tok-1").await.unwrap();
        assert!(created);

        let (second, created) = store.create_or_find_device("tok-1").await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_assign_code_enforces_unique_index() {
        let store = MemoryStore::new();

        let (a, _) = store.create_or_find_device("tok-a").await.unwrap();
        let (b, _) = store.create_or_find_device("tok-b").await.unwrap();

        store.assign_code(a.id, "AB12C").await.unwrap();
        let err = store.assign_code(b.id, "ab12c").await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { field: "code" }));
    }

    #[tokio::test]
    async fn test_code_lookup_is_case_insensitive() {
        let store = MemoryStore::new();

        let (device, _) = store.create_or_find_device("tok-a").await.unwrap();
        store.assign_code(device.id, "XY9ZQ").await.unwrap();

        let found = store.find_device_by_code("xy9zq").await.unwrap().unwrap();
        assert_eq!(found.id, device.id);
    }

    #[tokio::test]
    async fn test_update_rejects_stolen_token() {
        let store = MemoryStore::new();

        let (a, _) = store.create_or_find_device("tok-a").await.unwrap();
        let (_b, _) = store.create_or_find_device("tok-b").await.unwrap();

        let mut hijack = a.clone();
        hijack.session_token = "tok-b".to_owned();
        let err = store.update_device(&hijack).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::UniqueViolation {
                field: "session_token"
            }
        ));
    }

    #[tokio::test]
    async fn test_reset_connected_clears_every_flag() {
        let store = MemoryStore::new();

        let (a, _) = store.create_or_find_device("tok-a").await.unwrap();
        let (b, _) = store.create_or_find_device("tok-b").await.unwrap();
        store.set_connected(a.id, true).await.unwrap();
        store.set_connected(b.id, true).await.unwrap();

        store.reset_connected().await.unwrap();

        assert!(!store.find_device(a.id).await.unwrap().unwrap().connected);
        assert!(!store.find_device(b.id).await.unwrap().unwrap().connected);
    }

    #[tokio::test]
    async fn test_devices_at_filters_by_location() {
        let store = MemoryStore::new();
        let location = store.add_location("City Hall", true).await;

        let (a, _) = store.create_or_find_device("tok-a").await.unwrap();
        let (_b, _) = store.create_or_find_device("tok-b").await.unwrap();

        let mut attached = a.clone();
        attached.location_id = Some(location.id);
        store.update_device(&attached).await.unwrap();

        let at = store.devices_at(location.id).await.unwrap();
        assert_eq!(at.len(), 1);
        assert_eq!(at[0].id, a.id);
    }
}
