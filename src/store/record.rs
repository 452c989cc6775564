//! Persisted record types
//!
//! The row shapes of the durable store. Only `Device` and `Location` are
//! persisted; everything else in the crate is process-local state.

use serde::{Deserialize, Serialize};

/// Surrogate key of a device row
pub type DeviceId = i64;

/// Surrogate key of a location row
pub type LocationId = i64;

/// Identifier of a voter currently assigned to a device
pub type VoterId = i64;

/// Durable identity of one physical voting-booth terminal
///
/// `code` is assigned exactly once, on first-ever registration, and never
/// changes afterwards. `session_token` is reassigned only when a terminal
/// reconnects without a recognizable token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Stable surrogate key
    pub id: DeviceId,

    /// Opaque credential the terminal presents to reclaim this identity
    pub session_token: String,

    /// Short human-enterable token, globally unique, assigned once
    pub code: Option<String>,

    /// Operator-assigned display name
    pub name: Option<String>,

    /// Last-known live status; the connection registry is authoritative
    /// for the current value in read views
    pub connected: bool,

    /// Location this device is attached to, if any
    pub location_id: Option<LocationId>,

    /// Presence indicates a voting interaction is in progress
    pub voter_id: Option<VoterId>,
}

impl Device {
    /// Whether the device is attached to the given location
    pub fn is_at(&self, location_id: LocationId) -> bool {
        self.location_id == Some(location_id)
    }
}

/// A voting location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: LocationId,
    pub name: String,

    /// Gates the voting-workflow commands; a closed location accepts
    /// attach/detach but no vote signaling
    pub open: bool,
}
