//! Caller identity
//!
//! Authentication and authorization happen upstream; the hub receives the
//! already-resolved identity and only uses it for logging and for gating
//! the privileged viewer operations.

use serde::{Deserialize, Serialize};

use crate::store::LocationId;

/// Opaque identity of an administrative caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerIdentity {
    /// Caller's surrogate key in the upstream user store
    pub id: i64,

    /// Display name, for audit trails and logs
    pub username: String,

    /// Privileged viewers may join every location room
    pub privileged: bool,

    /// The location this caller operates, if any
    pub location_id: Option<LocationId>,
}

impl CallerIdentity {
    /// Identity of a location operator
    pub fn operator(id: i64, username: impl Into<String>, location_id: LocationId) -> Self {
        Self {
            id,
            username: username.into(),
            privileged: false,
            location_id: Some(location_id),
        }
    }

    /// Identity of a privileged overseer
    pub fn privileged(id: i64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            privileged: true,
            location_id: None,
        }
    }
}
