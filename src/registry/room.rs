//! Room identifiers
//!
//! A room is a named broadcast group of live connections. Location rooms
//! are derived deterministically from the location key, so every component
//! that needs "the room for location 5" computes the same identifier.

use serde::{Deserialize, Serialize};

use crate::store::LocationId;

/// Identifier of a broadcast room
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(String);

impl RoomId {
    /// The room for a location
    pub fn location(id: LocationId) -> Self {
        RoomId(format!("location-{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
