//! Wire events
//!
//! Everything the hub pushes down a live connection is one of these. Tags
//! and payload fields match the wire protocol the terminals and dashboards
//! speak (`session-identity`, `screens-list`, camelCase payloads).

use serde::{Deserialize, Serialize};

use crate::store::{Device, DeviceId, LocationId, VoterId};
use crate::vote::Ballot;

/// An event addressed to one connection or broadcast to a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum Event {
    /// Identity details a terminal persists for future reconnection
    SessionIdentity(SessionIdentity),

    /// The terminal has been attached to a location
    Attached(Attached),

    /// The terminal was detached; reset to the pre-attachment identity
    /// display
    NewSession(SessionIdentity),

    /// Display the ballot for a voting interaction
    ShowVote { ballot: Ballot },

    /// Commit the current voting interaction
    SubmitVote,

    /// Abort the current voting interaction
    CancelVote,

    /// Merged screen list for one location, sent to viewer subscriptions
    ScreensList(ScreensList),
}

impl Event {
    /// Wire tag, for logging
    pub fn name(&self) -> &'static str {
        match self {
            Event::SessionIdentity(_) => "session-identity",
            Event::Attached(_) => "attached",
            Event::NewSession(_) => "new-session",
            Event::ShowVote { .. } => "show-vote",
            Event::SubmitVote => "submit-vote",
            Event::CancelVote => "cancel-vote",
            Event::ScreensList(_) => "screens-list",
        }
    }
}

/// Payload of `session-identity` and `new-session`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    pub session_token: String,
    pub device_id: DeviceId,
    pub code: Option<String>,
}

impl SessionIdentity {
    pub fn from_device(device: &Device) -> Self {
        Self {
            session_token: device.session_token.clone(),
            device_id: device.id,
            code: device.code.clone(),
        }
    }
}

/// Payload of `attached`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attached {
    pub location_name: String,
    pub device_name: Option<String>,
}

/// One screen in a `screens-list` payload
///
/// `connected` is computed from registry state at the moment the list is
/// built; the persisted flag is never trusted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenView {
    pub id: DeviceId,
    pub name: Option<String>,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voter_id: Option<VoterId>,
}

/// Payload of `screens-list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreensList {
    pub location_id: LocationId,
    pub screens: Vec<ScreenView>,
}
