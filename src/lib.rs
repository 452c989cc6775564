//! Presence and session-reconciliation engine for voting-booth screens
//!
//! Coordinates physical voting-booth terminals ("screens") that connect
//! over a persistent bidirectional channel. Each fresh connection is
//! reconciled with a durable device identity, terminals are bound to
//! voting locations, and a per-terminal voting workflow (show, submit,
//! cancel) is driven through the registry while administrative viewers
//! receive a live, consistent picture of which screens are connected
//! where.
//!
//! # Components
//!
//! - [`store`]: durable record store seam ([`store::RecordStore`]) with an
//!   in-memory implementation
//! - [`session`]: token-to-device reconciliation with epoch-guarded
//!   disconnect writes and unique code assignment
//! - [`registry`]: live connections, rooms, targeted send and room
//!   broadcast, one instance per namespace
//! - [`protocol`]: per-connection lifecycles, terminal reconciliation and
//!   viewer subscriptions
//! - [`location`]: attach/detach and the merged (persisted + live)
//!   screen list
//! - [`vote`]: voting-workflow signaling behind ballot and audit seams
//! - [`hub`]: the facade wiring it all together
//!
//! The transport itself (socket accept loops, HTTP routing, auth) is the
//! embedding application's concern: it hands [`protocol::Handshake`] and
//! [`identity::CallerIdentity`] values in and pumps the returned event
//! receivers out to its peers.

pub mod config;
pub mod error;
pub mod hub;
pub mod identity;
pub mod location;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod store;
pub mod vote;

pub use config::HubConfig;
pub use error::{Error, Result};
pub use hub::{Hub, ScreenConnection, ViewerConnection};
pub use identity::CallerIdentity;
pub use protocol::Handshake;
pub use registry::{Event, ScreenView};
pub use store::{Device, DeviceId, Location, LocationId, VoterId};
pub use vote::{Ballot, BallotProvider};
