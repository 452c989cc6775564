//! Connection registry with rooms and broadcast
//!
//! Tracks live connections per namespace and routes events to them. Each
//! connection carries an unbounded event channel; the transport layer owns
//! the receiving half and writes to the peer, so fan-out never blocks on a
//! slow socket.
//!
//! # Architecture
//!
//! ```text
//!                      Arc<ConnectionRegistry>
//!                ┌────────────────────────────────┐
//!                │ connections: Map<ConnId,       │
//!                │   ConnectionEntry {            │
//!                │     device_id, token, epoch,   │
//!                │     rooms, tx: mpsc::Sender,   │
//!                │   }                            │
//!                │ rooms: Map<RoomId, Set<ConnId>>│
//!                └──────────────┬─────────────────┘
//!                               │
//!           ┌───────────────────┼───────────────────┐
//!           ▼                   ▼                   ▼
//!      [Terminal]          [Viewer]            [Viewer]
//!      events.recv()       events.recv()       events.recv()
//!           ▲                   ▲                   ▲
//!           └── send() ── broadcast(room) ──────────┘
//! ```
//!
//! The hub runs two instances: one for the terminal namespace, one for the
//! viewer namespace. Location rooms exist in both, but a `screens-list`
//! broadcast only ever targets the viewer instance.

pub mod connection;
pub mod event;
pub mod room;

pub use connection::{
    ConnectionEntry, ConnectionId, ConnectionRegistry, EventReceiver, EventSender,
};
pub use event::{Attached, Event, ScreenView, ScreensList, SessionIdentity};
pub use room::RoomId;
