//! Location attachment
//!
//! Business logic for binding devices to locations and for the merged
//! (persisted + live) screen list broadcast to viewer subscriptions.

pub mod attachment;

pub use attachment::AttachmentRegistry;
