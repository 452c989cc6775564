//! Session reconciliation layer
//!
//! Wraps the durable store with reconnection semantics: token-based
//! identity reclaim, first-time code assignment, and epoch-guarded
//! connected-flag writes.

pub mod code;
pub mod store;

pub use code::{generate_code, CODE_CHARSET};
pub use store::{Epoch, SessionStore};
