//! Connection-lifecycle protocols
//!
//! One protocol per namespace: terminals go through reconciliation,
//! viewers through subscription handling.

pub mod reconcile;
pub mod viewer;

pub use reconcile::{Handshake, Reconciler};
pub use viewer::ViewerProtocol;
