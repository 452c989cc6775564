//! Voting workflow signaling
//!
//! Per-device voting state machine, driven externally:
//! `Idle -> VoterAssigned -> BallotShown -> (Submitted | Cancelled) -> Idle`.
//! Voter assignment and clearing belong to the external voter workflow;
//! this module only signals a terminal to show, submit, or cancel, after
//! checking the preconditions for each command.

pub mod ballot;
pub mod signaling;

pub use ballot::{Ballot, BallotProvider, Candidate, Position, StaticBallotProvider};
pub use signaling::{AuditEntry, AuditLog, NoopAuditLog, VoteSignaling};
