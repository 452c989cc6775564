//! Ballot types and the ballot-definition seam
//!
//! The ballot itself is authored elsewhere; the hub only reads the ordered
//! candidate list for a location and pushes it to a terminal.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::store::{LocationId, StoreError};

/// Ordered set of positions and candidates shown on a terminal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ballot {
    pub positions: Vec<Position>,
}

/// One contested position on the ballot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub name: String,
    pub candidates: Vec<Candidate>,
}

/// One candidate under a position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: i64,
    pub name: String,
}

/// External read of the ballot definition for a location
#[async_trait]
pub trait BallotProvider: Send + Sync {
    async fn ballot_for(&self, location_id: LocationId) -> Result<Ballot, StoreError>;
}

/// Serves one fixed ballot for every location
///
/// Enough for tests and single-election deployments where the ballot does
/// not vary per location.
pub struct StaticBallotProvider {
    ballot: Ballot,
}

impl StaticBallotProvider {
    pub fn new(ballot: Ballot) -> Self {
        Self { ballot }
    }
}

#[async_trait]
impl BallotProvider for StaticBallotProvider {
    async fn ballot_for(&self, _location_id: LocationId) -> Result<Ballot, StoreError> {
        Ok(self.ballot.clone())
    }
}

#[cfg(test)]
pub(crate) fn sample_ballot() -> Ballot {
    Ballot {
        positions: vec![Position {
            name: "Mayor".to_owned(),
            candidates: vec![
                Candidate {
                    id: 1,
                    name: "A. Candidate".to_owned(),
                },
                Candidate {
                    id: 2,
                    name: "B. Candidate".to_owned(),
                },
            ],
        }],
    }
}
