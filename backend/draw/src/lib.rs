//! # Draw
//!
//! Pure assignment generation for the gift exchange. No I/O, no clocks, only a random source.
//!
//! Given a list of unique names, produces:
//! - **assignments**: giver -> giftee, a derangement over the participants
//! - **credentials**: credential -> person, one fresh credential per participant
//!
//! The server owns everything else: wish lists, persistence, who gets to see what.
use std::collections::{BTreeMap, BTreeSet};

use rand::{Rng, thread_rng};

pub mod credential;
pub mod derangement;
pub mod error;

pub use derangement::Strategy;
pub use error::DrawError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draw {
    pub credentials: BTreeMap<String, String>,
    pub assignments: BTreeMap<String, String>,
}

impl Draw {
    /// Two participants sampled the same credential, the later one won the slot.
    pub fn has_credential_collision(&self) -> bool {
        self.credentials.len() < self.assignments.len()
    }
}

pub fn generate(participants: &[String], strategy: Strategy) -> Result<Draw, DrawError> {
    generate_with(participants, strategy, &mut thread_rng())
}

pub fn generate_with<R: Rng + ?Sized>(
    participants: &[String],
    strategy: Strategy,
    rng: &mut R,
) -> Result<Draw, DrawError> {
    validate(participants)?;

    let assignments = strategy.assign(participants, rng)?;

    let mut credentials = BTreeMap::new();
    for person in participants {
        credentials.insert(credential::generate(rng), person.clone());
    }

    Ok(Draw {
        credentials,
        assignments,
    })
}

fn validate(participants: &[String]) -> Result<(), DrawError> {
    if participants.len() < 2 {
        return Err(DrawError::TooFewParticipants(participants.len()));
    }

    let mut seen = BTreeSet::new();
    for person in participants {
        if !seen.insert(person) {
            return Err(DrawError::DuplicateParticipant(person.clone()));
        }
    }

    Ok(())
}
