//! # Derangements
//!
//! Who buys for whom. Every participant gives exactly once, receives exactly once and never draws themselves.
//!
//! ## Queue
//!
//! The family policy, kept as is.
//!
//! 1. Shuffle a copy of the participants once (Fisher-Yates)
//! 2. Walk the participants in their original order, popping the head of the queue
//! 3. Someone else? They become the giftee and leave the queue for good
//! 4. Themselves? Back to the tail, pop again
//! 5. If the only one left is the giver themselves, the draw fails
//!
//! Step 5 can only happen to the last participant. The failure is final for that draw, callers decide whether
//! to draw again.
//!
//! ## Cycles
//!
//! Shuffle, then cut the order into cycles of at least 2 people. Each member gives to the next one in their
//! cycle, the last one closes the loop. Cannot fail for 2 or more participants.
use std::{
    collections::{BTreeMap, VecDeque},
    fmt::{self, Display},
    str::FromStr,
};

use rand::{Rng, seq::SliceRandom};

use crate::error::DrawError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strategy {
    #[default]
    Queue,
    Cycles,
}

impl Strategy {
    pub fn assign<R: Rng + ?Sized>(
        self,
        participants: &[String],
        rng: &mut R,
    ) -> Result<BTreeMap<String, String>, DrawError> {
        match self {
            Strategy::Queue => by_queue(participants, rng),
            Strategy::Cycles => Ok(by_cycles(participants, rng)),
        }
    }
}

impl FromStr for Strategy {
    type Err = DrawError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "queue" => Ok(Strategy::Queue),
            "cycles" => Ok(Strategy::Cycles),
            other => Err(DrawError::UnknownStrategy(other.to_string())),
        }
    }
}

impl Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Queue => write!(f, "queue"),
            Strategy::Cycles => write!(f, "cycles"),
        }
    }
}

fn by_queue<R: Rng + ?Sized>(
    participants: &[String],
    rng: &mut R,
) -> Result<BTreeMap<String, String>, DrawError> {
    let mut shuffled = participants.to_vec();
    shuffled.shuffle(rng);

    let mut queue: VecDeque<String> = shuffled.into();
    let mut assignments = BTreeMap::new();

    for person in participants {
        let mut requeued = 0;

        loop {
            let candidate = queue.pop_front().ok_or_else(|| DrawError::Exhausted {
                person: person.clone(),
            })?;

            if candidate != *person {
                assignments.insert(person.clone(), candidate);
                break;
            }

            queue.push_back(candidate);
            requeued += 1;

            // full rotation without anyone else, only the giver is left
            if requeued >= queue.len() {
                return Err(DrawError::Exhausted {
                    person: person.clone(),
                });
            }
        }
    }

    Ok(assignments)
}

fn by_cycles<R: Rng + ?Sized>(participants: &[String], rng: &mut R) -> BTreeMap<String, String> {
    let mut order = participants.to_vec();
    order.shuffle(rng);

    let mut assignments = BTreeMap::new();
    let mut rest = order.as_slice();

    while !rest.is_empty() {
        let len = cycle_length(rest.len(), rng);
        let (cycle, tail) = rest.split_at(len);

        for (index, giver) in cycle.iter().enumerate() {
            assignments.insert(giver.clone(), cycle[(index + 1) % len].clone());
        }

        rest = tail;
    }

    assignments
}

// Never leaves exactly one person behind.
fn cycle_length<R: Rng + ?Sized>(remaining: usize, rng: &mut R) -> usize {
    if remaining < 4 {
        return remaining;
    }

    let len = rng.gen_range(2..remaining);
    if len == remaining - 1 { remaining } else { len }
}
