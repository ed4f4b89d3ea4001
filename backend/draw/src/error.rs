use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DrawError {
    #[error("Need at least 2 participants, got {0}")]
    TooFewParticipants(usize),

    #[error("Participant {0} is listed more than once")]
    DuplicateParticipant(String),

    #[error("Cannot build a valid derangement: {person} is the only candidate left for themselves")]
    Exhausted { person: String },

    #[error("Unknown draw strategy: {0}")]
    UnknownStrategy(String),
}
