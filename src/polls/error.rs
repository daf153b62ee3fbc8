//! Poll errors

use crate::channels::ChannelError;

/// Result type for poll operations
pub type PollResult<T> = Result<T, PollError>;

/// Failures surfaced to whoever opened a poll.
///
/// Bad votes are not errors; they are dropped where they arrive.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("choice count must be a positive integer, got {0:?}")]
    InvalidChoiceCount(String),

    #[error("choice count {requested} exceeds the maximum of {max}")]
    TooManyChoices { requested: usize, max: usize },

    #[error("channel name is required")]
    MissingChannel,

    #[error("chat source failure: {0}")]
    Adapter(#[from] ChannelError),

    #[error("could not allocate a unique poll key after {0} attempts")]
    KeyExhausted(usize),
}

impl PollError {
    /// Whether the caller's input caused the error
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            PollError::InvalidChoiceCount(_)
                | PollError::TooManyChoices { .. }
                | PollError::MissingChannel
                | PollError::Adapter(ChannelError::InvalidChannel(_))
        )
    }
}
