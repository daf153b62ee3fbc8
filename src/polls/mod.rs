//! Polls
//!
//! Live chat polls: a session per poll counting one vote per voter, and an
//! engine that keeps sessions alive for a fixed time under opaque keys.

pub mod config;
pub mod engine;
pub mod error;
pub mod session;
pub mod tally;

pub use config::PollsConfig;
pub use engine::{create_engine, parse_choice_count, KeyGenerator, PollEngine, PollEngineStats};
pub use error::{PollError, PollResult};
pub use session::{parse_vote, PollSession, SessionState, VoteOutcome};
pub use tally::VoteTally;
