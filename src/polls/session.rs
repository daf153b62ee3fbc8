//! Poll Session
//!
//! A single poll over one chat channel. Lifecycle:
//!
//! ```text
//! Idle --start(n)--> Active --disconnect()--> Terminated
//!   \______________________disconnect()______/
//! ```
//!
//! While `Active`, every non-echo chat message is parsed as a vote. The first
//! valid vote from a voter is final; later messages from the same voter, out
//! of range numbers and chatter are ignored. All ballot state sits behind one
//! mutex so tally reads never observe a half-applied vote.

use super::error::{PollError, PollResult};
use super::tally::VoteTally;
use crate::channels::{ChatEvent, ChatEventHandler, DynChatSource, SubscriptionHandle};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Lifecycle state of a poll session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Active,
    Terminated,
}

/// What happened to one chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Counted for this 1-based choice
    Counted(usize),
    Echo,
    NotOpen,
    Unparseable,
    OutOfRange(i64),
    AlreadyVoted,
}

#[derive(Debug)]
struct Ballot {
    state: SessionState,
    choice_count: usize,
    voters: HashSet<String>,
    tally: VoteTally,
    subscription: Option<SubscriptionHandle>,
}

impl Ballot {
    fn new() -> Self {
        Self {
            state: SessionState::Idle,
            choice_count: 0,
            voters: HashSet::new(),
            tally: VoteTally::empty(),
            subscription: None,
        }
    }

    fn record(&mut self, event: &ChatEvent) -> VoteOutcome {
        if event.is_echo {
            return VoteOutcome::Echo;
        }
        if self.state != SessionState::Active {
            return VoteOutcome::NotOpen;
        }
        let Some(vote) = parse_vote(&event.text) else {
            return VoteOutcome::Unparseable;
        };
        let choice = match usize::try_from(vote) {
            Ok(choice) if (1..=self.choice_count).contains(&choice) => choice,
            _ => return VoteOutcome::OutOfRange(vote),
        };
        if self.voters.contains(&event.voter_id) {
            return VoteOutcome::AlreadyVoted;
        }

        self.voters.insert(event.voter_id.clone());
        self.tally.record(choice);
        VoteOutcome::Counted(choice)
    }
}

/// A poll bound to one chat channel
pub struct PollSession {
    channel_name: String,
    source: DynChatSource,
    ballot: Arc<Mutex<Ballot>>,
}

impl fmt::Debug for PollSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ballot = self.ballot.lock();
        f.debug_struct("PollSession")
            .field("channel_name", &self.channel_name)
            .field("state", &ballot.state)
            .field("choice_count", &ballot.choice_count)
            .field("voters", &ballot.voters.len())
            .finish()
    }
}

impl PollSession {
    /// Create an idle session for `channel_name`
    pub fn new(channel_name: impl Into<String>, source: DynChatSource) -> Self {
        Self {
            channel_name: channel_name.into(),
            source,
            ballot: Arc::new(Mutex::new(Ballot::new())),
        }
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    pub fn state(&self) -> SessionState {
        self.ballot.lock().state
    }

    /// Number of choices; 0 until started
    pub fn choice_count(&self) -> usize {
        self.ballot.lock().choice_count
    }

    /// Distinct voters counted so far
    pub fn voter_count(&self) -> usize {
        self.ballot.lock().voters.len()
    }

    /// Open the poll and subscribe to the channel's chat.
    ///
    /// Only acts from `Idle`; otherwise returns `Ok(())` without changes. If
    /// the chat source fails the session stays `Active` with a tally that will
    /// not move until it is disconnected.
    pub async fn start(&self, choice_count: usize) -> PollResult<()> {
        if choice_count == 0 {
            return Err(PollError::InvalidChoiceCount(choice_count.to_string()));
        }

        {
            let mut ballot = self.ballot.lock();
            if ballot.state != SessionState::Idle {
                return Ok(());
            }
            ballot.choice_count = choice_count;
            ballot.tally = VoteTally::zeroed(choice_count);
            ballot.voters.clear();
            ballot.state = SessionState::Active;
        }

        let listener = Arc::new(VoteListener {
            channel: self.channel_name.clone(),
            ballot: Arc::downgrade(&self.ballot),
        });
        let handle = self.source.subscribe(&self.channel_name, listener).await?;

        let mut ballot = self.ballot.lock();
        if ballot.state == SessionState::Active {
            ballot.subscription = Some(handle);
            debug!(channel = %self.channel_name, choices = choice_count, "Poll started");
        } else {
            // Disconnected while the subscription was being set up
            drop(ballot);
            self.source.unsubscribe(handle);
        }
        Ok(())
    }

    /// Apply one chat message to the ballot
    pub fn handle_event(&self, event: &ChatEvent) -> VoteOutcome {
        self.ballot.lock().record(event)
    }

    /// Current tally while active; zeros (or empty if never started) otherwise
    pub fn tally(&self) -> VoteTally {
        let ballot = self.ballot.lock();
        match ballot.state {
            SessionState::Active => ballot.tally.clone(),
            SessionState::Idle | SessionState::Terminated => {
                VoteTally::zeroed(ballot.choice_count)
            }
        }
    }

    /// Stop the poll and release the chat subscription. Idempotent.
    pub fn disconnect(&self) {
        let subscription = {
            let mut ballot = self.ballot.lock();
            if ballot.state == SessionState::Terminated {
                return;
            }
            ballot.state = SessionState::Terminated;
            ballot.subscription.take()
        };

        if let Some(handle) = subscription {
            self.source.unsubscribe(handle);
        }
        debug!(channel = %self.channel_name, "Poll disconnected");
    }
}

/// Forwards chat events into a session's ballot.
///
/// Holds the ballot weakly so a dropped session is not kept alive by the
/// chat source.
struct VoteListener {
    channel: String,
    ballot: Weak<Mutex<Ballot>>,
}

impl ChatEventHandler for VoteListener {
    fn on_event(&self, event: ChatEvent) {
        let Some(ballot) = self.ballot.upgrade() else {
            return;
        };
        let outcome = ballot.lock().record(&event);
        trace!(channel = %self.channel, voter = %event.voter_id, outcome = ?outcome, "Chat message");
    }
}

/// Read a vote from the start of a chat message.
///
/// Leading whitespace and an optional sign are accepted, then as many digits
/// as follow; anything after the digits is ignored (`"2 please"` is 2).
/// Returns `None` when no digits follow or the number does not fit in `i64`.
pub fn parse_vote(text: &str) -> Option<i64> {
    let trimmed = text.trim_start();
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let end = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());
    let digits = unsigned.get(..end).filter(|d| !d.is_empty())?;
    let value: i64 = digits.parse().ok()?;
    Some(if negative { -value } else { value })
}
