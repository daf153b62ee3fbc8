//! Poll Engine
//!
//! Opens polls, answers tally reads and closes polls. Sessions live in an
//! [`ExpiringStore`] under random keys; evicting an entry, by TTL or by an
//! explicit close, disconnects its session exactly once.

use super::config::PollsConfig;
use super::error::{PollError, PollResult};
use super::session::PollSession;
use super::tally::VoteTally;
use crate::channels::DynChatSource;
use crate::clock::{Clock, SystemClock};
use crate::store::{Disposer, ExpiringStore};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Produces candidate poll keys
pub type KeyGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Releases a session's chat subscription on eviction
struct SessionDisposer {
    key: String,
    session: Arc<PollSession>,
}

impl Disposer for SessionDisposer {
    fn release(self: Box<Self>) {
        self.session.disconnect();
        info!(poll = %self.key, channel = %self.session.channel_name(), "Poll closed");
    }
}

/// Poll engine for managing live polls
pub struct PollEngine {
    store: ExpiringStore<String, Arc<PollSession>>,
    source: DynChatSource,
    config: PollsConfig,
    keys: KeyGenerator,
}

impl fmt::Debug for PollEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollEngine")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish()
    }
}

impl PollEngine {
    /// Create an engine on the wall clock
    pub fn new(source: DynChatSource, config: PollsConfig) -> Self {
        Self::with_clock(source, config, Arc::new(SystemClock))
    }

    /// Create an engine reading time from `clock`
    pub fn with_clock(source: DynChatSource, config: PollsConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: ExpiringStore::new(clock),
            source,
            config,
            keys: Arc::new(|| uuid::Uuid::new_v4().to_string()),
        }
    }

    /// Replace the key generator
    pub fn with_key_generator(mut self, keys: KeyGenerator) -> Self {
        self.keys = keys;
        self
    }

    pub fn config(&self) -> &PollsConfig {
        &self.config
    }

    /// Open a poll on `channel` with `choice_count` choices and return its key.
    ///
    /// The session is started before it is stored; if starting fails it is
    /// disconnected and the error returned.
    pub async fn open_poll(&self, channel: &str, choice_count: usize) -> PollResult<String> {
        let channel = channel.trim();
        if channel.is_empty() {
            return Err(PollError::MissingChannel);
        }
        if choice_count > self.config.max_choices {
            return Err(PollError::TooManyChoices {
                requested: choice_count,
                max: self.config.max_choices,
            });
        }

        let session = Arc::new(PollSession::new(channel, self.source.clone()));
        if let Err(err) = session.start(choice_count).await {
            session.disconnect();
            warn!(channel = %channel, error = %err, "Failed to start poll");
            return Err(err);
        }

        let ttl = self.config.ttl();
        for _ in 0..self.config.key_attempts {
            let key = (self.keys)();
            let disposer = SessionDisposer {
                key: key.clone(),
                session: session.clone(),
            };
            if self
                .store
                .insert_unique(key.clone(), session.clone(), ttl, disposer)
            {
                info!(poll = %key, channel = %channel, choices = choice_count, "Poll opened");
                return Ok(key);
            }
            debug!(poll = %key, "Poll key collision, retrying");
        }

        session.disconnect();
        warn!(channel = %channel, "Could not allocate a poll key");
        Err(PollError::KeyExhausted(self.config.key_attempts))
    }

    /// Tally for `key`; empty if the poll is unknown or expired
    pub fn read_tally(&self, key: &str) -> VoteTally {
        match self.store.get(key) {
            Some(session) => session.tally(),
            None => VoteTally::empty(),
        }
    }

    /// Close the poll under `key`. Returns whether it was still open.
    pub fn close_poll(&self, key: &str) -> bool {
        self.store.remove(key)
    }

    /// Live session for `key`
    pub fn session(&self, key: &str) -> Option<Arc<PollSession>> {
        self.store.get(key)
    }

    /// Get engine statistics
    pub fn stats(&self) -> PollEngineStats {
        PollEngineStats {
            stored_polls: self.store.len(),
        }
    }
}

/// Statistics for the poll engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollEngineStats {
    /// Polls held by the store, including expired ones not yet evicted
    pub stored_polls: usize,
}

/// Parse a raw choice count from a request
pub fn parse_choice_count(raw: Option<&str>, max: usize) -> PollResult<usize> {
    let raw = raw.map(str::trim).unwrap_or_default();
    let count: usize = raw
        .parse()
        .map_err(|_| PollError::InvalidChoiceCount(raw.to_string()))?;
    if count == 0 {
        return Err(PollError::InvalidChoiceCount(raw.to_string()));
    }
    if count > max {
        return Err(PollError::TooManyChoices {
            requested: count,
            max,
        });
    }
    Ok(count)
}

/// Create a shared poll engine
pub fn create_engine(source: DynChatSource, config: PollsConfig) -> Arc<PollEngine> {
    Arc::new(PollEngine::new(source, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{ChannelError, ChatEvent, MemoryChatSource};
    use crate::clock::ManualClock;
    use crate::polls::config::DEFAULT_POLL_TTL_MS;
    use crate::polls::SessionState;
    use std::time::Duration;

    const CHANNEL: &str = "somechannel";

    fn test_engine() -> (PollEngine, Arc<MemoryChatSource>, Arc<ManualClock>) {
        let source = Arc::new(MemoryChatSource::new());
        let clock = Arc::new(ManualClock::new());
        let engine = PollEngine::with_clock(source.clone(), PollsConfig::default(), clock.clone());
        (engine, source, clock)
    }

    #[tokio::test]
    async fn test_open_poll_and_read_tally() {
        let (engine, source, _clock) = test_engine();
        let key = engine.open_poll(CHANNEL, 3).await.unwrap();

        assert_eq!(engine.read_tally(&key).counts(), &[0, 0, 0]);

        source.emit(CHANNEL, ChatEvent::new("A", "2"));
        source.emit(CHANNEL, ChatEvent::new("A", "1"));
        source.emit(CHANNEL, ChatEvent::new("B", "5"));
        source.emit(CHANNEL, ChatEvent::new("B", "1"));
        assert_eq!(engine.read_tally(&key).counts(), &[1, 1, 0]);
        assert_eq!(engine.stats().stored_polls, 1);
    }

    #[tokio::test]
    async fn test_unknown_key_reads_empty() {
        let (engine, _source, _clock) = test_engine();
        assert!(engine.read_tally("nope").is_empty());
        assert!(!engine.close_poll("nope"));
    }

    #[tokio::test]
    async fn test_close_poll_releases_subscription_once() {
        let (engine, source, _clock) = test_engine();
        let key = engine.open_poll(CHANNEL, 2).await.unwrap();
        let session = engine.session(&key).unwrap();

        assert!(engine.close_poll(&key));
        assert!(!engine.close_poll(&key));

        assert_eq!(session.state(), SessionState::Terminated);
        assert_eq!(source.total_unsubscribe_calls(), 1);
        assert!(engine.read_tally(&key).is_empty());
    }

    #[tokio::test]
    async fn test_expired_poll_is_evicted_on_read() {
        let (engine, source, clock) = test_engine();
        let key = engine.open_poll(CHANNEL, 2).await.unwrap();
        source.emit(CHANNEL, ChatEvent::new("A", "1"));

        clock.advance(Duration::from_millis(DEFAULT_POLL_TTL_MS + 1));
        assert!(engine.read_tally(&key).is_empty());
        assert!(engine.read_tally(&key).is_empty());

        assert_eq!(source.live_subscriptions(), 0);
        assert_eq!(source.total_unsubscribe_calls(), 1);
        assert_eq!(engine.stats().stored_polls, 0);
    }

    #[tokio::test]
    async fn test_poll_readable_until_ttl() {
        let (engine, _source, clock) = test_engine();
        let key = engine.open_poll(CHANNEL, 2).await.unwrap();

        clock.advance(Duration::from_millis(119_999));
        assert_eq!(engine.read_tally(&key).counts(), &[0, 0]);
    }

    #[tokio::test]
    async fn test_open_poll_validates_arguments() {
        let (engine, source, _clock) = test_engine();

        let err = engine.open_poll(CHANNEL, 0).await.unwrap_err();
        assert!(matches!(err, PollError::InvalidChoiceCount(_)));

        let err = engine.open_poll(CHANNEL, 51).await.unwrap_err();
        assert!(matches!(err, PollError::TooManyChoices { requested: 51, max: 50 }));

        let err = engine.open_poll("   ", 2).await.unwrap_err();
        assert!(matches!(err, PollError::MissingChannel));

        let err = engine.open_poll("bad channel", 2).await.unwrap_err();
        assert!(matches!(err, PollError::Adapter(ChannelError::InvalidChannel(_))));

        assert_eq!(engine.stats().stored_polls, 0);
        assert_eq!(source.live_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_adapter_failure_is_not_stored() {
        let source = Arc::new(MemoryChatSource::failing("offline"));
        let engine = PollEngine::new(source, PollsConfig::default());

        let err = engine.open_poll(CHANNEL, 2).await.unwrap_err();
        assert!(matches!(err, PollError::Adapter(ChannelError::ConnectionFailed(_))));
        assert_eq!(engine.stats().stored_polls, 0);
    }

    #[tokio::test]
    async fn test_key_collision_retries() {
        let (engine, source, _clock) = test_engine();
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let keys: KeyGenerator = {
            let counter = counter.clone();
            Arc::new(move || {
                let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                // First two calls collide on the same key
                if n < 2 {
                    "fixed".to_string()
                } else {
                    format!("key-{}", n)
                }
            })
        };
        let engine = engine.with_key_generator(keys);

        assert_eq!(engine.open_poll(CHANNEL, 2).await.unwrap(), "fixed");
        assert_eq!(engine.open_poll(CHANNEL, 2).await.unwrap(), "key-2");
        assert_eq!(engine.stats().stored_polls, 2);
        assert_eq!(source.live_subscriptions(), 2);
    }

    #[tokio::test]
    async fn test_key_exhaustion_disconnects_session() {
        let (engine, source, _clock) = test_engine();
        let engine = engine.with_key_generator(Arc::new(|| "same".to_string()));

        engine.open_poll(CHANNEL, 2).await.unwrap();
        let err = engine.open_poll(CHANNEL, 2).await.unwrap_err();

        assert!(matches!(err, PollError::KeyExhausted(8)));
        assert_eq!(source.live_subscriptions(), 1);
        assert_eq!(source.total_unsubscribe_calls(), 1);
    }

    #[tokio::test]
    async fn test_polls_on_same_channel_are_independent() {
        let (engine, source, _clock) = test_engine();
        let first = engine.open_poll(CHANNEL, 2).await.unwrap();
        source.emit(CHANNEL, ChatEvent::new("A", "1"));
        let second = engine.open_poll(CHANNEL, 2).await.unwrap();
        source.emit(CHANNEL, ChatEvent::new("A", "2"));

        assert_eq!(engine.read_tally(&first).counts(), &[1, 0]);
        assert_eq!(engine.read_tally(&second).counts(), &[0, 1]);
    }

    #[test]
    fn test_parse_choice_count() {
        assert_eq!(parse_choice_count(Some("3"), 50).unwrap(), 3);
        assert_eq!(parse_choice_count(Some(" 7 "), 50).unwrap(), 7);
        assert!(matches!(
            parse_choice_count(None, 50),
            Err(PollError::InvalidChoiceCount(_))
        ));
        assert!(matches!(
            parse_choice_count(Some("0"), 50),
            Err(PollError::InvalidChoiceCount(_))
        ));
        assert!(matches!(
            parse_choice_count(Some("-2"), 50),
            Err(PollError::InvalidChoiceCount(_))
        ));
        assert!(matches!(
            parse_choice_count(Some("two"), 50),
            Err(PollError::InvalidChoiceCount(_))
        ));
        assert!(matches!(
            parse_choice_count(Some("51"), 50),
            Err(PollError::TooManyChoices { .. })
        ));
    }
}
