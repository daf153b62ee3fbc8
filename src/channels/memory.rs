//! In-memory chat source
//!
//! Delivers events pushed with [`MemoryChatSource::emit`] to the channel's live
//! subscribers. Used by tests and for running the server without Twitch.

use super::{
    normalize_channel, ChannelError, ChannelResult, ChatEvent, ChatEventHandler, ChatSource,
    SubscriptionHandle,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

struct Subscriber {
    channel: String,
    handler: Arc<dyn ChatEventHandler>,
}

#[derive(Default)]
struct MemoryState {
    next_id: u64,
    live: HashMap<u64, Subscriber>,
    unsubscribe_calls: HashMap<u64, usize>,
    fail_subscribe: Option<String>,
}

/// Chat source fed by the caller
#[derive(Default)]
pub struct MemoryChatSource {
    state: Mutex<MemoryState>,
}

impl fmt::Debug for MemoryChatSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryChatSource")
            .field("live", &state.live.len())
            .finish()
    }
}

impl MemoryChatSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source whose `subscribe` always fails with `reason`
    pub fn failing(reason: impl Into<String>) -> Self {
        let source = Self::default();
        source.state.lock().fail_subscribe = Some(reason.into());
        source
    }

    /// Deliver `event` to every live subscriber of `channel`.
    ///
    /// Returns the number of handlers that received it.
    pub fn emit(&self, channel: &str, event: ChatEvent) -> usize {
        let Ok(channel) = normalize_channel(channel) else {
            return 0;
        };
        let mut targets: Vec<(u64, Arc<dyn ChatEventHandler>)> = {
            let state = self.state.lock();
            state
                .live
                .iter()
                .filter(|(_, sub)| sub.channel == channel)
                .map(|(id, sub)| (*id, sub.handler.clone()))
                .collect()
        };
        // Subscription order
        targets.sort_by_key(|(id, _)| *id);

        // Handlers run without the lock held
        for (_, handler) in &targets {
            handler.on_event(event.clone());
        }
        targets.len()
    }

    /// Number of subscriptions that have not been released
    pub fn live_subscriptions(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Whether any live subscription exists for `channel`
    pub fn is_subscribed(&self, channel: &str) -> bool {
        let Ok(channel) = normalize_channel(channel) else {
            return false;
        };
        self.state
            .lock()
            .live
            .values()
            .any(|sub| sub.channel == channel)
    }

    /// How many times `unsubscribe` was called for `handle`
    pub fn unsubscribe_calls(&self, handle: SubscriptionHandle) -> usize {
        self.state
            .lock()
            .unsubscribe_calls
            .get(&handle.id())
            .copied()
            .unwrap_or(0)
    }

    /// Total `unsubscribe` calls across all handles
    pub fn total_unsubscribe_calls(&self) -> usize {
        self.state.lock().unsubscribe_calls.values().sum()
    }
}

#[async_trait]
impl ChatSource for MemoryChatSource {
    async fn subscribe(
        &self,
        channel: &str,
        handler: Arc<dyn ChatEventHandler>,
    ) -> ChannelResult<SubscriptionHandle> {
        let channel = normalize_channel(channel)?;
        let mut state = self.state.lock();
        if let Some(reason) = &state.fail_subscribe {
            return Err(ChannelError::ConnectionFailed(reason.clone()));
        }

        state.next_id += 1;
        let id = state.next_id;
        state.live.insert(id, Subscriber { channel, handler });
        Ok(SubscriptionHandle::new(id))
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        let mut state = self.state.lock();
        *state.unsubscribe_calls.entry(handle.id()).or_insert(0) += 1;
        state.live.remove(&handle.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ChatEvent>>);

    impl ChatEventHandler for Recorder {
        fn on_event(&self, event: ChatEvent) {
            self.0.lock().push(event);
        }
    }

    #[tokio::test]
    async fn test_emit_reaches_channel_subscribers_only() {
        let source = MemoryChatSource::new();
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        source.subscribe("#Alpha", a.clone()).await.unwrap();
        source.subscribe("beta", b.clone()).await.unwrap();

        assert_eq!(source.emit("alpha", ChatEvent::new("u1", "1")), 1);
        assert_eq!(source.emit("gamma", ChatEvent::new("u1", "1")), 0);

        assert_eq!(a.0.lock().len(), 1);
        assert!(b.0.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let source = MemoryChatSource::new();
        let rec = Arc::new(Recorder::default());
        let handle = source.subscribe("alpha", rec.clone()).await.unwrap();

        source.unsubscribe(handle);
        assert_eq!(source.emit("alpha", ChatEvent::new("u1", "1")), 0);
        assert_eq!(source.unsubscribe_calls(handle), 1);
        assert_eq!(source.live_subscriptions(), 0);
        assert!(!source.is_subscribed("alpha"));
    }

    #[tokio::test]
    async fn test_failing_source() {
        let source = MemoryChatSource::failing("offline");
        let rec = Arc::new(Recorder::default());
        let err = source.subscribe("alpha", rec).await.unwrap_err();
        assert!(matches!(err, ChannelError::ConnectionFailed(ref r) if r == "offline"));
    }

    #[tokio::test]
    async fn test_subscribe_rejects_invalid_channel() {
        let source = MemoryChatSource::new();
        let rec = Arc::new(Recorder::default());
        let err = source.subscribe("not a channel", rec).await.unwrap_err();
        assert!(matches!(err, ChannelError::InvalidChannel(_)));
    }
}
