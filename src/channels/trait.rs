//! Chat Source Trait
//!
//! Defines the narrow interface the poll core consumes from a live chat
//! stream: subscribe to a channel with a handler, later unsubscribe.

use async_trait::async_trait;
use std::sync::Arc;

/// Result type for chat source operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors reported by a chat source
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Invalid channel name: {0:?}")]
    InvalidChannel(String),

    #[error("Channel closed")]
    Closed,
}

/// One inbound chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    /// Stable id of the sender
    pub voter_id: String,
    /// Raw message text
    pub text: String,
    /// Set when the message is the source's own traffic reflected back
    pub is_echo: bool,
}

impl ChatEvent {
    pub fn new(voter_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            voter_id: voter_id.into(),
            text: text.into(),
            is_echo: false,
        }
    }

    pub fn echo(voter_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            is_echo: true,
            ..Self::new(voter_id, text)
        }
    }
}

/// Opaque token for one live subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Receives chat events for a subscription, one at a time and in arrival order
pub trait ChatEventHandler: Send + Sync {
    fn on_event(&self, event: ChatEvent);
}

/// A live chat stream that can be subscribed to per channel
#[async_trait]
pub trait ChatSource: Send + Sync {
    /// Start delivering the channel's messages to `handler`
    async fn subscribe(
        &self,
        channel: &str,
        handler: Arc<dyn ChatEventHandler>,
    ) -> ChannelResult<SubscriptionHandle>;

    /// Stop delivery and release the underlying connection.
    ///
    /// Unknown or already released handles are ignored.
    fn unsubscribe(&self, handle: SubscriptionHandle);
}

/// Type-erased chat source for sharing
pub type DynChatSource = Arc<dyn ChatSource>;

/// Maximum length of a Twitch login
const MAX_CHANNEL_LEN: usize = 25;

/// Normalize a channel name: trim, drop a leading `#`, lowercase.
///
/// Rejects empty names and anything outside `[a-z0-9_]`.
pub fn normalize_channel(name: &str) -> ChannelResult<String> {
    let trimmed = name.trim();
    let bare = trimmed.strip_prefix('#').unwrap_or(trimmed);
    let lowered = bare.to_ascii_lowercase();

    if lowered.is_empty() || lowered.len() > MAX_CHANNEL_LEN {
        return Err(ChannelError::InvalidChannel(name.to_string()));
    }
    if !lowered
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ChannelError::InvalidChannel(name.to_string()));
    }
    Ok(lowered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_channel() {
        assert_eq!(normalize_channel("SomeStreamer").unwrap(), "somestreamer");
        assert_eq!(normalize_channel("  #some_streamer ").unwrap(), "some_streamer");
        assert_eq!(normalize_channel("abc123").unwrap(), "abc123");
    }

    #[test]
    fn test_normalize_channel_rejects_bad_names() {
        assert!(normalize_channel("").is_err());
        assert!(normalize_channel("#").is_err());
        assert!(normalize_channel("two words").is_err());
        assert!(normalize_channel("bad\r\nPRIVMSG").is_err());
        assert!(normalize_channel(&"x".repeat(26)).is_err());
    }

    #[test]
    fn test_echo_event_flag() {
        assert!(!ChatEvent::new("1", "2").is_echo);
        assert!(ChatEvent::echo("1", "2").is_echo);
    }
}
