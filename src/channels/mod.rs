//! Chat channels
//!
//! The poll core only sees [`ChatSource`]; `twitch` is the production
//! implementation and `memory` a caller-driven one for tests and local runs.

pub mod memory;
pub mod twitch;
mod r#trait;

pub use memory::MemoryChatSource;
pub use r#trait::{
    normalize_channel, ChannelError, ChannelResult, ChatEvent, ChatEventHandler, ChatSource,
    DynChatSource, SubscriptionHandle,
};
pub use twitch::{TwitchChatSource, TwitchConfig};
