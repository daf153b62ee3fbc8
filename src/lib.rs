//! chatpoll library
//!
//! Short-lived polls over Twitch chat: an expiring session store, the poll
//! state machine, chat sources and the HTTP surface that ties them together.

pub mod channels;
pub mod cli;
pub mod clock;
pub mod config;
pub mod logging;
pub mod polls;
pub mod server;
pub mod store;
