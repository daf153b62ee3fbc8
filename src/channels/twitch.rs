//! Twitch Chat Source
//!
//! Reads a channel's chat over Twitch's IRC-over-WebSocket endpoint.
//! Logs in anonymously unless an OAuth token is configured, requests message
//! tags so votes can be keyed by the stable `user-id`, and reconnects with
//! capped exponential backoff when the socket drops.
//!
//! Each subscription owns one socket and one reader task, so a channel's
//! messages reach its handler strictly in order.

use super::{
    normalize_channel, ChannelError, ChannelResult, ChatEvent, ChatEventHandler, ChatSource,
    SubscriptionHandle,
};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Public Twitch chat endpoint
pub const DEFAULT_TWITCH_URL: &str = "wss://irc-ws.chat.twitch.tv:443";

/// Password Twitch accepts for anonymous `justinfan` logins
const ANONYMOUS_PASS: &str = "SCHMOOPIIE";

/// Twitch chat configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TwitchConfig {
    /// WebSocket endpoint
    pub url: String,
    /// Login name (anonymous `justinfan` nick when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,
    /// OAuth token for `nick`, without the `oauth:` prefix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth_token: Option<String>,
    /// Reconnect after the socket drops
    pub reconnect: bool,
    /// Upper bound for the reconnect delay
    pub max_backoff_secs: u64,
}

impl Default for TwitchConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_TWITCH_URL.to_string(),
            nick: None,
            oauth_token: None,
            reconnect: true,
            max_backoff_secs: 30,
        }
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type Registry = Arc<Mutex<HashMap<u64, CancellationToken>>>;

/// Twitch chat over WebSocket
pub struct TwitchChatSource {
    config: TwitchConfig,
    nick: String,
    next_id: AtomicU64,
    subscriptions: Registry,
}

impl fmt::Debug for TwitchChatSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwitchChatSource")
            .field("url", &self.config.url)
            .field("nick", &self.nick)
            .field("subscriptions", &self.subscriptions.lock().len())
            .finish()
    }
}

impl TwitchChatSource {
    pub fn new(config: TwitchConfig) -> Self {
        let nick = config
            .nick
            .as_deref()
            .map(str::to_ascii_lowercase)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(anonymous_nick);

        Self {
            config,
            nick,
            next_id: AtomicU64::new(1),
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Login this source presents to Twitch
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Subscriptions whose reader task is still running
    pub fn live_subscriptions(&self) -> usize {
        self.subscriptions.lock().len()
    }

    fn login(&self) -> Login {
        Login {
            url: self.config.url.clone(),
            nick: self.nick.clone(),
            pass: match &self.config.oauth_token {
                Some(token) => format!("oauth:{}", token.trim_start_matches("oauth:")),
                None => ANONYMOUS_PASS.to_string(),
            },
        }
    }
}

#[async_trait]
impl ChatSource for TwitchChatSource {
    async fn subscribe(
        &self,
        channel: &str,
        handler: Arc<dyn ChatEventHandler>,
    ) -> ChannelResult<SubscriptionHandle> {
        let channel = normalize_channel(channel)?;
        let login = self.login();

        // The first connection is awaited so callers see connection errors
        let socket = login.connect(&channel).await?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        self.subscriptions.lock().insert(id, cancel.clone());

        let reader = Reader {
            id,
            channel: channel.clone(),
            login,
            handler,
            cancel,
            reconnect: self.config.reconnect,
            max_backoff: Duration::from_secs(self.config.max_backoff_secs.max(1)),
            registry: self.subscriptions.clone(),
        };
        tokio::spawn(reader.run(socket));

        info!(channel = %channel, subscription = id, "Subscribed to Twitch chat");
        Ok(SubscriptionHandle::new(id))
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        if let Some(cancel) = self.subscriptions.lock().remove(&handle.id()) {
            cancel.cancel();
            debug!(subscription = handle.id(), "Unsubscribed from Twitch chat");
        }
    }
}

/// Credentials and endpoint for one connection
#[derive(Clone)]
struct Login {
    url: String,
    nick: String,
    pass: String,
}

impl Login {
    async fn connect(&self, channel: &str) -> ChannelResult<WsStream> {
        let (mut socket, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;

        for line in handshake(&self.nick, &self.pass, channel) {
            socket
                .send(Message::Text(line.into()))
                .await
                .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;
        }
        Ok(socket)
    }
}

/// Why a read loop stopped
enum Stop {
    Cancelled,
    Dropped(String),
}

struct Reader {
    id: u64,
    channel: String,
    login: Login,
    handler: Arc<dyn ChatEventHandler>,
    cancel: CancellationToken,
    reconnect: bool,
    max_backoff: Duration,
    registry: Registry,
}

impl Reader {
    async fn run(self, mut socket: WsStream) {
        loop {
            match self.pump(&mut socket).await {
                Stop::Cancelled => {
                    let part = format!("PART #{}", self.channel);
                    let _ = socket.send(Message::Text(part.into())).await;
                    let _ = socket.close(None).await;
                    break;
                }
                Stop::Dropped(reason) => {
                    warn!(channel = %self.channel, subscription = self.id, reason = %reason, "Twitch chat connection dropped");
                    if !self.reconnect {
                        break;
                    }
                    match self.reconnect().await {
                        Some(fresh) => socket = fresh,
                        None => break,
                    }
                }
            }
        }

        self.registry.lock().remove(&self.id);
        debug!(channel = %self.channel, subscription = self.id, "Twitch reader stopped");
    }

    /// Read frames until cancelled or the connection drops
    async fn pump(&self, socket: &mut WsStream) -> Stop {
        loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => return Stop::Cancelled,
                frame = socket.next() => frame,
            };

            let text = match frame {
                None => return Stop::Dropped("stream ended".to_string()),
                Some(Err(e)) => return Stop::Dropped(e.to_string()),
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(_))) => return Stop::Dropped("closed by server".to_string()),
                Some(Ok(_)) => continue,
            };

            for raw in text.as_str().split("\r\n").filter(|l| !l.is_empty()) {
                let Some(line) = IrcLine::parse(raw) else {
                    trace!(line = raw, "Unparseable IRC line");
                    continue;
                };
                match line.command {
                    "PING" => {
                        let payload = line.params.last().copied().unwrap_or("tmi.twitch.tv");
                        let pong = format!("PONG :{}", payload);
                        if let Err(e) = socket.send(Message::Text(pong.into())).await {
                            return Stop::Dropped(e.to_string());
                        }
                    }
                    "RECONNECT" => return Stop::Dropped("server requested reconnect".to_string()),
                    "NOTICE" => {
                        debug!(channel = %self.channel, notice = ?line.params.last(), "Twitch notice");
                    }
                    _ => {
                        if let Some(event) = line.chat_event(&self.channel, &self.login.nick) {
                            self.handler.on_event(event);
                        }
                    }
                }
            }
        }
    }

    /// Reconnect with backoff; `None` if cancelled first
    async fn reconnect(&self) -> Option<WsStream> {
        let mut attempt = 0u32;
        loop {
            let delay = backoff_delay(attempt, self.max_backoff);
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }

            let result = tokio::select! {
                _ = self.cancel.cancelled() => return None,
                result = self.login.connect(&self.channel) => result,
            };
            match result {
                Ok(socket) => {
                    info!(channel = %self.channel, subscription = self.id, attempt, "Reconnected to Twitch chat");
                    return Some(socket);
                }
                Err(e) => {
                    warn!(channel = %self.channel, error = %e, attempt, "Twitch reconnect failed");
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }
}

/// Lines sent after the socket opens
fn handshake(nick: &str, pass: &str, channel: &str) -> Vec<String> {
    vec![
        "CAP REQ :twitch.tv/tags twitch.tv/commands".to_string(),
        format!("PASS {}", pass),
        format!("NICK {}", nick),
        format!("JOIN #{}", channel),
    ]
}

/// Delay before reconnect `attempt` (0-based): 1s, 2s, 4s, ... capped at `max`
fn backoff_delay(attempt: u32, max: Duration) -> Duration {
    let secs = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
    Duration::from_secs(secs).min(max)
}

fn anonymous_nick() -> String {
    let suffix = uuid::Uuid::new_v4().as_u128() % 100_000;
    format!("justinfan{}", suffix)
}

/// Chat event carried by a raw IRC line, if it is a message for `channel`
pub fn parse_privmsg(line: &str, channel: &str, own_nick: &str) -> Option<ChatEvent> {
    IrcLine::parse(line)?.chat_event(channel, own_nick)
}

/// One parsed IRC line, borrowing from the raw text
#[derive(Debug, PartialEq, Eq)]
struct IrcLine<'a> {
    tags: Option<&'a str>,
    prefix: Option<&'a str>,
    command: &'a str,
    /// Middle params followed by the trailing param, if any
    params: Vec<&'a str>,
}

impl<'a> IrcLine<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        let tags = match rest.strip_prefix('@') {
            Some(tagged) => {
                let (tags, after) = tagged.split_once(' ')?;
                rest = after;
                Some(tags)
            }
            None => None,
        };

        let prefix = match rest.strip_prefix(':') {
            Some(prefixed) => {
                let (prefix, after) = prefixed.split_once(' ')?;
                rest = after;
                Some(prefix)
            }
            None => None,
        };

        let (head, trailing) = match rest.split_once(" :") {
            Some((head, trailing)) => (head, Some(trailing)),
            None => (rest, None),
        };
        let mut words = head.split(' ').filter(|w| !w.is_empty());
        let command = words.next()?;
        let mut params: Vec<&str> = words.collect();
        params.extend(trailing);

        Some(Self {
            tags,
            prefix,
            command,
            params,
        })
    }

    fn tag(&self, name: &str) -> Option<&'a str> {
        self.tags?.split(';').find_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key == name).then_some(value)
        })
    }

    /// Sender login from `nick!user@host`
    fn login(&self) -> Option<&'a str> {
        let prefix = self.prefix?;
        Some(prefix.split_once('!').map_or(prefix, |(nick, _)| nick))
    }

    /// Convert a `PRIVMSG` for `channel` into a chat event
    fn chat_event(&self, channel: &str, own_nick: &str) -> Option<ChatEvent> {
        if self.command != "PRIVMSG" {
            return None;
        }
        let target = self.params.first()?.strip_prefix('#')?;
        if !target.eq_ignore_ascii_case(channel) {
            return None;
        }
        let text = *self.params.get(1)?;
        let login = self.login()?;
        let voter_id = self
            .tag("user-id")
            .filter(|id| !id.is_empty())
            .unwrap_or(login);

        Some(ChatEvent {
            voter_id: voter_id.to_string(),
            text: text.to_string(),
            is_echo: login.eq_ignore_ascii_case(own_nick),
        })
    }
}
