use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Local;

use crate::app::action::Action;
use crate::app::ignore::IgnoreList;
use crate::app::urls;
use crate::app::users::{self, ChannelUser};
use crate::config::model::{AppConfig, ServerConfig};
use crate::config::nickname::generate_nickname;
use crate::hooks::ScriptHook;
use crate::irc::connection::{
    Connection, ConnectionEndpoint, ConnectionId, ConnectionState, ServerIdentity,
};
use crate::irc::isupport::ServerSupport;
use crate::irc::sasl::SaslMechanism;
use crate::logging::{Scrollback, SCROLLBACK_END, SCROLLBACK_START, TIMESTAMP_FORMAT};

/// `(server, channel)`. The server tab of a server uses the server name as
/// its channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelKey {
    pub server: String,
    pub channel: String,
}

impl ChannelKey {
    pub fn new(server: &str, channel: &str) -> Self {
        Self {
            server: server.to_string(),
            channel: channel.to_string(),
        }
    }

    pub fn server_tab(server: &str) -> Self {
        Self::new(server, server)
    }

    pub fn is_server_tab(&self) -> bool {
        self.server == self.channel
    }
}

impl std::fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_server_tab() {
            f.write_str(&self.server)
        } else {
            write!(f, "{}/{}", self.server, self.channel)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    System,
    Chat,
    Action,
    Error,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Chat => "chat",
            Self::Action => "action",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Self::System),
            "chat" => Some(Self::Chat),
            "action" => Some(Self::Action),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    fn is_conversation(&self) -> bool {
        matches!(self, Self::Chat | Self::Action)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub kind: MessageKind,
    pub text: String,
    pub timestamp: String,
}

impl StoredMessage {
    pub fn now(kind: MessageKind, text: String) -> Self {
        Self {
            kind,
            text,
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ChannelState {
    pub topic: String,
    pub users: Vec<ChannelUser>,
    pub unread: bool,
    pub highlight: bool,
    pub history: Vec<StoredMessage>,
}

/// Everything needed to open (or reopen) a connection.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub endpoint: ConnectionEndpoint,
    pub identity: ServerIdentity,
    /// Joined after registration.
    pub channels: Vec<String>,
}

impl ConnectRequest {
    pub fn from_server_config(server: &ServerConfig, config: &AppConfig) -> Self {
        let nick = server.nickname.clone();
        let mut identity = ServerIdentity::new(&nick);
        identity.username = server.username.clone().unwrap_or_else(|| nick.clone());
        identity.realname = server.realname.clone().unwrap_or_else(|| nick.clone());
        identity.password = server.password.clone();
        identity.sasl = SaslMechanism::parse(server.sasl_mechanism.as_deref().unwrap_or(""));
        identity.sasl_username = server.sasl_username.clone().unwrap_or_else(|| nick.clone());
        identity.sasl_password = server.sasl_password.clone().unwrap_or_default();
        identity.nickserv_password = server.nickserv_password.clone();
        identity.nickserv_command = server.nickserv_command.clone();

        Self {
            endpoint: ConnectionEndpoint {
                host: server.host.clone(),
                port: server.port,
                tls: server.tls,
                accept_invalid_certs: server.accept_invalid_certs,
                proxy: config.proxy.clone(),
            },
            identity,
            channels: server.channels.clone(),
        }
    }

    /// `/SERVER host port`: reuse a matching configured server's identity if
    /// there is one.
    pub fn ad_hoc(host: &str, port: u16, tls: bool, nick: Option<&str>, config: &AppConfig) -> Self {
        let base = match config.find_server(host) {
            Some(server) => server.clone(),
            None => {
                let default_nick = config
                    .servers
                    .first()
                    .map(|s| s.nickname.clone())
                    .unwrap_or_else(generate_nickname);
                ServerConfig::new(host, host, &default_nick)
            }
        };
        let mut request = Self::from_server_config(&base, config);
        request.endpoint.host = host.to_string();
        request.endpoint.port = port;
        request.endpoint.tls = tls;
        if let Some(nick) = nick {
            request.identity.nickname = nick.to_string();
        }
        request
    }

    /// Server identifier used for sessions, channel keys and reconnects.
    pub fn server(&self) -> &str {
        &self.endpoint.host
    }
}

pub struct ServerSession {
    pub conn_id: ConnectionId,
    pub connection: Connection,
    pub request: ConnectRequest,
}

#[derive(Debug, Clone)]
pub struct ReconnectState {
    pub attempts: u32,
    /// Token of the armed timer, if any.
    pub pending: Option<u64>,
    pub request: ConnectRequest,
    pub user_disconnect: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwayLogEntry {
    pub timestamp: String,
    pub nick: String,
    pub channel: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrabbedUrl {
    pub timestamp: String,
    pub nick: String,
    pub channel: String,
    pub url: String,
}

/// State changes for the presentation layer, in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    MessageAppended { key: ChannelKey, message: StoredMessage },
    ViewSwitched(ChannelKey),
    HistoryCleared(ChannelKey),
    ChannelJoined(ChannelKey),
    ChannelParted(ChannelKey),
    ChannelClosed(ChannelKey),
    QueryOpened(ChannelKey),
    TopicChanged { key: ChannelKey, topic: String },
    UsersChanged(ChannelKey),
    NickChanged { server: String, nick: String },
    ServerRegistered { server: String, nick: String },
    ConnectionStateChanged { server: String, state: ConnectionState },
    UnreadChanged { key: ChannelKey, unread: bool, highlight: bool },
    IgnoreListChanged,
    AwayChanged(bool),
    UrlGrabbed(GrabbedUrl),
}

pub struct AppState {
    pub config: AppConfig,
    pub sessions: BTreeMap<String, ServerSession>,
    pub channels: BTreeMap<ChannelKey, ChannelState>,
    pub active: Option<ChannelKey>,
    pub ignore: IgnoreList,
    pub reconnect: HashMap<String, ReconnectState>,
    pub is_away: bool,
    pub away_log: Vec<AwayLogEntry>,
    pub grabbed_urls: Vec<GrabbedUrl>,
    pub pending_actions: Vec<Action>,
    pub(crate) hooks: Option<Box<dyn ScriptHook>>,
    scrollback: Option<Box<dyn Scrollback>>,
    scrollback_loaded: HashSet<ChannelKey>,
    notifications: Vec<Notification>,
    next_conn_id: ConnectionId,
    next_token: u64,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            sessions: BTreeMap::new(),
            channels: BTreeMap::new(),
            active: None,
            ignore: IgnoreList::default(),
            reconnect: HashMap::new(),
            is_away: false,
            away_log: Vec::new(),
            grabbed_urls: Vec::new(),
            pending_actions: Vec::new(),
            hooks: None,
            scrollback: None,
            scrollback_loaded: HashSet::new(),
            notifications: Vec::new(),
            next_conn_id: 1,
            next_token: 1,
        }
    }

    pub fn with_scrollback(mut self, scrollback: Box<dyn Scrollback>) -> Self {
        self.scrollback = Some(scrollback);
        self
    }

    pub fn with_hooks(mut self, hooks: Box<dyn ScriptHook>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn allocate_conn_id(&mut self) -> ConnectionId {
        let id = self.next_conn_id;
        self.next_conn_id += 1;
        id
    }

    pub fn allocate_token(&mut self) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        token
    }

    pub fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    /// Move queued wire lines of every connection into `pending_actions`.
    pub fn flush_outgoing(&mut self) {
        for session in self.sessions.values_mut() {
            for line in session.connection.take_outgoing() {
                self.pending_actions.push(Action::Send {
                    conn_id: session.conn_id,
                    line,
                });
            }
        }
    }

    pub fn take_actions(&mut self) -> Vec<Action> {
        self.flush_outgoing();
        std::mem::take(&mut self.pending_actions)
    }

    // ── Sessions ──

    pub fn server_for_conn(&self, conn_id: ConnectionId) -> Option<String> {
        self.sessions
            .iter()
            .find(|(_, s)| s.conn_id == conn_id)
            .map(|(name, _)| name.clone())
    }

    pub fn connection_mut(&mut self, server: &str) -> Option<&mut Connection> {
        self.sessions.get_mut(server).map(|s| &mut s.connection)
    }

    pub fn connection_state(&self, server: &str) -> ConnectionState {
        self.sessions
            .get(server)
            .map_or(ConnectionState::Disconnected, |s| s.connection.state())
    }

    pub fn current_nick(&self, server: &str) -> Option<&str> {
        self.sessions.get(server).map(|s| s.connection.nickname())
    }

    pub fn is_own_nick(&self, server: &str, nick: &str) -> bool {
        self.current_nick(server)
            .is_some_and(|own| own.eq_ignore_ascii_case(nick))
    }

    pub fn support(&self, server: &str) -> ServerSupport {
        self.sessions
            .get(server)
            .map(|s| s.connection.support().clone())
            .unwrap_or_default()
    }

    pub fn is_channel_name(&self, server: &str, name: &str) -> bool {
        match self.sessions.get(server) {
            Some(s) => s.connection.support().is_channel(name),
            None => ServerSupport::default().is_channel(name),
        }
    }

    pub fn is_query(&self, key: &ChannelKey) -> bool {
        !key.is_server_tab() && !self.is_channel_name(&key.server, &key.channel)
    }

    // ── Channels ──

    /// Get or lazily create the state for a key, seeding it from the
    /// scrollback log the first time the key is seen this session.
    pub fn ensure_channel(&mut self, key: &ChannelKey) -> &mut ChannelState {
        if self.scrollback_loaded.insert(key.clone()) {
            self.load_scrollback(key);
        }
        self.channels.entry(key.clone()).or_default()
    }

    fn load_scrollback(&mut self, key: &ChannelKey) {
        let Some(log) = self.scrollback.as_ref() else {
            return;
        };
        let max = self.config.logging.scrollback_lines;
        let entries = log.load_last(&key.server, &key.channel, max);
        if entries.is_empty() {
            return;
        }
        let mut loaded = Vec::with_capacity(entries.len() + 2);
        loaded.push(StoredMessage::now(
            MessageKind::System,
            format!("── {SCROLLBACK_START}{} ──", key.channel),
        ));
        loaded.extend(entries.into_iter().map(|e| StoredMessage {
            kind: e.kind,
            text: e.text,
            timestamp: e.timestamp,
        }));
        loaded.push(StoredMessage::now(
            MessageKind::System,
            format!("── {SCROLLBACK_END} ──"),
        ));
        let channel = self.channels.entry(key.clone()).or_default();
        loaded.append(&mut channel.history);
        channel.history = loaded;
    }

    /// Append to a channel's history, log it, and track unread/highlight.
    pub fn append(&mut self, key: &ChannelKey, kind: MessageKind, text: impl Into<String>) {
        let message = StoredMessage::now(kind, text.into());
        let track = kind.is_conversation() && self.active.as_ref() != Some(key);
        let highlight = track && self.is_highlight(key, &message.text);

        let channel = self.ensure_channel(key);
        channel.history.push(message.clone());
        let mut unread_changed = false;
        if track {
            unread_changed = !channel.unread || (highlight && !channel.highlight);
            channel.unread = true;
            channel.highlight |= highlight;
        }
        let (unread, highlighted) = (channel.unread, channel.highlight);

        if let Some(log) = self.scrollback.as_mut() {
            log.append(&key.server, &key.channel, kind, &message.text);
        }
        self.notify(Notification::MessageAppended {
            key: key.clone(),
            message,
        });
        if unread_changed {
            self.notify(Notification::UnreadChanged {
                key: key.clone(),
                unread,
                highlight: highlighted,
            });
        }
    }

    pub fn system(&mut self, key: &ChannelKey, text: impl Into<String>) {
        self.append(key, MessageKind::System, text);
    }

    pub fn error(&mut self, key: &ChannelKey, text: impl Into<String>) {
        self.append(key, MessageKind::Error, text);
    }

    /// Append a chat or action line from `nick`, feeding the URL grabber and
    /// the away log.
    pub fn append_conversation(
        &mut self,
        key: &ChannelKey,
        kind: MessageKind,
        nick: &str,
        text: String,
    ) {
        if self.config.features.url_grabber {
            let timestamp = Local::now().format("%H:%M:%S").to_string();
            for url in urls::extract_urls(&text) {
                let grabbed = GrabbedUrl {
                    timestamp: timestamp.clone(),
                    nick: nick.to_string(),
                    channel: key.channel.clone(),
                    url,
                };
                self.grabbed_urls.push(grabbed.clone());
                self.notify(Notification::UrlGrabbed(grabbed));
            }
        }
        if self.is_away && self.config.features.away_log {
            self.away_log.push(AwayLogEntry {
                timestamp: Local::now().format("%H:%M:%S").to_string(),
                nick: nick.to_string(),
                channel: key.channel.clone(),
                message: text.clone(),
            });
        }
        self.append(key, kind, text);
    }

    fn is_highlight(&self, key: &ChannelKey, text: &str) -> bool {
        if self.is_query(key) {
            return true;
        }
        self.current_nick(&key.server)
            .filter(|nick| !nick.is_empty())
            .is_some_and(|nick| text.to_lowercase().contains(&nick.to_lowercase()))
    }

    pub fn switch_to_channel(&mut self, key: &ChannelKey) {
        let channel = self.ensure_channel(key);
        let was_marked = channel.unread || channel.highlight;
        channel.unread = false;
        channel.highlight = false;
        self.active = Some(key.clone());
        if was_marked {
            self.notify(Notification::UnreadChanged {
                key: key.clone(),
                unread: false,
                highlight: false,
            });
        }
        self.notify(Notification::ViewSwitched(key.clone()));
    }

    /// Create (if needed) and switch to a private query tab.
    pub fn open_query(&mut self, server: &str, nick: &str) -> ChannelKey {
        let key = ChannelKey::new(server, nick);
        if !self.channels.contains_key(&key) {
            self.ensure_channel(&key);
            self.notify(Notification::QueryOpened(key.clone()));
        }
        self.switch_to_channel(&key);
        key
    }

    /// Drop a channel's state. The view falls back to its server tab.
    pub fn remove_channel(&mut self, key: &ChannelKey) -> bool {
        if self.channels.remove(key).is_none() {
            return false;
        }
        self.notify(Notification::ChannelClosed(key.clone()));
        if self.active.as_ref() == Some(key) {
            self.active = None;
            if !key.is_server_tab() {
                self.switch_to_channel(&ChannelKey::server_tab(&key.server));
            }
        }
        true
    }

    pub fn clear_history(&mut self, key: &ChannelKey) {
        if let Some(channel) = self.channels.get_mut(key) {
            channel.history.clear();
            self.notify(Notification::HistoryCleared(key.clone()));
        }
    }

    pub fn active_server(&self) -> Option<&str> {
        self.active.as_ref().map(|k| k.server.as_str())
    }

    // ── Queries ──

    pub fn history(&self, key: &ChannelKey) -> &[StoredMessage] {
        self.channels
            .get(key)
            .map_or(&[][..], |c| c.history.as_slice())
    }

    pub fn has_unread(&self, key: &ChannelKey) -> bool {
        self.channels.get(key).is_some_and(|c| c.unread)
    }

    pub fn has_highlight(&self, key: &ChannelKey) -> bool {
        self.channels.get(key).is_some_and(|c| c.highlight)
    }

    pub fn channel_topic(&self, key: &ChannelKey) -> Option<&str> {
        self.channels
            .get(key)
            .map(|c| c.topic.as_str())
            .filter(|t| !t.is_empty())
    }

    /// Display names ordered by rank.
    pub fn channel_users(&self, key: &ChannelKey) -> Vec<String> {
        match self.channels.get(key) {
            Some(channel) => {
                users::sorted_display_names(&channel.users, &self.support(&key.server))
            }
            None => Vec::new(),
        }
    }

    pub fn add_ignore(&mut self, mask: &str) -> Option<String> {
        let added = self.ignore.add(mask)?;
        self.notify(Notification::IgnoreListChanged);
        Some(added)
    }

    pub fn remove_ignore(&mut self, mask: &str) -> bool {
        let removed = self.ignore.remove(mask);
        if removed {
            self.notify(Notification::IgnoreListChanged);
        }
        removed
    }

    pub fn ignore_list(&self) -> Vec<String> {
        self.ignore.masks()
    }

    pub fn clear_away_log(&mut self) {
        self.away_log.clear();
    }

    pub fn clear_grabbed_urls(&mut self) {
        self.grabbed_urls.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogEntry, Scrollback};
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct MemoryLog {
        appended: Arc<Mutex<Vec<(String, String, MessageKind, String)>>>,
        stored: Vec<LogEntry>,
    }

    impl Scrollback for MemoryLog {
        fn append(&mut self, server: &str, channel: &str, kind: MessageKind, text: &str) {
            self.appended.lock().unwrap().push((
                server.to_string(),
                channel.to_string(),
                kind,
                text.to_string(),
            ));
        }

        fn load_last(&self, _server: &str, _channel: &str, max: usize) -> Vec<LogEntry> {
            let start = self.stored.len().saturating_sub(max);
            self.stored[start..].to_vec()
        }
    }

    #[test]
    fn test_unread_and_highlight() {
        let mut state = AppState::new(AppConfig::default());
        let rust = ChannelKey::new("irc.example.org", "#rust");
        let query = ChannelKey::new("irc.example.org", "bob");
        let tab = ChannelKey::server_tab("irc.example.org");
        state.switch_to_channel(&tab);

        state.append(&rust, MessageKind::System, "alice has joined #rust");
        assert!(!state.has_unread(&rust));

        state.append(&rust, MessageKind::Chat, "<alice> hello");
        assert!(state.has_unread(&rust));
        assert!(!state.has_highlight(&rust));

        state.append(&query, MessageKind::Chat, "<bob> psst");
        assert!(state.has_highlight(&query));

        state.switch_to_channel(&rust);
        assert!(!state.has_unread(&rust));
        state.append(&rust, MessageKind::Chat, "<alice> again");
        assert!(!state.has_unread(&rust));
    }

    #[test]
    fn test_scrollback_is_loaded_once_and_prepended() {
        let log = MemoryLog {
            stored: vec![LogEntry {
                timestamp: "2024-01-01 10:00:00".into(),
                kind: MessageKind::Chat,
                text: "<old> message".into(),
            }],
            ..Default::default()
        };
        let appended = log.appended.clone();
        let mut state = AppState::new(AppConfig::default()).with_scrollback(Box::new(log));
        let key = ChannelKey::new("net", "#c");

        state.system(&key, "Now talking in #c");
        let texts: Vec<&str> = state.history(&key).iter().map(|m| m.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "── Scrollback from #c ──",
                "<old> message",
                "── End of scrollback ──",
                "Now talking in #c"
            ]
        );

        state.remove_channel(&key);
        state.system(&key, "Now talking in #c");
        assert_eq!(state.history(&key).len(), 1);
        assert_eq!(appended.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_url_grabber_and_away_log() {
        let mut state = AppState::new(AppConfig::default());
        let key = ChannelKey::new("net", "#c");
        state.append_conversation(&key, MessageKind::Chat, "alice", "<alice> https://a.example".into());
        assert_eq!(state.grabbed_urls.len(), 1);
        assert_eq!(state.grabbed_urls[0].nick, "alice");
        assert!(state.away_log.is_empty());

        state.is_away = true;
        state.append_conversation(&key, MessageKind::Action, "bob", "* bob waves".into());
        assert_eq!(state.away_log.len(), 1);
        assert_eq!(state.away_log[0].channel, "#c");
    }

    #[test]
    fn test_close_falls_back_to_server_tab() {
        let mut state = AppState::new(AppConfig::default());
        let key = ChannelKey::new("net", "#c");
        state.switch_to_channel(&key);
        assert!(state.remove_channel(&key));
        assert_eq!(state.active, Some(ChannelKey::server_tab("net")));
        assert!(!state.remove_channel(&key));
    }

    #[test]
    fn test_ad_hoc_request_uses_configured_identity() {
        let mut config = AppConfig::default();
        let mut server = ServerConfig::new("example", "irc.example.org", "tester");
        server.sasl_mechanism = Some("PLAIN".into());
        server.sasl_password = Some("secret".into());
        config.servers = vec![server];

        let request = ConnectRequest::ad_hoc("irc.example.org", 6667, false, None, &config);
        assert_eq!(request.server(), "irc.example.org");
        assert_eq!(request.endpoint.port, 6667);
        assert_eq!(request.identity.sasl, SaslMechanism::Plain);
        assert_eq!(request.identity.sasl_username, "tester");

        let request = ConnectRequest::ad_hoc("irc.other.net", 6697, true, Some("zed"), &config);
        assert_eq!(request.identity.nickname, "zed");
        assert_eq!(request.identity.sasl, SaslMechanism::None);
    }
}
