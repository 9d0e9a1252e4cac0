//! Per-server protocol state machine.
//!
//! A [`Connection`] never touches a socket. The transport task feeds it
//! transport events and raw lines; it answers with [`IrcEvent`]s for the
//! manager and queues wire lines in an outbox that the control loop drains
//! after every event. This keeps the handshake fully testable.

use std::collections::HashMap;

use chrono::Local;

use super::error::IrcError;
use super::isupport::ServerSupport;
use super::message::{format_ctcp, parse_ctcp, Message};
use super::sasl::{self, SaslMechanism};
use crate::config::model::{CtcpConfig, ProxyConfig};

/// Identifies one transport session. A reconnect gets a fresh id so events
/// from a discarded socket can be recognised and dropped.
pub type ConnectionId = u64;

pub const DEFAULT_NICKSERV_COMMAND: &str = "/msg NickServ IDENTIFY %p";
const SASL_CHUNK_SIZE: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    TlsHandshake,
    AwaitingCapList,
    SaslNegotiating,
    Registering,
    Registered,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::TlsHandshake => "TlsHandshake",
            Self::AwaitingCapList => "AwaitingCapList",
            Self::SaslNegotiating => "SaslNegotiating",
            Self::Registering => "Registering",
            Self::Registered => "Registered",
        };
        f.write_str(name)
    }
}

/// Who we claim to be on a server.
#[derive(Debug, Clone)]
pub struct ServerIdentity {
    pub nickname: String,
    pub username: String,
    pub realname: String,
    pub password: Option<String>,
    pub sasl: SaslMechanism,
    pub sasl_username: String,
    pub sasl_password: String,
    pub nickserv_password: Option<String>,
    /// Template with `%p` (password) and `%n` (nick) placeholders.
    pub nickserv_command: String,
}

impl ServerIdentity {
    pub fn new(nickname: &str) -> Self {
        Self {
            nickname: nickname.to_string(),
            username: nickname.to_string(),
            realname: nickname.to_string(),
            password: None,
            sasl: SaslMechanism::None,
            sasl_username: String::new(),
            sasl_password: String::new(),
            nickserv_password: None,
            nickserv_command: DEFAULT_NICKSERV_COMMAND.to_string(),
        }
    }
}

/// Where to connect. Fixed for the lifetime of one connection attempt.
#[derive(Debug, Clone)]
pub struct ConnectionEndpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub accept_invalid_certs: bool,
    pub proxy: ProxyConfig,
}

/// Protocol-level events handed to the manager, in wire order.
#[derive(Debug, Clone, PartialEq)]
pub enum IrcEvent {
    StateChanged(ConnectionState),
    Registered { nick: String, welcome: String },
    /// Our own nickname changed (server rename, collision retry or NICK echo).
    OwnNickChanged { nick: String },
    Info(String),
    Error(IrcError),
    Privmsg { prefix: String, target: String, text: String },
    Notice { prefix: String, target: String, text: String },
    Action { prefix: String, target: String, text: String },
    CtcpRequest { prefix: String, target: String, command: String, args: String },
    CtcpReply { prefix: String, command: String, args: String },
    Join { prefix: String, channel: String },
    Part { prefix: String, channel: String, reason: Option<String> },
    Quit { prefix: String, reason: Option<String> },
    Kick { prefix: String, channel: String, nick: String, reason: Option<String> },
    NickChange { prefix: String, new_nick: String },
    Topic { channel: String, topic: String, setter: Option<String> },
    ChannelMode { prefix: String, channel: String, modes: String, params: Vec<String> },
    UserMode { nick: String, modes: String },
    Invite { prefix: String, channel: String },
    Names { channel: String, names: Vec<String> },
    Numeric { code: u16, params: Vec<String> },
    ServerError(String),
    Disconnected { reason: String },
}

/// Nick portion of a `nick!user@host` prefix.
pub fn nick_of(prefix: &str) -> &str {
    prefix.split('!').next().unwrap_or(prefix)
}

pub struct Connection {
    id: ConnectionId,
    endpoint: ConnectionEndpoint,
    identity: ServerIdentity,
    ctcp: CtcpConfig,
    state: ConnectionState,
    nick: String,
    support: ServerSupport,
    cap_buffer: Vec<String>,
    server_caps: Vec<String>,
    cap_ended: bool,
    pending_names: HashMap<String, Vec<String>>,
    quitting: bool,
    outbox: Vec<String>,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        endpoint: ConnectionEndpoint,
        identity: ServerIdentity,
        ctcp: CtcpConfig,
    ) -> Self {
        let nick = identity.nickname.clone();
        Self {
            id,
            endpoint,
            identity,
            ctcp,
            state: ConnectionState::Disconnected,
            nick,
            support: ServerSupport::default(),
            cap_buffer: Vec::new(),
            server_caps: Vec::new(),
            cap_ended: false,
            pending_names: HashMap::new(),
            quitting: false,
            outbox: Vec::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn endpoint(&self) -> &ConnectionEndpoint {
        &self.endpoint
    }

    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn nickname(&self) -> &str {
        &self.nick
    }

    pub fn support(&self) -> &ServerSupport {
        &self.support
    }

    pub fn server_caps(&self) -> &[String] {
        &self.server_caps
    }

    pub fn is_registered(&self) -> bool {
        self.state == ConnectionState::Registered
    }

    pub fn is_quitting(&self) -> bool {
        self.quitting
    }

    /// Lines queued since the last call, oldest first.
    pub fn take_outgoing(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outbox)
    }

    fn set_state(&mut self, state: ConnectionState, events: &mut Vec<IrcEvent>) {
        if self.state != state {
            tracing::debug!(conn = self.id, from = %self.state, to = %state, "connection state");
            self.state = state;
            events.push(IrcEvent::StateChanged(state));
        }
    }

    // ── Transport events ──

    pub fn on_connecting(&mut self) -> Vec<IrcEvent> {
        let mut events = Vec::new();
        self.set_state(ConnectionState::Connecting, &mut events);
        events
    }

    /// TCP (and proxy tunnel) is up; TLS may still be pending.
    pub fn on_tcp_connected(&mut self) -> Vec<IrcEvent> {
        let mut events = Vec::new();
        if self.endpoint.tls {
            self.set_state(ConnectionState::TlsHandshake, &mut events);
        }
        events
    }

    /// The stream is ready for IRC traffic: start registration.
    pub fn on_transport_ready(&mut self) -> Vec<IrcEvent> {
        let mut events = Vec::new();
        self.cap_buffer.clear();
        self.cap_ended = false;
        self.send("CAP LS 302".to_string());
        if let Some(pass) = self.identity.password.clone().filter(|p| !p.is_empty()) {
            self.send(format!("PASS {pass}"));
        }
        self.send(format!("NICK {}", self.nick));
        self.send(format!(
            "USER {} 0 * :{}",
            self.identity.username, self.identity.realname
        ));
        self.set_state(ConnectionState::AwaitingCapList, &mut events);
        events
    }

    pub fn on_transport_closed(&mut self, reason: &str) -> Vec<IrcEvent> {
        let mut events = Vec::new();
        self.pending_names.clear();
        self.set_state(ConnectionState::Disconnected, &mut events);
        events.push(IrcEvent::Disconnected {
            reason: reason.to_string(),
        });
        events
    }

    // ── Inbound ──

    /// Process one raw line. Malformed lines are logged and dropped.
    pub fn handle_line(&mut self, raw: &str) -> Vec<IrcEvent> {
        let msg = match Message::parse(raw) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(conn = self.id, error = %e, "dropping line");
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        if let Some(code) = msg.numeric() {
            self.handle_numeric(code, msg, &mut events);
            return events;
        }

        let prefix = msg.prefix.clone().unwrap_or_default();
        match msg.command.as_str() {
            "PING" => {
                let token = msg.trailing();
                if token.is_empty() {
                    self.send("PONG".to_string());
                } else if token.contains(' ') || token.starts_with(':') {
                    self.send(format!("PONG :{token}"));
                } else {
                    self.send(format!("PONG {token}"));
                }
            }
            "CAP" => self.handle_cap(&msg, &mut events),
            "AUTHENTICATE" => self.handle_authenticate(&msg, &mut events),
            "PRIVMSG" | "NOTICE" => {
                let (Some(target), Some(text)) = (msg.param(0), msg.params.get(1)) else {
                    return events;
                };
                self.handle_message(&msg.command, prefix, target.to_string(), text, &mut events);
            }
            "JOIN" => {
                if let Some(channel) = msg.param(0) {
                    if nick_of(&prefix).eq_ignore_ascii_case(&self.nick) {
                        self.pending_names.insert(channel.to_string(), Vec::new());
                    }
                    events.push(IrcEvent::Join {
                        prefix,
                        channel: channel.to_string(),
                    });
                }
            }
            "PART" => {
                if let Some(channel) = msg.param(0) {
                    events.push(IrcEvent::Part {
                        prefix,
                        channel: channel.to_string(),
                        reason: msg.param(1).map(str::to_string),
                    });
                }
            }
            "QUIT" => events.push(IrcEvent::Quit {
                prefix,
                reason: msg.param(0).map(str::to_string),
            }),
            "KICK" => {
                if let (Some(channel), Some(nick)) = (msg.param(0), msg.param(1)) {
                    events.push(IrcEvent::Kick {
                        prefix,
                        channel: channel.to_string(),
                        nick: nick.to_string(),
                        reason: msg.param(2).map(str::to_string),
                    });
                }
            }
            "NICK" => {
                if let Some(new_nick) = msg.param(0) {
                    if nick_of(&prefix).eq_ignore_ascii_case(&self.nick) {
                        self.nick = new_nick.to_string();
                        events.push(IrcEvent::OwnNickChanged {
                            nick: new_nick.to_string(),
                        });
                    }
                    events.push(IrcEvent::NickChange {
                        prefix,
                        new_nick: new_nick.to_string(),
                    });
                }
            }
            "TOPIC" => {
                if let Some(channel) = msg.param(0) {
                    events.push(IrcEvent::Topic {
                        channel: channel.to_string(),
                        topic: msg.param(1).unwrap_or_default().to_string(),
                        setter: Some(nick_of(&prefix).to_string()),
                    });
                }
            }
            "MODE" => {
                let Some(target) = msg.param(0) else {
                    return events;
                };
                let modes = msg.param(1).unwrap_or_default().to_string();
                if self.support.is_channel(target) {
                    events.push(IrcEvent::ChannelMode {
                        prefix,
                        channel: target.to_string(),
                        modes,
                        params: msg.params.iter().skip(2).cloned().collect(),
                    });
                } else {
                    events.push(IrcEvent::UserMode {
                        nick: target.to_string(),
                        modes,
                    });
                }
            }
            "INVITE" => {
                if let Some(channel) = msg.param(1) {
                    events.push(IrcEvent::Invite {
                        prefix,
                        channel: channel.to_string(),
                    });
                }
            }
            "ERROR" => events.push(IrcEvent::ServerError(msg.trailing().to_string())),
            other => tracing::debug!(conn = self.id, command = other, "unhandled command"),
        }
        events
    }

    fn handle_cap(&mut self, msg: &Message, events: &mut Vec<IrcEvent>) {
        let sub = msg.param(1).unwrap_or_default().to_ascii_uppercase();
        match sub.as_str() {
            "LS" => {
                self.cap_buffer
                    .extend(msg.trailing().split_whitespace().map(str::to_string));
                // `CAP * LS * :...` announces more lines to come
                if msg.params.len() >= 4 && msg.param(2) == Some("*") {
                    return;
                }
                self.server_caps = std::mem::take(&mut self.cap_buffer);
                if self.state != ConnectionState::AwaitingCapList {
                    return;
                }
                let advertised = self
                    .server_caps
                    .iter()
                    .any(|cap| cap.to_ascii_lowercase().contains("sasl"));
                if advertised && self.identity.sasl.is_enabled() {
                    self.send("CAP REQ :sasl".to_string());
                    self.set_state(ConnectionState::SaslNegotiating, events);
                } else {
                    self.end_cap(events);
                }
            }
            "ACK" => {
                if !msg.trailing().to_ascii_lowercase().contains("sasl") {
                    return;
                }
                match self.identity.sasl.clone() {
                    SaslMechanism::Plain => self.send("AUTHENTICATE PLAIN".to_string()),
                    SaslMechanism::External => self.send("AUTHENTICATE EXTERNAL".to_string()),
                    SaslMechanism::Unsupported(name) => {
                        tracing::warn!(conn = self.id, mechanism = %name, "unsupported SASL mechanism");
                        events.push(IrcEvent::Info(format!(
                            "SASL mechanism {name} is not supported, continuing without authentication"
                        )));
                        self.end_cap(events);
                    }
                    SaslMechanism::None => self.end_cap(events),
                }
            }
            "NAK" => {
                events.push(IrcEvent::Info(
                    "Server refused SASL, continuing without authentication".to_string(),
                ));
                self.end_cap(events);
            }
            _ => {}
        }
    }

    fn handle_authenticate(&mut self, msg: &Message, events: &mut Vec<IrcEvent>) {
        if msg.param(0) != Some("+") {
            return;
        }
        match self.identity.sasl {
            SaslMechanism::Plain => {
                let payload =
                    sasl::encode_plain(&self.identity.sasl_username, &self.identity.sasl_password);
                self.send_authenticate_payload(&payload);
            }
            SaslMechanism::External => self.send("AUTHENTICATE +".to_string()),
            _ => self.end_cap(events),
        }
    }

    /// Payloads over 400 bytes go out in chunks; an exact multiple ends with `+`.
    fn send_authenticate_payload(&mut self, payload: &str) {
        let bytes = payload.as_bytes();
        for chunk in bytes.chunks(SASL_CHUNK_SIZE) {
            self.send(format!("AUTHENTICATE {}", String::from_utf8_lossy(chunk)));
        }
        if bytes.len() % SASL_CHUNK_SIZE == 0 {
            self.send("AUTHENTICATE +".to_string());
        }
    }

    fn end_cap(&mut self, events: &mut Vec<IrcEvent>) {
        if !self.cap_ended {
            self.cap_ended = true;
            self.send("CAP END".to_string());
        }
        if self.state != ConnectionState::Registered {
            self.set_state(ConnectionState::Registering, events);
        }
    }

    fn handle_message(
        &mut self,
        command: &str,
        prefix: String,
        target: String,
        text: &str,
        events: &mut Vec<IrcEvent>,
    ) {
        let is_privmsg = command == "PRIVMSG";
        let Some(ctcp) = parse_ctcp(text) else {
            let text = text.to_string();
            events.push(if is_privmsg {
                IrcEvent::Privmsg { prefix, target, text }
            } else {
                IrcEvent::Notice { prefix, target, text }
            });
            return;
        };

        if !is_privmsg {
            events.push(IrcEvent::CtcpReply {
                prefix,
                command: ctcp.command,
                args: ctcp.args,
            });
        } else if ctcp.command == "ACTION" {
            events.push(IrcEvent::Action {
                prefix,
                target,
                text: ctcp.args,
            });
        } else {
            self.auto_reply_ctcp(nick_of(&prefix).to_string(), &ctcp.command, &ctcp.args);
            events.push(IrcEvent::CtcpRequest {
                prefix,
                target,
                command: ctcp.command,
                args: ctcp.args,
            });
        }
    }

    fn auto_reply_ctcp(&mut self, to: String, command: &str, args: &str) {
        if to.is_empty() {
            return;
        }
        let reply = match command {
            "VERSION" if self.ctcp.reply_version => self.ctcp.version_string.clone(),
            "PING" if self.ctcp.reply_ping => args.to_string(),
            "TIME" if self.ctcp.reply_time => {
                Local::now().format("%a %b %d %H:%M:%S %Y").to_string()
            }
            _ => return,
        };
        self.send(format!("NOTICE {to} :{}", format_ctcp(command, &reply)));
    }

    fn handle_numeric(&mut self, code: u16, msg: Message, events: &mut Vec<IrcEvent>) {
        match code {
            1 => {
                self.set_state(ConnectionState::Registered, events);
                if let Some(echoed) = msg.param(0).filter(|n| !n.is_empty() && *n != "*") {
                    if echoed != self.nick {
                        self.nick = echoed.to_string();
                        events.push(IrcEvent::OwnNickChanged {
                            nick: self.nick.clone(),
                        });
                    }
                }
                events.push(IrcEvent::Registered {
                    nick: self.nick.clone(),
                    welcome: msg.trailing().to_string(),
                });
                self.run_identify_template();
            }
            5 => {
                let end = msg.params.len().saturating_sub(1);
                if end > 1 {
                    self.support
                        .apply_tokens(msg.params[1..end].iter().map(String::as_str));
                }
                events.push(IrcEvent::Numeric {
                    code,
                    params: msg.params,
                });
            }
            433 if !self.is_registered() => {
                let taken = self.nick.clone();
                self.nick.push('_');
                events.push(IrcEvent::Info(format!(
                    "Nickname {taken} is already in use, trying {}",
                    self.nick
                )));
                self.send(format!("NICK {}", self.nick));
            }
            903 => {
                events.push(IrcEvent::Info("SASL authentication successful".to_string()));
                self.end_cap(events);
            }
            904..=907 => {
                events.push(IrcEvent::Error(IrcError::AuthenticationFailure {
                    code,
                    text: msg.trailing().to_string(),
                }));
                self.end_cap(events);
            }
            332 => {
                if msg.params.len() >= 3 {
                    events.push(IrcEvent::Topic {
                        channel: msg.params[1].clone(),
                        topic: msg.trailing().to_string(),
                        setter: None,
                    });
                }
            }
            353 => {
                // `353 me = #chan :names`, some servers omit the channel type
                let channel = if msg.params.len() >= 4 {
                    msg.param(2)
                } else {
                    msg.param(1)
                };
                if let Some(channel) = channel {
                    self.pending_names
                        .entry(channel.to_string())
                        .or_default()
                        .extend(msg.trailing().split_whitespace().map(str::to_string));
                }
            }
            366 => {
                if let Some(channel) = msg.param(1) {
                    if let Some(names) = self.pending_names.remove(channel) {
                        events.push(IrcEvent::Names {
                            channel: channel.to_string(),
                            names,
                        });
                    }
                }
            }
            _ => events.push(IrcEvent::Numeric {
                code,
                params: msg.params,
            }),
        }
    }

    /// Execute the NickServ template once registration completes.
    fn run_identify_template(&mut self) {
        let Some(password) = self
            .identity
            .nickserv_password
            .clone()
            .filter(|p| !p.is_empty())
        else {
            return;
        };
        let template = if self.identity.nickserv_command.trim().is_empty() {
            DEFAULT_NICKSERV_COMMAND
        } else {
            self.identity.nickserv_command.trim()
        };
        let command = template.replace("%n", &self.nick).replace("%p", &password);

        if let Some(rest) = strip_prefix_ci(&command, "/msg ") {
            if let Some((target, text)) = rest.trim_start().split_once(' ') {
                self.privmsg(target, text);
            }
        } else if let Some(text) = strip_prefix_ci(&command, "/nickserv ") {
            self.privmsg("NickServ", text);
        } else if let Some(raw) = command.strip_prefix('/') {
            self.send_raw(raw);
        } else {
            self.send_raw(&command);
        }
    }

    // ── Outbound ──

    fn send(&mut self, line: String) {
        tracing::debug!(conn = self.id, line = %line, "queue");
        self.outbox.push(line);
    }

    pub fn send_raw(&mut self, line: &str) {
        let line = clean(line);
        if !line.trim().is_empty() {
            self.send(line);
        }
    }

    pub fn privmsg(&mut self, target: &str, text: &str) {
        let text = clean(text).replace('\x01', "");
        self.send(format!("PRIVMSG {} :{}", clean(target), text));
    }

    pub fn notice(&mut self, target: &str, text: &str) {
        let text = clean(text).replace('\x01', "");
        self.send(format!("NOTICE {} :{}", clean(target), text));
    }

    pub fn action(&mut self, target: &str, text: &str) {
        let text = clean(text).replace('\x01', "");
        self.send(format!("PRIVMSG {} :{}", clean(target), format_ctcp("ACTION", &text)));
    }

    pub fn ctcp(&mut self, target: &str, command: &str, args: &str) {
        let args = clean(args).replace('\x01', "");
        let command = clean(command).to_uppercase();
        self.send(format!("PRIVMSG {} :{}", clean(target), format_ctcp(&command, &args)));
    }

    pub fn join(&mut self, channel: &str, key: Option<&str>) {
        match key.filter(|k| !k.is_empty()) {
            Some(key) => self.send(format!("JOIN {} {}", clean(channel), clean(key))),
            None => self.send(format!("JOIN {}", clean(channel))),
        }
    }

    pub fn part(&mut self, channel: &str, reason: Option<&str>) {
        match reason.filter(|r| !r.is_empty()) {
            Some(reason) => self.send(format!("PART {} :{}", clean(channel), clean(reason))),
            None => self.send(format!("PART {}", clean(channel))),
        }
    }

    pub fn set_nick(&mut self, nick: &str) {
        if !self.is_registered() {
            self.nick = nick.to_string();
        }
        self.send(format!("NICK {}", clean(nick)));
    }

    pub fn mode(&mut self, target: &str, modes: &str) {
        if modes.trim().is_empty() {
            self.send(format!("MODE {}", clean(target)));
        } else {
            self.send(format!("MODE {} {}", clean(target), clean(modes)));
        }
    }

    pub fn topic(&mut self, channel: &str, topic: Option<&str>) {
        match topic {
            Some(topic) => self.send(format!("TOPIC {} :{}", clean(channel), clean(topic))),
            None => self.send(format!("TOPIC {}", clean(channel))),
        }
    }

    pub fn kick(&mut self, channel: &str, nick: &str, reason: Option<&str>) {
        match reason.filter(|r| !r.is_empty()) {
            Some(reason) => self.send(format!(
                "KICK {} {} :{}",
                clean(channel),
                clean(nick),
                clean(reason)
            )),
            None => self.send(format!("KICK {} {}", clean(channel), clean(nick))),
        }
    }

    pub fn invite(&mut self, nick: &str, channel: &str) {
        self.send(format!("INVITE {} {}", clean(nick), clean(channel)));
    }

    pub fn whois(&mut self, nick: &str) {
        self.send(format!("WHOIS {}", clean(nick)));
    }

    pub fn away(&mut self, message: Option<&str>) {
        match message.filter(|m| !m.is_empty()) {
            Some(message) => self.send(format!("AWAY :{}", clean(message))),
            None => self.send("AWAY".to_string()),
        }
    }

    pub fn quit(&mut self, message: &str) {
        self.quitting = true;
        self.send(format!("QUIT :{}", clean(message)));
    }
}

/// Strip line breaks so user text can never smuggle extra commands.
fn clean(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(tls: bool) -> ConnectionEndpoint {
        ConnectionEndpoint {
            host: "irc.example.org".into(),
            port: 6697,
            tls,
            accept_invalid_certs: false,
            proxy: ProxyConfig::default(),
        }
    }

    fn ready(identity: ServerIdentity) -> Connection {
        let mut conn = Connection::new(1, endpoint(true), identity, CtcpConfig::default());
        conn.on_connecting();
        conn.on_tcp_connected();
        conn.on_transport_ready();
        conn
    }

    fn sasl_identity(mechanism: SaslMechanism) -> ServerIdentity {
        let mut identity = ServerIdentity::new("tester");
        identity.sasl = mechanism;
        identity.sasl_username = "tester".into();
        identity.sasl_password = "secret".into();
        identity
    }

    #[test]
    fn test_registration_lines() {
        let mut identity = ServerIdentity::new("alice");
        identity.username = "al".into();
        identity.realname = "Alice Liddell".into();
        identity.password = Some("hunter2".into());
        let mut conn = ready(identity);
        assert_eq!(
            conn.take_outgoing(),
            vec![
                "CAP LS 302",
                "PASS hunter2",
                "NICK alice",
                "USER al 0 * :Alice Liddell"
            ]
        );
        assert_eq!(conn.state(), ConnectionState::AwaitingCapList);
    }

    #[test]
    fn test_tls_state_progression() {
        let mut conn = Connection::new(1, endpoint(true), ServerIdentity::new("a"), CtcpConfig::default());
        assert_eq!(
            conn.on_connecting(),
            vec![IrcEvent::StateChanged(ConnectionState::Connecting)]
        );
        assert_eq!(
            conn.on_tcp_connected(),
            vec![IrcEvent::StateChanged(ConnectionState::TlsHandshake)]
        );

        let mut plain = Connection::new(2, endpoint(false), ServerIdentity::new("a"), CtcpConfig::default());
        plain.on_connecting();
        assert!(plain.on_tcp_connected().is_empty());
    }

    #[test]
    fn test_sasl_plain_handshake() {
        let mut conn = ready(sasl_identity(SaslMechanism::Plain));
        conn.take_outgoing();

        conn.handle_line(":irc.example.org CAP * LS :multi-prefix sasl=PLAIN,EXTERNAL");
        assert_eq!(conn.take_outgoing(), vec!["CAP REQ :sasl"]);
        assert_eq!(conn.state(), ConnectionState::SaslNegotiating);

        conn.handle_line(":irc.example.org CAP tester ACK :sasl");
        assert_eq!(conn.take_outgoing(), vec!["AUTHENTICATE PLAIN"]);

        conn.handle_line("AUTHENTICATE +");
        assert_eq!(
            conn.take_outgoing(),
            vec!["AUTHENTICATE dGVzdGVyAHRlc3RlcgBzZWNyZXQ="]
        );

        conn.handle_line(":irc.example.org 903 tester :SASL authentication successful");
        assert_eq!(conn.take_outgoing(), vec!["CAP END"]);
        assert_eq!(conn.state(), ConnectionState::Registering);

        let events = conn.handle_line(":irc.example.org 001 tester :Welcome to ExampleNet tester");
        assert_eq!(conn.state(), ConnectionState::Registered);
        assert_eq!(conn.nickname(), "tester");
        assert!(events.contains(&IrcEvent::Registered {
            nick: "tester".into(),
            welcome: "Welcome to ExampleNet tester".into(),
        }));
        assert!(!events
            .iter()
            .any(|e| matches!(e, IrcEvent::OwnNickChanged { .. })));
    }

    #[test]
    fn test_sasl_external() {
        let mut conn = ready(sasl_identity(SaslMechanism::External));
        conn.take_outgoing();
        conn.handle_line("CAP * LS :sasl");
        conn.handle_line("CAP * ACK :sasl");
        conn.handle_line("AUTHENTICATE +");
        assert_eq!(
            conn.take_outgoing(),
            vec!["CAP REQ :sasl", "AUTHENTICATE EXTERNAL", "AUTHENTICATE +"]
        );
    }

    #[test]
    fn test_no_sasl_configured_ends_cap() {
        let mut conn = ready(ServerIdentity::new("tester"));
        conn.take_outgoing();
        conn.handle_line(":srv CAP * LS :sasl multi-prefix");
        assert_eq!(conn.take_outgoing(), vec!["CAP END"]);
        assert_eq!(conn.state(), ConnectionState::Registering);
    }

    #[test]
    fn test_sasl_not_advertised() {
        let mut conn = ready(sasl_identity(SaslMechanism::Plain));
        conn.take_outgoing();
        conn.handle_line(":srv CAP * LS :multi-prefix away-notify");
        assert_eq!(conn.take_outgoing(), vec!["CAP END"]);
    }

    #[test]
    fn test_cap_ls_continuation() {
        let mut conn = ready(sasl_identity(SaslMechanism::Plain));
        conn.take_outgoing();
        conn.handle_line(":srv CAP * LS * :multi-prefix away-notify");
        assert!(conn.take_outgoing().is_empty());
        conn.handle_line(":srv CAP * LS :sasl=PLAIN");
        assert_eq!(conn.take_outgoing(), vec!["CAP REQ :sasl"]);
        assert_eq!(conn.server_caps().len(), 3);
    }

    #[test]
    fn test_cap_nak_and_unsupported() {
        let mut conn = ready(sasl_identity(SaslMechanism::Plain));
        conn.take_outgoing();
        conn.handle_line("CAP * LS :sasl");
        conn.handle_line("CAP * NAK :sasl");
        assert_eq!(conn.take_outgoing(), vec!["CAP REQ :sasl", "CAP END"]);

        let mut conn = ready(sasl_identity(SaslMechanism::Unsupported("SCRAM-SHA-256".into())));
        conn.take_outgoing();
        conn.handle_line("CAP * LS :sasl");
        let events = conn.handle_line("CAP * ACK :sasl");
        assert_eq!(conn.take_outgoing(), vec!["CAP REQ :sasl", "CAP END"]);
        assert!(events.iter().any(|e| matches!(e, IrcEvent::Info(_))));
    }

    #[test]
    fn test_sasl_failure_still_ends_cap() {
        let mut conn = ready(sasl_identity(SaslMechanism::Plain));
        conn.take_outgoing();
        conn.handle_line("CAP * LS :sasl");
        conn.handle_line("CAP * ACK :sasl");
        conn.handle_line("AUTHENTICATE +");
        conn.take_outgoing();

        let events = conn.handle_line(":srv 904 tester :SASL authentication failed");
        assert!(events.contains(&IrcEvent::Error(IrcError::AuthenticationFailure {
            code: 904,
            text: "SASL authentication failed".into(),
        })));
        assert_eq!(conn.take_outgoing(), vec!["CAP END"]);

        // a trailing 906 must not send a second CAP END
        conn.handle_line(":srv 906 tester :SASL authentication aborted");
        assert!(conn.take_outgoing().is_empty());
    }

    #[test]
    fn test_nick_collision_retries() {
        let mut conn = ready(ServerIdentity::new("alice"));
        conn.take_outgoing();
        conn.handle_line(":srv 433 * alice :Nickname is already in use");
        conn.handle_line(":srv 433 * alice_ :Nickname is already in use");
        assert_eq!(conn.take_outgoing(), vec!["NICK alice_", "NICK alice__"]);
        assert_eq!(conn.nickname(), "alice__");
    }

    #[test]
    fn test_nick_collision_after_registration_is_forwarded() {
        let mut conn = ready(ServerIdentity::new("alice"));
        conn.handle_line(":srv 001 alice :Welcome");
        conn.take_outgoing();
        let events = conn.handle_line(":srv 433 alice bob :Nickname is already in use");
        assert!(conn.take_outgoing().is_empty());
        assert!(matches!(events[0], IrcEvent::Numeric { code: 433, .. }));
    }

    #[test]
    fn test_welcome_adopts_server_nick() {
        let mut conn = ready(ServerIdentity::new("averyveryverylongnick"));
        let events = conn.handle_line(":srv 001 averyveryv :Welcome");
        assert_eq!(conn.nickname(), "averyveryv");
        assert!(events.contains(&IrcEvent::OwnNickChanged {
            nick: "averyveryv".into()
        }));
    }

    #[test]
    fn test_ping_before_registration() {
        let mut conn = ready(ServerIdentity::new("alice"));
        conn.take_outgoing();
        let events = conn.handle_line("PING :12345");
        assert!(events.is_empty());
        assert_eq!(conn.take_outgoing(), vec!["PONG 12345"]);
        assert_eq!(conn.state(), ConnectionState::AwaitingCapList);
    }

    #[test]
    fn test_names_are_aggregated() {
        let mut conn = ready(ServerIdentity::new("tester"));
        conn.handle_line(":srv 001 tester :Welcome");
        conn.handle_line(":tester!t@host JOIN #test");

        let first: Vec<String> = (0..20).map(|i| format!("user{i}")).collect();
        let second: Vec<String> = (20..40).map(|i| format!("user{i}")).collect();
        assert!(conn
            .handle_line(&format!(":srv 353 tester = #test :{}", first.join(" ")))
            .is_empty());
        assert!(conn
            .handle_line(&format!(":srv 353 tester = #test :{}", second.join(" ")))
            .is_empty());

        let events = conn.handle_line(":srv 366 tester #test :End of /NAMES list.");
        assert_eq!(events.len(), 1);
        match &events[0] {
            IrcEvent::Names { channel, names } => {
                assert_eq!(channel, "#test");
                assert_eq!(names.len(), 40);
                assert_eq!(names[0], "user0");
                assert_eq!(names[39], "user39");
            }
            other => panic!("unexpected event {other:?}"),
        }

        // buffer is cleared after the flush
        assert!(conn.handle_line(":srv 366 tester #test :End of /NAMES list.").is_empty());
    }

    #[test]
    fn test_ctcp_auto_reply() {
        let mut conn = ready(ServerIdentity::new("alice"));
        conn.take_outgoing();
        let events = conn.handle_line(":bob!b@host PRIVMSG alice :\x01VERSION\x01");
        let outgoing = conn.take_outgoing();
        assert_eq!(outgoing.len(), 1);
        assert!(outgoing[0].starts_with("NOTICE bob :\x01VERSION "));
        assert!(matches!(&events[0], IrcEvent::CtcpRequest { command, .. } if command == "VERSION"));

        conn.handle_line(":bob!b@host PRIVMSG alice :\x01PING 42\x01");
        assert_eq!(conn.take_outgoing(), vec!["NOTICE bob :\x01PING 42\x01"]);

        let events = conn.handle_line(":bob!b@host PRIVMSG #c :\x01ACTION waves\x01");
        assert!(conn.take_outgoing().is_empty());
        assert_eq!(
            events,
            vec![IrcEvent::Action {
                prefix: "bob!b@host".into(),
                target: "#c".into(),
                text: "waves".into(),
            }]
        );
    }

    #[test]
    fn test_nickserv_templates() {
        let mut identity = ServerIdentity::new("alice");
        identity.nickserv_password = Some("pw".into());
        let mut conn = ready(identity.clone());
        conn.take_outgoing();
        conn.handle_line(":srv 001 alice :Welcome");
        assert_eq!(conn.take_outgoing(), vec!["PRIVMSG NickServ :IDENTIFY pw"]);

        identity.nickserv_command = "/nickserv IDENTIFY %n %p".into();
        let mut conn = ready(identity.clone());
        conn.take_outgoing();
        conn.handle_line(":srv 001 alice :Welcome");
        assert_eq!(conn.take_outgoing(), vec!["PRIVMSG NickServ :IDENTIFY alice pw"]);

        identity.nickserv_command = "/NS IDENTIFY %p".into();
        let mut conn = ready(identity);
        conn.take_outgoing();
        conn.handle_line(":srv 001 alice :Welcome");
        assert_eq!(conn.take_outgoing(), vec!["NS IDENTIFY pw"]);
    }

    #[test]
    fn test_isupport_changes_channel_detection() {
        let mut conn = ready(ServerIdentity::new("alice"));
        conn.handle_line(":srv 005 alice CHANTYPES=#! PREFIX=(ov)@+ :are supported by this server");
        let events = conn.handle_line(":op!o@h MODE !chan +o alice");
        assert!(matches!(&events[0], IrcEvent::ChannelMode { channel, .. } if channel == "!chan"));
        assert_eq!(conn.support().prefix_for_mode('q'), None);
    }

    #[test]
    fn test_own_nick_change_is_tracked() {
        let mut conn = ready(ServerIdentity::new("alice"));
        conn.handle_line(":srv 001 alice :Welcome");
        let events = conn.handle_line(":alice!a@h NICK :alicia");
        assert_eq!(conn.nickname(), "alicia");
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_outgoing_is_sanitized() {
        let mut conn = ready(ServerIdentity::new("alice"));
        conn.take_outgoing();
        conn.privmsg("#c", "hi\r\nQUIT :gotcha");
        conn.send_raw("   ");
        assert_eq!(conn.take_outgoing(), vec!["PRIVMSG #c :hi  QUIT :gotcha"]);
    }

    #[test]
    fn test_malformed_line_is_dropped() {
        let mut conn = ready(ServerIdentity::new("alice"));
        assert!(conn.handle_line("").is_empty());
        assert!(conn.handle_line(":prefix.only").is_empty());
    }

    #[test]
    fn test_transport_closed() {
        let mut conn = ready(ServerIdentity::new("alice"));
        let events = conn.on_transport_closed("Connection reset");
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(
            events.last(),
            Some(&IrcEvent::Disconnected {
                reason: "Connection reset".into()
            })
        );
    }
}
