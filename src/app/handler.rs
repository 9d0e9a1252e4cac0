use chrono::{Local, TimeZone};

use crate::app::action::Action;
use crate::app::dispatch;
use crate::app::event::AppEvent;
use crate::app::session;
use crate::app::state::{AppState, ChannelKey, MessageKind, Notification};
use crate::app::users::{self, ChannelUser};
use crate::irc::connection::{nick_of, IrcEvent};
use crate::irc::error::IrcError;

/// Apply one event from the control loop and return the network side
/// effects it produced.
pub fn handle_event(state: &mut AppState, event: AppEvent) -> Vec<Action> {
    match event {
        AppEvent::Input(text) => dispatch::dispatch_input(state, &text),
        AppEvent::Connect(request) => session::connect(state, request),
        AppEvent::Disconnect { server, message } => {
            session::disconnect(state, &server, message.as_deref())
        }
        AppEvent::SwitchView(key) => state.switch_to_channel(&key),
        AppEvent::OpenQuery { server, nick } => {
            state.open_query(&server, &nick);
        }
        AppEvent::CloseChannel(key) => dispatch::close_channel(state, &key),
        AppEvent::Transport { conn_id, event } => session::on_transport(state, conn_id, event),
        AppEvent::ReconnectDue { host, token } => session::on_reconnect_due(state, &host, token),
        AppEvent::Shutdown { message } => session::quit_all(state, message.as_deref()),
    }

    // Drain pending_actions and queued wire lines
    state.take_actions()
}

/// Apply the events one connection produced, in order.
pub fn apply_events(state: &mut AppState, server: &str, events: Vec<IrcEvent>) {
    for event in events {
        apply_event(state, server, event);
    }
}

fn apply_event(state: &mut AppState, server: &str, event: IrcEvent) {
    let tab = ChannelKey::server_tab(server);
    match event {
        IrcEvent::StateChanged(new_state) => {
            state.notify(Notification::ConnectionStateChanged {
                server: server.to_string(),
                state: new_state,
            });
        }
        IrcEvent::Registered { nick, welcome } => on_registered(state, server, &nick, welcome),
        IrcEvent::OwnNickChanged { nick } => {
            state.notify(Notification::NickChanged {
                server: server.to_string(),
                nick,
            });
        }
        IrcEvent::Info(text) => state.system(&tab, text),
        IrcEvent::Error(error) => state.error(&tab, error.to_string()),
        IrcEvent::Privmsg {
            prefix,
            target,
            text,
        } => on_message(state, server, &prefix, &target, MessageKind::Chat, &text),
        IrcEvent::Action {
            prefix,
            target,
            text,
        } => on_message(state, server, &prefix, &target, MessageKind::Action, &text),
        IrcEvent::Notice {
            prefix,
            target,
            text,
        } => on_notice(state, server, &prefix, &target, &text),
        IrcEvent::CtcpRequest {
            prefix,
            command,
            args,
            ..
        } => {
            if is_ignored(state, &prefix) {
                return;
            }
            let nick = nick_of(&prefix);
            let text = if args.is_empty() {
                format!("CTCP {command} from {nick}")
            } else {
                format!("CTCP {command} from {nick}: {args}")
            };
            state.system(&tab, text);
        }
        IrcEvent::CtcpReply {
            prefix,
            command,
            args,
        } => {
            if is_ignored(state, &prefix) {
                return;
            }
            let key = view_for(state, server);
            let nick = nick_of(&prefix);
            state.system(&key, format!("CTCP {command} reply from {nick}: {args}"));
        }
        IrcEvent::Join { prefix, channel } => on_join(state, server, nick_of(&prefix), &channel),
        IrcEvent::Part {
            prefix,
            channel,
            reason,
        } => on_part(state, server, nick_of(&prefix), &channel, reason.as_deref()),
        IrcEvent::Quit { prefix, reason } => on_quit(state, server, nick_of(&prefix), reason.as_deref()),
        IrcEvent::Kick {
            prefix,
            channel,
            nick,
            reason,
        } => on_kick(state, server, nick_of(&prefix), &channel, &nick, reason.as_deref()),
        IrcEvent::NickChange { prefix, new_nick } => {
            on_nick_change(state, server, nick_of(&prefix), &new_nick)
        }
        IrcEvent::Topic { channel, topic, .. } => {
            let key = ChannelKey::new(server, &channel);
            state.ensure_channel(&key).topic = topic.clone();
            state.notify(Notification::TopicChanged {
                key: key.clone(),
                topic: topic.clone(),
            });
            state.system(&key, format!("Topic for {channel}: {topic}"));
        }
        IrcEvent::ChannelMode {
            prefix,
            channel,
            modes,
            params,
        } => on_channel_mode(state, server, &prefix, &channel, &modes, &params),
        IrcEvent::UserMode { nick, modes } => {
            state.system(&tab, format!("{nick} sets mode {modes}"));
        }
        IrcEvent::Invite { prefix, channel } => {
            if is_ignored(state, &prefix) {
                return;
            }
            let key = view_for(state, server);
            let nick = nick_of(&prefix);
            state.system(&key, format!("{nick} invites you to join {channel}"));
        }
        IrcEvent::Names { channel, names } => {
            let key = ChannelKey::new(server, &channel);
            let support = state.support(server);
            state.ensure_channel(&key).users = users::from_names(&names, &support);
            state.notify(Notification::UsersChanged(key));
        }
        IrcEvent::Numeric { code, params } => on_numeric(state, server, code, &params),
        IrcEvent::ServerError(text) => state.error(&tab, format!("Server error: {text}")),
        IrcEvent::Disconnected { reason } => {
            tracing::debug!(server, reason = %reason, "disconnected");
            state.system(&tab, format!("Disconnected from {server}"));
        }
    }
}

fn is_ignored(state: &AppState, prefix: &str) -> bool {
    if prefix.is_empty() || state.ignore.is_empty() {
        return false;
    }
    state.ignore.is_ignored(prefix) || state.ignore.is_ignored(nick_of(prefix))
}

/// Active view if it belongs to `server`, else the server tab.
fn view_for(state: &AppState, server: &str) -> ChannelKey {
    match &state.active {
        Some(key) if key.server == server => key.clone(),
        _ => ChannelKey::server_tab(server),
    }
}

/// Create a query tab for an incoming private message without switching to
/// it.
fn ensure_query(state: &mut AppState, server: &str, nick: &str) -> ChannelKey {
    let key = ChannelKey::new(server, nick);
    if !state.channels.contains_key(&key) {
        state.ensure_channel(&key);
        state.notify(Notification::QueryOpened(key.clone()));
    }
    key
}

fn on_registered(state: &mut AppState, server: &str, nick: &str, welcome: String) {
    let tab = ChannelKey::server_tab(server);
    state.system(&tab, format!("Connected to {server} as {nick}"));
    if !welcome.is_empty() {
        state.system(&tab, welcome);
    }
    state.notify(Notification::ServerRegistered {
        server: server.to_string(),
        nick: nick.to_string(),
    });
    tracing::info!(server, nick, "registered");

    session::on_registered(state, server);
    dispatch::run_perform(state, server, nick);

    let channels = state
        .sessions
        .get(server)
        .map(|s| s.request.channels.clone())
        .unwrap_or_default();
    if let Some(connection) = state.connection_mut(server) {
        for entry in &channels {
            // `#chan key`
            let mut parts = entry.split_whitespace();
            if let Some(channel) = parts.next() {
                connection.join(channel, parts.next());
            }
        }
    }
}

fn on_message(
    state: &mut AppState,
    server: &str,
    prefix: &str,
    target: &str,
    kind: MessageKind,
    text: &str,
) {
    if is_ignored(state, prefix) {
        return;
    }
    let nick = nick_of(prefix);
    let key = if state.is_channel_name(server, target) {
        ChannelKey::new(server, target)
    } else if nick.is_empty() {
        ChannelKey::server_tab(server)
    } else {
        ensure_query(state, server, nick)
    };

    let line = match kind {
        MessageKind::Action => format!("* {nick} {text}"),
        _ => {
            let rank = state
                .channels
                .get(&key)
                .and_then(|c| c.users.iter().find(|u| u.nick.eq_ignore_ascii_case(nick)))
                .and_then(ChannelUser::prefix)
                .map(String::from)
                .unwrap_or_default();
            format!("<{rank}{nick}> {text}")
        }
    };
    state.append_conversation(&key, kind, nick, line);
}

fn on_notice(state: &mut AppState, server: &str, prefix: &str, target: &str, text: &str) {
    if is_ignored(state, prefix) {
        return;
    }
    let nick = nick_of(prefix);
    let query = ChannelKey::new(server, nick);
    let key = if state.is_channel_name(server, target) {
        ChannelKey::new(server, target)
    } else if !nick.is_empty() && state.channels.contains_key(&query) {
        query
    } else {
        ChannelKey::server_tab(server)
    };
    let from = if nick.is_empty() { server } else { nick };
    state.system(&key, format!("-{from}- {text}"));
}

fn on_join(state: &mut AppState, server: &str, nick: &str, channel: &str) {
    let key = ChannelKey::new(server, channel);
    if state.is_own_nick(server, nick) {
        state.ensure_channel(&key).users.clear();
        state.notify(Notification::ChannelJoined(key.clone()));
        state.switch_to_channel(&key);
        state.system(&key, format!("Now talking in {channel}"));
        if let Some(connection) = state.connection_mut(server) {
            connection.mode(channel, "");
        }
        return;
    }

    if users::add_user(&mut state.ensure_channel(&key).users, ChannelUser::new(nick)) {
        state.notify(Notification::UsersChanged(key.clone()));
    }
    state.system(&key, format!("{nick} has joined {channel}"));
}

fn with_reason(text: String, reason: Option<&str>) -> String {
    match reason.filter(|r| !r.is_empty()) {
        Some(reason) => format!("{text} ({reason})"),
        None => text,
    }
}

fn on_part(state: &mut AppState, server: &str, nick: &str, channel: &str, reason: Option<&str>) {
    let key = ChannelKey::new(server, channel);
    state.system(&key, with_reason(format!("{nick} has left {channel}"), reason));

    if state.is_own_nick(server, nick) {
        state.ensure_channel(&key).users.clear();
        state.notify(Notification::ChannelParted(key.clone()));
        state.notify(Notification::UsersChanged(key));
    } else if users::remove_user(&mut state.ensure_channel(&key).users, nick) {
        state.notify(Notification::UsersChanged(key));
    }
}

fn on_quit(state: &mut AppState, server: &str, nick: &str, reason: Option<&str>) {
    let text = with_reason(format!("{nick} has quit"), reason);
    let affected: Vec<ChannelKey> = state
        .channels
        .iter()
        .filter(|(key, channel)| key.server == server && users::contains(&channel.users, nick))
        .map(|(key, _)| key.clone())
        .collect();
    for key in affected {
        if let Some(channel) = state.channels.get_mut(&key) {
            users::remove_user(&mut channel.users, nick);
        }
        state.notify(Notification::UsersChanged(key.clone()));
        state.system(&key, text.clone());
    }
}

fn on_kick(
    state: &mut AppState,
    server: &str,
    kicker: &str,
    channel: &str,
    kicked: &str,
    reason: Option<&str>,
) {
    let key = ChannelKey::new(server, channel);
    state.system(&key, with_reason(format!("{kicked} was kicked by {kicker}"), reason));

    if state.is_own_nick(server, kicked) {
        state.ensure_channel(&key).users.clear();
        state.notify(Notification::ChannelParted(key.clone()));
        state.notify(Notification::UsersChanged(key));
    } else if users::remove_user(&mut state.ensure_channel(&key).users, kicked) {
        state.notify(Notification::UsersChanged(key));
    }
}

fn on_nick_change(state: &mut AppState, server: &str, old: &str, new: &str) {
    let text = format!("{old} is now known as {new}");
    let affected: Vec<ChannelKey> = state
        .channels
        .iter()
        .filter(|(key, channel)| key.server == server && users::contains(&channel.users, old))
        .map(|(key, _)| key.clone())
        .collect();
    for key in affected {
        if let Some(channel) = state.channels.get_mut(&key) {
            users::rename_user(&mut channel.users, old, new);
        }
        state.notify(Notification::UsersChanged(key.clone()));
        state.system(&key, text.clone());
    }
    if state.is_own_nick(server, new) {
        state.system(&ChannelKey::server_tab(server), text);
    }
}

fn on_channel_mode(
    state: &mut AppState,
    server: &str,
    prefix: &str,
    channel: &str,
    modes: &str,
    params: &[String],
) {
    let key = ChannelKey::new(server, channel);
    let support = state.support(server);
    if users::apply_channel_mode(&mut state.ensure_channel(&key).users, &support, modes, params) {
        state.notify(Notification::UsersChanged(key.clone()));
    }

    let setter = if prefix.is_empty() { server } else { nick_of(prefix) };
    let mut text = format!("{setter} sets mode {modes}");
    if !params.is_empty() {
        text.push(' ');
        text.push_str(&params.join(" "));
    }
    text.push_str(" on ");
    text.push_str(channel);
    state.system(&key, text);
}

fn param(params: &[String], idx: usize) -> &str {
    params.get(idx).map_or("", String::as_str)
}

fn format_timestamp(raw: &str, format: &str) -> Option<String> {
    let secs = raw.parse::<i64>().ok()?;
    Local
        .timestamp_opt(secs, 0)
        .single()
        .map(|t| t.format(format).to_string())
}

fn format_idle(secs: u64) -> String {
    let (d, h, m, s) = (secs / 86_400, (secs % 86_400) / 3600, (secs % 3600) / 60, secs % 60);
    let mut out = String::new();
    if d > 0 {
        out.push_str(&format!("{d}d "));
    }
    if h > 0 {
        out.push_str(&format!("{h}h "));
    }
    if m > 0 {
        out.push_str(&format!("{m}m "));
    }
    out.push_str(&format!("{s}s"));
    out
}

/// Route a numeric reply. `params[0]` is always our own nick.
fn on_numeric(state: &mut AppState, server: &str, code: u16, params: &[String]) {
    let tab = ChannelKey::server_tab(server);
    let trailing = params.last().map_or("", String::as_str);
    if params.len() < 2 && !(400..=599).contains(&code) {
        if !trailing.is_empty() {
            state.system(&tab, trailing);
        }
        return;
    }

    match code {
        5 => state.system(&tab, params[1..].join(" ")),
        2..=4 | 251..=255 | 265 | 266 | 372..=376 => state.system(&tab, trailing),
        305 => {
            state.is_away = false;
            state.notify(Notification::AwayChanged(false));
            let logged = state.away_log.len();
            let text = if logged > 0 {
                format!("{trailing} ({logged} messages logged while away)")
            } else {
                trailing.to_string()
            };
            state.system(&tab, text);
        }
        306 => {
            state.is_away = true;
            state.clear_away_log();
            state.notify(Notification::AwayChanged(true));
            state.system(&tab, trailing);
        }
        311..=319 | 330 | 338 | 378 | 671 => {
            let text = format_whois(code, params);
            let key = view_for(state, server);
            state.system(&key, text);
        }
        324 => {
            let channel = param(params, 1);
            let mut text = format!("Channel modes for {channel}: {}", param(params, 2));
            if params.len() > 3 {
                text.push(' ');
                text.push_str(&params[3..].join(" "));
            }
            state.system(&ChannelKey::new(server, channel), text);
        }
        329 => {
            let channel = param(params, 1);
            let created = format_timestamp(param(params, 2), "%a %b %e %H:%M:%S %Y")
                .unwrap_or_else(|| param(params, 2).to_string());
            state.system(
                &ChannelKey::new(server, channel),
                format!("Channel {channel} created on {created}"),
            );
        }
        331 => {
            let channel = param(params, 1);
            state.system(&ChannelKey::new(server, channel), format!("No topic is set for {channel}"));
        }
        333 => {
            let channel = param(params, 1);
            let setter = nick_of(param(params, 2));
            let text = match format_timestamp(param(params, 3), "%Y-%m-%d %H:%M:%S") {
                Some(when) => format!("Topic set by {setter} on {when}"),
                None => format!("Topic set by {setter}"),
            };
            state.system(&ChannelKey::new(server, channel), text);
        }
        400..=599 => {
            let key = params
                .iter()
                .skip(1)
                .map(|p| ChannelKey::new(server, p))
                .find(|k| state.is_channel_name(server, &k.channel) && state.channels.contains_key(k))
                .unwrap_or(tab);
            let error = IrcError::Protocol {
                code,
                text: trailing.to_string(),
            };
            state.error(&key, error.to_string());
        }
        _ if code < 400 => {
            let text = if params.len() > 2 {
                params[1..].join(" ")
            } else {
                trailing.to_string()
            };
            state.system(&tab, text);
        }
        _ => tracing::debug!(server, code, "unrouted numeric"),
    }
}

fn format_whois(code: u16, params: &[String]) -> String {
    let nick = param(params, 1);
    let trailing = params.last().map_or("", String::as_str);
    match code {
        311 => format!(
            "[WHOIS] {nick} ({}@{}): {trailing}",
            param(params, 2),
            param(params, 3)
        ),
        312 => format!("[WHOIS] {nick} using server {} ({trailing})", param(params, 2)),
        314 => format!(
            "[WHOWAS] {nick} was {}@{}: {trailing}",
            param(params, 2),
            param(params, 3)
        ),
        317 => {
            let idle = param(params, 2).parse::<u64>().unwrap_or(0);
            let mut text = format!("[WHOIS] {nick} idle {}", format_idle(idle));
            if params.len() > 4 {
                if let Some(signon) = format_timestamp(param(params, 3), "%Y-%m-%d %H:%M:%S") {
                    text.push_str(&format!(", signed on {signon}"));
                }
            }
            text
        }
        318 => format!("[WHOIS] End of WHOIS for {nick}"),
        319 => format!("[WHOIS] {nick} channels: {trailing}"),
        330 => format!("[WHOIS] {nick} {trailing} {}", param(params, 2)),
        338 => format!("[WHOIS] {nick} actually using host {}", param(params, 2)),
        _ => format!("[WHOIS] {nick} {trailing}"),
    }
}
