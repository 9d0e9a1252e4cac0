//! User input: plain text and slash-commands.
//!
//! Scripting hooks see every slash-command first. Unknown commands are sent
//! to the server as `COMMAND args`.

use crate::app::session;
use crate::app::state::{AppState, ChannelKey, ConnectRequest, MessageKind};
use crate::app::sysinfo;
use crate::irc::commands::{self, ParsedCommand};
use crate::irc::connection::Connection;

/// Dispatch a line typed into the active view.
pub fn dispatch_input(state: &mut AppState, text: &str) {
    let context = state.active.clone();
    dispatch_in(state, context, text);
}

/// Dispatch a line as if typed into `context`.
pub fn dispatch_in(state: &mut AppState, context: Option<ChannelKey>, text: &str) {
    let text = text.trim_end_matches(['\r', '\n']);
    if text.trim().is_empty() {
        return;
    }
    if !text.starts_with('/') {
        send_text(state, context.as_ref(), text);
        return;
    }

    if let Some((name, args)) = commands::split_command(text) {
        let consumed = state
            .hooks
            .as_mut()
            .is_some_and(|hooks| hooks.try_handle_command(&name, &args));
        if consumed {
            tracing::debug!(command = %name, "command consumed by hook");
            return;
        }
    }
    if let Some(command) = commands::parse_command(text) {
        run_command(state, context, command);
    }
}

/// Execute the perform-on-connect template for a freshly registered server.
pub fn run_perform(state: &mut AppState, server: &str, nick: &str) {
    let template = state.config.perform.commands.clone();
    let tab = ChannelKey::server_tab(server);
    for line in template.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let line = line.replace("%n", nick).replace("%s", server);
        if line.starts_with('/') {
            dispatch_in(state, Some(tab.clone()), &line);
        } else if let Some(connection) = state.connection_mut(server) {
            connection.send_raw(&line);
        }
    }
}

/// Close a view. Channels are parted first; closing a server tab
/// disconnects and drops every view of that server.
pub fn close_channel(state: &mut AppState, key: &ChannelKey) {
    if key.is_server_tab() {
        if state.sessions.contains_key(&key.server) {
            session::disconnect(state, &key.server, None);
        }
        let views: Vec<ChannelKey> = state
            .channels
            .keys()
            .filter(|k| k.server == key.server && !k.is_server_tab())
            .cloned()
            .collect();
        for view in &views {
            state.remove_channel(view);
        }
        state.remove_channel(key);
        return;
    }

    if state.is_channel_name(&key.server, &key.channel) {
        let reason = state.config.connection.part_message.clone();
        if let Some(connection) = state.connection_mut(&key.server) {
            connection.part(&key.channel, Some(&reason));
        }
    }
    state.remove_channel(key);
}

fn send_text(state: &mut AppState, context: Option<&ChannelKey>, text: &str) {
    let Some(key) = context else {
        tracing::warn!("no active view, dropping input");
        return;
    };
    if key.is_server_tab() {
        state.error(key, "Cannot send to server tab");
        return;
    }
    let Some(connection) = state.connection_mut(&key.server) else {
        state.error(key, "Not connected");
        return;
    };
    connection.privmsg(&key.channel, text);
    echo_own(state, key, MessageKind::Chat, text);
}

/// Show our own outgoing message in a view.
fn echo_own(state: &mut AppState, key: &ChannelKey, kind: MessageKind, text: &str) {
    let nick = state.current_nick(&key.server).unwrap_or_default().to_string();
    let line = match kind {
        MessageKind::Action => format!("* {nick} {text}"),
        _ => {
            let rank = state
                .channels
                .get(key)
                .and_then(|c| c.users.iter().find(|u| u.nick.eq_ignore_ascii_case(&nick)))
                .and_then(|u| u.prefix())
                .map(String::from)
                .unwrap_or_default();
            format!("<{rank}{nick}> {text}")
        }
    };
    state.append(key, kind, line);
}

/// Bare nicks become `nick!*@*`.
fn ban_mask(mask: &str) -> String {
    if mask.contains('!') || mask.contains('@') {
        mask.to_string()
    } else {
        format!("{mask}!*@*")
    }
}

fn run_command(state: &mut AppState, context: Option<ChannelKey>, command: ParsedCommand) {
    if let ParsedCommand::Server {
        host,
        port,
        tls,
        nick,
    } = command
    {
        let request = ConnectRequest::ad_hoc(&host, port, tls, nick.as_deref(), &state.config);
        session::connect(state, request);
        return;
    }
    let Some(key) = context else {
        tracing::warn!(?command, "no active view, dropping command");
        return;
    };

    // Local commands
    match command {
        ParsedCommand::Usage(usage) => {
            state.error(&key, format!("Usage: {usage}"));
            return;
        }
        ParsedCommand::Echo { text } => {
            state.system(&key, text);
            return;
        }
        ParsedCommand::Clear => {
            state.clear_history(&key);
            return;
        }
        ParsedCommand::Close { target } => {
            let view = match target {
                Some(target) => ChannelKey::new(&key.server, &target),
                None => key,
            };
            close_channel(state, &view);
            return;
        }
        ParsedCommand::Ignore { mask: None } => {
            let masks = state.ignore_list();
            let text = if masks.is_empty() {
                "Ignore list is empty".to_string()
            } else {
                format!("Ignore list: {}", masks.join(", "))
            };
            state.system(&key, text);
            return;
        }
        ParsedCommand::Ignore { mask: Some(mask) } => {
            let text = match state.add_ignore(&mask) {
                Some(added) => format!("Now ignoring {added}"),
                None => format!("{mask} is already ignored"),
            };
            state.system(&key, text);
            return;
        }
        ParsedCommand::Unignore { mask } => {
            let text = if state.remove_ignore(&mask) {
                format!("No longer ignoring {mask}")
            } else {
                format!("{mask} is not in the ignore list")
            };
            state.system(&key, text);
            return;
        }
        ParsedCommand::Query { nick, text } => {
            let query = state.open_query(&key.server, &nick);
            if let Some(text) = text {
                send_text(state, Some(&query), &text);
            }
            return;
        }
        ParsedCommand::Quit { message } => {
            session::disconnect(state, &key.server, message.as_deref());
            return;
        }
        command => {
            if !state.sessions.contains_key(&key.server) {
                state.error(&key, "Not connected");
                return;
            }
            run_server_command(state, &key, command);
        }
    }
}

fn run_server_command(state: &mut AppState, key: &ChannelKey, command: ParsedCommand) {
    let server = key.server.clone();
    let own_nick = state.current_nick(&server).unwrap_or_default().to_string();
    let current_channel = state
        .is_channel_name(&server, &key.channel)
        .then(|| key.channel.clone());
    let query_target = (!key.is_server_tab()).then(|| key.channel.clone());

    match command {
        ParsedCommand::Join { channel, key: channel_key } => {
            conn(state, &server, |c| c.join(&channel, channel_key.as_deref()));
        }
        ParsedCommand::Part { channel, reason } => {
            let Some(channel) = channel.or(current_channel) else {
                state.error(key, "Not in a channel");
                return;
            };
            let reason = reason.unwrap_or_else(|| state.config.connection.part_message.clone());
            conn(state, &server, |c| c.part(&channel, Some(&reason)));
        }
        ParsedCommand::Nick { nick } => conn(state, &server, |c| c.set_nick(&nick)),
        ParsedCommand::Away { message } => {
            if message.is_some() {
                state.clear_away_log();
            }
            conn(state, &server, |c| c.away(message.as_deref()));
        }
        ParsedCommand::Back => conn(state, &server, |c| c.away(None)),
        ParsedCommand::Msg { target, text } => {
            conn(state, &server, |c| c.privmsg(&target, &text));
            let view = if state.is_channel_name(&server, &target) {
                ChannelKey::new(&server, &target)
            } else {
                state.open_query(&server, &target)
            };
            if state.channels.contains_key(&view) {
                echo_own(state, &view, MessageKind::Chat, &text);
            } else {
                state.system(key, format!("-> *{target}* {text}"));
            }
        }
        ParsedCommand::Me { text } => {
            let Some(target) = query_target else {
                state.error(key, "Cannot send to server tab");
                return;
            };
            conn(state, &server, |c| c.action(&target, &text));
            echo_own(state, key, MessageKind::Action, &text);
        }
        ParsedCommand::Slap { nick } => {
            let Some(target) = query_target else {
                state.error(key, "Cannot send to server tab");
                return;
            };
            let text = format!("slaps {nick} around a bit with a large trout");
            conn(state, &server, |c| c.action(&target, &text));
            echo_own(state, key, MessageKind::Action, &text);
        }
        ParsedCommand::Notice { target, text } => {
            conn(state, &server, |c| c.notice(&target, &text));
            state.system(key, format!("-> -{target}- {text}"));
        }
        ParsedCommand::Ctcp {
            target,
            command,
            args,
        } => {
            conn(state, &server, |c| c.ctcp(&target, &command, &args));
            state.system(key, format!("CTCP {command} sent to {target}"));
        }
        ParsedCommand::Sysinfo => {
            let Some(target) = query_target else {
                state.error(key, "Cannot send to server tab");
                return;
            };
            let text = sysinfo::system_summary();
            conn(state, &server, |c| c.privmsg(&target, &text));
            echo_own(state, key, MessageKind::Chat, &text);
        }
        ParsedCommand::UserMode { grant, mode, nick } => {
            let Some(channel) = current_channel else {
                state.error(key, "Not in a channel");
                return;
            };
            let nick = nick.unwrap_or(own_nick);
            let sign = if grant { '+' } else { '-' };
            conn(state, &server, |c| c.mode(&channel, &format!("{sign}{mode} {nick}")));
        }
        ParsedCommand::Ban { mask } => set_ban(state, key, current_channel, '+', &mask),
        ParsedCommand::Unban { mask } => set_ban(state, key, current_channel, '-', &mask),
        ParsedCommand::Kick { nick, reason } => {
            let Some(channel) = current_channel else {
                state.error(key, "Not in a channel");
                return;
            };
            conn(state, &server, |c| c.kick(&channel, &nick, reason.as_deref()));
        }
        ParsedCommand::KickBan { nick, reason } => {
            let Some(channel) = current_channel else {
                state.error(key, "Not in a channel");
                return;
            };
            conn(state, &server, |c| {
                c.mode(&channel, &format!("+b {}", ban_mask(&nick)));
                c.kick(&channel, &nick, Some(&reason));
            });
        }
        ParsedCommand::Invite { nick, channel } => {
            let Some(channel) = channel.or(current_channel) else {
                state.error(key, "Not in a channel");
                return;
            };
            conn(state, &server, |c| c.invite(&nick, &channel));
        }
        ParsedCommand::Topic { text } => {
            // `/topic #other [text]` targets another channel
            let explicit = text.as_deref().and_then(|t| {
                let (first, rest) = t.split_once(' ').unwrap_or((t, ""));
                state
                    .is_channel_name(&server, first)
                    .then(|| (first.to_string(), (!rest.is_empty()).then(|| rest.to_string())))
            });
            let (channel, text) = match explicit {
                Some((channel, rest)) => (Some(channel), rest),
                None => (current_channel, text),
            };
            let Some(channel) = channel else {
                state.error(key, "Not in a channel");
                return;
            };
            conn(state, &server, |c| c.topic(&channel, text.as_deref()));
        }
        ParsedCommand::Mode { args } => {
            let args = args.unwrap_or_default();
            let (first, rest) = args.split_once(' ').unwrap_or((args.as_str(), ""));
            let explicit_target = !first.is_empty()
                && (state.is_channel_name(&server, first) || first.eq_ignore_ascii_case(&own_nick));
            let (target, modes) = if explicit_target {
                (first.to_string(), rest.to_string())
            } else {
                (current_channel.unwrap_or_else(|| own_nick.clone()), args.clone())
            };
            conn(state, &server, |c| c.mode(&target, &modes));
        }
        ParsedCommand::Cycle { channel } => {
            let Some(channel) = channel.or(current_channel) else {
                state.error(key, "Not in a channel");
                return;
            };
            conn(state, &server, |c| {
                c.part(&channel, None);
                c.join(&channel, None);
            });
        }
        ParsedCommand::Service { service, text } => {
            conn(state, &server, |c| c.privmsg(service, &text));
        }
        ParsedCommand::Oper { args } => raw(state, &server, format!("OPER {args}")),
        ParsedCommand::Kill { nick, reason } => {
            let line = match reason {
                Some(reason) => format!("KILL {nick} :{reason}"),
                None => format!("KILL {nick}"),
            };
            raw(state, &server, line);
        }
        ParsedCommand::ServerBan { command, args } => raw(state, &server, format!("{command} {args}")),
        ParsedCommand::Wallops { text } => raw(state, &server, format!("WALLOPS :{text}")),
        ParsedCommand::Squit { args } => raw(state, &server, format!("SQUIT {args}")),
        ParsedCommand::Rehash => raw(state, &server, "REHASH".to_string()),
        ParsedCommand::Whois { nick } => conn(state, &server, |c| c.whois(&nick)),
        ParsedCommand::Who { mask } => match mask.or(current_channel) {
            Some(mask) => raw(state, &server, format!("WHO {mask}")),
            None => raw(state, &server, "WHO".to_string()),
        },
        ParsedCommand::Names { channel } => match channel.or(current_channel) {
            Some(channel) => raw(state, &server, format!("NAMES {channel}")),
            None => raw(state, &server, "NAMES".to_string()),
        },
        ParsedCommand::Info { command, args } => match args {
            Some(args) => raw(state, &server, format!("{command} {args}")),
            None => raw(state, &server, command),
        },
        ParsedCommand::Raw { line } => raw(state, &server, line),
        ParsedCommand::Unknown { command, args } => {
            let line = if args.is_empty() {
                command
            } else {
                format!("{command} {args}")
            };
            raw(state, &server, line);
        }
        // handled by run_command
        ParsedCommand::Server { .. }
        | ParsedCommand::Usage(_)
        | ParsedCommand::Echo { .. }
        | ParsedCommand::Clear
        | ParsedCommand::Close { .. }
        | ParsedCommand::Ignore { .. }
        | ParsedCommand::Unignore { .. }
        | ParsedCommand::Query { .. }
        | ParsedCommand::Quit { .. } => {}
    }
}

fn set_ban(
    state: &mut AppState,
    key: &ChannelKey,
    channel: Option<String>,
    sign: char,
    mask: &str,
) {
    let Some(channel) = channel else {
        state.error(key, "Not in a channel");
        return;
    };
    let modes = format!("{sign}b {}", ban_mask(mask));
    conn(state, &key.server, |c| c.mode(&channel, &modes));
}

fn conn(state: &mut AppState, server: &str, f: impl FnOnce(&mut Connection)) {
    if let Some(connection) = state.connection_mut(server) {
        f(connection);
    }
}

fn raw(state: &mut AppState, server: &str, line: String) {
    conn(state, server, |c| c.send_raw(&line));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::action::Action;
    use crate::app::event::TransportEvent;
    use crate::config::model::{AppConfig, ServerConfig};
    use crate::hooks::ScriptHook;
    use std::sync::{Arc, Mutex};

    const HOST: &str = "irc.example.org";

    fn registered(state: AppState) -> AppState {
        let mut state = state;
        let request = ConnectRequest::from_server_config(&state.config.servers[0], &state.config);
        session::connect(&mut state, request);
        let conn_id = state.sessions[HOST].conn_id;
        for event in [
            TransportEvent::Ready,
            TransportEvent::Line(":irc.example.org CAP * LS :multi-prefix".into()),
            TransportEvent::Line(":irc.example.org 001 tester :Welcome".into()),
            TransportEvent::Line(":tester!t@host JOIN #c".into()),
        ] {
            session::on_transport(&mut state, conn_id, event);
        }
        state.take_actions();
        state
    }

    fn new_state() -> AppState {
        let mut config = AppConfig::default();
        config.servers = vec![ServerConfig::new("example", HOST, "tester")];
        AppState::new(config)
    }

    fn input(state: &mut AppState, text: &str) -> Vec<String> {
        dispatch_input(state, text);
        state
            .take_actions()
            .into_iter()
            .filter_map(|a| match a {
                Action::Send { line, .. } => Some(line),
                _ => None,
            })
            .collect()
    }

    fn last_text(state: &AppState, channel: &str) -> Option<String> {
        state
            .history(&ChannelKey::new(HOST, channel))
            .last()
            .map(|m| m.text.clone())
    }

    #[test]
    fn test_plain_text() {
        let mut state = registered(new_state());
        assert_eq!(input(&mut state, "hello all"), vec!["PRIVMSG #c :hello all"]);
        assert_eq!(last_text(&state, "#c").as_deref(), Some("<tester> hello all"));

        state.switch_to_channel(&ChannelKey::server_tab(HOST));
        assert!(input(&mut state, "hello server").is_empty());
        assert_eq!(last_text(&state, HOST).as_deref(), Some("Cannot send to server tab"));
    }

    #[test]
    fn test_not_connected() {
        let mut state = new_state();
        state.switch_to_channel(&ChannelKey::new(HOST, "#c"));
        assert!(input(&mut state, "/join #rust").is_empty());
        assert_eq!(last_text(&state, "#c").as_deref(), Some("Not connected"));
        assert!(input(&mut state, "hi").is_empty());
        assert_eq!(last_text(&state, "#c").as_deref(), Some("Not connected"));
    }

    #[test]
    fn test_unknown_command_is_sent_raw() {
        let mut state = registered(new_state());
        assert_eq!(input(&mut state, "/knock #secret please"), vec!["KNOCK #secret please"]);
        assert_eq!(input(&mut state, "/motd"), vec!["MOTD"]);
        assert_eq!(input(&mut state, "/quote PRIVMSG x :y"), vec!["PRIVMSG x :y"]);
    }

    #[test]
    fn test_moderation_commands() {
        let mut state = registered(new_state());
        assert_eq!(input(&mut state, "/op"), vec!["MODE #c +o tester"]);
        assert_eq!(input(&mut state, "/devoice bob"), vec!["MODE #c -v bob"]);
        assert_eq!(input(&mut state, "/ban bob"), vec!["MODE #c +b bob!*@*"]);
        assert_eq!(
            input(&mut state, "/kb bob"),
            vec!["MODE #c +b bob!*@*", "KICK #c bob :Banned"]
        );
        assert_eq!(input(&mut state, "/topic new topic"), vec!["TOPIC #c :new topic"]);
        assert_eq!(input(&mut state, "/topic #other"), vec!["TOPIC #other"]);
        assert_eq!(input(&mut state, "/mode +m"), vec!["MODE #c +m"]);
        assert_eq!(input(&mut state, "/mode tester +i"), vec!["MODE tester +i"]);
        assert_eq!(input(&mut state, "/cycle"), vec!["PART #c", "JOIN #c"]);
        assert_eq!(input(&mut state, "/cs op #c"), vec!["PRIVMSG ChanServ :op #c"]);
    }

    #[test]
    fn test_channel_commands_need_a_channel() {
        let mut state = registered(new_state());
        state.switch_to_channel(&ChannelKey::server_tab(HOST));
        assert!(input(&mut state, "/kick bob").is_empty());
        assert_eq!(last_text(&state, HOST).as_deref(), Some("Not in a channel"));
        assert!(input(&mut state, "/me waves").is_empty());
        assert_eq!(last_text(&state, HOST).as_deref(), Some("Cannot send to server tab"));
    }

    #[test]
    fn test_msg_opens_query() {
        let mut state = registered(new_state());
        assert_eq!(input(&mut state, "/msg bob hi there"), vec!["PRIVMSG bob :hi there"]);
        assert_eq!(state.active, Some(ChannelKey::new(HOST, "bob")));
        assert_eq!(last_text(&state, "bob").as_deref(), Some("<tester> hi there"));
        assert_eq!(input(&mut state, "/me waves"), vec!["PRIVMSG bob :\x01ACTION waves\x01"]);
        assert_eq!(last_text(&state, "bob").as_deref(), Some("* tester waves"));
    }

    #[test]
    fn test_ignore_commands() {
        let mut state = registered(new_state());
        input(&mut state, "/ignore");
        assert_eq!(last_text(&state, "#c").as_deref(), Some("Ignore list is empty"));
        input(&mut state, "/ignore spammer");
        assert_eq!(last_text(&state, "#c").as_deref(), Some("Now ignoring spammer!*@*"));
        input(&mut state, "/ignore spammer");
        assert_eq!(last_text(&state, "#c").as_deref(), Some("spammer is already ignored"));
        input(&mut state, "/unignore spammer");
        assert_eq!(last_text(&state, "#c").as_deref(), Some("No longer ignoring spammer"));
        assert!(state.ignore_list().is_empty());
    }

    #[test]
    fn test_usage_and_echo() {
        let mut state = registered(new_state());
        assert!(input(&mut state, "/kick").is_empty());
        let last = state.history(&ChannelKey::new(HOST, "#c")).last().cloned().unwrap();
        assert_eq!(last.kind, MessageKind::Error);
        assert_eq!(last.text, "Usage: /kick <nick> [reason]");
        assert!(input(&mut state, "/echo just for me").is_empty());
        assert_eq!(last_text(&state, "#c").as_deref(), Some("just for me"));
    }

    #[test]
    fn test_close_parts_channel() {
        let mut state = registered(new_state());
        let key = ChannelKey::new(HOST, "#c");
        assert_eq!(input(&mut state, "/close"), vec!["PART #c :Leaving"]);
        assert!(!state.channels.contains_key(&key));
        assert_eq!(state.active, Some(ChannelKey::server_tab(HOST)));
    }

    #[test]
    fn test_away_and_back() {
        let mut state = registered(new_state());
        state.away_log.push(crate::app::state::AwayLogEntry {
            timestamp: "00:00:00".into(),
            nick: "x".into(),
            channel: "#c".into(),
            message: "old".into(),
        });
        assert_eq!(input(&mut state, "/away lunch"), vec!["AWAY :lunch"]);
        assert!(state.away_log.is_empty());
        assert_eq!(input(&mut state, "/back"), vec!["AWAY"]);
    }

    #[test]
    fn test_quit_disconnects_without_reconnect() {
        let mut state = registered(new_state());
        dispatch_input(&mut state, "/quit see you");
        let actions = state.take_actions();
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Send { line, .. } if line == "QUIT :see you")));
        assert!(actions.iter().any(|a| matches!(a, Action::Close { .. })));
        assert!(state.reconnect[HOST].user_disconnect);
    }

    #[test]
    fn test_server_command_connects() {
        let mut state = new_state();
        dispatch_in(&mut state, None, "/server irc.other.net:6667 zed");
        let actions = state.take_actions();
        assert!(matches!(
            &actions[..],
            [Action::Connect { endpoint, .. }] if endpoint.host == "irc.other.net" && endpoint.port == 6667 && !endpoint.tls
        ));
        assert_eq!(state.sessions["irc.other.net"].request.identity.nickname, "zed");
    }

    #[derive(Clone, Default)]
    struct RecordingHook {
        seen: Arc<Mutex<Vec<(String, Vec<String>)>>>,
    }

    impl ScriptHook for RecordingHook {
        fn try_handle_command(&mut self, name: &str, args: &[String]) -> bool {
            self.seen.lock().unwrap().push((name.to_string(), args.to_vec()));
            name == "HELLO"
        }

        fn try_handle_server_line(&mut self, _server: &str, raw: &str) -> bool {
            raw.contains("PRIVMSG #hidden")
        }
    }

    #[test]
    fn test_hooks_run_first() {
        let hook = RecordingHook::default();
        let seen = hook.seen.clone();
        let mut state = registered(new_state().with_hooks(Box::new(hook)));

        assert!(input(&mut state, "/hello big world").is_empty());
        assert_eq!(input(&mut state, "/whois bob"), vec!["WHOIS bob"]);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ("HELLO".to_string(), vec!["big".to_string(), "world".to_string()]),
                ("WHOIS".to_string(), vec!["bob".to_string()]),
            ]
        );

        let conn_id = state.sessions[HOST].conn_id;
        session::on_transport(
            &mut state,
            conn_id,
            TransportEvent::Line(":x!x@h PRIVMSG #hidden :secret".into()),
        );
        assert!(!state.channels.contains_key(&ChannelKey::new(HOST, "#hidden")));
        session::on_transport(&mut state, conn_id, TransportEvent::Line("PING :abc".into()));
        assert_eq!(
            state.take_actions().into_iter().filter(|a| matches!(a, Action::Send { .. })).count(),
            1
        );
    }

    #[test]
    fn test_perform_lines_run_in_server_tab() {
        let mut state = new_state();
        state.config.perform.commands = "/echo hello %n on %s".into();
        let state = registered(state);
        assert!(state
            .history(&ChannelKey::server_tab(HOST))
            .iter()
            .any(|m| m.text == "hello tester on irc.example.org"));
    }
}
