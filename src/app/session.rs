//! Connection lifecycle: opening connections, explicit disconnects, socket
//! events and auto-reconnect.
//!
//! Every attempt gets a fresh [`ConnectionId`]; events from an id that no
//! longer owns a session are dropped. Reconnect bookkeeping is per host and
//! survives the session it was created for.

use std::time::Duration;

use crate::app::action::Action;
use crate::app::event::TransportEvent;
use crate::app::handler;
use crate::app::state::{AppState, ChannelKey, ConnectRequest, ReconnectState, ServerSession};
use crate::config::model::ProxyKind;
use crate::irc::connection::{Connection, ConnectionId, IrcEvent};
use crate::irc::error::IrcError;

/// Open a connection on the user's request. Resets the reconnect counter.
pub fn connect(state: &mut AppState, request: ConnectRequest) {
    if let Some(rc) = state.reconnect.get_mut(request.server()) {
        rc.attempts = 0;
    }
    open(state, request, "Connecting to");
}

fn open(state: &mut AppState, request: ConnectRequest, verb: &str) {
    let server = request.server().to_string();
    if let Some(old) = state.sessions.remove(&server) {
        tracing::debug!(server = %server, conn = old.conn_id, "replacing connection");
        state.pending_actions.push(Action::Discard {
            conn_id: old.conn_id,
        });
    }
    cancel_timer(state, &server);

    state
        .reconnect
        .entry(server.clone())
        .and_modify(|rc| {
            rc.request = request.clone();
            rc.user_disconnect = false;
        })
        .or_insert_with(|| ReconnectState {
            attempts: 0,
            pending: None,
            request: request.clone(),
            user_disconnect: false,
        });

    let conn_id = state.allocate_conn_id();
    let endpoint = request.endpoint.clone();
    let mut connection = Connection::new(
        conn_id,
        endpoint.clone(),
        request.identity.clone(),
        state.config.ctcp.clone(),
    );
    let events = connection.on_connecting();
    state.sessions.insert(
        server.clone(),
        ServerSession {
            conn_id,
            connection,
            request,
        },
    );

    let tab = ChannelKey::server_tab(&server);
    state.ensure_channel(&tab);
    if state.active.is_none() {
        state.switch_to_channel(&tab);
    }
    let tls = if endpoint.tls { " (TLS)" } else { "" };
    state.system(
        &tab,
        format!("{verb} {}:{}{tls}...", endpoint.host, endpoint.port),
    );
    if endpoint.proxy.is_enabled() {
        let kind = match endpoint.proxy.kind {
            ProxyKind::Socks5 => "SOCKS5",
            ProxyKind::Http => "HTTP",
            ProxyKind::None => "no",
        };
        state.system(
            &tab,
            format!("Using {kind} proxy {}:{}", endpoint.proxy.host, endpoint.proxy.port),
        );
    }
    if endpoint.tls && endpoint.accept_invalid_certs {
        state.system(
            &tab,
            format!("TLS certificate verification is disabled for {}", endpoint.host),
        );
    }
    tracing::info!(server = %server, conn = conn_id, "opening connection");

    handler::apply_events(state, &server, events);
    state.pending_actions.push(Action::Connect { conn_id, endpoint });
}

/// Explicit user disconnect: no reconnect follows.
pub fn disconnect(state: &mut AppState, server: &str, message: Option<&str>) {
    if let Some(rc) = state.reconnect.get_mut(server) {
        rc.user_disconnect = true;
        rc.attempts = 0;
    }
    cancel_timer(state, server);

    let quit_message = message
        .map(str::to_string)
        .unwrap_or_else(|| state.config.connection.quit_message.clone());
    let Some(session) = state.sessions.get_mut(server) else {
        state.error(&ChannelKey::server_tab(server), "Not connected");
        return;
    };
    session.connection.quit(&quit_message);
    let conn_id = session.conn_id;
    // QUIT must reach the socket before the close request
    state.flush_outgoing();
    state.pending_actions.push(Action::Close { conn_id });
    tracing::info!(server, conn = conn_id, "disconnecting");
}

/// Disconnect everything and stop the control loop.
pub fn quit_all(state: &mut AppState, message: Option<&str>) {
    let servers: Vec<String> = state.sessions.keys().cloned().collect();
    for server in servers {
        disconnect(state, &server, message);
    }
    state.flush_outgoing();
    state.pending_actions.push(Action::Quit);
}

fn cancel_timer(state: &mut AppState, server: &str) {
    if let Some(rc) = state.reconnect.get_mut(server) {
        if rc.pending.take().is_some() {
            state.pending_actions.push(Action::CancelReconnect {
                host: server.to_string(),
            });
        }
    }
}

/// Registration completed: the connection is healthy again.
pub fn on_registered(state: &mut AppState, server: &str) {
    if let Some(rc) = state.reconnect.get_mut(server) {
        rc.attempts = 0;
    }
    cancel_timer(state, server);
}

pub fn on_transport(state: &mut AppState, conn_id: ConnectionId, event: TransportEvent) {
    let Some(server) = state.server_for_conn(conn_id) else {
        tracing::debug!(conn = conn_id, ?event, "event from a discarded connection");
        return;
    };
    let tab = ChannelKey::server_tab(&server);

    let events = match event {
        TransportEvent::TcpConnected => match state.connection_mut(&server) {
            Some(connection) => connection.on_tcp_connected(),
            None => return,
        },
        TransportEvent::Ready => match state.connection_mut(&server) {
            Some(connection) => connection.on_transport_ready(),
            None => return,
        },
        TransportEvent::Line(raw) => {
            let Some(connection) = state.connection_mut(&server) else {
                return;
            };
            let mut events = connection.handle_line(&raw);
            let consumed = state
                .hooks
                .as_mut()
                .is_some_and(|hooks| hooks.try_handle_server_line(&server, &raw));
            if consumed {
                events.retain(is_connection_level);
            }
            events
        }
        TransportEvent::Error(error) => {
            state.error(&tab, IrcError::Transport(error).to_string());
            return;
        }
        TransportEvent::Closed { reason } => {
            on_closed(state, &server, conn_id, &reason);
            return;
        }
    };
    handler::apply_events(state, &server, events);
}

fn is_connection_level(event: &IrcEvent) -> bool {
    matches!(
        event,
        IrcEvent::StateChanged(_)
            | IrcEvent::Registered { .. }
            | IrcEvent::OwnNickChanged { .. }
            | IrcEvent::Disconnected { .. }
    )
}

fn on_closed(state: &mut AppState, server: &str, conn_id: ConnectionId, reason: &str) {
    let Some(mut session) = state.sessions.remove(server) else {
        return;
    };
    let quitting = session.connection.is_quitting();
    let events = session.connection.on_transport_closed(reason);
    state.pending_actions.push(Action::Discard { conn_id });
    handler::apply_events(state, server, events);
    tracing::info!(server, conn = conn_id, reason, "connection closed");

    let user_disconnect = match state.reconnect.get_mut(server) {
        Some(rc) => std::mem::replace(&mut rc.user_disconnect, false),
        None => false,
    };
    if !quitting && !user_disconnect {
        schedule_reconnect(state, server);
    }
}

fn schedule_reconnect(state: &mut AppState, server: &str) {
    if !state.config.reconnect.enabled {
        return;
    }
    let max = state.config.reconnect.max_attempts;
    let delay = state.config.reconnect.delay_secs;
    let token = state.allocate_token();
    let tab = ChannelKey::server_tab(server);

    let Some(rc) = state.reconnect.get_mut(server) else {
        return;
    };
    if max > 0 && rc.attempts >= max {
        let exhausted = IrcError::ReconnectExhausted {
            host: server.to_string(),
            attempts: max,
        };
        tracing::warn!(server, attempts = max, "giving up reconnecting");
        state.system(&tab, exhausted.to_string());
        return;
    }
    rc.attempts += 1;
    rc.pending = Some(token);
    let attempt = rc.attempts;

    let limit = if max > 0 {
        max.to_string()
    } else {
        "∞".to_string()
    };
    state.system(
        &tab,
        format!(
            "Auto-reconnect: attempting to reconnect to {server} in {delay}s (attempt {attempt}/{limit})"
        ),
    );
    state.pending_actions.push(Action::ScheduleReconnect {
        host: server.to_string(),
        token,
        delay: Duration::from_secs(delay),
    });
}

/// A reconnect timer fired. Recreates the connection from the stored
/// parameters unless the timer was cancelled in the meantime.
pub fn on_reconnect_due(state: &mut AppState, host: &str, token: u64) {
    let Some(rc) = state.reconnect.get_mut(host) else {
        return;
    };
    if rc.pending != Some(token) {
        tracing::debug!(host, token, "stale reconnect timer");
        return;
    }
    rc.pending = None;
    let request = rc.request.clone();
    open(state, request, "Reconnecting to");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::state::MessageKind;
    use crate::config::model::{AppConfig, ServerConfig};
    use crate::irc::connection::ConnectionState;

    const HOST: &str = "irc.example.org";

    fn config(max_attempts: u32) -> AppConfig {
        let mut config = AppConfig::default();
        config.reconnect.max_attempts = max_attempts;
        config.servers = vec![ServerConfig::new("example", HOST, "tester")];
        config
    }

    fn request(state: &AppState) -> ConnectRequest {
        ConnectRequest::from_server_config(&state.config.servers[0], &state.config)
    }

    fn conn_id(state: &AppState) -> ConnectionId {
        state.sessions[HOST].conn_id
    }

    fn server_tab_texts(state: &AppState) -> Vec<String> {
        state
            .history(&ChannelKey::server_tab(HOST))
            .iter()
            .map(|m| m.text.clone())
            .collect()
    }

    fn scheduled_token(actions: &[Action]) -> Option<u64> {
        actions.iter().find_map(|a| match a {
            Action::ScheduleReconnect { token, .. } => Some(*token),
            _ => None,
        })
    }

    #[test]
    fn test_reconnect_gives_up_after_max_attempts() {
        let mut state = AppState::new(config(3));
        let req = request(&state);
        connect(&mut state, req);
        state.take_actions();

        for round in 0..4 {
            let id = conn_id(&state);
            on_transport(
                &mut state,
                id,
                TransportEvent::Closed {
                    reason: "Connection reset by peer".into(),
                },
            );
            let actions = state.take_actions();
            assert!(actions
                .iter()
                .any(|a| matches!(a, Action::Discard { conn_id } if *conn_id == id)));
            match scheduled_token(&actions) {
                Some(token) => {
                    assert!(round < 3);
                    on_reconnect_due(&mut state, HOST, token);
                    let actions = state.take_actions();
                    assert!(actions.iter().any(|a| matches!(a, Action::Connect { .. })));
                }
                None => assert_eq!(round, 3),
            }
        }

        let texts = server_tab_texts(&state);
        let scheduled: Vec<&String> = texts
            .iter()
            .filter(|t| t.starts_with("Auto-reconnect: attempting"))
            .collect();
        assert_eq!(scheduled.len(), 3);
        assert_eq!(
            scheduled[2],
            "Auto-reconnect: attempting to reconnect to irc.example.org in 10s (attempt 3/3)"
        );
        let exhausted = texts
            .iter()
            .filter(|t| *t == "Auto-reconnect: max attempts (3) reached for irc.example.org")
            .count();
        assert_eq!(exhausted, 1);
        assert!(!state.sessions.contains_key(HOST));
    }

    #[test]
    fn test_unlimited_attempts_show_infinity() {
        let mut state = AppState::new(config(0));
        let req = request(&state);
        connect(&mut state, req);
        let id = conn_id(&state);
        on_transport(&mut state, id, TransportEvent::Closed { reason: "gone".into() });
        assert!(server_tab_texts(&state)
            .iter()
            .any(|t| t.ends_with("(attempt 1/∞)")));
    }

    #[test]
    fn test_user_disconnect_does_not_reconnect() {
        let mut state = AppState::new(config(3));
        let req = request(&state);
        connect(&mut state, req);
        state.take_actions();
        let id = conn_id(&state);

        disconnect(&mut state, HOST, Some("bye"));
        let actions = state.take_actions();
        let send = actions
            .iter()
            .position(|a| matches!(a, Action::Send { line, .. } if line == "QUIT :bye"));
        let close = actions
            .iter()
            .position(|a| matches!(a, Action::Close { .. }));
        assert!(send.is_some() && close.is_some() && send < close);

        on_transport(&mut state, id, TransportEvent::Closed { reason: "Disconnected".into() });
        assert_eq!(scheduled_token(&state.take_actions()), None);
        assert_eq!(state.connection_state(HOST), ConnectionState::Disconnected);
    }

    #[test]
    fn test_stale_events_are_ignored() {
        let mut state = AppState::new(config(3));
        let req = request(&state);
        connect(&mut state, req.clone());
        let old = conn_id(&state);
        connect(&mut state, req);
        let actions = state.take_actions();
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Discard { conn_id } if *conn_id == old)));

        on_transport(&mut state, old, TransportEvent::Closed { reason: "old".into() });
        assert!(state.sessions.contains_key(HOST));
        assert_eq!(scheduled_token(&state.take_actions()), None);
    }

    #[test]
    fn test_cancelled_timer_is_stale() {
        let mut state = AppState::new(config(3));
        let req = request(&state);
        connect(&mut state, req.clone());
        let id = conn_id(&state);
        on_transport(&mut state, id, TransportEvent::Closed { reason: "x".into() });
        let token = scheduled_token(&state.take_actions()).unwrap();

        // a manual connect wins over the pending timer
        connect(&mut state, req);
        let actions = state.take_actions();
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::CancelReconnect { host } if host == HOST)));
        let current = conn_id(&state);
        on_reconnect_due(&mut state, HOST, token);
        assert_eq!(conn_id(&state), current);
    }

    #[test]
    fn test_transport_error_is_shown() {
        let mut state = AppState::new(config(3));
        let req = request(&state);
        connect(&mut state, req);
        let id = conn_id(&state);
        on_transport(&mut state, id, TransportEvent::Error("TLS handshake failed".into()));
        let last = state.history(&ChannelKey::server_tab(HOST)).last().unwrap();
        assert_eq!(last.kind, MessageKind::Error);
        assert_eq!(last.text, "Connection error: TLS handshake failed");
    }
}
