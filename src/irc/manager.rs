//! Owner of the live sockets and reconnect timers.
//!
//! The application state decides *what* should happen and returns
//! [`Action`]s; `IrcManager` performs them. It holds one transport handle per
//! connection id and at most one pending reconnect timer per host.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::app::action::Action;
use crate::app::event::AppEvent;
use crate::irc::connection::{ConnectionEndpoint, ConnectionId};
use crate::irc::transport::{self, TransportHandle};

pub struct IrcManager {
    transports: HashMap<ConnectionId, TransportHandle>,
    reconnect_timers: HashMap<String, JoinHandle<()>>,
    event_tx: mpsc::UnboundedSender<AppEvent>,
    connect_timeout: Duration,
}

impl IrcManager {
    pub fn new(event_tx: mpsc::UnboundedSender<AppEvent>, connect_timeout: Duration) -> Self {
        Self {
            transports: HashMap::new(),
            reconnect_timers: HashMap::new(),
            event_tx,
            connect_timeout,
        }
    }

    /// Carry out one action. Returns `false` once the application should exit.
    pub fn execute(&mut self, action: Action) -> bool {
        match action {
            Action::Connect { conn_id, endpoint } => self.connect(conn_id, endpoint),
            Action::Send { conn_id, line } => self.send(conn_id, line),
            Action::Close { conn_id } => {
                if let Some(handle) = self.transports.get(&conn_id) {
                    handle.close();
                }
            }
            Action::Discard { conn_id } => {
                if let Some(handle) = self.transports.remove(&conn_id) {
                    handle.abort();
                }
            }
            Action::ScheduleReconnect { host, token, delay } => {
                self.schedule_reconnect(host, token, delay)
            }
            Action::CancelReconnect { host } => {
                if let Some(timer) = self.reconnect_timers.remove(&host) {
                    timer.abort();
                }
            }
            Action::Quit => {
                for handle in self.transports.values() {
                    handle.close();
                }
                return false;
            }
        }
        true
    }

    fn connect(&mut self, conn_id: ConnectionId, endpoint: ConnectionEndpoint) {
        tracing::info!(conn = conn_id, host = %endpoint.host, port = endpoint.port, tls = endpoint.tls, "connecting");
        let handle = transport::spawn(
            conn_id,
            endpoint,
            self.connect_timeout,
            self.event_tx.clone(),
        );
        self.transports.insert(conn_id, handle);
    }

    fn send(&mut self, conn_id: ConnectionId, line: String) {
        let Some(handle) = self.transports.get(&conn_id) else {
            tracing::debug!(conn = conn_id, "dropping line for unknown connection");
            return;
        };
        if let Err(e) = handle.send_line(line) {
            tracing::warn!(conn = conn_id, error = %e, "send failed");
            self.transports.remove(&conn_id);
        }
    }

    fn schedule_reconnect(&mut self, host: String, token: u64, delay: Duration) {
        let tx = self.event_tx.clone();
        let fire_host = host.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(AppEvent::ReconnectDue {
                host: fire_host,
                token,
            });
        });
        if let Some(previous) = self.reconnect_timers.insert(host, timer) {
            previous.abort();
        }
    }

    pub fn connection_count(&self) -> usize {
        self.transports.len()
    }
}
