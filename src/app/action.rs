use std::time::Duration;

use crate::irc::connection::{ConnectionEndpoint, ConnectionId};

/// Network side effects requested by the state layer and carried out by
/// [`crate::irc::manager::IrcManager`].
#[derive(Debug, Clone)]
pub enum Action {
    Connect { conn_id: ConnectionId, endpoint: ConnectionEndpoint },
    Send { conn_id: ConnectionId, line: String },
    /// Flush pending lines, then close the socket.
    Close { conn_id: ConnectionId },
    /// Drop the socket without waiting for anything.
    Discard { conn_id: ConnectionId },
    ScheduleReconnect { host: String, token: u64, delay: Duration },
    CancelReconnect { host: String },
    Quit,
}
