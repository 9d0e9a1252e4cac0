use crate::app::state::{ChannelKey, ConnectRequest};
use crate::irc::connection::ConnectionId;

/// What a transport task observed on its socket.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// TCP (and any proxy tunnel) is up.
    TcpConnected,
    /// TLS (if any) is done; IRC traffic can start.
    Ready,
    Line(String),
    Error(String),
    /// Always the last event of a transport task.
    Closed { reason: String },
}

/// Everything the control loop consumes, in arrival order.
#[derive(Debug)]
pub enum AppEvent {
    /// A line typed by the user: plain text or a slash-command.
    Input(String),

    /// Open a new connection (configured server or ad-hoc).
    Connect(ConnectRequest),

    /// Explicit user disconnect of one server.
    Disconnect { server: String, message: Option<String> },

    SwitchView(ChannelKey),
    OpenQuery { server: String, nick: String },
    CloseChannel(ChannelKey),

    /// Socket activity, tagged with the attempt that produced it.
    Transport {
        conn_id: ConnectionId,
        event: TransportEvent,
    },

    /// A reconnect timer fired. Stale if `token` no longer matches.
    ReconnectDue { host: String, token: u64 },

    /// Quit every server and stop the control loop.
    Shutdown { message: Option<String> },
}
