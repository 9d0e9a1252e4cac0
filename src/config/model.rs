//! Configuration data model.
//!
//! All structs derive `Deserialize` for TOML loading. Every field has a
//! sensible default so the engine works without a config file.

use serde::{Deserialize, Serialize};

use super::nickname::generate_nickname;
use crate::irc::connection::DEFAULT_NICKSERV_COMMAND;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_servers")]
    pub servers: Vec<ServerConfig>,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub perform: PerformConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub ctcp: CtcpConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            connection: ConnectionConfig::default(),
            reconnect: ReconnectConfig::default(),
            proxy: ProxyConfig::default(),
            perform: PerformConfig::default(),
            logging: LoggingConfig::default(),
            ctcp: CtcpConfig::default(),
            features: FeaturesConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn find_server(&self, name_or_host: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| {
            s.name.eq_ignore_ascii_case(name_or_host) || s.host.eq_ignore_ascii_case(name_or_host)
        })
    }
}

fn default_servers() -> Vec<ServerConfig> {
    let nick = generate_nickname();
    vec![
        ServerConfig::new("libera", "irc.libera.chat", &nick),
        ServerConfig::new("oftc", "irc.oftc.net", &nick),
    ]
}

/// Configuration for a single IRC server connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// User-facing label (e.g. `"libera"`).
    pub name: String,
    /// Hostname or IP address of the IRC server.
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub tls: bool,
    #[serde(default = "default_nickname")]
    pub nickname: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub realname: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// `None`, `PLAIN` or `EXTERNAL`.
    #[serde(default)]
    pub sasl_mechanism: Option<String>,
    #[serde(default)]
    pub sasl_username: Option<String>,
    #[serde(default)]
    pub sasl_password: Option<String>,
    #[serde(default)]
    pub nickserv_password: Option<String>,
    #[serde(default = "default_nickserv_command")]
    pub nickserv_command: String,
    /// Joined after registration.
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub auto_connect: bool,
    /// Skip certificate verification for this server.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl ServerConfig {
    pub fn new(name: &str, host: &str, nickname: &str) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port: default_port(),
            tls: true,
            nickname: nickname.into(),
            username: None,
            realname: None,
            password: None,
            sasl_mechanism: None,
            sasl_username: None,
            sasl_password: None,
            nickserv_password: None,
            nickserv_command: default_nickserv_command(),
            channels: vec![],
            auto_connect: false,
            accept_invalid_certs: false,
        }
    }
}

/// Socket-level settings shared by every connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_quit_message")]
    pub quit_message: String,
    #[serde(default = "default_part_message")]
    pub part_message: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            quit_message: default_quit_message(),
            part_message: default_part_message(),
        }
    }
}

/// Automatic reconnection after an unexpected disconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 0 retries forever.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_reconnect_delay")]
    pub delay_secs: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: default_max_attempts(),
            delay_secs: default_reconnect_delay(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    #[default]
    None,
    Socks5,
    Http,
}

/// Outbound proxy used for every connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub kind: ProxyKind,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ProxyConfig {
    pub fn is_enabled(&self) -> bool {
        self.kind != ProxyKind::None && !self.host.is_empty()
    }
}

/// Commands run after registration, one per line.
///
/// `%n` expands to the current nickname and `%s` to the server name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformConfig {
    #[serde(default)]
    pub commands: String,
}

/// Chat log (scrollback) and diagnostic log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_scrollback_lines")]
    pub scrollback_lines: usize,
    /// Maximum tracing level written to stderr.
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_dir: default_log_dir(),
            scrollback_lines: default_scrollback_lines(),
            level: default_level(),
        }
    }
}

/// CTCP (Client-To-Client Protocol) auto-reply settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CtcpConfig {
    #[serde(default = "default_true")]
    pub reply_version: bool,
    #[serde(default = "default_true")]
    pub reply_ping: bool,
    #[serde(default = "default_true")]
    pub reply_time: bool,
    #[serde(default = "default_version_string")]
    pub version_string: String,
}

impl Default for CtcpConfig {
    fn default() -> Self {
        Self {
            reply_version: true,
            reply_ping: true,
            reply_time: true,
            version_string: default_version_string(),
        }
    }
}

/// Side features fed by the normal message flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_true")]
    pub url_grabber: bool,
    #[serde(default = "default_true")]
    pub away_log: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            url_grabber: true,
            away_log: true,
        }
    }
}

fn default_nickname() -> String {
    generate_nickname()
}
fn default_port() -> u16 {
    6697
}
fn default_true() -> bool {
    true
}
fn default_nickserv_command() -> String {
    DEFAULT_NICKSERV_COMMAND.to_string()
}
fn default_connect_timeout() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    10
}
fn default_reconnect_delay() -> u64 {
    10
}
fn default_quit_message() -> String {
    "crabirc".to_string()
}
fn default_part_message() -> String {
    "Leaving".to_string()
}
fn default_log_dir() -> String {
    dirs::data_dir()
        .map(|d| d.join("crabirc").join("logs").display().to_string())
        .unwrap_or_else(|| "~/.local/share/crabirc/logs".to_string())
}
fn default_scrollback_lines() -> usize {
    200
}
fn default_level() -> String {
    "info".to_string()
}
fn default_version_string() -> String {
    format!("crabirc {} - Rust IRC client", env!("CARGO_PKG_VERSION"))
}
