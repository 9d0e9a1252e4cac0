//! Chat logs (scrollback) and diagnostic tracing.
//!
//! Chat lines are written to `<log_dir>/<server>/<channel>.log`, one line per
//! message in the form `yyyy-MM-dd HH:mm:ss [kind] text`. The manager reads
//! the tail of that file back the first time a channel is opened in a
//! session.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;

use crate::app::state::MessageKind;
use crate::config::model::LoggingConfig;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const SCROLLBACK_START: &str = "Scrollback from ";
pub const SCROLLBACK_END: &str = "End of scrollback";

/// One line read back from a chat log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: String,
    pub kind: MessageKind,
    pub text: String,
}

/// Persistent per-channel history.
pub trait Scrollback: Send {
    /// Record one message. Failures are logged, never returned.
    fn append(&mut self, server: &str, channel: &str, kind: MessageKind, text: &str);

    /// The last `max` entries for a channel, oldest first.
    fn load_last(&self, server: &str, channel: &str, max: usize) -> Vec<LogEntry>;
}

/// [`Scrollback`] backed by plain text files. File handles are cached for
/// the lifetime of the logger.
pub struct FileScrollback {
    log_dir: PathBuf,
    handles: HashMap<PathBuf, File>,
}

impl FileScrollback {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            handles: HashMap::new(),
        }
    }

    pub fn from_config(config: &LoggingConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(expand_home(&config.log_dir)))
    }

    fn path_for(&self, server: &str, channel: &str) -> PathBuf {
        let safe: String = channel
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
            .collect();
        self.log_dir.join(server).join(format!("{safe}.log"))
    }

    fn write_line(&mut self, path: PathBuf, line: &str) -> Result<()> {
        if !self.handles.contains_key(&path) {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            self.handles.insert(path.clone(), file);
        }
        if let Some(file) = self.handles.get_mut(&path) {
            writeln!(file, "{line}").with_context(|| format!("Failed to write {}", path.display()))?;
        }
        Ok(())
    }
}

impl Scrollback for FileScrollback {
    fn append(&mut self, server: &str, channel: &str, kind: MessageKind, text: &str) {
        let path = self.path_for(server, channel);
        let line = format!(
            "{} [{}] {}",
            Local::now().format(TIMESTAMP_FORMAT),
            kind.as_str(),
            text
        );
        if let Err(e) = self.write_line(path, &line) {
            tracing::warn!(server, channel, error = %format!("{e:#}"), "chat log append failed");
        }
    }

    fn load_last(&self, server: &str, channel: &str, max: usize) -> Vec<LogEntry> {
        let path = self.path_for(server, channel);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(_) => return Vec::new(),
        };
        let lines: Vec<&str> = contents.lines().collect();
        let start = lines.len().saturating_sub(max);
        lines[start..]
            .iter()
            .filter_map(|line| parse_log_line(line))
            .filter(|entry| !is_noise(entry))
            .collect()
    }
}

/// Parse `yyyy-MM-dd HH:mm:ss [kind] text`, or a legacy line without the
/// bracketed kind.
fn parse_log_line(line: &str) -> Option<LogEntry> {
    if line.chars().count() < 20 || !line.is_char_boundary(19) || !line.is_char_boundary(20) {
        return None;
    }
    let timestamp = line[..19].to_string();
    let rest = &line[20..];

    if let Some(inner) = rest.strip_prefix('[') {
        if let Some((kind, text)) = inner.split_once(']') {
            return Some(LogEntry {
                timestamp,
                kind: MessageKind::parse(kind).unwrap_or(MessageKind::System),
                text: text.strip_prefix(' ').unwrap_or(text).to_string(),
            });
        }
    }

    let kind = if rest.starts_with('<') || rest.starts_with('-') {
        MessageKind::Chat
    } else if rest.starts_with('*') {
        MessageKind::Action
    } else {
        MessageKind::System
    };
    Some(LogEntry {
        timestamp,
        kind,
        text: rest.to_string(),
    })
}

fn is_noise(entry: &LogEntry) -> bool {
    if entry.kind != MessageKind::System {
        return false;
    }
    let t = entry.text.as_str();
    t.starts_with("Now talking in ")
        || t.starts_with("Topic for ")
        || t.starts_with("*** Topic for ")
        || t.starts_with("Connecting to ")
        || t.contains(SCROLLBACK_START)
        || t.contains(SCROLLBACK_END)
}

fn expand_home(dir: &str) -> PathBuf {
    match dir.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(dir)),
        None => PathBuf::from(dir),
    }
}

/// Install the stderr tracing subscriber. Unknown level names fall back to
/// `info`.
pub fn init_tracing(config: &LoggingConfig) {
    let level = config
        .level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

/// Directory the file logger writes to, for display.
pub fn log_root(config: &LoggingConfig) -> PathBuf {
    expand_home(&config.log_dir)
}
