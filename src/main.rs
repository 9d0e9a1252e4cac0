mod app;
mod config;
mod hooks;
mod irc;
mod logging;

use crate::app::event::AppEvent;
use crate::app::handler;
use crate::app::state::*;
use crate::config::model::AppConfig;
use crate::irc::manager::IrcManager;
use crate::logging::FileScrollback;
use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = config::load_config(config_path.as_deref())?;
    logging::init_tracing(&cfg.logging);
    tracing::info!(
        servers = cfg.servers.len(),
        log_dir = %logging::log_root(&cfg.logging).display(),
        "starting"
    );

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<AppEvent>();
    let connect_timeout = Duration::from_secs(cfg.connection.connect_timeout_secs);
    let mut irc_manager = IrcManager::new(event_tx.clone(), connect_timeout);

    let mut state = AppState::new(cfg.clone());
    if let Some(scrollback) = FileScrollback::from_config(&cfg.logging) {
        state = state.with_scrollback(Box::new(scrollback));
    }

    spawn_console(event_tx.clone(), cfg.clone());

    for server in cfg.servers.iter().filter(|s| s.auto_connect) {
        let request = ConnectRequest::from_server_config(server, &cfg);
        let _ = event_tx.send(AppEvent::Connect(request));
    }

    while let Some(event) = event_rx.recv().await {
        let actions = handler::handle_event(&mut state, event);
        print_notifications(&mut state);

        let mut running = true;
        for action in actions {
            running &= irc_manager.execute(action);
        }
        if !running {
            break;
        }
    }

    // Give writer tasks a moment to flush QUIT.
    tokio::time::sleep(Duration::from_millis(250)).await;
    Ok(())
}

/// Read stdin line by line. EOF quits every server.
fn spawn_console(tx: mpsc::UnboundedSender<AppEvent>, cfg: AppConfig) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let Some(event) = console_event(&line, &cfg) else {
                        continue;
                    };
                    if tx.send(event).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    let _ = tx.send(AppEvent::Shutdown { message: None });
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    let _ = tx.send(AppEvent::Shutdown { message: None });
                    break;
                }
            }
        }
    });
}

/// Lines starting with `:` drive the views; everything else is chat input.
fn console_event(line: &str, cfg: &AppConfig) -> Option<AppEvent> {
    let Some(meta) = line.strip_prefix(':') else {
        return Some(AppEvent::Input(line.to_string()));
    };
    let mut words = meta.split_whitespace();
    let event = match (words.next()?, words.next(), words.next()) {
        ("connect", Some(name), _) => match cfg.find_server(name) {
            Some(server) => AppEvent::Connect(ConnectRequest::from_server_config(server, cfg)),
            None => {
                eprintln!("no configured server named {name}");
                return None;
            }
        },
        ("disconnect", Some(server), _) => AppEvent::Disconnect {
            server: server.to_string(),
            message: None,
        },
        ("switch", Some(server), channel) => {
            AppEvent::SwitchView(view_key(server, channel))
        }
        ("query", Some(server), Some(nick)) => AppEvent::OpenQuery {
            server: server.to_string(),
            nick: nick.to_string(),
        },
        ("close", Some(server), channel) => AppEvent::CloseChannel(view_key(server, channel)),
        ("quit", ..) => {
            let message = meta["quit".len()..].trim();
            AppEvent::Shutdown {
                message: (!message.is_empty()).then(|| message.to_string()),
            }
        }
        _ => {
            eprintln!("unknown console command: {line}");
            return None;
        }
    };
    Some(event)
}

fn view_key(server: &str, channel: Option<&str>) -> ChannelKey {
    match channel {
        Some(channel) => ChannelKey::new(server, channel),
        None => ChannelKey::server_tab(server),
    }
}

fn print_notifications(state: &mut AppState) {
    for notification in state.drain_notifications() {
        match notification {
            Notification::MessageAppended { key, message } => {
                let time = message.timestamp.get(11..).unwrap_or(&message.timestamp);
                println!("{time} [{key}] {}", message.text);
            }
            Notification::ViewSwitched(key) => println!("-- viewing {key}"),
            other => tracing::trace!(?other, "notification"),
        }
    }
}
