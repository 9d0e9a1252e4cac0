//! Socket task for one connection attempt.
//!
//! Each attempt runs in its own tokio task: connect (optionally through a
//! proxy), TLS handshake, then a read/write loop. Everything it observes is
//! reported to the control loop as [`AppEvent::Transport`] tagged with the
//! attempt's [`ConnectionId`]; it never interprets IRC itself.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::connection::{ConnectionEndpoint, ConnectionId};
use super::{proxy, tls};
use crate::app::event::{AppEvent, TransportEvent};

trait IrcStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> IrcStream for T {}

#[derive(Debug)]
enum Outgoing {
    Line(String),
    Close,
}

pub struct TransportHandle {
    tx: mpsc::UnboundedSender<Outgoing>,
    task: JoinHandle<()>,
}

impl TransportHandle {
    pub fn send_line(&self, line: String) -> Result<()> {
        self.tx
            .send(Outgoing::Line(line))
            .map_err(|_| anyhow!("Connection task has stopped"))
    }

    /// Flush queued lines, then shut the socket down.
    pub fn close(&self) {
        let _ = self.tx.send(Outgoing::Close);
    }

    /// Drop the socket immediately without reporting further events.
    pub fn abort(&self) {
        self.task.abort();
    }
}

pub fn spawn(
    conn_id: ConnectionId,
    endpoint: ConnectionEndpoint,
    connect_timeout: Duration,
    event_tx: mpsc::UnboundedSender<AppEvent>,
) -> TransportHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(async move {
        let reason = match run(conn_id, &endpoint, connect_timeout, rx, &event_tx).await {
            Ok(reason) => reason,
            Err(e) => {
                let error = format!("{e:#}");
                tracing::warn!(conn = conn_id, host = %endpoint.host, error = %error, "transport failed");
                emit(&event_tx, conn_id, TransportEvent::Error(error.clone()));
                error
            }
        };
        emit(&event_tx, conn_id, TransportEvent::Closed { reason });
    });
    TransportHandle { tx, task }
}

fn emit(event_tx: &mpsc::UnboundedSender<AppEvent>, conn_id: ConnectionId, event: TransportEvent) {
    let _ = event_tx.send(AppEvent::Transport { conn_id, event });
}

async fn establish(
    conn_id: ConnectionId,
    endpoint: &ConnectionEndpoint,
    event_tx: &mpsc::UnboundedSender<AppEvent>,
) -> Result<Box<dyn IrcStream>> {
    let tcp = proxy::connect(&endpoint.proxy, &endpoint.host, endpoint.port).await?;
    let _ = tcp.set_nodelay(true);
    tracing::info!(conn = conn_id, host = %endpoint.host, port = endpoint.port, "TCP connected");
    emit(event_tx, conn_id, TransportEvent::TcpConnected);

    if !endpoint.tls {
        return Ok(Box::new(tcp));
    }
    if endpoint.accept_invalid_certs {
        tracing::warn!(conn = conn_id, host = %endpoint.host, "TLS certificate verification disabled");
    }
    let connector = tls::connector(endpoint.accept_invalid_certs)?;
    let name = tls::server_name(&endpoint.host)?;
    let stream = connector
        .connect(name, tcp)
        .await
        .with_context(|| format!("TLS handshake with {} failed", endpoint.host))?;
    tracing::info!(conn = conn_id, host = %endpoint.host, "TLS handshake complete");
    Ok(Box::new(stream))
}

/// Returns the close reason on a clean shutdown.
async fn run(
    conn_id: ConnectionId,
    endpoint: &ConnectionEndpoint,
    connect_timeout: Duration,
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
    event_tx: &mpsc::UnboundedSender<AppEvent>,
) -> Result<String> {
    let stream = tokio::time::timeout(connect_timeout, establish(conn_id, endpoint, event_tx))
        .await
        .map_err(|_| {
            anyhow!(
                "Connection to {}:{} timed out after {}s",
                endpoint.host,
                endpoint.port,
                connect_timeout.as_secs()
            )
        })??;
    emit(event_tx, conn_id, TransportEvent::Ready);

    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    // Partial lines stay here across wakeups until their newline arrives
    let mut buf = Vec::with_capacity(512);

    loop {
        tokio::select! {
            result = reader.read_until(b'\n', &mut buf) => {
                let n = result.context("Read error")?;
                if n == 0 {
                    return Ok("Connection closed by server".to_string());
                }
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                buf.clear();
                if line.is_empty() {
                    continue;
                }
                tracing::debug!(conn = conn_id, line = %line, "<<");
                if event_tx
                    .send(AppEvent::Transport { conn_id, event: TransportEvent::Line(line) })
                    .is_err()
                {
                    return Ok("Shutting down".to_string());
                }
            }
            outgoing = rx.recv() => match outgoing {
                Some(Outgoing::Line(line)) => {
                    tracing::debug!(conn = conn_id, line = %line, ">>");
                    writer.write_all(line.as_bytes()).await.context("Write error")?;
                    writer.write_all(b"\r\n").await.context("Write error")?;
                    writer.flush().await.context("Write error")?;
                }
                Some(Outgoing::Close) | None => {
                    let _ = writer.shutdown().await;
                    return Ok("Disconnected".to_string());
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::ProxyConfig;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn plain_endpoint(port: u16) -> ConnectionEndpoint {
        ConnectionEndpoint {
            host: "127.0.0.1".into(),
            port,
            tls: false,
            accept_invalid_certs: false,
            proxy: ProxyConfig::default(),
        }
    }

    async fn next_transport_event(rx: &mut mpsc::UnboundedReceiver<AppEvent>) -> TransportEvent {
        match rx.recv().await {
            Some(AppEvent::Transport { event, .. }) => event,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_lines_in_and_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            // one line split across two writes
            sock.write_all(b"PING :ab").await.unwrap();
            sock.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            sock.write_all(b"c\r\n").await.unwrap();
            let mut received = vec![0u8; 64];
            let n = sock.read(&mut received).await.unwrap();
            String::from_utf8_lossy(&received[..n]).to_string()
        });

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let handle = spawn(7, plain_endpoint(port), Duration::from_secs(5), event_tx);

        assert_eq!(next_transport_event(&mut event_rx).await, TransportEvent::TcpConnected);
        assert_eq!(next_transport_event(&mut event_rx).await, TransportEvent::Ready);
        assert_eq!(
            next_transport_event(&mut event_rx).await,
            TransportEvent::Line("PING :abc".into())
        );

        handle.send_line("PONG abc".into()).unwrap();
        assert_eq!(server.await.unwrap(), "PONG abc\r\n");
    }

    #[tokio::test]
    async fn test_refused_connection_reports_error_then_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let _handle = spawn(1, plain_endpoint(port), Duration::from_secs(5), event_tx);
        assert!(matches!(
            next_transport_event(&mut event_rx).await,
            TransportEvent::Error(_)
        ));
        assert!(matches!(
            next_transport_event(&mut event_rx).await,
            TransportEvent::Closed { .. }
        ));
    }
}
