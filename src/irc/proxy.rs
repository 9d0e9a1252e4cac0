//! Outbound proxy tunnels: SOCKS5 (RFC 1928/1929) and HTTP CONNECT.

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::model::{ProxyConfig, ProxyKind};

const MAX_HTTP_HEADER: usize = 8192;

/// Open a TCP stream to `host:port`, tunnelled through the proxy if one is
/// configured.
pub async fn connect(proxy: &ProxyConfig, host: &str, port: u16) -> Result<TcpStream> {
    if !proxy.is_enabled() {
        return TcpStream::connect((host, port))
            .await
            .with_context(|| format!("TCP connect to {host}:{port} failed"));
    }

    let mut stream = TcpStream::connect((proxy.host.as_str(), proxy.port))
        .await
        .with_context(|| format!("Proxy connect to {}:{} failed", proxy.host, proxy.port))?;
    match proxy.kind {
        ProxyKind::Socks5 => socks5_handshake(&mut stream, proxy, host, port).await?,
        ProxyKind::Http => http_connect(&mut stream, proxy, host, port).await?,
        ProxyKind::None => {}
    }
    tracing::debug!(proxy = %proxy.host, target = %host, port, "proxy tunnel established");
    Ok(stream)
}

async fn socks5_handshake(
    stream: &mut TcpStream,
    proxy: &ProxyConfig,
    host: &str,
    port: u16,
) -> Result<()> {
    let credentials = proxy
        .username
        .as_deref()
        .filter(|u| !u.is_empty())
        .map(|u| (u, proxy.password.as_deref().unwrap_or("")));

    let greeting: &[u8] = if credentials.is_some() {
        &[0x05, 0x02, 0x00, 0x02]
    } else {
        &[0x05, 0x01, 0x00]
    };
    stream.write_all(greeting).await?;

    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await?;
    if choice[0] != 0x05 {
        bail!("SOCKS5 proxy sent version {}", choice[0]);
    }
    match (choice[1], credentials) {
        (0x00, _) => {}
        (0x02, Some((user, pass))) => {
            let mut auth = vec![0x01, user.len() as u8];
            auth.extend_from_slice(user.as_bytes());
            auth.push(pass.len() as u8);
            auth.extend_from_slice(pass.as_bytes());
            stream.write_all(&auth).await?;
            let mut status = [0u8; 2];
            stream.read_exact(&mut status).await?;
            if status[1] != 0x00 {
                bail!("SOCKS5 proxy rejected the credentials");
            }
        }
        (0xff, _) => bail!("SOCKS5 proxy accepted none of our auth methods"),
        (method, _) => bail!("SOCKS5 proxy chose unsupported auth method {method}"),
    }

    stream.write_all(&socks5_connect_request(host, port)?).await?;

    let mut reply = [0u8; 4];
    stream.read_exact(&mut reply).await?;
    if reply[1] != 0x00 {
        bail!("SOCKS5 connect failed: {}", socks5_error(reply[1]));
    }
    // Skip the bound address
    let addr_len = match reply[3] {
        0x01 => 4,
        0x04 => 16,
        0x03 => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            len[0] as usize
        }
        other => bail!("SOCKS5 proxy sent address type {other}"),
    };
    let mut bound = vec![0u8; addr_len + 2];
    stream.read_exact(&mut bound).await?;
    Ok(())
}

fn socks5_connect_request(host: &str, port: u16) -> Result<Vec<u8>> {
    if host.len() > 255 {
        bail!("Host name too long for SOCKS5: {host}");
    }
    let mut request = vec![0x05, 0x01, 0x00, 0x03, host.len() as u8];
    request.extend_from_slice(host.as_bytes());
    request.extend_from_slice(&port.to_be_bytes());
    Ok(request)
}

fn socks5_error(code: u8) -> &'static str {
    match code {
        0x01 => "general failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown error",
    }
}

async fn http_connect(
    stream: &mut TcpStream,
    proxy: &ProxyConfig,
    host: &str,
    port: u16,
) -> Result<()> {
    stream
        .write_all(http_connect_request(proxy, host, port).as_bytes())
        .await?;

    // Read byte by byte so nothing the IRC server sends after the tunnel
    // opens is swallowed into a buffer.
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() > MAX_HTTP_HEADER {
            bail!("HTTP proxy response headers too large");
        }
        stream.read_exact(&mut byte).await?;
        head.push(byte[0]);
    }
    let head = String::from_utf8_lossy(&head);
    let status = head.lines().next().unwrap_or_default();
    let code = status.split_whitespace().nth(1).unwrap_or_default();
    if code != "200" {
        bail!("HTTP proxy refused CONNECT: {}", status.trim());
    }
    Ok(())
}

fn http_connect_request(proxy: &ProxyConfig, host: &str, port: u16) -> String {
    let mut request = format!("CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n");
    if let Some(user) = proxy.username.as_deref().filter(|u| !u.is_empty()) {
        let pass = proxy.password.as_deref().unwrap_or("");
        let token = BASE64.encode(format!("{user}:{pass}"));
        request.push_str(&format!("Proxy-Authorization: Basic {token}\r\n"));
    }
    request.push_str("\r\n");
    request
}
