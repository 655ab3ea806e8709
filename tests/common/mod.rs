//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use admission_guard::clock::ManualClock;
use admission_guard::config::GuardConfig;
use admission_guard::http::AppState;
use admission_guard::lifecycle::build_state_with_store;
use admission_guard::store::MemoryStore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Fixed start time for simulated clocks.
pub const EPOCH: Duration = Duration::from_secs(1_700_000_000);

/// Fully wired components over an in-memory store and a manual clock.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
    pub state: AppState,
    pub config: GuardConfig,
}

pub fn harness(config: GuardConfig) -> Harness {
    let clock = Arc::new(ManualClock::new(EPOCH));
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let state = build_state_with_store(&config, store.clone(), clock.clone()).unwrap();
    Harness {
        clock,
        store,
        state,
        config,
    }
}

/// A second set of components sharing `other`'s store and clock, as a second
/// instance of the service would.
pub fn sibling(other: &Harness) -> AppState {
    build_state_with_store(&other.config, other.store.clone(), other.clock.clone()).unwrap()
}

/// Start a programmable mock upstream on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        let _ = socket.read(&mut buf).await;

                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a minimal Redis protocol responder whose `SELECT` reply is delayed
/// by `handshake_delay`. Every other command is answered immediately.
pub async fn start_slow_handshake_store(handshake_delay: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut pending = Vec::new();
                let mut buf = [0u8; 4096];
                loop {
                    let n = match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    pending.extend_from_slice(&buf[..n]);

                    while let Some((command, used)) = parse_command(&pending) {
                        pending.drain(..used);
                        let reply: &[u8] = match command.as_str() {
                            "SELECT" => {
                                tokio::time::sleep(handshake_delay).await;
                                b"+OK\r\n"
                            }
                            "PING" => b"+PONG\r\n",
                            _ => b"+OK\r\n",
                        };
                        if socket.write_all(reply).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }
    });

    addr
}

/// Parse one RESP array command from the front of `buf`, returning its
/// upper-cased name and the number of bytes it occupies.
fn parse_command(buf: &[u8]) -> Option<(String, usize)> {
    fn line(buf: &[u8], from: usize) -> Option<(&[u8], usize)> {
        let end = buf[from..].windows(2).position(|w| w == b"\r\n")? + from;
        Some((&buf[from..end], end + 2))
    }

    let (header, mut pos) = line(buf, 0)?;
    let count: usize = std::str::from_utf8(header.strip_prefix(b"*")?).ok()?.parse().ok()?;
    let mut name = String::new();
    for i in 0..count {
        let (len_line, next) = line(buf, pos)?;
        let len: usize = std::str::from_utf8(len_line.strip_prefix(b"$")?).ok()?.parse().ok()?;
        if buf.len() < next + len + 2 {
            return None;
        }
        if i == 0 {
            name = String::from_utf8_lossy(&buf[next..next + len]).to_uppercase();
        }
        pos = next + len + 2;
    }
    Some((name, pos))
}
