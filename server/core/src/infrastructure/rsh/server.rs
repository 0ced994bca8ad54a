// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! RSH Daemon
//!
//! TCP accept loop spawning one task per connection. A session is the
//! rsh handshake (optional reverse stderr channel from a descending
//! privileged source-port pool), one NUL acceptance byte, then command
//! batches framed as three NUL-terminated strings, each answered with
//! the batch output plus one NUL. A zero-length read ends the session.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::{debug, error, info, warn};

use super::shell::ShellSession;
use crate::domain::store::AssetStore;

const READ_CHUNK: usize = 4096;
const STDERR_PORT_HIGH: u16 = 1023;
const STDERR_PORT_LOW: u16 = 512;

/// Descending pool of privileged source ports for stderr connections.
///
/// The BSD rsh client expects the server side of the stderr channel to
/// originate from a reserved port; the pool walks 1023 down to 512 and
/// wraps.
pub struct StderrPortPool {
    next: Mutex<u16>,
}

impl StderrPortPool {
    pub fn new() -> Self {
        Self {
            next: Mutex::new(STDERR_PORT_HIGH),
        }
    }

    /// Take the next source port from the pool.
    pub fn acquire(&self) -> u16 {
        let mut next = self.next.lock();
        let port = *next;
        *next = if port <= STDERR_PORT_LOW {
            STDERR_PORT_HIGH
        } else {
            port - 1
        };
        port
    }
}

impl Default for StderrPortPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Remote-command server bound to one listener.
pub struct RshDaemon {
    listener: TcpListener,
    store: Arc<dyn AssetStore>,
    local_ip: IpAddr,
    stderr_ports: Arc<StderrPortPool>,
}

impl RshDaemon {
    /// Create a daemon over an already-bound listener.
    pub fn new(listener: TcpListener, store: Arc<dyn AssetStore>, local_ip: IpAddr) -> Self {
        Self {
            listener,
            store,
            local_ip,
            stderr_ports: Arc::new(StderrPortPool::new()),
        }
    }

    /// Accept forever; each connection is serviced by its own task so an
    /// in-flight install session never blocks the accept loop or the
    /// datagram daemons.
    pub async fn run(self) {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "rsh: accept failed");
                    continue;
                }
            };

            let store = self.store.clone();
            let pool = self.stderr_ports.clone();
            let local_ip = self.local_ip;
            tokio::spawn(async move {
                if let Err(e) = serve_connection(stream, peer, store, local_ip, pool).await {
                    warn!(%peer, error = %e, "rsh: session failed");
                }
            });
        }
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    store: Arc<dyn AssetStore>,
    local_ip: IpAddr,
    pool: Arc<StderrPortPool>,
) -> io::Result<()> {
    let mut buf = Vec::new();

    let Some(spec) = read_segment(&mut stream, &mut buf).await? else {
        debug!(%peer, "rsh: peer closed during handshake");
        return Ok(());
    };

    // held for the session; the protocol logic itself never writes to it
    let _stderr = match parse_stderr_port(&spec) {
        Some(port) => {
            info!(%peer, stderr_port = port, "rsh: session opened");
            connect_stderr(local_ip, peer, port, &pool).await
        }
        None => {
            info!(%peer, "rsh: session opened");
            None
        }
    };

    // accept the connection
    stream.write_all(&[0]).await?;

    let mut session = ShellSession::new(store);
    while let Some((luser, ruser, commands)) = read_batch(&mut stream, &mut buf).await? {
        info!(%peer, luser = %luser, ruser = %ruser, commands = %commands, "rsh: batch");
        let mut output = session.run_batch(&commands).await;
        output.push(0);
        stream.write_all(&output).await?;
    }

    info!(%peer, "rsh: disconnect");
    Ok(())
}

/// Handshake payload: empty means no stderr channel, otherwise an ASCII
/// decimal port (0 also means none).
fn parse_stderr_port(spec: &[u8]) -> Option<u16> {
    if spec.is_empty() {
        return None;
    }
    match std::str::from_utf8(spec).ok().and_then(|s| s.trim().parse::<u16>().ok()) {
        Some(0) | None => {
            debug!(spec = %String::from_utf8_lossy(spec), "rsh: no usable stderr port");
            None
        }
        Some(port) => Some(port),
    }
}

/// Open the reverse stderr connection from a reserved source port.
///
/// Failure is logged and tolerated; the installer only cares about the
/// primary channel.
async fn connect_stderr(
    local_ip: IpAddr,
    peer: SocketAddr,
    port: u16,
    pool: &StderrPortPool,
) -> Option<TcpStream> {
    let source = pool.acquire();
    let attempt = async {
        let socket = TcpSocket::new_v4()?;
        socket.set_reuseaddr(true)?;
        socket.bind(SocketAddr::new(local_ip, source))?;
        socket.connect(SocketAddr::new(peer.ip(), port)).await
    };
    match attempt.await {
        Ok(stream) => {
            debug!(%peer, source, port, "rsh: stderr channel up");
            Some(stream)
        }
        Err(e) => {
            warn!(%peer, source, port, error = %e, "rsh: stderr connect failed");
            None
        }
    }
}

async fn fill<R: AsyncRead + Unpin>(stream: &mut R, buf: &mut Vec<u8>) -> io::Result<usize> {
    let mut chunk = [0u8; READ_CHUNK];
    let n = stream.read(&mut chunk).await?;
    buf.extend_from_slice(&chunk[..n]);
    Ok(n)
}

/// Read one NUL-terminated segment, buffering across partial reads.
async fn read_segment<R: AsyncRead + Unpin>(
    stream: &mut R,
    buf: &mut Vec<u8>,
) -> io::Result<Option<Vec<u8>>> {
    loop {
        if let Some(pos) = buf.iter().position(|&b| b == 0) {
            let mut segment: Vec<u8> = buf.drain(..=pos).collect();
            segment.pop();
            return Ok(Some(segment));
        }
        if fill(stream, buf).await? == 0 {
            if !buf.is_empty() {
                warn!("rsh: peer closed mid-segment");
            }
            return Ok(None);
        }
    }
}

/// Read one command batch: three NUL-terminated strings. Data after the
/// third NUL stays buffered for the next batch.
async fn read_batch<R: AsyncRead + Unpin>(
    stream: &mut R,
    buf: &mut Vec<u8>,
) -> io::Result<Option<(String, String, String)>> {
    loop {
        let nuls: Vec<usize> = buf
            .iter()
            .enumerate()
            .filter(|(_, &b)| b == 0)
            .map(|(i, _)| i)
            .take(3)
            .collect();

        if let [first, second, third] = nuls[..] {
            let luser = String::from_utf8_lossy(&buf[..first]).into_owned();
            let ruser = String::from_utf8_lossy(&buf[first + 1..second]).into_owned();
            let commands = String::from_utf8_lossy(&buf[second + 1..third]).into_owned();
            buf.drain(..=third);
            return Ok(Some((luser, ruser, commands)));
        }

        if fill(stream, buf).await? == 0 {
            if !buf.is_empty() {
                warn!("rsh: peer closed mid-batch");
            }
            return Ok(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt as _;

    #[tokio::test]
    async fn test_read_segment_across_partial_writes() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            client.write_all(b"10").await.unwrap();
            client.write_all(b"23\0rest").await.unwrap();
        });

        let mut buf = Vec::new();
        let segment = read_segment(&mut server, &mut buf).await.unwrap().unwrap();
        assert_eq!(segment, b"1023");
        assert_eq!(buf, b"rest");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_read_segment_eof_without_nul() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(b"partial").await.unwrap();
        drop(client);

        let mut buf = Vec::new();
        assert!(read_segment(&mut server, &mut buf).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_batch_splits_three_segments() {
        let (mut client, mut server) = tokio::io::duplex(256);
        let writer = tokio::spawn(async move {
            client.write_all(b"root\0guest\0cd a; cat b\0").await.unwrap();
        });

        let mut buf = Vec::new();
        let (luser, ruser, commands) = read_batch(&mut server, &mut buf).await.unwrap().unwrap();
        assert_eq!(luser, "root");
        assert_eq!(ruser, "guest");
        assert_eq!(commands, "cd a; cat b");
        assert!(buf.is_empty());
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_read_batch_keeps_pipelined_remainder() {
        let (mut client, mut server) = tokio::io::duplex(256);
        let writer = tokio::spawn(async move {
            client
                .write_all(b"a\0b\0date\0x\0y\0cat f\0")
                .await
                .unwrap();
        });

        let mut buf = Vec::new();
        let (_, _, first) = read_batch(&mut server, &mut buf).await.unwrap().unwrap();
        assert_eq!(first, "date");
        let (_, _, second) = read_batch(&mut server, &mut buf).await.unwrap().unwrap();
        assert_eq!(second, "cat f");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_read_batch_clean_eof() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        let mut buf = Vec::new();
        assert!(read_batch(&mut server, &mut buf).await.unwrap().is_none());
    }

    #[test]
    fn test_parse_stderr_port() {
        assert_eq!(parse_stderr_port(b""), None);
        assert_eq!(parse_stderr_port(b"0"), None);
        assert_eq!(parse_stderr_port(b"1021"), Some(1021));
        assert_eq!(parse_stderr_port(b"bogus"), None);
    }

    #[test]
    fn test_stderr_pool_descends_and_wraps() {
        let pool = StderrPortPool::new();
        assert_eq!(pool.acquire(), 1023);
        assert_eq!(pool.acquire(), 1022);
        for _ in 0..509 {
            pool.acquire();
        }
        assert_eq!(pool.acquire(), 512);
        assert_eq!(pool.acquire(), 1023);
    }
}
