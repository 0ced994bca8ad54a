// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Netboot Server Dispatcher
//!
//! Owns the set of protocol daemons, each bound to exactly one socket.
//! The archive is indexed and every socket is bound before the first
//! packet is served, so startup failures (unreadable archive, privileged
//! port in use) are fatal and reported up front. After that each daemon
//! runs as an independent task under one supervising `JoinSet`: a daemon
//! that dies is logged while the remaining protocols stay available.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::domain::store::StoreError;
use crate::infrastructure::archive::TarArchiveStore;
use crate::infrastructure::bfs::BfsDaemon;
use crate::infrastructure::bootp::BootpDaemon;
use crate::infrastructure::rsh::RshDaemon;
use crate::infrastructure::tftp::TftpDaemon;

/// Server configuration: bind address, archive, protocol ports.
#[derive(Debug, Clone)]
pub struct NetbootConfig {
    /// Address every protocol socket binds to
    pub bind_addr: Ipv4Addr,
    /// Path of the install-asset archive
    pub archive: PathBuf,
    /// BOOTP port (67)
    pub bootp_port: u16,
    /// TFTP port (69)
    pub tftp_port: u16,
    /// BFS port (2201)
    pub bfs_port: u16,
    /// RSH port (514)
    pub rsh_port: u16,
}

impl NetbootConfig {
    /// Standard ports on the given address.
    pub fn new(bind_addr: Ipv4Addr, archive: PathBuf) -> Self {
        Self {
            bind_addr,
            archive,
            bootp_port: 67,
            tftp_port: 69,
            bfs_port: 2201,
            rsh_port: 514,
        }
    }
}

/// Server startup errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to open boot archive {path}: {source}")]
    Archive {
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to bind {proto} socket on {addr}: {source}")]
    Bind {
        proto: &'static str,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// The netboot server: one process, four protocol daemons.
pub struct NetbootServer {
    config: NetbootConfig,
    store: Arc<TarArchiveStore>,
    host: String,
}

impl NetbootServer {
    /// Index the archive and resolve the server's host name.
    pub fn new(config: NetbootConfig) -> Result<Self, ServerError> {
        let store = TarArchiveStore::open(&config.archive).map_err(|source| {
            ServerError::Archive {
                path: config.archive.display().to_string(),
                source,
            }
        })?;

        let host = hostname::get()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| String::from("netboot"));

        Ok(Self {
            config,
            store: Arc::new(store),
            host,
        })
    }

    /// Bind every protocol socket. Any failure is fatal before the
    /// first packet is served.
    pub async fn bind(self) -> Result<BoundServer, ServerError> {
        let addr = self.config.bind_addr;

        let bootp_socket = bind_udp("bootp", addr, self.config.bootp_port).await?;
        let tftp_socket = bind_udp("tftp", addr, self.config.tftp_port).await?;
        let bfs_socket = bind_udp("bfs", addr, self.config.bfs_port).await?;
        let rsh_listener = bind_tcp("rsh", addr, self.config.rsh_port).await?;

        info!(
            %addr,
            archive = %self.config.archive.display(),
            host = %self.host,
            "netboot server ready"
        );

        Ok(BoundServer {
            addr,
            store: self.store,
            host: self.host,
            bootp_socket,
            tftp_socket,
            bfs_socket,
            rsh_listener,
        })
    }

    /// Bind and serve until the process ends.
    pub async fn run(self) -> Result<(), ServerError> {
        self.bind().await?.serve().await;
        Ok(())
    }
}

/// A server whose sockets are bound and ready to serve.
pub struct BoundServer {
    addr: Ipv4Addr,
    store: Arc<TarArchiveStore>,
    host: String,
    bootp_socket: UdpSocket,
    tftp_socket: UdpSocket,
    bfs_socket: UdpSocket,
    rsh_listener: TcpListener,
}

impl BoundServer {
    /// Address of the BOOTP socket.
    pub fn bootp_addr(&self) -> std::io::Result<SocketAddr> {
        self.bootp_socket.local_addr()
    }

    /// Address of the TFTP socket.
    pub fn tftp_addr(&self) -> std::io::Result<SocketAddr> {
        self.tftp_socket.local_addr()
    }

    /// Address of the BFS socket.
    pub fn bfs_addr(&self) -> std::io::Result<SocketAddr> {
        self.bfs_socket.local_addr()
    }

    /// Address of the RSH listener.
    pub fn rsh_addr(&self) -> std::io::Result<SocketAddr> {
        self.rsh_listener.local_addr()
    }

    /// Run every daemon under one supervising set, forever.
    pub async fn serve(self) {
        let bootp = BootpDaemon::new(self.bootp_socket, self.addr, self.host.clone());
        let tftp = TftpDaemon::new(self.tftp_socket, self.store.clone());
        let bfs = BfsDaemon::new(self.bfs_socket, self.store.clone(), self.host.clone());
        let rsh = RshDaemon::new(self.rsh_listener, self.store.clone(), self.addr.into());

        let mut daemons = JoinSet::new();
        daemons.spawn(async move { bootp.run().await });
        daemons.spawn(async move { tftp.run().await });
        daemons.spawn(async move { bfs.run().await });
        daemons.spawn(async move { rsh.run().await });

        // the run loops never return; reaching here means a daemon died
        while let Some(result) = daemons.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "protocol daemon terminated");
            }
        }
    }
}

async fn bind_udp(
    proto: &'static str,
    addr: Ipv4Addr,
    port: u16,
) -> Result<UdpSocket, ServerError> {
    let bind_addr = SocketAddr::from((addr, port));
    let socket = UdpSocket::bind(bind_addr)
        .await
        .map_err(|source| ServerError::Bind {
            proto,
            addr: bind_addr,
            source,
        })?;
    info!(proto, %bind_addr, "socket bound");
    Ok(socket)
}

async fn bind_tcp(
    proto: &'static str,
    addr: Ipv4Addr,
    port: u16,
) -> Result<TcpListener, ServerError> {
    let bind_addr = SocketAddr::from((addr, port));
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|source| ServerError::Bind {
            proto,
            addr: bind_addr,
            source,
        })?;
    info!(proto, %bind_addr, "listener bound");
    Ok(listener)
}
