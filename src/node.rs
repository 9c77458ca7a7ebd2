// overlay-search - unstructured peer-to-peer content-search overlay node
// Copyright (C) 2026  overlay-search contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Node: binds the single UDP datagram socket, owns every collaborator
//! handle, and runs the inbound-datagram dispatch loop.
//!
//! Per the re-architecture guidance, inbound datagrams are not spawned as
//! one task each. A single receive task reads from the socket and pushes
//! onto a bounded channel; a fixed-size pool of worker tasks drains that
//! channel and does the actual parsing and dispatch. A slow or malicious
//! peer can fill the channel and start applying backpressure to the
//! receive loop, but it can never spawn unbounded work.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::error::{OverlayError, OverlayResult};
use crate::files::FileServer;
use crate::membership::MembershipProtocol;
use crate::neighbor::NeighborTableHandle;
use crate::protocol::{self, Message};
use crate::query::{PendingQueryHandle, QueryEngine, QuerySeenHandle};
use crate::registrar::{Registration, RegistrarClient};
use crate::stats::{EventKind, StatsHandle};
use crate::transport::{Datagrams, UdpTransport};

/// Number of worker tasks draining the inbound-datagram channel.
const WORKER_POOL_SIZE: usize = 4;
/// Capacity of the inbound-datagram channel; beyond this, the receive
/// loop blocks rather than spawning more work.
const INBOUND_QUEUE_CAPACITY: usize = 256;
/// Interval between sweeps of the query-seen and pending-query tables.
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);
/// Entries older than this are dropped on sweep.
const PENDING_QUERY_MAX_AGE: Duration = Duration::from_secs(60);
/// Grace period between broadcasting LEAVE and unregistering, giving
/// neighbors a chance to actually receive the datagram.
const LEAVE_GRACE_PERIOD: Duration = Duration::from_secs(1);

pub struct Node {
    config: Config,
    socket: Arc<UdpSocket>,
    neighbors: NeighborTableHandle,
    pending: PendingQueryHandle,
    membership: MembershipProtocol,
    query_engine: Arc<QueryEngine>,
    registrar: RegistrarClient,
    stats: Option<StatsHandle>,
}

impl Node {
    pub async fn bind(config: Config, local_index: Vec<String>) -> OverlayResult<Self> {
        let bind_addr = format!("{}:{}", config.general.bind_ip, config.general.bind_port);
        let socket = Arc::new(UdpSocket::bind(&bind_addr).await?);

        let self_addr = (config.general.bind_ip.clone(), config.general.bind_port);
        let neighbors = NeighborTableHandle::spawn(self_addr);
        let seen = QuerySeenHandle::spawn();
        let pending = PendingQueryHandle::spawn();

        let transport: Arc<dyn Datagrams> = Arc::new(UdpTransport::new(socket.clone()));

        let stats = match StatsHandle::spawn(
            config.general.stats_dir.clone(),
            format!("{}_{}", config.general.bind_ip, config.general.bind_port),
        ) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("statistics sink disabled: {}", e);
                None
            }
        };

        let membership = MembershipProtocol::new(neighbors.clone(), transport.clone(), stats.clone());

        let (query_engine, mut results) = QueryEngine::new(
            config.general.bind_ip.clone(),
            config.general.bind_port,
            Arc::new(local_index),
            neighbors.clone(),
            seen.clone(),
            pending.clone(),
            transport,
            stats.clone(),
        );
        let query_engine = Arc::new(query_engine);

        // Surface results by logging them; a CLI binding this node can
        // instead hold on to the receiver returned by `QueryEngine::new`
        // directly if it wants the structured form.
        tokio::spawn(async move {
            while let Some(result) = results.recv().await {
                info!(
                    "search result: query={} file={:?} from={}:{} hops={} latency={:?}",
                    result.filename,
                    result.files,
                    result.peer_ip,
                    result.peer_port,
                    result.hops,
                    result.latency
                );
            }
        });

        let registrar = RegistrarClient::new(
            format!("{}:{}", config.registrar.address, config.registrar.port),
            config.registrar.timeout_secs,
        );

        Ok(Self {
            config,
            socket,
            neighbors,
            pending,
            membership,
            query_engine,
            registrar,
            stats,
        })
    }

    /// Register with the registrar and send JOIN to the peers it hands
    /// back, if any.
    ///
    /// A `9998` (already registered) rejection means a previous run of
    /// this same `(ip, port, username)` never left gracefully -- the
    /// registrar still thinks it's here. Rather than staying rejected
    /// forever, unregister the stale entry once and retry registration.
    pub async fn register(&self) -> OverlayResult<()> {
        let registration = match self
            .registrar
            .register(
                &self.config.general.bind_ip,
                self.config.general.bind_port,
                &self.config.general.username,
            )
            .await
        {
            Err(OverlayError::RegistrarRejected { status: 9998 }) => {
                warn!("already registered with the registrar, unregistering stale entry and retrying");
                let _ = self
                    .registrar
                    .unregister(
                        &self.config.general.bind_ip,
                        self.config.general.bind_port,
                        &self.config.general.username,
                    )
                    .await;

                self.registrar
                    .register(
                        &self.config.general.bind_ip,
                        self.config.general.bind_port,
                        &self.config.general.username,
                    )
                    .await?
            }
            other => other?,
        };

        if let Registration::WithPeers(peers) = registration {
            for (ip, port) in peers {
                self.neighbors.add(ip.clone(), port).await;
                let _ = self
                    .membership
                    .send_join(
                        &ip,
                        port,
                        &self.config.general.bind_ip,
                        self.config.general.bind_port,
                    )
                    .await;
            }
        }

        Ok(())
    }

    /// Run the node until `shutdown` resolves (typically ctrl-c).
    pub async fn run(&self, mut shutdown: impl std::future::Future<Output = ()> + Unpin) -> OverlayResult<()> {
        let (tx, rx) = mpsc::channel::<(Vec<u8>, SocketAddr)>(INBOUND_QUEUE_CAPACITY);

        let workers = self.spawn_workers(rx);
        let recv_task = self.spawn_receive_loop(tx);
        let sweep_task = self.spawn_sweeper();

        tokio::select! {
            _ = &mut shutdown => {
                info!("shutting down");
            }
        }

        recv_task.abort();
        sweep_task.abort();
        for w in workers {
            w.abort();
        }

        self.leave_gracefully().await;

        Ok(())
    }

    fn spawn_receive_loop(&self, tx: mpsc::Sender<(Vec<u8>, SocketAddr)>) -> tokio::task::JoinHandle<()> {
        let socket = self.socket.clone();

        tokio::spawn(async move {
            let mut buf = vec![0u8; 9999];
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((n, peer)) => {
                        let datagram = buf[..n].to_vec();
                        if tx.send((datagram, peer)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("udp recv error: {}", e);
                    }
                }
            }
        })
    }

    fn spawn_workers(
        &self,
        rx: mpsc::Receiver<(Vec<u8>, SocketAddr)>,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let mut handles = Vec::with_capacity(WORKER_POOL_SIZE);

        for _ in 0..WORKER_POOL_SIZE {
            let rx = rx.clone();
            let node = self.dispatch_context();

            handles.push(tokio::spawn(async move {
                loop {
                    let item = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };

                    match item {
                        Some((datagram, peer)) => node.dispatch(&datagram, peer).await,
                        None => break,
                    }
                }
            }));
        }

        handles
    }

    fn dispatch_context(&self) -> DispatchContext {
        DispatchContext {
            membership: self.membership.clone(),
            query_engine: self.query_engine.clone(),
            reply_transport: Arc::new(UdpTransport::new(self.socket.clone())),
            stats: self.stats.clone(),
        }
    }

    fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let pending = self.pending.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                pending.sweep(PENDING_QUERY_MAX_AGE);
            }
        })
    }

    async fn leave_gracefully(&self) {
        let _ = self
            .membership
            .broadcast_leave(&self.config.general.bind_ip, self.config.general.bind_port)
            .await;

        tokio::time::sleep(LEAVE_GRACE_PERIOD).await;

        let _ = self
            .registrar
            .unregister(
                &self.config.general.bind_ip,
                self.config.general.bind_port,
                &self.config.general.username,
            )
            .await;

        self.neighbors.clear().await;
    }

    pub fn file_server(&self, corpus: Arc<Vec<String>>) -> FileServer {
        FileServer::new(corpus)
    }

    pub fn stats(&self) -> Option<StatsHandle> {
        self.stats.clone()
    }

    pub fn auto_register(&self) -> bool {
        self.config.general.auto_register
    }

    /// Originate a search for `filename` from the CLI or any other
    /// driver sitting on top of this node.
    pub async fn search(&self, filename: &str) -> OverlayResult<String> {
        self.query_engine.initiate_search(filename).await
    }

    pub async fn neighbor_count(&self) -> usize {
        self.neighbors.count().await
    }
}

/// Everything a worker task needs to handle one inbound datagram, cloned
/// cheaply out of the owning [`Node`] once per worker rather than shared
/// by reference (workers outlive the borrow of `&Node` that spawned
/// them).
struct DispatchContext {
    membership: MembershipProtocol,
    query_engine: Arc<QueryEngine>,
    reply_transport: Arc<UdpTransport>,
    stats: Option<StatsHandle>,
}

impl DispatchContext {
    fn record(&self, kind: EventKind) {
        if let Some(stats) = &self.stats {
            stats.record(kind);
        }
    }

    async fn dispatch(&self, datagram: &[u8], peer: SocketAddr) {
        self.record(EventKind::MessageReceived);

        let tokens = match protocol::decode(datagram) {
            Ok(t) => t,
            Err(e) => {
                warn!("malformed datagram from {}: {}", peer, e);
                return;
            }
        };

        let message = match Message::parse(&tokens) {
            Ok(m) => m,
            Err(e) => {
                warn!("unparseable message from {}: {}", peer, e);
                return;
            }
        };

        let peer_ip = peer.ip().to_string();
        let peer_port = peer.port();

        match message {
            Message::Join { ip, port } => {
                if let Ok(reply) = self.membership.handle_join(&ip, port).await {
                    if self.reply_transport.send_to(&reply, &ip, port).await.is_ok() {
                        self.record(EventKind::MessageSent);
                    }
                }
            }
            Message::JoinOk { .. } => {
                let _ = self.membership.handle_joinok(&peer_ip, peer_port).await;
            }
            Message::Leave { ip, port } => {
                if let Ok(reply) = self.membership.handle_leave(&ip, port).await {
                    if self.reply_transport.send_to(&reply, &ip, port).await.is_ok() {
                        self.record(EventKind::MessageSent);
                    }
                }
            }
            Message::LeaveOk { .. } => {
                let _ = self.membership.handle_leaveok().await;
            }
            Message::Ser {
                orig_ip,
                orig_port,
                filename,
                hops,
            } => {
                let _ = self
                    .query_engine
                    .handle_ser(&orig_ip, orig_port, &filename, hops, &peer_ip, peer_port)
                    .await;
            }
            Message::SerOk {
                count,
                ip,
                port,
                hops,
                filenames,
            } => {
                let _ = self
                    .query_engine
                    .handle_serok(count, &ip, port, hops, &filenames)
                    .await;
            }
            Message::Error | Message::Reg { .. } | Message::RegOk { .. } | Message::Unreg { .. } | Message::UnregOk { .. } => {
                // These only ever travel over the registrar's TCP link.
            }
        }
    }
}
