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

//! Query-seen set: at-most-once processing of every query across the
//! graph.
//!
//! Like the neighbor table, this is an owning task behind a command
//! channel rather than a locked `HashSet`. The check-then-insert is a
//! single round trip so two handlers racing on the same query id cannot
//! both observe "not seen".

use std::collections::HashSet;

use tokio::sync::{mpsc, oneshot};

enum Command {
    CheckAndInsert {
        id: String,
        reply: oneshot::Sender<bool>,
    },
}

#[derive(Clone)]
pub struct QuerySeenHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl QuerySeenHandle {
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();

        tokio::spawn(async move {
            let mut seen: HashSet<String> = HashSet::new();

            while let Some(cmd) = rx.recv().await {
                match cmd {
                    Command::CheckAndInsert { id, reply } => {
                        let newly_inserted = seen.insert(id);
                        let _ = reply.send(newly_inserted);
                    }
                }
            }
        });

        Self { tx }
    }

    /// Returns `true` if `id` had not been observed before (and is now
    /// recorded), `false` if it was already seen.
    pub async fn check_and_insert(&self, id: String) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::CheckAndInsert { id, reply }).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }
}

/// Build the query identifier used at origination time, which embeds a
/// millisecond timestamp for uniqueness across repeated searches of the
/// same file by the same node.
pub fn origination_id(ip: &str, port: u16, millis: u128) -> String {
    format!("{}:{}:{}", ip, port, millis)
}

/// Build the query identifier used when forwarding a SER frame.
///
/// The timestamp component embedded at origination is not carried on the
/// wire, so every forwarder must derive the same identity from data that
/// *is* present on every hop: the originator address and the filename.
/// Deriving it from `(orig_ip, orig_port, now)` instead makes every
/// forwarder compute a different id for the same query and defeats
/// duplicate suppression entirely.
pub fn forwarding_id(orig_ip: &str, orig_port: u16, filename: &str) -> String {
    format!("{}:{}:{}", orig_ip, orig_port, filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_observation_is_new() {
        let seen = QuerySeenHandle::spawn();
        assert!(seen.check_and_insert("a:1:x".to_string()).await);
    }

    #[tokio::test]
    async fn repeat_observation_is_suppressed() {
        let seen = QuerySeenHandle::spawn();
        assert!(seen.check_and_insert("a:1:x".to_string()).await);
        assert!(!seen.check_and_insert("a:1:x".to_string()).await);
    }

    #[test]
    fn forwarding_id_ignores_timestamp_and_hops() {
        let a = forwarding_id("1.2.3.4", 7000, "Lord of the rings");
        let b = forwarding_id("1.2.3.4", 7000, "Lord of the rings");
        assert_eq!(a, b);
    }

    #[test]
    fn forwarding_id_differs_by_filename() {
        let a = forwarding_id("1.2.3.4", 7000, "Lord of the rings");
        let b = forwarding_id("1.2.3.4", 7000, "Logan");
        assert_ne!(a, b);
    }
}
