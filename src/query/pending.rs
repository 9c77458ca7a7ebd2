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

//! Pending-query table: tracks queries this node originated, so that
//! arriving SEROK replies can be matched back to a filename and a start
//! time for latency computation.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub peer_ip: String,
    pub peer_port: u16,
    pub files: Vec<String>,
    pub hops: u8,
    pub latency: std::time::Duration,
}

#[derive(Debug, Clone)]
struct PendingQuery {
    filename: String,
    start: Instant,
    responses: Vec<SearchHit>,
}

enum Command {
    Insert {
        id: String,
        filename: String,
    },
    RecordLocalHit {
        id: String,
        files: Vec<String>,
    },
    /// Match an arriving SEROK by filename. Matching "most recently
    /// inserted" silently misattributes responses once two searches for
    /// different files are in flight, so this matches by filename when
    /// exactly one pending query has that filename; ambiguous matches
    /// (two concurrent searches for the same filename) are dropped rather
    /// than guessed at, since the wire protocol carries no query id on
    /// SEROK (see the open question in the design notes).
    MatchByFilename {
        filename: String,
        hit: SearchHit,
        reply: oneshot::Sender<Option<std::time::Duration>>,
    },
    Sweep {
        max_age: std::time::Duration,
    },
}

#[derive(Clone)]
pub struct PendingQueryHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl PendingQueryHandle {
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();

        tokio::spawn(async move {
            let mut pending: HashMap<String, PendingQuery> = HashMap::new();

            while let Some(cmd) = rx.recv().await {
                match cmd {
                    Command::Insert { id, filename } => {
                        pending.insert(
                            id,
                            PendingQuery {
                                filename,
                                start: Instant::now(),
                                responses: Vec::new(),
                            },
                        );
                    }
                    Command::RecordLocalHit { id, files } => {
                        if let Some(q) = pending.get_mut(&id) {
                            q.responses.push(SearchHit {
                                peer_ip: String::new(),
                                peer_port: 0,
                                files,
                                hops: 0,
                                latency: std::time::Duration::from_millis(0),
                            });
                        }
                    }
                    Command::MatchByFilename {
                        filename,
                        hit,
                        reply,
                    } => {
                        let candidates: Vec<&String> = pending
                            .iter()
                            .filter(|(_, q)| q.filename == filename)
                            .map(|(id, _)| id)
                            .collect();

                        let result = if candidates.len() == 1 {
                            let id = candidates[0].clone();
                            let q = pending.get_mut(&id).unwrap();
                            let latency = q.start.elapsed();
                            let mut hit = hit;
                            hit.latency = latency;
                            q.responses.push(hit);
                            Some(latency)
                        } else {
                            None
                        };

                        let _ = reply.send(result);
                    }
                    Command::Sweep { max_age } => {
                        pending.retain(|_, q| q.start.elapsed() < max_age);
                    }
                }
            }
        });

        Self { tx }
    }

    pub fn insert(&self, id: String, filename: String) {
        let _ = self.tx.send(Command::Insert { id, filename });
    }

    pub fn record_local_hit(&self, id: String, files: Vec<String>) {
        let _ = self.tx.send(Command::RecordLocalHit { id, files });
    }

    /// Attempt to match an arriving SEROK to a pending query by filename.
    /// Returns the computed latency on an unambiguous match.
    pub async fn match_by_filename(
        &self,
        filename: String,
        hit: SearchHit,
    ) -> Option<std::time::Duration> {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(Command::MatchByFilename {
                filename,
                hit,
                reply,
            })
            .is_err()
        {
            return None;
        }
        rx.await.ok().flatten()
    }

    pub fn sweep(&self, max_age: std::time::Duration) {
        let _ = self.tx.send(Command::Sweep { max_age });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit() -> SearchHit {
        SearchHit {
            peer_ip: "9.9.9.9".to_string(),
            peer_port: 9000,
            files: vec!["Logan".to_string()],
            hops: 2,
            latency: std::time::Duration::from_millis(0),
        }
    }

    #[tokio::test]
    async fn matches_unique_pending_filename() {
        let pending = PendingQueryHandle::spawn();
        pending.insert("a:1:1000".to_string(), "Logan".to_string());

        let latency = pending.match_by_filename("Logan".to_string(), hit()).await;
        assert!(latency.is_some());
    }

    #[tokio::test]
    async fn refuses_ambiguous_match() {
        let pending = PendingQueryHandle::spawn();
        pending.insert("a:1:1000".to_string(), "Logan".to_string());
        pending.insert("a:1:1001".to_string(), "Logan".to_string());

        let latency = pending.match_by_filename("Logan".to_string(), hit()).await;
        assert!(latency.is_none());
    }

    #[tokio::test]
    async fn unknown_filename_does_not_match() {
        let pending = PendingQueryHandle::spawn();
        pending.insert("a:1:1000".to_string(), "Logan".to_string());

        let latency = pending
            .match_by_filename("Matrix".to_string(), hit())
            .await;
        assert!(latency.is_none());
    }
}
