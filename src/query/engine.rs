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

//! Query Engine: origination, flooding forward, local matching, and
//! reverse-path replies. This is the largest component in the core -- it
//! is the only one that touches every other piece (neighbor table,
//! query-seen set, pending-query table, and the outbound transport).

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;

use crate::error::OverlayResult;
use crate::neighbor::NeighborTableHandle;
use crate::protocol::{Message, MAX_HOPS};
use crate::stats::{EventKind, SearchResultRow, StatsHandle};
use crate::transport::Datagrams;

use super::matching::search_local;
use super::pending::{PendingQueryHandle, SearchHit};
use super::seen::{forwarding_id, origination_id, QuerySeenHandle};

/// A search hit surfaced to whatever is driving this node (the CLI or a
/// test harness), independent of how it was matched internally.
#[derive(Debug, Clone)]
pub struct ObservedResult {
    pub query_id: String,
    pub filename: String,
    pub peer_ip: String,
    pub peer_port: u16,
    pub hops: u8,
    pub latency: std::time::Duration,
    pub files: Vec<String>,
}

pub struct QueryEngine {
    self_ip: String,
    self_port: u16,
    local_index: Arc<Vec<String>>,
    neighbors: NeighborTableHandle,
    seen: QuerySeenHandle,
    pending: PendingQueryHandle,
    transport: Arc<dyn Datagrams>,
    stats: Option<StatsHandle>,
    results_tx: mpsc::UnboundedSender<ObservedResult>,
}

impl QueryEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        self_ip: String,
        self_port: u16,
        local_index: Arc<Vec<String>>,
        neighbors: NeighborTableHandle,
        seen: QuerySeenHandle,
        pending: PendingQueryHandle,
        transport: Arc<dyn Datagrams>,
        stats: Option<StatsHandle>,
    ) -> (Self, mpsc::UnboundedReceiver<ObservedResult>) {
        let (results_tx, results_rx) = mpsc::unbounded_channel();

        (
            Self {
                self_ip,
                self_port,
                local_index,
                neighbors,
                seen,
                pending,
                transport,
                stats,
                results_tx,
            },
            results_rx,
        )
    }

    fn record(&self, kind: EventKind) {
        if let Some(stats) = &self.stats {
            stats.record(kind);
        }
    }

    /// Originate a new search for `filename`. Returns the generated query
    /// id, primarily useful for tests.
    pub async fn initiate_search(&self, filename: &str) -> OverlayResult<String> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();

        let query_id = origination_id(&self.self_ip, self.self_port, millis);

        self.seen.check_and_insert(query_id.clone()).await;
        self.pending.insert(query_id.clone(), filename.to_string());

        let local_hits: Vec<String> = search_local(&self.local_index, filename)
            .into_iter()
            .map(String::from)
            .collect();

        if !local_hits.is_empty() {
            self.pending
                .record_local_hit(query_id.clone(), local_hits.clone());

            let _ = self.results_tx.send(ObservedResult {
                query_id: query_id.clone(),
                filename: filename.to_string(),
                peer_ip: self.self_ip.clone(),
                peer_port: self.self_port,
                hops: 0,
                latency: std::time::Duration::from_millis(0),
                files: local_hits,
            });
        }

        let neighbors = self.neighbors.snapshot().await;

        for (ip, port) in &neighbors {
            let msg = Message::Ser {
                orig_ip: self.self_ip.clone(),
                orig_port: self.self_port,
                filename: filename.to_string(),
                hops: 1,
            };

            if self.transport.send_to(&msg, ip, *port).await.is_ok() {
                self.record(EventKind::MessageSent);
            }
        }

        Ok(query_id)
    }

    /// Handle an inbound SER frame arriving from `sender_ip:sender_port`.
    pub async fn handle_ser(
        &self,
        orig_ip: &str,
        orig_port: u16,
        filename: &str,
        hops: u8,
        sender_ip: &str,
        sender_port: u16,
    ) -> OverlayResult<()> {
        if hops >= MAX_HOPS {
            return Ok(());
        }

        let query_id = forwarding_id(orig_ip, orig_port, filename);

        if !self.seen.check_and_insert(query_id).await {
            return Ok(());
        }

        self.record(EventKind::QueryReceived);

        let hits = search_local(&self.local_index, filename);

        if !hits.is_empty() {
            let reply = Message::SerOk {
                count: hits.len(),
                ip: self.self_ip.clone(),
                port: self.self_port,
                hops,
                filenames: hits.iter().map(|s| s.to_string()).collect(),
            };

            if self.transport.send_to(&reply, orig_ip, orig_port).await.is_ok() {
                self.record(EventKind::MessageSent);
                self.record(EventKind::QueryAnswered);
            }
        }

        let neighbors = self.neighbors.snapshot().await;
        let mut forwarded = false;

        for (ip, port) in &neighbors {
            if ip == sender_ip && *port == sender_port {
                continue;
            }
            if ip == orig_ip && *port == orig_port {
                continue;
            }

            let forward = Message::Ser {
                orig_ip: orig_ip.to_string(),
                orig_port,
                filename: filename.to_string(),
                hops: hops + 1,
            };

            if self.transport.send_to(&forward, ip, *port).await.is_ok() {
                self.record(EventKind::MessageSent);
                forwarded = true;
            }
        }

        if forwarded {
            self.record(EventKind::QueryForwarded);
        }

        Ok(())
    }

    /// Handle an inbound SEROK frame.
    pub async fn handle_serok(
        &self,
        count: usize,
        peer_ip: &str,
        peer_port: u16,
        hops: u8,
        filenames: &[String],
    ) -> OverlayResult<()> {
        if count == 0 || filenames.is_empty() {
            return Ok(());
        }

        // SEROK carries no filename of its own (see the open question on
        // the wire format); the filenames returned are assumed to all
        // match the same in-flight query, so any one of them is enough to
        // look up the pending entry by filename.
        let probe_filename = filenames[0].clone();

        let hit = SearchHit {
            peer_ip: peer_ip.to_string(),
            peer_port,
            files: filenames.to_vec(),
            hops,
            latency: std::time::Duration::from_millis(0),
        };

        if let Some(latency) = self
            .pending
            .match_by_filename(probe_filename.clone(), hit)
            .await
        {
            if let Some(stats) = &self.stats {
                stats.record_search_result(SearchResultRow {
                    query: probe_filename.clone(),
                    hops,
                    latency_ms: latency.as_secs_f64() * 1000.0,
                    peer_ip: peer_ip.to_string(),
                    peer_port,
                });
            }

            let _ = self.results_tx.send(ObservedResult {
                query_id: forwarding_id(&self.self_ip, self.self_port, &probe_filename),
                filename: probe_filename,
                peer_ip: peer_ip.to_string(),
                peer_port,
                hops,
                latency,
                files: filenames.to_vec(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::test_support::RecordingTransport;

    fn engine_with(
        index: Vec<&str>,
        self_addr: (&str, u16),
    ) -> (QueryEngine, Arc<RecordingTransport>, mpsc::UnboundedReceiver<ObservedResult>) {
        let transport = Arc::new(RecordingTransport::default());
        let neighbors = NeighborTableHandle::spawn((self_addr.0.to_string(), self_addr.1));
        let seen = QuerySeenHandle::spawn();
        let pending = PendingQueryHandle::spawn();

        let (engine, results) = QueryEngine::new(
            self_addr.0.to_string(),
            self_addr.1,
            Arc::new(index.into_iter().map(String::from).collect()),
            neighbors,
            seen,
            pending,
            transport.clone(),
            None,
        );

        (engine, transport, results)
    }

    #[tokio::test]
    async fn initiate_search_finds_local_hit_with_zero_hops() {
        let (engine, _transport, mut results) =
            engine_with(vec!["Lord of the rings"], ("10.0.0.1", 6000));

        engine.initiate_search("Lord").await.unwrap();

        let result = results.recv().await.unwrap();
        assert_eq!(result.hops, 0);
        assert_eq!(result.files, vec!["Lord of the rings".to_string()]);
    }

    #[tokio::test]
    async fn forwarding_drops_frames_at_hop_limit() {
        let (engine, transport, _results) = engine_with(vec!["Logan"], ("10.0.0.2", 6001));

        engine
            .handle_ser("1.1.1.1", 7000, "Logan", MAX_HOPS, "9.9.9.9", 7001)
            .await
            .unwrap();

        assert!(transport.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_ser_is_suppressed() {
        let (engine, transport, _results) = engine_with(vec!["Logan"], ("10.0.0.2", 6001));
        engine
            .neighbors
            .add("5.5.5.5".to_string(), 8000)
            .await;

        engine
            .handle_ser("1.1.1.1", 7000, "Logan", 1, "9.9.9.9", 7001)
            .await
            .unwrap();
        let after_first = transport.sent.lock().await.len();

        engine
            .handle_ser("1.1.1.1", 7000, "Logan", 1, "2.2.2.2", 7002)
            .await
            .unwrap();
        let after_second = transport.sent.lock().await.len();

        assert_eq!(after_first, after_second);
    }

    #[tokio::test]
    async fn forwarding_skips_sender_and_originator() {
        let (engine, transport, _results) = engine_with(vec!["nothing-here"], ("10.0.0.2", 6001));
        engine.neighbors.add("5.5.5.5".to_string(), 8000).await;
        engine.neighbors.add("9.9.9.9".to_string(), 7001).await; // sender
        engine.neighbors.add("1.1.1.1".to_string(), 7000).await; // originator

        engine
            .handle_ser("1.1.1.1", 7000, "Logan", 1, "9.9.9.9", 7001)
            .await
            .unwrap();

        let sent = transport.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "5.5.5.5");
    }
}
