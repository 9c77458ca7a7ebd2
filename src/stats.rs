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

//! Statistics Sink collaborator.
//!
//! The core only ever calls [`StatisticsSink`] methods; recording is
//! best-effort and must never block the query engine or membership
//! protocol. The production implementation, [`CsvStatisticsSink`], owns a
//! background task draining an `mpsc` channel and appending rows to a
//! per-node CSV, mirroring the corpus's `node_<id>.csv` log and the
//! teacher's pattern of keeping all mutable state behind a single owning
//! task fed by a channel.

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    MessageSent,
    MessageReceived,
    QueryReceived,
    QueryForwarded,
    QueryAnswered,
}

impl EventKind {
    fn as_str(&self) -> &'static str {
        match self {
            EventKind::MessageSent => "message_sent",
            EventKind::MessageReceived => "message_received",
            EventKind::QueryReceived => "query_received",
            EventKind::QueryForwarded => "query_forwarded",
            EventKind::QueryAnswered => "query_answered",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResultRow {
    pub query: String,
    pub hops: u8,
    pub latency_ms: f64,
    pub peer_ip: String,
    pub peer_port: u16,
}

#[derive(Debug, Clone, Serialize)]
struct LogRow {
    timestamp: String,
    event_type: String,
    query: String,
    hops: u8,
    latency_ms: f64,
    sender_ip: String,
    sender_port: String,
}

enum Event {
    Counter(EventKind),
    SearchResult(SearchResultRow),
}

/// Handle to the background CSV writer task.
#[derive(Clone)]
pub struct StatsHandle {
    tx: mpsc::UnboundedSender<Event>,
}

impl StatsHandle {
    /// Spawn the sink task. `node_id` names the per-node log file, e.g.
    /// `"127.0.0.1_6000"`.
    pub fn spawn(stats_dir: impl Into<PathBuf>, node_id: String) -> std::io::Result<Self> {
        let stats_dir = stats_dir.into();
        std::fs::create_dir_all(&stats_dir)?;

        let log_path = stats_dir.join(format!("node_{}.csv", node_id));
        let summary_path = stats_dir.join(format!("node_{}_summary.csv", node_id));

        let mut writer = csv::WriterBuilder::new().from_path(&log_path)?;
        writer.write_record([
            "timestamp",
            "event_type",
            "query",
            "hops",
            "latency_ms",
            "sender_ip",
            "sender_port",
        ])?;
        writer.flush()?;

        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();

        tokio::spawn(async move {
            let mut counters = Counters::default();

            while let Some(event) = rx.recv().await {
                match event {
                    Event::Counter(kind) => {
                        counters.record(kind);
                    }
                    Event::SearchResult(row) => {
                        let record = LogRow {
                            timestamp: now_iso8601(),
                            event_type: "SEARCH_RESULT".to_string(),
                            query: row.query,
                            hops: row.hops,
                            latency_ms: row.latency_ms,
                            sender_ip: row.peer_ip,
                            sender_port: row.peer_port.to_string(),
                        };

                        if let Err(e) = writer.serialize(&record) {
                            warn!("Unable to write stats row: {}", e);
                        }
                        let _ = writer.flush();
                    }
                }
            }

            if let Err(e) = counters.write_summary(&summary_path) {
                warn!("Unable to write stats summary {:?}: {}", summary_path, e);
            }
        });

        Ok(Self { tx })
    }

    pub fn record(&self, kind: EventKind) {
        let _ = self.tx.send(Event::Counter(kind));
    }

    pub fn record_search_result(&self, row: SearchResultRow) {
        let _ = self.tx.send(Event::SearchResult(row));
    }
}

#[derive(Default)]
struct Counters {
    queries_received: u64,
    queries_forwarded: u64,
    queries_answered: u64,
    messages_sent: u64,
    messages_received: u64,
}

impl Counters {
    fn record(&mut self, kind: EventKind) {
        match kind {
            EventKind::MessageSent => self.messages_sent += 1,
            EventKind::MessageReceived => self.messages_received += 1,
            EventKind::QueryReceived => self.queries_received += 1,
            EventKind::QueryForwarded => self.queries_forwarded += 1,
            EventKind::QueryAnswered => self.queries_answered += 1,
        }
    }

    fn write_summary(&self, path: &PathBuf) -> Result<(), csv::Error> {
        let mut writer = csv::WriterBuilder::new().from_path(path)?;
        writer.write_record(["metric", "value"])?;
        writer.write_record(["queries_received", &self.queries_received.to_string()])?;
        writer.write_record(["queries_forwarded", &self.queries_forwarded.to_string()])?;
        writer.write_record(["queries_answered", &self.queries_answered.to_string()])?;
        writer.write_record(["messages_sent", &self.messages_sent.to_string()])?;
        writer.write_record(["messages_received", &self.messages_received.to_string()])?;
        writer.flush()?;
        Ok(())
    }
}

fn now_iso8601() -> String {
    let since_epoch = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:09}", since_epoch.as_secs(), since_epoch.subsec_nanos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn read_lines(path: &std::path::Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    #[tokio::test]
    async fn writes_header_immediately_on_spawn() {
        let dir = tempfile_dir("writes_header");
        let _handle = StatsHandle::spawn(dir.clone(), "node_a".to_string()).unwrap();

        let log_path = dir.join("node_node_a.csv");
        let lines = read_lines(&log_path);
        assert_eq!(
            lines[0],
            "timestamp,event_type,query,hops,latency_ms,sender_ip,sender_port"
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn search_result_rows_appear_in_documented_order() {
        let dir = tempfile_dir("search_result_rows");
        let handle = StatsHandle::spawn(dir.clone(), "node_b".to_string()).unwrap();

        handle.record_search_result(SearchResultRow {
            query: "Logan".to_string(),
            hops: 3,
            latency_ms: 12.5,
            peer_ip: "10.0.0.9".to_string(),
            peer_port: 7000,
        });

        // Give the background task a chance to drain the channel.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let log_path = dir.join("node_node_b.csv");
        let lines = read_lines(&log_path);
        assert_eq!(lines.len(), 2);
        let row = lines[1].split(',').collect::<Vec<_>>();
        assert_eq!(row[1], "SEARCH_RESULT");
        assert_eq!(row[2], "Logan");
        assert_eq!(row[3], "3");
        assert_eq!(row[5], "10.0.0.9");
        assert_eq!(row[6], "7000");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn summary_is_written_after_sink_is_dropped() {
        let dir = tempfile_dir("summary_written");
        let handle = StatsHandle::spawn(dir.clone(), "node_c".to_string()).unwrap();

        handle.record(EventKind::MessageSent);
        handle.record(EventKind::QueryReceived);
        drop(handle);

        tokio::time::sleep(Duration::from_millis(50)).await;

        let summary_path = dir.join("node_node_c_summary.csv");
        let lines = read_lines(&summary_path);
        assert_eq!(lines[0], "metric,value");
        assert!(lines.contains(&"messages_sent,1".to_string()));
        assert!(lines.contains(&"queries_received,1".to_string()));

        std::fs::remove_dir_all(&dir).ok();
    }

    fn tempfile_dir(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("overlay-search-stats-test-{}", label))
    }
}
