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

//! Membership Protocol: JOIN/JOINOK and LEAVE/LEAVEOK handling against
//! the Neighbor Table.
//!
//! Unlike the Query Engine, this component needs no state of its own
//! beyond the Neighbor Table it already shares with the rest of the node
//! -- every rule here is a direct translation of an inbound or outbound
//! frame into a table command plus (for JOIN) a reply frame.

use std::sync::Arc;

use crate::error::OverlayResult;
use crate::neighbor::NeighborTableHandle;
use crate::protocol::Message;
use crate::stats::{EventKind, StatsHandle};
use crate::transport::Datagrams;

#[derive(Clone)]
pub struct MembershipProtocol {
    neighbors: NeighborTableHandle,
    transport: Arc<dyn Datagrams>,
    stats: Option<StatsHandle>,
}

impl MembershipProtocol {
    pub fn new(
        neighbors: NeighborTableHandle,
        transport: Arc<dyn Datagrams>,
        stats: Option<StatsHandle>,
    ) -> Self {
        Self {
            neighbors,
            transport,
            stats,
        }
    }

    fn record(&self, kind: EventKind) {
        if let Some(stats) = &self.stats {
            stats.record(kind);
        }
    }

    /// Send a JOIN to a newly discovered peer (typically one handed back
    /// by the registrar at registration time).
    pub async fn send_join(&self, ip: &str, port: u16, self_ip: &str, self_port: u16) -> OverlayResult<()> {
        let msg = Message::Join {
            ip: self_ip.to_string(),
            port: self_port,
        };
        let result = self.transport.send_to(&msg, ip, port).await;
        if result.is_ok() {
            self.record(EventKind::MessageSent);
        }
        result
    }

    /// Handle an inbound JOIN. Adds the sender to the neighbor table --
    /// idempotently, so a retransmitted JOIN from a peer that is already
    /// present still gets a JOINOK back rather than being silently
    /// dropped -- and replies with JOINOK.
    pub async fn handle_join(&self, ip: &str, port: u16) -> OverlayResult<Message> {
        self.neighbors.add(ip.to_string(), port).await;
        Ok(Message::JoinOk { code: 0 })
    }

    /// Handle an inbound JOINOK. Confirms the neighbor that was tentatively
    /// added when the JOIN was sent.
    pub async fn handle_joinok(&self, ip: &str, port: u16) -> OverlayResult<()> {
        self.neighbors.add(ip.to_string(), port).await;
        Ok(())
    }

    /// Send LEAVE to every current neighbor, used during graceful
    /// shutdown before this node unregisters from the registrar.
    pub async fn broadcast_leave(&self, self_ip: &str, self_port: u16) -> OverlayResult<()> {
        let neighbors = self.neighbors.snapshot().await;

        for (ip, port) in neighbors {
            let msg = Message::Leave {
                ip: self_ip.to_string(),
                port: self_port,
            };
            if self.transport.send_to(&msg, &ip, port).await.is_ok() {
                self.record(EventKind::MessageSent);
            }
        }

        Ok(())
    }

    /// Handle an inbound LEAVE: remove the sender from the table and
    /// acknowledge.
    pub async fn handle_leave(&self, ip: &str, port: u16) -> OverlayResult<Message> {
        self.neighbors.remove(ip.to_string(), port).await;
        Ok(Message::LeaveOk { code: 0 })
    }

    /// Handle an inbound LEAVEOK: nothing further to do, the neighbor was
    /// already removed locally when LEAVE was sent.
    pub async fn handle_leaveok(&self) -> OverlayResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::test_support::RecordingTransport;

    fn protocol_with(self_addr: (&str, u16)) -> (MembershipProtocol, NeighborTableHandle, Arc<RecordingTransport>) {
        let neighbors = NeighborTableHandle::spawn((self_addr.0.to_string(), self_addr.1));
        let transport = Arc::new(RecordingTransport::default());
        let protocol = MembershipProtocol::new(neighbors.clone(), transport.clone(), None);
        (protocol, neighbors, transport)
    }

    #[tokio::test]
    async fn handle_join_adds_peer_and_replies_ok() {
        let (protocol, neighbors, _transport) = protocol_with(("10.0.0.1", 6000));

        let reply = protocol.handle_join("10.0.0.2", 7000).await.unwrap();
        assert_eq!(reply, Message::JoinOk { code: 0 });
        assert_eq!(neighbors.count().await, 1);
    }

    #[tokio::test]
    async fn repeated_join_from_present_peer_still_replies_ok() {
        let (protocol, neighbors, _transport) = protocol_with(("10.0.0.1", 6000));

        protocol.handle_join("10.0.0.2", 7000).await.unwrap();
        let reply = protocol.handle_join("10.0.0.2", 7000).await.unwrap();

        assert_eq!(reply, Message::JoinOk { code: 0 });
        assert_eq!(neighbors.count().await, 1);
    }

    #[tokio::test]
    async fn handle_leave_removes_peer_and_replies_ok() {
        let (protocol, neighbors, _transport) = protocol_with(("10.0.0.1", 6000));
        neighbors.add("10.0.0.2".to_string(), 7000).await;

        let reply = protocol.handle_leave("10.0.0.2", 7000).await.unwrap();
        assert_eq!(reply, Message::LeaveOk { code: 0 });
        assert_eq!(neighbors.count().await, 0);
    }

    #[tokio::test]
    async fn broadcast_leave_reaches_every_neighbor() {
        let (protocol, neighbors, transport) = protocol_with(("10.0.0.1", 6000));
        neighbors.add("10.0.0.2".to_string(), 7000).await;
        neighbors.add("10.0.0.3".to_string(), 7001).await;

        protocol.broadcast_leave("10.0.0.1", 6000).await.unwrap();

        assert_eq!(transport.sent.lock().await.len(), 2);
    }
}
