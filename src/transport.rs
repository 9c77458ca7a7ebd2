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

//! Outbound datagram transport, abstracted behind a trait so the
//! membership protocol and query engine can be exercised in tests without
//! a real socket.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use crate::error::OverlayError;
use crate::protocol::Message;

#[async_trait]
pub trait Datagrams: Send + Sync {
    async fn send_to(&self, message: &Message, ip: &str, port: u16) -> Result<(), OverlayError>;
}

/// Production transport: a shared UDP socket.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl Datagrams for UdpTransport {
    async fn send_to(&self, message: &Message, ip: &str, port: u16) -> Result<(), OverlayError> {
        let addr: SocketAddr = format!("{}:{}", ip, port)
            .parse()
            .map_err(OverlayError::InvalidAddress)?;

        let frame = message.to_frame()?;

        self.socket
            .send_to(&frame, addr)
            .await
            .map_err(|e| OverlayError::SendFailed(e.to_string()))?;

        Ok(())
    }
}
