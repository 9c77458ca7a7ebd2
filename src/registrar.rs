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

//! Registrar Client: registration and unregistration against the
//! registrar over a short-lived TCP connection.

use std::time::Duration;

use futures::SinkExt;
use rand::seq::SliceRandom;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;

use crate::codec::MessageCodec;
use crate::error::{OverlayError, OverlayResult};
use crate::protocol::Message;

/// At most this many peers are ever used as initial JOIN targets, to
/// bound the fan-in any one existing peer sees from new arrivals.
const MAX_BOOTSTRAP_PEERS: usize = 2;

/// Registrar's reply to REG, interpreted from the raw REGOK status code.
#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    /// No other peers are registered yet.
    Alone,
    /// At most two peers to attempt JOIN against.
    WithPeers(Vec<(String, u16)>),
}

pub struct RegistrarClient {
    addr: String,
    timeout: Duration,
}

impl RegistrarClient {
    pub fn new(addr: String, timeout_secs: u64) -> Self {
        Self {
            addr,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    async fn connect(&self) -> OverlayResult<Framed<TcpStream, MessageCodec>> {
        let stream = timeout(self.timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| OverlayError::RegistrarUnreachable(self.addr.clone()))?
            .map_err(OverlayError::IoError)?;

        Ok(Framed::new(stream, MessageCodec))
    }

    async fn exchange(&self, frame: &mut Framed<TcpStream, MessageCodec>, request: Message) -> OverlayResult<Message> {
        frame
            .send(request)
            .await
            .map_err(|_| OverlayError::RegistrarUnreachable(self.addr.clone()))?;

        let response = timeout(self.timeout, frame.next())
            .await
            .map_err(|_| OverlayError::RegistrarUnreachable(self.addr.clone()))?
            .ok_or_else(|| OverlayError::RegistrarUnreachable(self.addr.clone()))??;

        Ok(response)
    }

    /// Register `ip:port` under `username`. A `REGOK 9998` reply -- this
    /// exact `(ip, port, username)` is already registered -- and a `REGOK
    /// 9999` reply -- generic registrar failure -- both surface as
    /// [`OverlayError::RegistrarRejected`]; any other status is a normal
    /// peer sample (possibly empty).
    pub async fn register(&self, ip: &str, port: u16, username: &str) -> OverlayResult<Registration> {
        let mut frame = self.connect().await?;

        let response = self
            .exchange(
                &mut frame,
                Message::Reg {
                    ip: ip.to_string(),
                    port,
                    username: username.to_string(),
                },
            )
            .await?;

        match response {
            Message::RegOk { status, .. } if status == 9998 || status == 9999 => {
                Err(OverlayError::RegistrarRejected { status })
            }
            Message::RegOk { peers, .. } if peers.is_empty() => Ok(Registration::Alone),
            Message::RegOk { peers, .. } => {
                Ok(Registration::WithPeers(sample_bootstrap_peers(peers)))
            }
            other => Err(OverlayError::UnknownCommand(other.command().to_string())),
        }
    }

    /// Unregister `ip:port`. Returns an error if the registrar does not
    /// acknowledge with UNROK.
    pub async fn unregister(&self, ip: &str, port: u16, username: &str) -> OverlayResult<()> {
        let mut frame = self.connect().await?;

        let response = self
            .exchange(
                &mut frame,
                Message::Unreg {
                    ip: ip.to_string(),
                    port,
                    username: username.to_string(),
                },
            )
            .await?;

        match response {
            Message::UnregOk { .. } => Ok(()),
            other => Err(OverlayError::UnknownCommand(other.command().to_string())),
        }
    }
}

/// Cap the peer sample handed back to the caller at
/// [`MAX_BOOTSTRAP_PEERS`], choosing uniformly at random when the
/// registrar returned more than that. Bounds the fan-in any single
/// existing peer sees as new nodes join the overlay.
fn sample_bootstrap_peers(mut peers: Vec<(String, u16)>) -> Vec<(String, u16)> {
    if peers.len() <= MAX_BOOTSTRAP_PEERS {
        return peers;
    }

    let mut rng = rand::thread_rng();
    peers.shuffle(&mut rng);
    peers.truncate(MAX_BOOTSTRAP_PEERS);
    peers
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn register_returns_peer_sample() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut frame = Framed::new(stream, MessageCodec);
            let _req = frame.next().await.unwrap().unwrap();
            frame
                .send(Message::RegOk {
                    status: 2,
                    peers: vec![("9.9.9.9".to_string(), 7000)],
                })
                .await
                .unwrap();
        });

        let client = RegistrarClient::new(addr.to_string(), 5);
        let registration = client.register("1.1.1.1", 6000, "alice").await.unwrap();

        assert_eq!(
            registration,
            Registration::WithPeers(vec![("9.9.9.9".to_string(), 7000)])
        );

        server.await.unwrap();
    }

    #[tokio::test]
    async fn register_samples_at_most_two_of_a_larger_peer_set() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let offered: Vec<(String, u16)> = (0..5)
            .map(|i| (format!("5.5.5.{}", i), 7000 + i as u16))
            .collect();

        let server = tokio::spawn({
            let offered = offered.clone();
            async move {
                let (stream, _) = listener.accept().await.unwrap();
                let mut frame = Framed::new(stream, MessageCodec);
                let _req = frame.next().await.unwrap().unwrap();
                frame
                    .send(Message::RegOk {
                        status: 5,
                        peers: offered,
                    })
                    .await
                    .unwrap();
            }
        });

        let client = RegistrarClient::new(addr.to_string(), 5);
        let registration = client.register("1.1.1.1", 6000, "alice").await.unwrap();

        match registration {
            Registration::WithPeers(peers) => {
                assert_eq!(peers.len(), 2);
                for peer in &peers {
                    assert!(offered.contains(peer));
                }
            }
            Registration::Alone => panic!("expected a peer sample"),
        }

        server.await.unwrap();
    }

    #[tokio::test]
    async fn register_status_alone_when_no_peers() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut frame = Framed::new(stream, MessageCodec);
            let _req = frame.next().await.unwrap().unwrap();
            frame
                .send(Message::RegOk {
                    status: 0,
                    peers: vec![],
                })
                .await
                .unwrap();
        });

        let client = RegistrarClient::new(addr.to_string(), 5);
        let registration = client.register("1.1.1.1", 6000, "alice").await.unwrap();

        assert_eq!(registration, Registration::Alone);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut frame = Framed::new(stream, MessageCodec);
            let _req = frame.next().await.unwrap().unwrap();
            frame
                .send(Message::RegOk {
                    status: 9998,
                    peers: vec![],
                })
                .await
                .unwrap();
        });

        let client = RegistrarClient::new(addr.to_string(), 5);
        let err = client.register("1.1.1.1", 6000, "alice").await.unwrap_err();

        assert!(matches!(
            err,
            OverlayError::RegistrarRejected { status: 9998 }
        ));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn generic_failure_status_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut frame = Framed::new(stream, MessageCodec);
            let _req = frame.next().await.unwrap().unwrap();
            frame
                .send(Message::RegOk {
                    status: 9999,
                    peers: vec![],
                })
                .await
                .unwrap();
        });

        let client = RegistrarClient::new(addr.to_string(), 5);
        let err = client.register("1.1.1.1", 6000, "alice").await.unwrap_err();

        assert!(matches!(
            err,
            OverlayError::RegistrarRejected { status: 9999 }
        ));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn connect_failure_is_reported_as_unreachable() {
        // Nothing is listening on this port.
        let client = RegistrarClient::new("127.0.0.1:1".to_string(), 1);
        let err = client.register("1.1.1.1", 6000, "alice").await.unwrap_err();
        assert!(matches!(err, OverlayError::RegistrarUnreachable(_) | OverlayError::IoError(_)));
    }

    #[tokio::test]
    async fn unregister_succeeds_on_unrok() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut frame = Framed::new(stream, MessageCodec);
            let _req = frame.next().await.unwrap().unwrap();
            frame.send(Message::UnregOk { code: 0 }).await.unwrap();
        });

        let client = RegistrarClient::new(addr.to_string(), 5);
        client.unregister("1.1.1.1", 6000, "alice").await.unwrap();
        server.await.unwrap();
    }
}
