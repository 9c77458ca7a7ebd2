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

//! Bulk File Server: a plain TCP side-channel for fetching file content
//! by name, kept entirely separate from the UDP overlay socket. The
//! Query Engine only ever hands back `(peer_ip, peer_port, filename)`
//! triples -- it never proxies a download itself.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::error::OverlayResult;

/// Smallest and largest synthesized file size, in bytes.
const MIN_FILE_BYTES: usize = 2 * 1024 * 1024;
const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

/// Request line sent by the client: the bare filename, newline-terminated.
/// Response is either `OK <len> <sha256-hex>\n<content>` or `NOTFOUND\n`.
pub struct FileServer {
    corpus: Arc<Vec<String>>,
}

impl FileServer {
    pub fn new(corpus: Arc<Vec<String>>) -> Self {
        Self { corpus }
    }

    /// Bind and serve forever, handling one connection at a time in its
    /// own task. Returns only if the listener itself fails to bind.
    pub async fn serve(self: Arc<Self>, bind_addr: &str) -> OverlayResult<()> {
        let listener = TcpListener::bind(bind_addr).await?;

        loop {
            let (stream, _) = listener.accept().await?;
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream).await {
                    warn!("file server connection failed: {}", e);
                }
            });
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> OverlayResult<()> {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            let n = stream.read(&mut byte).await?;
            if n == 0 || byte[0] == b'\n' {
                break;
            }
            buf.push(byte[0]);
        }

        let filename = String::from_utf8_lossy(&buf).trim().to_string();

        if !self.corpus.contains(&filename) {
            stream.write_all(b"NOTFOUND\n").await?;
            return Ok(());
        }

        let content = synthesize_content(&filename);
        let digest = hex::encode(Sha256::digest(&content));

        let header = format!("OK {} {}\n", content.len(), digest);
        stream.write_all(header.as_bytes()).await?;
        stream.write_all(&content).await?;

        Ok(())
    }
}

/// Deterministically synthesize 2-10MiB of pseudo-random content for
/// `filename`, so repeated requests for the same file hash identically
/// without storing any content on disk.
fn synthesize_content(filename: &str) -> Vec<u8> {
    let mut seed = [0u8; 32];
    let hash = Sha256::digest(filename.as_bytes());
    seed.copy_from_slice(&hash);

    let size_seed = u32::from_le_bytes([seed[0], seed[1], seed[2], seed[3]]) as usize;
    let len = MIN_FILE_BYTES + (size_seed % (MAX_FILE_BYTES - MIN_FILE_BYTES));

    let mut out = Vec::with_capacity(len);
    let mut state = seed;

    while out.len() < len {
        state = Sha256::digest(&state).into();
        out.extend_from_slice(&state);
    }

    out.truncate(len);
    out
}

/// Client-side download: connect to `addr`, request `filename`, and
/// return the content plus the server-reported hash for verification.
pub async fn download(addr: &str, filename: &str) -> OverlayResult<Option<(Vec<u8>, String)>> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(filename.as_bytes()).await?;
    stream.write_all(b"\n").await?;

    let mut header = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await?;
        if n == 0 || byte[0] == b'\n' {
            break;
        }
        header.push(byte[0]);
    }

    let header = String::from_utf8_lossy(&header).to_string();
    if header == "NOTFOUND" {
        return Ok(None);
    }

    let mut parts = header.split_whitespace();
    let _ok = parts.next();
    let len: usize = parts
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();
    let expected_hash = parts.next().unwrap_or_default().to_string();

    let mut content = vec![0u8; len];
    stream.read_exact(&mut content).await?;

    Ok(Some((content, expected_hash)))
}
