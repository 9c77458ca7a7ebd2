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

//! `tokio_util::codec` adapter around [`protocol`], used to frame the
//! stream-oriented registrar connection. The UDP overlay socket does not
//! need this: a datagram already arrives as one complete frame, so the
//! node decodes it directly with [`protocol::decode`].

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::OverlayError;
use crate::protocol::{self, Message};

#[derive(Debug, Default)]
pub struct MessageCodec;

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = OverlayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, OverlayError> {
        if src.len() < 4 {
            return Ok(None);
        }

        let len_str = std::str::from_utf8(&src[..4]).map_err(|_| OverlayError::FrameMalformed)?;
        let total_len: usize = len_str.parse().map_err(|_| OverlayError::FrameMalformed)?;

        if src.len() < total_len {
            // Wait for the rest of the frame to arrive.
            src.reserve(total_len - src.len());
            return Ok(None);
        }

        let frame = src.split_to(total_len);
        let tokens = protocol::decode(&frame)?;
        let message = Message::parse(&tokens)?;

        Ok(Some(message))
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = OverlayError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), OverlayError> {
        let frame = item.to_frame()?;
        dst.extend_from_slice(&frame);
        Ok(())
    }
}
