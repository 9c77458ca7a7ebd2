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

//! Wire codec: length-prefixed, whitespace-tokenized ASCII text frames.
//!
//! Every message on every transport in the overlay (the UDP membership/query
//! socket, and the TCP link to the registrar) is framed the same way: four
//! ASCII decimal digits giving the total frame length, a single space, then
//! the payload. The payload's first whitespace-delimited token is the
//! command keyword.

use std::convert::TryFrom;
use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use nom::character::complete::digit1;
use nom::combinator::{all_consuming, map_res};

use crate::error::OverlayError;

/// Frames larger than this (prefix included) are rejected before send.
pub const MAX_FRAME_LEN: usize = 9999;

/// Upper bound on SER propagation depth.
pub const MAX_HOPS: u8 = 10;

/// Encode a payload string as a length-prefixed frame.
///
/// The length counts the entire frame, prefix included, e.g. encoding
/// `"REGOK 0"` produces `"0012 REGOK 0"` (12 = 4 + 1 + 7).
pub fn encode(payload: &str) -> Result<Bytes, OverlayError> {
    let total_len = 4 + 1 + payload.len();

    if total_len > MAX_FRAME_LEN {
        return Err(OverlayError::FrameTooLarge);
    }

    let mut buf = BytesMut::with_capacity(total_len);

    buf.put_slice(format!("{:04}", total_len).as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(payload.as_bytes());

    Ok(buf.freeze())
}

/// Parse the four-digit length prefix off the front of a frame.
///
/// Returns the declared total length and the remaining input (the
/// separator + payload).
fn parse_length(input: &[u8]) -> Result<(usize, &[u8]), OverlayError> {
    if input.len() < 4 {
        return Err(OverlayError::FrameMalformed);
    }

    let (digits, rest) = input.split_at(4);

    let digits = std::str::from_utf8(digits).map_err(|_| OverlayError::FrameMalformed)?;

    let (_, len) = all_consuming(map_res(digit1, str::parse::<usize>))(digits)
        .map_err(|_: nom::Err<nom::error::Error<&str>>| OverlayError::FrameMalformed)?;

    Ok((len, rest))
}

/// Strip the length prefix from a raw frame and tokenize the payload.
///
/// Tolerates a missing trailing newline. Tokens are whitespace-delimited,
/// except that a `"..."`-quoted run (used by SER to carry filenames with
/// embedded spaces) is reassembled into a single token with its quotes
/// stripped.
pub fn decode(bytes: &[u8]) -> Result<Vec<String>, OverlayError> {
    if bytes.len() < 5 {
        return Err(OverlayError::FrameMalformed);
    }

    let (_len, rest) = parse_length(bytes)?;

    // rest still includes the single separator byte.
    let payload = rest.get(1..).unwrap_or(&[]);

    let payload = std::str::from_utf8(payload).map_err(|_| OverlayError::FrameMalformed)?;

    Ok(tokenize(payload.trim_end_matches(['\r', '\n'].as_ref())))
}

/// Split a payload on runs of whitespace, reassembling `"..."`-quoted
/// sections (which may contain spaces) into a single token.
pub fn tokenize(payload: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;

    for c in payload.chars() {
        if c == '"' {
            in_quotes = !in_quotes;
            continue;
        }

        if c.is_whitespace() && !in_quotes {
            if !buf.is_empty() {
                tokens.push(std::mem::take(&mut buf));
            }
        } else {
            buf.push(c);
        }
    }

    if !buf.is_empty() {
        tokens.push(buf);
    }

    tokens
}

/// One parsed control message. Variant names mirror the command keywords
/// of the wire protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Reg {
        ip: String,
        port: u16,
        username: String,
    },
    RegOk {
        status: u16,
        peers: Vec<(String, u16)>,
    },
    Unreg {
        ip: String,
        port: u16,
        username: String,
    },
    UnregOk {
        code: u16,
    },
    Join {
        ip: String,
        port: u16,
    },
    JoinOk {
        code: u16,
    },
    Leave {
        ip: String,
        port: u16,
    },
    LeaveOk {
        code: u16,
    },
    Ser {
        orig_ip: String,
        orig_port: u16,
        filename: String,
        hops: u8,
    },
    SerOk {
        count: usize,
        ip: String,
        port: u16,
        hops: u8,
        filenames: Vec<String>,
    },
    Error,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command())
    }
}

impl Message {
    /// The command keyword, as it appears in the wire payload.
    pub fn command(&self) -> &'static str {
        match self {
            Message::Reg { .. } => "REG",
            Message::RegOk { .. } => "REGOK",
            Message::Unreg { .. } => "UNREG",
            Message::UnregOk { .. } => "UNROK",
            Message::Join { .. } => "JOIN",
            Message::JoinOk { .. } => "JOINOK",
            Message::Leave { .. } => "LEAVE",
            Message::LeaveOk { .. } => "LEAVEOK",
            Message::Ser { .. } => "SER",
            Message::SerOk { .. } => "SEROK",
            Message::Error => "ERROR",
        }
    }

    /// Render this message to its wire payload (without the length
    /// prefix).
    pub fn to_payload(&self) -> String {
        match self {
            Message::Reg { ip, port, username } => format!("REG {} {} {}", ip, port, username),
            Message::RegOk { status, peers } => {
                let mut s = format!("REGOK {}", status);
                for (ip, port) in peers {
                    s.push_str(&format!(" {} {}", ip, port));
                }
                s
            }
            Message::Unreg { ip, port, username } => {
                format!("UNREG {} {} {}", ip, port, username)
            }
            Message::UnregOk { code } => format!("UNROK {}", code),
            Message::Join { ip, port } => format!("JOIN {} {}", ip, port),
            Message::JoinOk { code } => format!("JOINOK {}", code),
            Message::Leave { ip, port } => format!("LEAVE {} {}", ip, port),
            Message::LeaveOk { code } => format!("LEAVEOK {}", code),
            Message::Ser {
                orig_ip,
                orig_port,
                filename,
                hops,
            } => format!("SER {} {} \"{}\" {}", orig_ip, orig_port, filename, hops),
            Message::SerOk {
                count,
                ip,
                port,
                hops,
                filenames,
            } => {
                let mut s = format!("SEROK {} {} {} {}", count, ip, port, hops);
                for f in filenames {
                    s.push(' ');
                    s.push_str(f);
                }
                s
            }
            Message::Error => "ERROR".to_string(),
        }
    }

    /// Encode this message as a length-prefixed frame.
    pub fn to_frame(&self) -> Result<Bytes, OverlayError> {
        encode(&self.to_payload())
    }

    /// Parse a message out of already-tokenized frame contents (as
    /// returned by [`decode`]).
    pub fn parse(tokens: &[String]) -> Result<Message, OverlayError> {
        let cmd = tokens.first().ok_or(OverlayError::FrameMalformed)?.as_str();

        match cmd {
            "REG" => {
                let (ip, port, username) = triple(tokens)?;
                Ok(Message::Reg { ip, port, username })
            }
            "REGOK" => {
                let status = parse_u16(tokens, 1)?;
                let mut peers = Vec::new();
                let mut i = 2;
                while i + 1 < tokens.len() {
                    peers.push((tokens[i].clone(), parse_port(&tokens[i + 1])?));
                    i += 2;
                }
                Ok(Message::RegOk { status, peers })
            }
            "UNREG" => {
                let (ip, port, username) = triple(tokens)?;
                Ok(Message::Unreg { ip, port, username })
            }
            "UNROK" => Ok(Message::UnregOk {
                code: parse_u16(tokens, 1)?,
            }),
            "JOIN" => {
                let (ip, port) = pair(tokens)?;
                Ok(Message::Join { ip, port })
            }
            "JOINOK" => Ok(Message::JoinOk {
                code: parse_u16(tokens, 1)?,
            }),
            "LEAVE" => {
                let (ip, port) = pair(tokens)?;
                Ok(Message::Leave { ip, port })
            }
            "LEAVEOK" => Ok(Message::LeaveOk {
                code: parse_u16(tokens, 1)?,
            }),
            "SER" => {
                if tokens.len() != 5 {
                    return Err(OverlayError::FrameMalformed);
                }
                Ok(Message::Ser {
                    orig_ip: tokens[1].clone(),
                    orig_port: parse_port(&tokens[2])?,
                    filename: tokens[3].clone(),
                    hops: tokens[4].parse().map_err(|_| OverlayError::FrameMalformed)?,
                })
            }
            "SEROK" => {
                if tokens.len() < 5 {
                    return Err(OverlayError::FrameMalformed);
                }
                let count: usize = tokens[1].parse().map_err(|_| OverlayError::FrameMalformed)?;
                let ip = tokens[2].clone();
                let port = parse_port(&tokens[3])?;
                let hops: u8 = tokens[4].parse().map_err(|_| OverlayError::FrameMalformed)?;
                let filenames = tokens[5..].to_vec();
                Ok(Message::SerOk {
                    count,
                    ip,
                    port,
                    hops,
                    filenames,
                })
            }
            "ERROR" => Ok(Message::Error),
            other => Err(OverlayError::UnknownCommand(other.to_string())),
        }
    }
}

fn parse_port(s: &str) -> Result<u16, OverlayError> {
    s.parse().map_err(|_| OverlayError::FrameMalformed)
}

fn parse_u16(tokens: &[String], idx: usize) -> Result<u16, OverlayError> {
    tokens
        .get(idx)
        .ok_or(OverlayError::FrameMalformed)?
        .parse()
        .map_err(|_| OverlayError::FrameMalformed)
}

fn pair(tokens: &[String]) -> Result<(String, u16), OverlayError> {
    if tokens.len() != 3 {
        return Err(OverlayError::FrameMalformed);
    }
    Ok((tokens[1].clone(), parse_port(&tokens[2])?))
}

fn triple(tokens: &[String]) -> Result<(String, u16, String), OverlayError> {
    if tokens.len() != 4 {
        return Err(OverlayError::FrameMalformed);
    }
    Ok((tokens[1].clone(), parse_port(&tokens[2])?, tokens[3].clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_regok_matches_spec_example() {
        let frame = encode("REGOK 0").unwrap();
        assert_eq!(&frame[..], b"0012 REGOK 0");
    }

    #[test]
    fn encode_join_matches_spec_example() {
        let frame = encode("JOIN 127.0.0.1 5001").unwrap();
        assert_eq!(&frame[..], b"0023 JOIN 127.0.0.1 5001");
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let payload = "x".repeat(9995);
        assert!(matches!(
            encode(&payload),
            Err(OverlayError::FrameTooLarge)
        ));
    }

    #[test]
    fn frame_round_trip() {
        let payload = "SER 10.0.0.1 6000 \"Lord of the rings\" 1";
        let frame = encode(payload).unwrap();
        let tokens = decode(&frame).unwrap();
        assert_eq!(
            tokens,
            vec!["SER", "10.0.0.1", "6000", "Lord of the rings", "1"]
        );
    }

    #[test]
    fn decode_tolerates_missing_trailing_newline() {
        let frame = encode("JOINOK 0").unwrap();
        let mut owned = frame.to_vec();
        assert_eq!(*owned.last().unwrap(), b'0');
        owned.push(b'\n'); // simulate a sender that does add one anyway
        let tokens = decode(&owned).unwrap();
        assert_eq!(tokens, vec!["JOINOK", "0"]);
    }

    #[test]
    fn ser_message_round_trips_quoted_filename() {
        let msg = Message::Ser {
            orig_ip: "1.2.3.4".to_string(),
            orig_port: 7000,
            filename: "Happy Feet".to_string(),
            hops: 2,
        };
        let frame = msg.to_frame().unwrap();
        let tokens = decode(&frame).unwrap();
        let parsed = Message::parse(&tokens).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn serok_round_trips_single_word_filenames() {
        let msg = Message::SerOk {
            count: 2,
            ip: "1.2.3.4".to_string(),
            port: 7000,
            hops: 1,
            filenames: vec!["Logan".to_string(), "Matrix".to_string()],
        };
        let frame = msg.to_frame().unwrap();
        let tokens = decode(&frame).unwrap();
        let parsed = Message::parse(&tokens).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn regok_parses_peer_sample() {
        let tokens: Vec<String> = vec!["REGOK", "2", "1.1.1.1", "7001", "2.2.2.2", "7002"]
            .into_iter()
            .map(String::from)
            .collect();

        let parsed = Message::parse(&tokens).unwrap();
        assert_eq!(
            parsed,
            Message::RegOk {
                status: 2,
                peers: vec![
                    ("1.1.1.1".to_string(), 7001),
                    ("2.2.2.2".to_string(), 7002)
                ],
            }
        );
    }

    #[test]
    fn unknown_command_is_rejected() {
        let tokens: Vec<String> = vec!["BOGUS".to_string()];
        assert!(matches!(
            Message::parse(&tokens),
            Err(OverlayError::UnknownCommand(cmd)) if cmd == "BOGUS"
        ));
    }
}
