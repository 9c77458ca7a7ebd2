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

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("IO error {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid net address {0}")]
    InvalidAddress(#[from] std::net::AddrParseError),

    #[error("Unable to parse int {0}")]
    InvalidInt(#[from] std::num::ParseIntError),

    #[error("Config error {0}")]
    ConfigError(#[from] toml::de::Error),

    #[error("CSV error {0}")]
    CsvError(#[from] csv::Error),

    #[error("Malformed frame")]
    FrameMalformed,

    #[error("Frame exceeds 9999 bytes")]
    FrameTooLarge,

    #[error("Unknown command {0}")]
    UnknownCommand(String),

    #[error("Unable to send to peer ({0})")]
    SendFailed(String),

    #[error("Local operation timed out")]
    LocalTimeout,

    #[error("Registrar is unreachable: {0}")]
    RegistrarUnreachable(String),

    #[error("Registrar rejected the request (status {status})")]
    RegistrarRejected { status: u16 },
}

impl OverlayError {
    /// Wire-facing error code, used for logging/diagnostics. The core
    /// protocol's own ERROR variant carries no payload (see the command
    /// table), so this never crosses the wire itself.
    pub fn code(&self) -> u8 {
        match self {
            OverlayError::FrameMalformed => 0,
            OverlayError::FrameTooLarge => 1,
            OverlayError::UnknownCommand(_) => 2,
            OverlayError::RegistrarRejected { .. } => 3,
            OverlayError::RegistrarUnreachable(_) => 4,
            OverlayError::SendFailed(_) => 5,
            OverlayError::LocalTimeout => 6,
            _ => 255,
        }
    }
}

pub type OverlayResult<T> = std::result::Result<T, OverlayError>;
