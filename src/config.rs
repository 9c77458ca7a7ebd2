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

use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(rename(deserialize = "General"))]
    pub general: General,

    #[serde(rename(deserialize = "Registrar"))]
    pub registrar: Registrar,

    #[serde(rename(deserialize = "Files"))]
    pub files: Files,
}

#[derive(Deserialize, Debug)]
pub struct General {
    pub bind_ip: String,

    pub bind_port: u16,

    pub username: String,

    /// Automatically register with the rendezvous service on start.
    #[serde(default)]
    pub auto_register: bool,

    /// Directory statistics CSVs are written to.
    #[serde(default = "default_stats_dir")]
    pub stats_dir: String,
}

#[derive(Deserialize, Debug)]
pub struct Registrar {
    pub address: String,

    pub port: u16,

    /// Connect/recv timeout in seconds for registrar round-trips. Spec
    /// range is 5-10s; default picked at the midpoint.
    #[serde(default = "default_registrar_timeout")]
    pub timeout_secs: u64,
}

#[derive(Deserialize, Debug)]
pub struct Files {
    /// Newline-delimited corpus of candidate filenames this node may be
    /// assigned at startup.
    pub corpus_path: String,
}

fn default_stats_dir() -> String {
    "logs".to_string()
}

fn default_registrar_timeout() -> u64 {
    7
}

impl Config {
    pub fn from_str(raw: &str) -> Result<Self, crate::error::OverlayError> {
        Ok(toml::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_table_with_defaults_applied() {
        let raw = r#"
            [General]
            bind_ip = "127.0.0.1"
            bind_port = 6000
            username = "alice"

            [Registrar]
            address = "127.0.0.1"
            port = 9000

            [Files]
            corpus_path = "corpus.txt"
        "#;

        let config = Config::from_str(raw).unwrap();

        assert_eq!(config.general.bind_ip, "127.0.0.1");
        assert_eq!(config.general.bind_port, 6000);
        assert_eq!(config.general.username, "alice");
        assert!(!config.general.auto_register);
        assert_eq!(config.general.stats_dir, "logs");

        assert_eq!(config.registrar.address, "127.0.0.1");
        assert_eq!(config.registrar.port, 9000);
        assert_eq!(config.registrar.timeout_secs, 7);

        assert_eq!(config.files.corpus_path, "corpus.txt");
    }

    #[test]
    fn explicit_values_override_defaults() {
        let raw = r#"
            [General]
            bind_ip = "10.0.0.5"
            bind_port = 7000
            username = "bob"
            auto_register = true
            stats_dir = "/var/log/overlay"

            [Registrar]
            address = "10.0.0.1"
            port = 9000
            timeout_secs = 10

            [Files]
            corpus_path = "/etc/overlay/corpus.txt"
        "#;

        let config = Config::from_str(raw).unwrap();

        assert!(config.general.auto_register);
        assert_eq!(config.general.stats_dir, "/var/log/overlay");
        assert_eq!(config.registrar.timeout_secs, 10);
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let raw = r#"
            [General]
            bind_ip = "127.0.0.1"
            username = "alice"

            [Registrar]
            address = "127.0.0.1"
            port = 9000

            [Files]
            corpus_path = "corpus.txt"
        "#;

        assert!(Config::from_str(raw).is_err());
    }
}
