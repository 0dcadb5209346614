// (c) 2024 Ross Younger
//! # Configuration management
//!
//! The lab topology (which host runs the QUIC server, where its certificate lives,
//! which page the browser loads, how long each session lasts) is read from the
//! following sources, in order of priority:
//! 1. Command-line options
//! 2. A file named with `--config`
//! 3. The user's configuration file, `~/.dashqoe.toml`
//! 4. The system-wide configuration file, `/etc/dashqoe.toml`
//! 5. Hard-wired defaults
//!
//! Each option may appear in multiple places; the highest-priority value wins.
//! `dashqoe --config-files` lists the files consulted; `dashqoe --show-config`
//! shows every field, its value and where that value came from.
//!
//! ## File format
//!
//! TOML, with one key per field of [`Configuration`]:
//!
//! ```toml
//! remote_host = "lab@quic-box"
//! server_cert = "/home/lab/certs/cert.crt"
//! server_key = "/home/lab/certs/cert.key"
//! server_root = "/home/lab/www"
//! dest_server = "quic-box.lab:4433"
//! careful_resume_cwnd = "800k"
//! ssh_options = ["-i", "/home/me/.ssh/lab_key"]
//! ```

mod structure;
pub use structure::{Configuration, SESSION_MARGIN};
pub(crate) use structure::Configuration_Optional;
#[cfg(test)]
pub(crate) use structure::lab_config;

mod manager;
pub use manager::{DisplayAdapter, Manager};

pub(crate) const BASE_CONFIG_FILENAME: &str = "dashqoe.toml";
