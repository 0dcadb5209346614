//! Configuration structure
// (c) 2024 Ross Younger

use std::time::Duration;

use anyhow::{ensure, Context as _};
use clap::Parser;
use derive_deftly::Deftly;
use serde::{Deserialize, Serialize};
use struct_field_names_as_array::FieldNamesAsSlice;

use crate::remote::CarefulResume;
use crate::util::{derive_deftly_template_Optionalify, ByteQuantity};

/// Extra time allowed beyond `session_wait` for the page to post its metrics
pub const SESSION_MARGIN: Duration = Duration::from_millis(3140);

/// The lab topology and experiment timings.
///
/// **Note:** `default()` returns the hard-wired defaults. The lab fields (`remote_host`,
/// `server_cert` and so on) default to empty and must be supplied by a configuration
/// file or on the command line before `experiment` will run.
///
/// The [Optionalify](derive_deftly_template_Optionalify) template derives `Configuration_Optional`,
/// the all-`Option` twin which the CLI parses into. Only the values a user actually enters
/// are merged over files and defaults.
///
// Maintainer note: no member of this struct should itself be an Option. (The CLI twin would end up with Some(Some(..)).)
#[derive(Deftly)]
#[derive_deftly(Optionalify)]
#[deftly(visibility = "pub(crate)")]
#[derive(Debug, Clone, PartialEq, Eq, Parser, Deserialize, Serialize, FieldNamesAsSlice)]
pub struct Configuration {
    // REMOTE HOST =====================================================================================
    /// The ssh client program to use [default: `ssh`]
    #[arg(long, help_heading("Remote host"), value_name("PROGRAM"))]
    pub ssh: String,

    /// The scp program to use [default: `scp`]
    #[arg(long, help_heading("Remote host"), value_name("PROGRAM"))]
    pub scp: String,

    /// Provides an additional option or argument to pass to ssh and scp. [default: none]
    ///
    /// **On the command line** repeat `--ssh-options` for each argument.
    ///
    /// **In a configuration file** this field is an array of strings, e.g. `ssh_options=["-i", "/dev/null"]`
    #[arg(
        long,
        action,
        value_name("ssh-option"),
        allow_hyphen_values(true),
        help_heading("Remote host")
    )]
    pub ssh_options: Vec<String>,

    /// The machine running the QUIC test server, as `HOST` or `USER@HOST`
    #[arg(long, help_heading("Remote host"), value_name("USER@HOST"))]
    pub remote_host: String,

    /// Working directory on the remote host; each server session logs into its own subdirectory here [default: /tmp/dashqoe]
    #[arg(long, help_heading("Remote host"), value_name("DIR"))]
    pub remote_temp_dir: String,

    // QUIC SERVER =====================================================================================
    /// The QUIC test server program on the remote host [default: quiche-server]
    #[arg(long, help_heading("QUIC server"), value_name("PROGRAM"))]
    pub server_binary: String,

    /// UDP port the QUIC test server listens on [default: 4433]
    #[arg(long, help_heading("QUIC server"), value_name("PORT"))]
    pub server_port: u16,

    /// TLS certificate (path on the remote host)
    #[arg(long, help_heading("QUIC server"), value_name("FILE"))]
    pub server_cert: String,

    /// TLS private key (path on the remote host)
    #[arg(long, help_heading("QUIC server"), value_name("FILE"))]
    pub server_key: String,

    /// Document root holding the player page and the DASH manifest (path on the remote host)
    #[arg(long, help_heading("QUIC server"), value_name("DIR"))]
    pub server_root: String,

    /// Additional arguments for the QUIC test server. [default: none]
    ///
    /// The server is expected to exit by itself after serving one session.
    #[arg(
        long,
        action,
        value_name("arg"),
        allow_hyphen_values(true),
        help_heading("QUIC server")
    )]
    pub server_extra_args: Vec<String>,

    /// Careful resume: round-trip time observed on the previous connection, in milliseconds [default: 600]
    #[arg(long, help_heading("QUIC server"), value_name("ms"))]
    pub careful_resume_rtt: u32,

    /// Careful resume: congestion window observed on the previous connection [default: 1M]
    ///
    /// May be given as a number of bytes or with an SI suffix, e.g. `800k`.
    #[arg(long, help_heading("QUIC server"), value_name("bytes"), value_parser=clap::value_parser!(ByteQuantity))]
    pub careful_resume_cwnd: ByteQuantity,

    // BROWSER =========================================================================================
    /// Destination server as `HOST:PORT`, without scheme
    #[arg(long, help_heading("Browser"), value_name("HOST:PORT"))]
    pub dest_server: String,

    /// Path of the player page on the destination server [default: /player.html]
    #[arg(long, help_heading("Browser"), value_name("PATH"))]
    pub page_path: String,

    /// How long the player page runs before it reports its metrics, in seconds [default: 60]
    ///
    /// This must match the page's own reporting interval. A further 3.14s is always allowed.
    #[arg(long, help_heading("Browser"), value_name("sec"))]
    pub session_wait: u16,

    /// Delay between starting the remote server and starting the browser, in seconds [default: 2]
    #[arg(long, help_heading("Browser"), value_name("sec"))]
    pub startup_grace: u16,

    /// Browser executable. If empty, a Chrome/Chromium installation is searched for. [default: empty]
    #[arg(long, help_heading("Browser"), value_name("PROGRAM"))]
    pub chrome: String,

    /// Name of the global JavaScript object in which the player page accumulates its metrics [default: metrics]
    #[arg(long, help_heading("Browser"), value_name("NAME"))]
    pub metrics_variable: String,

    // RESULTS =========================================================================================
    /// Local directory under which results are stored [default: ./results]
    #[arg(long, help_heading("Results"), value_name("DIR"))]
    pub results_dir: String,

    /// Local TCP port on which metrics callbacks are received [default: 8000]
    #[arg(long, help_heading("Results"), value_name("PORT"))]
    pub callback_port: u16,

    /// How long to wait for outstanding metrics callbacks after the last session, in seconds [default: 30]
    #[arg(long, help_heading("Results"), value_name("sec"))]
    pub callback_timeout: u16,
}

impl Configuration {
    /// Time to keep each browser session open
    #[must_use]
    pub fn session_duration(&self) -> Duration {
        Duration::from_secs(self.session_wait.into()) + SESSION_MARGIN
    }

    /// Accessor for `startup_grace`, as a Duration
    #[must_use]
    pub fn startup_grace_duration(&self) -> Duration {
        Duration::from_secs(self.startup_grace.into())
    }

    /// Accessor for `callback_timeout`, as a Duration
    #[must_use]
    pub fn callback_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.callback_timeout.into())
    }

    /// The careful resume parameters to hand to the QUIC server
    #[must_use]
    pub fn careful_resume(&self) -> CarefulResume {
        CarefulResume {
            previous_rtt_ms: self.careful_resume_rtt,
            previous_cwnd: *self.careful_resume_cwnd,
        }
    }

    /// Splits `dest_server` into host and port
    pub fn dest_host_port(&self) -> anyhow::Result<(&str, u16)> {
        let (host, port) = self
            .dest_server
            .rsplit_once(':')
            .with_context(|| format!("dest_server {:?} must be HOST:PORT", self.dest_server))?;
        ensure!(!host.is_empty(), "dest_server {:?} has no host", self.dest_server);
        let port = port
            .parse()
            .with_context(|| format!("dest_server {:?} has an invalid port", self.dest_server))?;
        Ok((host, port))
    }

    /// Checks that the values needed to drive the browser are present
    pub fn validate_browser(&self) -> anyhow::Result<()> {
        let _ = self.dest_host_port()?;
        ensure!(
            self.page_path.starts_with('/'),
            "page_path {:?} must start with '/'",
            self.page_path
        );
        ensure!(
            !self.metrics_variable.is_empty(),
            "metrics_variable must not be empty"
        );
        Ok(())
    }

    /// Checks that every lab value needed for an experiment run is present
    pub fn validate_lab(&self) -> anyhow::Result<()> {
        self.validate_browser()?;
        for (name, value) in [
            ("ssh", &self.ssh),
            ("scp", &self.scp),
            ("remote_host", &self.remote_host),
            ("remote_temp_dir", &self.remote_temp_dir),
            ("server_binary", &self.server_binary),
            ("server_cert", &self.server_cert),
            ("server_key", &self.server_key),
            ("server_root", &self.server_root),
        ] {
            ensure!(!value.trim().is_empty(), "configuration field {name} must be set");
        }
        ensure!(self.server_port != 0, "server_port must not be 0");
        ensure!(
            *self.careful_resume_cwnd > 0,
            "careful_resume_cwnd must be greater than 0"
        );
        Ok(())
    }
}

impl Default for Configuration {
    /// **(Unusual!)**
    /// Returns the hard-wired configuration defaults.
    fn default() -> Self {
        Self {
            ssh: "ssh".into(),
            scp: "scp".into(),
            ssh_options: Vec::new(),
            remote_host: String::new(),
            remote_temp_dir: "/tmp/dashqoe".into(),

            server_binary: "quiche-server".into(),
            server_port: 4433,
            server_cert: String::new(),
            server_key: String::new(),
            server_root: String::new(),
            server_extra_args: Vec::new(),
            careful_resume_rtt: 600,
            careful_resume_cwnd: ByteQuantity::new(1_000_000),

            dest_server: String::new(),
            page_path: "/player.html".into(),
            session_wait: 60,
            startup_grace: 2,
            chrome: String::new(),
            metrics_variable: "metrics".into(),

            results_dir: "./results".into(),
            callback_port: 8000,
            callback_timeout: 30,
        }
    }
}

#[cfg(test)]
pub(crate) fn lab_config() -> Configuration {
    Configuration {
        remote_host: "tester@lab-server".into(),
        server_cert: "/etc/lab/cert.pem".into(),
        server_key: "/etc/lab/key.pem".into(),
        server_root: "/srv/dash".into(),
        dest_server: "lab-server.example:4433".into(),
        ..Default::default()
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use assertables::assert_contains;

    use super::{lab_config, Configuration};

    #[test]
    fn defaults_are_not_a_lab() {
        let c = Configuration::default();
        let err = c.validate_lab().unwrap_err().to_string();
        assert_contains!(err, "dest_server");
    }

    #[test]
    fn complete_lab_validates() {
        lab_config().validate_lab().unwrap();
    }

    #[test]
    fn missing_field_is_named() {
        let c = Configuration {
            server_key: "  ".into(),
            ..lab_config()
        };
        let err = c.validate_lab().unwrap_err().to_string();
        assert_contains!(err, "server_key");
    }

    #[test]
    fn dest_parsing() {
        let mut c = lab_config();
        assert_eq!(c.dest_host_port().unwrap(), ("lab-server.example", 4433));
        for (bad, problem) in [
            ("no-port", "must be HOST:PORT"),
            (":443", "has no host"),
            ("host:99999", "has an invalid port"),
        ] {
            c.dest_server = bad.into();
            let err = c.dest_host_port().unwrap_err().to_string();
            assert_eq!(err, format!("dest_server {bad:?} {problem}"));
        }
    }

    #[test]
    fn page_path_must_be_absolute() {
        let c = Configuration {
            page_path: "player.html".into(),
            ..lab_config()
        };
        assert!(c.validate_browser().is_err());
    }

    #[test]
    fn session_includes_margin() {
        let c = Configuration {
            session_wait: 10,
            ..Default::default()
        };
        assert_eq!(c.session_duration(), Duration::from_millis(13_140));
    }

    #[test]
    fn serializes_flat() {
        let j = serde_json::to_value(Configuration::default()).unwrap();
        assert_eq!(j["careful_resume_cwnd"], 1_000_000);
        assert_eq!(j["server_port"], 4433);
    }
}
