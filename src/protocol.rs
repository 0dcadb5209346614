//! Transport protocol variants under test
// (c) 2024 Ross Younger

use serde::{de, Deserialize, Serialize};
use std::str::FromStr as _;
use strum::VariantNames as _;

/// The transport a browser session uses to fetch the stream.
///
/// Declaration order is the order in which protocols appear in tables, CSV output and chart legends.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
)]
#[strum(ascii_case_insensitive)]
pub enum Protocol {
    /// HTTP/2 over TCP; QUIC is disabled in the browser
    #[strum(to_string = "TCP/HTTP2", serialize = "tcp")]
    Tcp,
    /// HTTP/3 over QUIC with the server's default slow start (HyStart)
    #[strum(to_string = "QUIC (HyStart)", serialize = "quic-hystart", serialize = "quic")]
    QuicHystart,
    /// HTTP/3 over QUIC, the server resuming from a previous connection's congestion state
    #[strum(to_string = "QUIC (careful resume)", serialize = "quic-cr")]
    QuicCarefulResume,
}

impl Protocol {
    /// Every protocol, in legend order
    pub const ALL: [Protocol; 3] = [
        Protocol::Tcp,
        Protocol::QuicHystart,
        Protocol::QuicCarefulResume,
    ];

    /// Short tag used in filenames and directory names
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::QuicHystart => "quic-hystart",
            Protocol::QuicCarefulResume => "quic-cr",
        }
    }

    /// Whether a session with this protocol is served by the remote QUIC test server
    #[must_use]
    pub fn needs_remote_server(self) -> bool {
        !matches!(self, Protocol::Tcp)
    }

    /// Whether the QUIC server should be started with careful resume parameters
    #[must_use]
    pub fn careful_resume(self) -> bool {
        matches!(self, Protocol::QuicCarefulResume)
    }

    /// Browser switches selecting this transport towards `dest` (`HOST:PORT`)
    #[must_use]
    pub fn browser_flags(self, dest: &str) -> Vec<String> {
        match self {
            Protocol::Tcp => vec!["--disable-quic".into()],
            Protocol::QuicHystart | Protocol::QuicCarefulResume => vec![
                "--enable-quic".into(),
                format!("--origin-to-force-quic-on={dest}"),
            ],
        }
    }

    /// File stem for the results of one session, e.g. `quic-cr_3`
    #[must_use]
    pub fn file_stem(self, iteration: u32) -> String {
        format!("{}_{iteration}", self.tag())
    }

    /// Recognises a file stem written by [`Protocol::file_stem`]
    #[must_use]
    pub fn from_file_stem(stem: &str) -> Option<(Protocol, u32)> {
        let (tag, iteration) = stem.rsplit_once('_')?;
        let iteration = iteration.parse().ok()?;
        Protocol::ALL
            .into_iter()
            .find(|p| p.tag() == tag)
            .map(|p| (p, iteration))
    }
}

impl Serialize for Protocol {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Protocol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Protocol::from_str(&s).map_err(|_| de::Error::unknown_variant(&s, Protocol::VARIANTS))
    }
}
