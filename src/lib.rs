//! Measures DASH video playback quality of experience over TCP and QUIC
// (c) 2024 Ross Younger

//! A headless browser plays a DASH stream from a test server while the player page
//! records buffer level, resolution, stalls and start-up timing. Sessions are repeated
//! for each protocol under comparison:
//!
//! * TCP (HTTP/2)
//! * QUIC (HTTP/3) with HyStart
//! * QUIC with careful resume, seeded from a previous connection's RTT and congestion window
//!
//! The QUIC test server runs on a lab machine, driven over ssh; its logs and qlogs are
//! collected alongside each session's result file. The [`eval`] module aggregates result
//! files into a CSV export, a summary table and a comparison chart.
//!
//! The command-line entrypoint is [`cli`]. Configuration is layered from defaults,
//! system and user files and the command line; see [`config`].

pub mod browser;
pub mod callback;
mod cli;
pub use cli::cli;
pub mod config;
mod console;
pub mod driver;
pub mod eval;
pub mod protocol;
pub mod record;
pub mod remote;
pub mod util;

#[doc(hidden)]
pub use derive_deftly;
