// (c) 2024 Ross Younger
//! # Experiment drivers
//!
//! Two ways of running the player page repeatedly:
//!
//! * [`experiment`] runs the full lab comparison. Each iteration is one TCP session,
//!   then one session against each variant of the remote QUIC server. The page's state
//!   is read back out of the browser and written as `<protocol>_<n>.json`.
//! * [`collect`] runs one protocol against any destination, relying on the page to
//!   POST its metrics to the local [callback server](crate::callback).

mod collect;
pub use collect::collect;

mod experiment;
pub use experiment::{experiment, session_plan};

use std::path::PathBuf;

use crate::util::fs::{expand_path, hostname};

/// `<results_dir>/<hostname>`
fn host_results_dir(results_dir: &str) -> anyhow::Result<PathBuf> {
    Ok(expand_path(results_dir)?.join(hostname()))
}

