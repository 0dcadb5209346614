// Callback collection mode
// (c) 2024 Ross Younger

use std::{
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use anyhow::{ensure, Result};
use indicatif::MultiProgress;
use tracing::{info, info_span, warn, Instrument as _};

use crate::browser::{spawn_session, SessionSpec};
use crate::callback::{timestamp_label, CallbackServer};
use crate::config::Configuration;
use crate::console::session_progress;
use crate::protocol::Protocol;
use crate::util::{fs::ensure_dir, time::PhaseTimer};

/// Runs `iterations` sessions of one protocol against `config.dest_server`.
///
/// The page reports its own metrics to the callback server, which stores them in
/// `<results_dir>/<hostname>/<protocol>/<timestamp>.json`. Returns the files written.
pub async fn collect(
    config: &Configuration,
    protocol: Protocol,
    iterations: u32,
    display: &MultiProgress,
    quiet: bool,
    profile: bool,
) -> Result<Vec<PathBuf>> {
    ensure!(iterations > 0, "iterations must be greater than 0");
    let spec = SessionSpec::new(config, protocol, false)?;

    let dir = super::host_results_dir(&config.results_dir)?.join(protocol.tag());
    ensure_dir(&dir).await?;
    info!("writing results to {}", dir.display());

    let mut timers = PhaseTimer::new_running("setup");
    let expected = usize::try_from(iterations)?;
    let callbacks = CallbackServer::new(&dir, expected)
        .start(SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.callback_port)))
        .await?;

    let progress = session_progress(display, iterations.into(), 20, quiet)?;
    for iteration in 0..iterations {
        let label = timestamp_label();
        progress.set_message(label.clone());
        callbacks.set_label(&label);
        timers.next(&format!("session {iteration}"));
        let outcome = spawn_session(spec.clone())
            .outcome()
            .instrument(info_span!("iteration", iteration, %label))
            .await;
        if let Err(e) = outcome {
            progress.abandon();
            callbacks.stop().await;
            return Err(e);
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    timers.next("callbacks");
    let written = callbacks.wait(config.callback_timeout_duration()).await?;
    timers.stop();
    if written.len() < expected {
        warn!(
            "only {} of {iterations} sessions reported their metrics",
            written.len()
        );
    }
    if profile {
        info!("Elapsed time by phase:\n{timers}");
    }
    Ok(written)
}
