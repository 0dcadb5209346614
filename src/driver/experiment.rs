// Full lab experiment: TCP, QUIC with HyStart and QUIC with careful resume, back to back
// (c) 2024 Ross Younger

use std::{
    future::Future,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{ensure, Context as _, Result};
use indicatif::MultiProgress;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, Instrument as _};

use crate::browser::{spawn_session, SessionSpec};
use crate::callback::timestamp_label;
use crate::config::Configuration;
use crate::console::session_progress;
use crate::protocol::Protocol;
use crate::remote::{Parameters, RemoteServer, ServerRun};
use crate::util::fs::{ensure_dir, write_json};
use crate::util::time::PhaseTimer;

/// The sessions an experiment of `iterations` iterations runs, in order
#[must_use]
pub fn session_plan(iterations: u32) -> Vec<(u32, Protocol)> {
    (0..iterations)
        .flat_map(|i| Protocol::ALL.into_iter().map(move |p| (i, p)))
        .collect()
}

/// Runs the full experiment. Returns the directory holding the results.
///
/// Every session writes `<protocol>_<n>.json`; QUIC sessions also leave the server's
/// console output and qlog files alongside. The first failure aborts the run.
pub async fn experiment(
    config: &Configuration,
    config_done: bool,
    iterations: u32,
    display: &MultiProgress,
    quiet: bool,
    profile: bool,
) -> Result<PathBuf> {
    ensure!(
        config_done,
        "refusing to run without --config-done; check the lab settings with --show-config first"
    );
    ensure!(iterations > 0, "iterations must be greater than 0");
    config.validate_lab()?;

    let dir = super::host_results_dir(&config.results_dir)?.join(timestamp_label());
    ensure_dir(&dir).await?;
    info!("writing results to {}", dir.display());

    let plan = session_plan(iterations);
    let progress = session_progress(display, plan.len() as u64, 20, quiet)?;
    let mut timers = PhaseTimer::new_running("setup");

    for (iteration, protocol) in plan {
        let stem = protocol.file_stem(iteration);
        progress.set_message(stem.clone());
        run_one(config, protocol, &stem, &dir, &mut timers)
            .instrument(info_span!("session", %stem))
            .await
            .with_context(|| format!("session {stem} failed"))?;
        progress.inc(1);
    }
    timers.stop();
    progress.finish_and_clear();

    if profile {
        info!("Elapsed time by phase:\n{timers}");
    }
    Ok(dir)
}

async fn run_one(
    config: &Configuration,
    protocol: Protocol,
    stem: &str,
    dir: &Path,
    timers: &mut PhaseTimer,
) -> Result<()> {
    let spec = SessionSpec::new(config, protocol, true)?;

    let (server, grace) = if protocol.needs_remote_server() {
        timers.next(&format!("{stem} server start"));
        let remote = RemoteServer::new(Parameters::from(config));
        let careful_resume = protocol.careful_resume().then(|| config.careful_resume());
        let task = tokio::spawn(
            remote
                .run_session(stem.to_string(), careful_resume, dir.to_path_buf())
                .in_current_span(),
        );
        // No readiness signal from the server; this is a best guess
        (Some(task), config.startup_grace_duration())
    } else {
        (None, Duration::ZERO)
    };

    let browser = async {
        tokio::time::sleep(grace).await;
        timers.next(&format!("{stem} browser"));
        spawn_session(spec).outcome().await
    };
    let (record, run) = alongside_server(server, browser).await?;
    if let Some(run) = run {
        debug!(
            "server output in {}, {} log file(s) retrieved",
            run.console_log.display(),
            run.retrieved.len()
        );
    }

    let record = record.context("browser session returned no page state")?;
    let path = dir.join(format!("{stem}.json"));
    write_json(&path, &record).await?;
    info!("wrote {}", path.display());
    Ok(())
}

/// Runs `browser` to completion while the remote server session runs alongside.
///
/// Whichever fails first ends the session at once: a server failure drops the browser
/// (killing it), a browser failure aborts the server. On success both have finished.
async fn alongside_server<T>(
    server: Option<JoinHandle<Result<ServerRun>>>,
    browser: impl Future<Output = Result<T>>,
) -> Result<(T, Option<ServerRun>)> {
    let Some(mut server) = server else {
        return Ok((browser.await?, None));
    };
    tokio::pin!(browser);
    tokio::select! {
        finished = &mut server => {
            let run = finished.context("remote server task failed")??;
            debug!("remote server finished before the browser");
            Ok((browser.await?, Some(run)))
        }
        outcome = &mut browser => match outcome {
            Ok(value) => {
                let run = server.await.context("remote server task failed")??;
                Ok((value, Some(run)))
            }
            Err(e) => {
                server.abort();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::{path::PathBuf, time::Duration};

    use anyhow::anyhow;
    use assertables::assert_contains;
    use indicatif::MultiProgress;

    use super::{alongside_server, experiment, session_plan};
    use crate::config::{lab_config, Configuration};
    use crate::protocol::Protocol;
    use crate::remote::{Parameters, RemoteServer, ServerRun};

    #[test]
    fn plan_order() {
        let plan = session_plan(2);
        assert_eq!(plan.len(), 6);
        assert_eq!(plan[0], (0, Protocol::Tcp));
        assert_eq!(plan[1], (0, Protocol::QuicHystart));
        assert_eq!(plan[2], (0, Protocol::QuicCarefulResume));
        assert_eq!(plan[3], (1, Protocol::Tcp));
        assert!(session_plan(0).is_empty());
    }

    async fn refused(config: &Configuration, config_done: bool, iterations: u32) -> String {
        experiment(config, config_done, iterations, &MultiProgress::new(), true, false)
            .await
            .unwrap_err()
            .to_string()
    }

    #[tokio::test]
    async fn gated_on_confirmation() {
        let scratch = tempfile::tempdir().unwrap();
        let config = Configuration {
            results_dir: scratch.path().to_string_lossy().into_owned(),
            ..lab_config()
        };
        assert_contains!(refused(&config, false, 1).await, "--config-done");
        assert_contains!(refused(&config, true, 0).await, "iterations");
        let incomplete = Configuration {
            remote_host: String::new(),
            ..config
        };
        assert_contains!(refused(&incomplete, true, 1).await, "remote_host");
        // nothing was created
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    /// A browser session which would outlast any test
    async fn endless_browser() -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn server_failure_ends_the_session_at_once() {
        let scratch = tempfile::tempdir().unwrap();
        // every remote command exits 3
        let config = Configuration {
            ssh: "sh".into(),
            ssh_options: vec!["-c".into(), "exit 3".into()],
            ..lab_config()
        };
        let server = tokio::spawn(
            RemoteServer::new(Parameters::from(&config)).run_session(
                "quic-hystart_0".into(),
                None,
                scratch.path().to_path_buf(),
            ),
        );
        let err = tokio::time::timeout(
            Duration::from_secs(30),
            alongside_server(Some(server), endless_browser()),
        )
        .await
        .expect("waited for the browser despite the server failing")
        .unwrap_err();
        assert_contains!(err.to_string(), "remote mkdir failed");
    }

    #[tokio::test]
    async fn browser_failure_aborts_the_server() {
        let (alive, stopped) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let _alive = alive;
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ServerRun {
                console_log: PathBuf::new(),
                retrieved: Vec::new(),
            })
        });
        let err = alongside_server::<()>(Some(server), async { Err(anyhow!("no page")) })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "no page");
        let gone = tokio::time::timeout(Duration::from_secs(30), stopped)
            .await
            .expect("server task kept running");
        assert!(gone.is_err());
    }

    #[tokio::test]
    async fn early_server_exit_waits_for_the_browser() {
        let run = ServerRun {
            console_log: PathBuf::from("tcp_0_server.log"),
            retrieved: Vec::new(),
        };
        let expected = run.clone();
        let server = tokio::spawn(async move { Ok(run) });
        let (value, got) = alongside_server(Some(server), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(7)
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(got, Some(expected));

        let (value, got) = alongside_server(None, async { Ok("tcp") }).await.unwrap();
        assert_eq!(value, "tcp");
        assert!(got.is_none());
    }
}
