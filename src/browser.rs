//! Headless browser sessions
// (c) 2024 Ross Younger

use std::{path::PathBuf, time::Duration};

use anyhow::{Context as _, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures_util::StreamExt as _;
use serde_json::Value;
use tokio::{sync::oneshot, task::AbortHandle};
use tracing::{debug, info, trace, warn, Instrument as _};

use crate::config::Configuration;
use crate::protocol::Protocol;
use crate::record::SessionRecord;
use crate::util::fs::expand_path;

/// The stages a browser session passes through.
/// Errors are reported with the stage in which they occurred.
#[derive(Copy, Clone, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    /// Building the browser configuration and launching the browser
    Configuring,
    /// Loading the player page
    Navigating,
    /// Letting the player run
    Waiting,
    /// Reading the page's state back out
    Extracting,
}

/// Everything one browser session needs to know
#[derive(Debug, Clone)]
pub struct SessionSpec {
    protocol: Protocol,
    dest: String,
    url: String,
    chrome: Option<PathBuf>,
    duration: Duration,
    metrics_variable: String,
    extract_page_state: bool,
}

impl SessionSpec {
    /// Constructor.
    ///
    /// When `extract_page_state` is false the page is expected to report its own metrics
    /// (to the callback server) and the session returns no record.
    pub fn new(config: &Configuration, protocol: Protocol, extract_page_state: bool) -> Result<Self> {
        config.validate_browser()?;
        let chrome = if config.chrome.is_empty() {
            None
        } else {
            Some(expand_path(&config.chrome)?)
        };
        Ok(Self {
            protocol,
            dest: config.dest_server.clone(),
            url: format!("https://{}{}", config.dest_server, config.page_path),
            chrome,
            duration: config.session_duration(),
            metrics_variable: config.metrics_variable.clone(),
            extract_page_state,
        })
    }

    /// Command-line switches for the browser, excluding the headless switch which the driver adds itself
    #[must_use]
    pub fn browser_args(&self) -> Vec<String> {
        let mut args = vec!["--disable-gpu".to_string()];
        args.extend(self.protocol.browser_flags(&self.dest));
        args
    }

    fn browser_config(&self) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder().args(self.browser_args());
        if let Some(chrome) = &self.chrome {
            builder = builder.chrome_executable(chrome);
        }
        builder.build().map_err(|e| anyhow::anyhow!(e))
    }

    fn metrics_expression(&self) -> String {
        format!("JSON.stringify(window.{})", self.metrics_variable)
    }
}

const TIMING_EXPRESSION: &str = "JSON.stringify(window.performance.timing)";

/// Receiving end of a spawned browser session.
/// Dropping it before the outcome arrives stops the session and kills the browser.
#[derive(Debug)]
pub struct SessionHandle {
    rx: oneshot::Receiver<Result<Option<SessionRecord>>>,
    task: Option<AbortHandle>,
}

impl SessionHandle {
    /// Waits for the session to finish. Exactly one outcome is delivered per session.
    pub async fn outcome(mut self) -> Result<Option<SessionRecord>> {
        (&mut self.rx)
            .await
            .context("browser session ended without reporting an outcome")?
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Runs a browser session in the background
#[must_use]
pub fn spawn_session(spec: SessionSpec) -> SessionHandle {
    let (tx, rx) = oneshot::channel();
    let span = tracing::debug_span!("browser", protocol = spec.protocol.tag());
    let task = tokio::spawn(
        async move {
            let outcome = run_session(&spec).await;
            // The receiver may have gone away if the run was abandoned
            let _ = tx.send(outcome);
        }
        .instrument(span),
    );
    SessionHandle {
        rx,
        task: Some(task.abort_handle()),
    }
}

fn at(phase: Phase) -> String {
    format!("browser session failed while {phase}")
}

/// Runs one browser session to completion.
///
/// The browser is killed on failure, closed politely on success.
pub async fn run_session(spec: &SessionSpec) -> Result<Option<SessionRecord>> {
    let config = spec.browser_config().context(at(Phase::Configuring))?;
    let (mut browser, mut handler) = Browser::launch(config)
        .await
        .context(at(Phase::Configuring))?;
    let events = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                trace!("browser event error: {e}");
            }
        }
    });

    let result = drive(&browser, spec).await;
    if result.is_ok() {
        if let Err(e) = browser.close().await {
            debug!("browser close: {e}");
        }
        let _ = browser.wait().await;
    } else if let Some(Err(e)) = browser.kill().await {
        warn!("could not kill browser: {e}");
    }
    events.abort();
    result
}

async fn drive(browser: &Browser, spec: &SessionSpec) -> Result<Option<SessionRecord>> {
    info!("loading {} over {}", spec.url, spec.protocol);
    let navigation_requested = unix_now();
    let page = browser
        .new_page(spec.url.as_str())
        .await
        .context(at(Phase::Navigating))?;

    debug!("waiting {:?} for the player", spec.duration);
    tokio::time::sleep(spec.duration).await;

    if !spec.extract_page_state {
        return Ok(None);
    }
    let metrics = evaluate_json(&page, &spec.metrics_expression())
        .await
        .context(at(Phase::Extracting))?;
    let performance_timing = evaluate_json(&page, TIMING_EXPRESSION)
        .await
        .context(at(Phase::Extracting))?;
    Ok(Some(SessionRecord {
        navigation_requested,
        metrics,
        performance_timing,
    }))
}

/// Evaluates an expression yielding a JSON string and parses the result
async fn evaluate_json(page: &chromiumoxide::Page, expression: &str) -> Result<Value> {
    let text: String = page
        .evaluate(expression)
        .await
        .with_context(|| format!("evaluating {expression}"))?
        .into_value()
        .with_context(|| format!("{expression} did not yield a string"))?;
    serde_json::from_str(&text).with_context(|| format!("parsing result of {expression}"))
}

#[allow(clippy::cast_precision_loss)]
fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1e6
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::{at, Phase, SessionHandle, SessionSpec};
    use crate::config::{lab_config, Configuration};
    use crate::protocol::Protocol;

    #[test]
    fn spec_from_config() {
        let spec = SessionSpec::new(&lab_config(), Protocol::QuicHystart, true).unwrap();
        assert_eq!(spec.url, "https://lab-server.example:4433/player.html");
        assert_eq!(spec.duration, Duration::from_millis(63_140));
        assert!(spec.chrome.is_none());
        assert_eq!(
            spec.browser_args(),
            vec![
                "--disable-gpu",
                "--enable-quic",
                "--origin-to-force-quic-on=lab-server.example:4433"
            ]
        );
        assert_eq!(spec.metrics_expression(), "JSON.stringify(window.metrics)");
    }

    #[test]
    fn tcp_disables_quic() {
        let spec = SessionSpec::new(&lab_config(), Protocol::Tcp, false).unwrap();
        assert_eq!(spec.browser_args(), vec!["--disable-gpu", "--disable-quic"]);
    }

    #[test]
    fn bad_destination_is_rejected() {
        let config = Configuration {
            dest_server: "nowhere".into(),
            ..lab_config()
        };
        assert!(SessionSpec::new(&config, Protocol::Tcp, true).is_err());
    }

    #[test]
    fn phase_in_error_message() {
        assert_eq!(at(Phase::Extracting), "browser session failed while extracting");
        assert_eq!(Phase::Navigating.to_string(), "navigating");
    }

    #[tokio::test]
    async fn dropped_sender_is_an_error() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        drop(tx);
        let handle = SessionHandle { rx, task: None };
        assert!(handle.outcome().await.is_err());
    }

    #[tokio::test]
    async fn dropping_the_handle_stops_the_session() {
        let (_tx, rx) = tokio::sync::oneshot::channel();
        let task = tokio::spawn(tokio::time::sleep(Duration::from_secs(3600)));
        let handle = SessionHandle {
            rx,
            task: Some(task.abort_handle()),
        };
        drop(handle);
        assert!(task.await.unwrap_err().is_cancelled());
    }
}
