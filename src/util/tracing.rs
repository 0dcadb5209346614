//! Log output setup
// (c) 2024 Ross Younger

use std::{fs::File, io::Write, path::Path, sync::Arc};

use anyhow::Context as _;
use indicatif::MultiProgress;
use tracing_subscriber::{
    fmt::{self, time::ChronoLocal, writer::BoxMakeWriter, MakeWriter},
    prelude::*,
    EnvFilter,
};

/// Overrides the filter for all output
const CONSOLE_FILTER_VAR: &str = "RUST_LOG";
/// Overrides the filter for the log file only
const FILE_FILTER_VAR: &str = "RUST_LOG_FILE_DETAIL";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Returns the filter and whether it came from the environment
fn filter(var: &str, fallback: Option<&str>, level: &str) -> anyhow::Result<(EnvFilter, bool)> {
    for key in std::iter::once(var).chain(fallback) {
        if let Ok(directives) = std::env::var(key) {
            let parsed = EnvFilter::try_new(&directives)
                .with_context(|| format!("{key} (set in environment) was invalid"))?;
            return Ok((parsed, true));
        }
    }
    Ok((
        EnvFilter::new(format!("{}={level}", env!("CARGO_CRATE_NAME"))),
        false,
    ))
}

/// Sets up logging to the console and, if `filename` is given, to a file.
///
/// Only this crate's events are shown, at `trace_level`, unless `RUST_LOG` says otherwise.
/// `RUST_LOG_FILE_DETAIL` applies to the file alone. Console output goes through `display`
/// when there is one, so log lines do not tear the progress bars.
///
/// **CAUTION:** If this fails, nothing is set up; the caller must report the error itself.
pub fn setup(
    trace_level: &str,
    display: Option<&MultiProgress>,
    filename: Option<&Path>,
) -> anyhow::Result<()> {
    let (console_filter, show_targets) = filter(CONSOLE_FILTER_VAR, None, trace_level)?;
    let writer = display.map_or_else(
        || BoxMakeWriter::new(std::io::stderr),
        |mp| BoxMakeWriter::new(ProgressSink(mp.clone())),
    );
    let console = fmt::layer()
        .compact()
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.into()))
        .with_target(show_targets)
        .with_writer(writer)
        .with_filter(console_filter);

    let file = match filename {
        None => None,
        Some(path) => {
            let out = File::create(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let (file_filter, show_targets) =
                filter(FILE_FILTER_VAR, Some(CONSOLE_FILTER_VAR), trace_level)?;
            Some(
                fmt::layer()
                    .compact()
                    .with_ansi(false)
                    .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.into()))
                    .with_target(show_targets)
                    .with_writer(Arc::new(out))
                    .with_filter(file_filter),
            )
        }
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .context("logging was already set up")
}

/// Routes each log event through a `MultiProgress`
#[derive(Debug, Clone)]
struct ProgressSink(MultiProgress);

impl<'a> MakeWriter<'a> for ProgressSink {
    type Writer = ProgressLine;

    fn make_writer(&'a self) -> Self::Writer {
        ProgressLine {
            display: self.0.clone(),
            text: Vec::new(),
        }
    }
}

/// One event's worth of output, printed when dropped
#[derive(Debug)]
struct ProgressLine {
    display: MultiProgress,
    text: Vec<u8>,
}

impl Write for ProgressLine {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.text.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for ProgressLine {
    fn drop(&mut self) {
        let text = String::from_utf8_lossy(&self.text);
        let line = text.trim_end_matches('\n');
        if line.is_empty() {
            return;
        }
        if self.display.is_hidden() || self.display.println(line).is_err() {
            eprintln!("{line}");
        }
    }
}
