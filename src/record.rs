//! Result records: what one browser session produces
// (c) 2024 Ross Younger

use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

const METRICS_KEY: &str = "chrome_metrics";
const TIMING_KEY: &str = "chrome_performanceTiming";

/// What the experiment driver writes for one session.
///
/// The two page-state objects are stored exactly as the page produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Wall-clock time (UNIX seconds) at which navigation was requested
    #[serde(rename = "chrome_driver.get()")]
    pub navigation_requested: f64,
    /// The player page's metrics object
    #[serde(rename = "chrome_metrics")]
    pub metrics: Value,
    /// The browser's `performance.timing` object
    #[serde(rename = "chrome_performanceTiming")]
    pub performance_timing: Value,
}

/// One array of samples as the page reported it.
///
/// Anything that is not a number (`JSON.stringify` turns NaN into `null`) is kept as `None`.
/// A value that is not an array at all is remembered as a problem; it spoils only the
/// views which use this series, never the whole record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    samples: Vec<Option<f64>>,
    problem: Option<String>,
}

impl Series {
    /// Number of samples, including any which are not numbers
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether there are no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The samples, provided all of them are numbers. `name` is used in the error.
    pub fn numbers(&self, name: &str) -> Result<Vec<f64>, String> {
        if let Some(problem) = &self.problem {
            return Err(format!("{name} {problem}"));
        }
        self.samples
            .iter()
            .enumerate()
            .map(|(i, s)| s.ok_or_else(|| format!("{name} sample {i} is not a number")))
            .collect()
    }
}

impl From<Vec<f64>> for Series {
    fn from(values: Vec<f64>) -> Self {
        Self {
            samples: values.into_iter().map(Some).collect(),
            problem: None,
        }
    }
}

impl<'de> Deserialize<'de> for Series {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Array(items) => Self {
                samples: items.iter().map(Value::as_f64).collect(),
                problem: None,
            },
            Value::Null => Self::default(),
            other => Self {
                samples: Vec::new(),
                problem: Some(format!("is not an array (found {other})")),
            },
        })
    }
}

/// Playback metrics sampled by the player page.
///
/// Every array is aligned by index with `current_time` (milliseconds since the UNIX epoch),
/// except the stall arrays which are aligned with each other.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlaybackMetrics {
    /// Seconds of media buffered ahead of the playhead
    pub buffer_level: Series,
    /// Sampling instants, ms since the epoch
    pub current_time: Series,
    /// Cumulative dropped video frames
    pub dropped_frames: Series,
    /// Rendered video height, pixels
    pub res_height: Series,
    /// Rendered video width, pixels
    pub res_width: Series,
    /// Whether the player was able to play at each sample; normally an array
    pub can_play: Value,
    /// Stall start instants, ms since the epoch
    pub stall_start_time: Series,
    /// Stall durations, ms
    pub stall_duration: Series,
}

/// The subset of the navigation timing snapshot we use
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationTiming {
    /// ms since the epoch at which the browser began fetching the page
    pub fetch_start: f64,
}

/// A result file as read back for evaluation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultRecord {
    /// Playback metrics
    pub metrics: PlaybackMetrics,
    /// Navigation timing, if the file has a usable one
    pub timing: Option<NavigationTiming>,
}

/// A `canPlay` sample counts as playable if it is `true` or a non-zero number
fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

impl ResultRecord {
    /// Interprets a parsed result file.
    ///
    /// Files written by the experiment driver nest the metrics under `chrome_metrics`;
    /// files posted by the page to the callback server hold them at the top level.
    pub fn from_value(value: Value) -> anyhow::Result<Self> {
        let Value::Object(mut map) = value else {
            anyhow::bail!("result is not a JSON object");
        };
        // A malformed timing object only costs the start-up view
        let timing = map.remove(TIMING_KEY).and_then(|t| {
            serde_json::from_value(t)
                .inspect_err(|e| debug!("ignoring {TIMING_KEY}: {e}"))
                .ok()
        });
        let metrics = match map.remove(METRICS_KEY) {
            Some(nested) => serde_json::from_value(nested).context("reading chrome_metrics")?,
            None => serde_json::from_value(Value::Object(map)).context("reading metrics")?,
        };
        Ok(Self { metrics, timing })
    }

    /// Reads and interprets a result file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data =
            std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let value: Value = serde_json::from_slice(&data)
            .with_context(|| format!("parsing {}", path.display()))?;
        Self::from_value(value).with_context(|| format!("interpreting {}", path.display()))
    }

    /// Index of the first sample at which the player could play
    #[must_use]
    pub fn first_playable(&self) -> Option<usize> {
        self.metrics.can_play.as_array()?.iter().position(truthy)
    }
}
