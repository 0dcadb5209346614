// Tabular views derived from one result record
// (c) 2024 Ross Younger

use std::path::PathBuf;

use tracing::warn;

use crate::protocol::Protocol;
use crate::record::{PlaybackMetrics, ResultRecord};

/// Where a record came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Path to the result file
    pub path: PathBuf,
    /// File name, as shown in the CSV export
    pub file: String,
    /// Host or access network label
    pub operator: String,
    /// Transport used
    pub protocol: Protocol,
}

/// The views derived per record
#[derive(Copy, Clone, Debug, PartialEq, Eq, strum::Display)]
pub enum ViewKind {
    /// Buffer level over time
    #[strum(to_string = "buffer level")]
    Buffer,
    /// Dropped frames over time
    #[strum(to_string = "dropped frames")]
    DroppedFrames,
    /// Rendered resolution over time
    #[strum(to_string = "resolution")]
    Resolution,
    /// Stall start and duration pairs
    #[strum(to_string = "stalls")]
    Stalls,
    /// Time to first playable frame
    #[strum(to_string = "start-up")]
    Startup,
}

/// One sample of a numeric series
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesRow {
    /// Whole seconds since the record's first sample
    pub time: i64,
    /// Transport
    pub protocol: Protocol,
    /// Operator label
    pub operator: String,
    /// Source file name
    pub file: String,
    /// The sample
    pub value: f64,
}

/// One resolution sample
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionRow {
    /// Whole seconds since the record's first sample
    pub time: i64,
    /// Transport
    pub protocol: Protocol,
    /// Operator label
    pub operator: String,
    /// Source file name
    pub file: String,
    /// Pixels
    pub width: f64,
    /// Pixels
    pub height: f64,
}

impl ResolutionRow {
    /// Pixel count, used only to order resolutions
    #[must_use]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// `WIDTHxHEIGHT`
    #[must_use]
    pub fn label(&self) -> String {
        format!("{:.0}x{:.0}", self.width, self.height)
    }
}

/// One stall
#[derive(Debug, Clone, PartialEq)]
pub struct StallRow {
    /// Whole seconds since the record's first sample
    pub start: i64,
    /// Seconds
    pub duration: f64,
    /// Transport
    pub protocol: Protocol,
    /// Operator label
    pub operator: String,
    /// Source file name
    pub file: String,
}

/// Time from the start of the page fetch to the first playable sample
#[derive(Debug, Clone, PartialEq)]
pub struct StartupRow {
    /// Seconds
    pub seconds: f64,
    /// Transport
    pub protocol: Protocol,
    /// Operator label
    pub operator: String,
    /// Source file name
    pub file: String,
}

/// A view (or, with `view` unset, a whole file) left out of the aggregate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skip {
    /// Result file
    pub file: PathBuf,
    /// Which view; `None` if the file could not be read at all
    pub view: Option<ViewKind>,
    /// Why
    pub reason: String,
}

/// Every view, concatenated across records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Views {
    /// Buffer level, seconds of media
    pub buffer: Vec<TimeSeriesRow>,
    /// Cumulative dropped frames
    pub dropped_frames: Vec<TimeSeriesRow>,
    /// Rendered resolution
    pub resolution: Vec<ResolutionRow>,
    /// Stall events
    pub stalls: Vec<StallRow>,
    /// Time to first playable frame
    pub startup: Vec<StartupRow>,
}

/// Converts ms-since-epoch instants to whole seconds since `origin`
#[allow(clippy::cast_possible_truncation)]
fn seconds_since(origin: f64, t: f64) -> i64 {
    ((t - origin) / 1000.0).round() as i64
}

/// Checks that every array has the same, non-zero length
fn aligned(arrays: &[(&str, usize)]) -> Result<(), String> {
    let Some(&(first_name, first_len)) = arrays.first() else {
        return Ok(());
    };
    if first_len == 0 {
        return Err(format!("{first_name} is empty"));
    }
    for &(name, len) in &arrays[1..] {
        if len != first_len {
            return Err(format!(
                "{name} has {len} samples but {first_name} has {first_len}"
            ));
        }
    }
    Ok(())
}

/// Collects derived rows, noting every view it has to leave out
#[derive(Debug, Default)]
pub(crate) struct ViewBuilder {
    pub(crate) views: Views,
    pub(crate) skips: Vec<Skip>,
}

impl ViewBuilder {
    fn skip(&mut self, source: &Source, view: ViewKind, reason: String) {
        warn!("{}: skipping {view} view: {reason}", source.file);
        self.skips.push(Skip {
            file: source.path.clone(),
            view: Some(view),
            reason,
        });
    }

    /// Records a file which could not be read
    pub(crate) fn unreadable(&mut self, path: PathBuf, reason: String) {
        warn!("{}: skipping file: {reason}", path.display());
        self.skips.push(Skip {
            file: path,
            view: None,
            reason,
        });
    }

    /// Derives every view from one record
    pub(crate) fn add(&mut self, source: &Source, record: &ResultRecord) {
        let m = &record.metrics;
        let times = m.current_time.numbers("currentTime");
        let origin = times.as_ref().ok().and_then(|t| t.first().copied());

        for (kind, name, series) in [
            (ViewKind::Buffer, "bufferLevel", &m.buffer_level),
            (ViewKind::DroppedFrames, "droppedFrames", &m.dropped_frames),
        ] {
            let checked = times.clone().and_then(|times| {
                let values = series.numbers(name)?;
                aligned(&[("currentTime", times.len()), (name, values.len())])?;
                Ok((times, values))
            });
            let (times, values) = match checked {
                Ok(v) => v,
                Err(reason) => {
                    self.skip(source, kind, reason);
                    continue;
                }
            };
            let origin = times[0];
            let rows = times.iter().zip(values).map(|(&t, value)| TimeSeriesRow {
                time: seconds_since(origin, t),
                protocol: source.protocol,
                operator: source.operator.clone(),
                file: source.file.clone(),
                value,
            });
            match kind {
                ViewKind::Buffer => self.views.buffer.extend(rows),
                _ => self.views.dropped_frames.extend(rows),
            }
        }

        let resolution = times.clone().and_then(|times| {
            let widths = m.res_width.numbers("resWidth")?;
            let heights = m.res_height.numbers("resHeight")?;
            aligned(&[
                ("currentTime", times.len()),
                ("resWidth", widths.len()),
                ("resHeight", heights.len()),
            ])?;
            Ok((times, widths, heights))
        });
        match resolution {
            Err(reason) => self.skip(source, ViewKind::Resolution, reason),
            Ok((times, widths, heights)) => {
                let origin = times[0];
                self.views.resolution.extend(
                    times
                        .iter()
                        .zip(widths.into_iter().zip(heights))
                        .map(|(&t, (width, height))| ResolutionRow {
                            time: seconds_since(origin, t),
                            protocol: source.protocol,
                            operator: source.operator.clone(),
                            file: source.file.clone(),
                            width,
                            height,
                        }),
                );
            }
        }

        match stalls(m, origin) {
            Err(reason) => self.skip(source, ViewKind::Stalls, reason),
            Ok(pairs) => self.views.stalls.extend(pairs.into_iter().map(|(start, duration)| {
                StallRow {
                    start,
                    duration,
                    protocol: source.protocol,
                    operator: source.operator.clone(),
                    file: source.file.clone(),
                }
            })),
        }

        match startup_seconds(record) {
            Ok(seconds) => self.views.startup.push(StartupRow {
                seconds,
                protocol: source.protocol,
                operator: source.operator.clone(),
                file: source.file.clone(),
            }),
            Err(reason) => self.skip(source, ViewKind::Startup, reason),
        }
    }
}

/// `(start, duration)` of each stall, in seconds. A session without stalls is
/// complete data, not a skip.
fn stalls(m: &PlaybackMetrics, origin: Option<f64>) -> Result<Vec<(i64, f64)>, String> {
    let starts = m.stall_start_time.numbers("stallStartTime")?;
    let durations = m.stall_duration.numbers("stallDuration")?;
    if starts.len() != durations.len() {
        return Err(format!(
            "stallDuration has {} entries but stallStartTime has {}",
            durations.len(),
            starts.len()
        ));
    }
    if starts.is_empty() {
        return Ok(Vec::new());
    }
    let origin = origin.ok_or_else(|| "currentTime has no usable first sample".to_string())?;
    Ok(starts
        .into_iter()
        .zip(durations)
        .map(|(start, duration)| (seconds_since(origin, start), duration / 1000.0))
        .collect())
}

/// Seconds from `fetchStart` to the first playable sample
fn startup_seconds(record: &ResultRecord) -> Result<f64, String> {
    let m = &record.metrics;
    let times = m.current_time.numbers("currentTime")?;
    let can_play = m
        .can_play
        .as_array()
        .ok_or_else(|| "canPlay is not an array".to_string())?;
    aligned(&[("currentTime", times.len()), ("canPlay", can_play.len())])?;
    let timing = record
        .timing
        .ok_or_else(|| "no usable navigation timing".to_string())?;
    let first = record
        .first_playable()
        .ok_or_else(|| "never became playable".to_string())?;
    Ok((times[first] - timing.fetch_start) / 1000.0)
}

/// Distinct resolutions in ascending order of area
#[must_use]
pub fn resolution_categories(rows: &[ResolutionRow]) -> Vec<String> {
    let mut seen: Vec<(f64, String)> = Vec::new();
    for row in rows {
        let label = row.label();
        if !seen.iter().any(|(_, l)| *l == label) {
            seen.push((row.area(), label));
        }
    }
    seen.sort_by(|a, b| a.0.total_cmp(&b.0));
    seen.into_iter().map(|(_, l)| l).collect()
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::{resolution_categories, ResolutionRow, Source, ViewBuilder, ViewKind};
    use crate::protocol::Protocol;
    use crate::record::ResultRecord;

    fn source() -> Source {
        Source {
            path: "results/lab/tcp/x.json".into(),
            file: "x.json".into(),
            operator: "lab".into(),
            protocol: Protocol::Tcp,
        }
    }

    fn build(v: serde_json::Value) -> ViewBuilder {
        let mut b = ViewBuilder::default();
        b.add(&source(), &ResultRecord::from_value(v).unwrap());
        b
    }

    #[test]
    fn buffer_view_starts_at_zero() {
        let b = build(json!({
            "currentTime": [1_000_000.0, 1_001_000.0, 1_002_400.0, 1_003_600.0],
            "bufferLevel": [0.0, 1.5, 3.0, 4.5],
        }));
        let times: Vec<_> = b.views.buffer.iter().map(|r| r.time).collect();
        assert_eq!(times, vec![0, 1, 2, 4]);
        assert_eq!(b.views.buffer[3].value, 4.5);
        assert_eq!(b.views.buffer[0].operator, "lab");
    }

    #[test]
    fn mismatched_dropped_frames_are_skipped() {
        let b = build(json!({
            "currentTime": [0.0, 1000.0, 2000.0],
            "bufferLevel": [1.0, 2.0, 3.0],
            "droppedFrames": [0.0, 1.0],
        }));
        assert_eq!(b.views.buffer.len(), 3);
        assert!(b.views.dropped_frames.is_empty());
        let skip = b
            .skips
            .iter()
            .find(|s| s.view == Some(ViewKind::DroppedFrames))
            .unwrap();
        assert!(skip.reason.contains("droppedFrames has 2"));
    }

    #[test]
    fn null_sample_costs_only_its_own_view() {
        let b = build(json!({
            "chrome_metrics": {
                "currentTime": [0, 1000],
                "bufferLevel": [1.0, 2.0],
                "droppedFrames": [null, 0],
            }
        }));
        assert_eq!(b.views.buffer.len(), 2);
        assert!(b.views.dropped_frames.is_empty());
        let dropped: Vec<_> = b
            .skips
            .iter()
            .filter(|s| s.view == Some(ViewKind::DroppedFrames))
            .collect();
        assert_eq!(dropped.len(), 1);
        assert!(dropped[0].reason.contains("not a number"));
        assert!(b.skips.iter().all(|s| s.view.is_some()));
    }

    #[test]
    fn empty_record_skips_without_stall_complaint() {
        let b = build(json!({}));
        assert_eq!(b.views, super::Views::default());
        let kinds: Vec<_> = b.skips.iter().filter_map(|s| s.view).collect();
        assert_eq!(
            kinds,
            vec![
                ViewKind::Buffer,
                ViewKind::DroppedFrames,
                ViewKind::Resolution,
                ViewKind::Startup
            ]
        );
    }

    #[test]
    fn stalls_in_seconds() {
        let b = build(json!({
            "currentTime": [10_000.0, 11_000.0],
            "stallStartTime": [12_600.0, 20_000.0],
            "stallDuration": [1500.0, 250.0],
        }));
        assert_eq!(b.views.stalls.len(), 2);
        assert_eq!(b.views.stalls[0].start, 3);
        assert_eq!(b.views.stalls[0].duration, 1.5);
        assert_eq!(b.views.stalls[1].start, 10);
    }

    #[test]
    fn startup_from_fetch_start() {
        let b = build(json!({
            "chrome_metrics": {
                "currentTime": [5000.0, 6000.0, 7500.0],
                "canPlay": [false, false, true],
            },
            "chrome_performanceTiming": {"fetchStart": 4000.0},
        }));
        assert_eq!(b.views.startup.len(), 1);
        assert_eq!(b.views.startup[0].seconds, 3.5);

        let never = build(json!({
            "chrome_metrics": {"currentTime": [1.0], "canPlay": [false]},
            "chrome_performanceTiming": {"fetchStart": 0.0},
        }));
        assert!(never.views.startup.is_empty());
        assert!(never
            .skips
            .iter()
            .any(|s| s.view == Some(ViewKind::Startup) && s.reason.contains("playable")));
    }

    #[test]
    fn resolutions_ordered_by_area() {
        let b = build(json!({
            "currentTime": [0.0, 1000.0, 2000.0],
            "resWidth": [1920.0, 1280.0, 1920.0],
            "resHeight": [1080.0, 720.0, 1080.0],
        }));
        assert_eq!(b.views.resolution[0].area(), 2_073_600.0);
        assert_eq!(b.views.resolution[1].area(), 921_600.0);
        assert_eq!(
            resolution_categories(&b.views.resolution),
            vec!["1280x720", "1920x1080"]
        );
    }

    #[test]
    fn resolution_label() {
        let r = ResolutionRow {
            time: 0,
            protocol: Protocol::Tcp,
            operator: String::new(),
            file: String::new(),
            width: 640.0,
            height: 360.0,
        };
        assert_eq!(r.label(), "640x360");
    }
}
