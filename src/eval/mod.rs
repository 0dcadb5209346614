// (c) 2024 Ross Younger
//! # Offline aggregation and plotting
//!
//! Result files are found anywhere below the target directory. Two layouts are recognised:
//!
//! * `<operator>/<run>/<protocol>_<n>.json`, as written by `dashqoe experiment`;
//!   the protocol comes from the file name.
//! * `<operator>/<protocol>/<timestamp>.json`, as written by `dashqoe run`;
//!   the protocol comes from the directory name.
//!
//! In both the operator is the name of the directory two levels above the file.
//! Other JSON files are ignored.
//!
//! Each record yields up to five views. A view whose arrays are empty or of unequal
//! length is left out for that file and noted as a [`Skip`]; this is never an error.

mod export;
mod plot;
mod stats;
mod summary;
mod views;

pub use export::{write_buffer_csv, write_buffer_csv_file};
pub use stats::{bands, median, percentile, Band, Quartiles};
pub use summary::summary_table;
pub use views::{
    resolution_categories, ResolutionRow, Skip, Source, StallRow, StartupRow, TimeSeriesRow,
    ViewKind, Views,
};

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    str::FromStr as _,
};

use anyhow::{Context as _, Result};
use tracing::{debug, info, warn};

use crate::protocol::Protocol;
use crate::record::ResultRecord;
use views::ViewBuilder;

/// Name of the CSV export
pub const CSV_FILENAME: &str = "eval.csv";
/// Name of the chart
pub const PNG_FILENAME: &str = "result.png";

/// Display names for operators, in the order they should be listed.
///
/// Operators without a label keep their directory name and sort after all labelled ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperatorLabels(Vec<(String, String)>);

impl OperatorLabels {
    fn label(&self, directory: &str) -> String {
        self.0
            .iter()
            .find(|(dir, _)| dir == directory)
            .map_or_else(|| directory.to_string(), |(_, label)| label.clone())
    }

    fn rank(&self, label: &str) -> usize {
        self.0
            .iter()
            .position(|(_, l)| l == label)
            .unwrap_or(self.0.len())
    }
}

impl FromIterator<(String, String)> for OperatorLabels {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Parses `DIRECTORY=LABEL`
pub fn parse_operator_label(s: &str) -> Result<(String, String)> {
    let (dir, label) = s
        .split_once('=')
        .with_context(|| format!("{s:?} is not of the form DIRECTORY=LABEL"))?;
    anyhow::ensure!(!dir.is_empty() && !label.is_empty(), "{s:?}: empty directory or label");
    Ok((dir.to_string(), label.to_string()))
}

fn dir_name(path: Option<&Path>) -> Option<&str> {
    path?.file_name()?.to_str()
}

/// Works out where a result file came from; `None` if it isn't a result file
#[must_use]
pub fn classify(path: &Path, labels: &OperatorLabels) -> Option<Source> {
    let stem = path.file_stem()?.to_str()?;
    let parent = path.parent();
    let protocol = match Protocol::from_file_stem(stem) {
        Some((protocol, _)) => protocol,
        None => Protocol::from_str(dir_name(parent)?).ok()?,
    };
    let operator = dir_name(parent.and_then(Path::parent)).unwrap_or_default();
    Some(Source {
        path: path.to_path_buf(),
        file: path.file_name()?.to_string_lossy().into_owned(),
        operator: labels.label(operator),
        protocol,
    })
}

/// Every `.json` file below `dir`
pub fn discover(dir: &Path) -> Result<Vec<PathBuf>> {
    anyhow::ensure!(dir.is_dir(), "{} is not a directory", dir.display());
    let pattern = dir.join("**").join("*.json");
    let mut found = Vec::new();
    for entry in glob::glob(&pattern.to_string_lossy()).context("bad search pattern")? {
        match entry {
            Ok(path) => found.push(path),
            Err(e) => warn!("{e}"),
        }
    }
    Ok(found)
}

/// Everything derived from a directory of result files
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregate {
    /// Rows of every view, grouped by protocol in legend order
    pub views: Views,
    /// Views and files left out, and why
    pub skips: Vec<Skip>,
    /// Result files recognised and read
    pub files_read: usize,
    sources: Vec<Source>,
}

impl Aggregate {
    /// Number of recognised result files for a protocol
    #[must_use]
    pub fn files_for(&self, protocol: Protocol) -> usize {
        self.sources.iter().filter(|s| s.protocol == protocol).count()
    }

    /// Operators seen, in listing order
    #[must_use]
    pub fn operators(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.sources
            .iter()
            .map(|s| s.operator.as_str())
            .filter(|o| seen.insert(*o))
            .collect()
    }
}

/// Reads every result file below `dir` and derives its views
pub fn aggregate(dir: &Path, labels: &OperatorLabels) -> Result<Aggregate> {
    let mut sources: Vec<Source> = discover(dir)?
        .into_iter()
        .filter_map(|path| {
            let source = classify(&path, labels);
            if source.is_none() {
                debug!("ignoring {}", path.display());
            }
            source
        })
        .collect();
    // Row order follows source order, which makes legend order independent of discovery order
    sources.sort_by(|a, b| {
        (a.protocol, labels.rank(&a.operator), &a.operator, &a.path).cmp(&(
            b.protocol,
            labels.rank(&b.operator),
            &b.operator,
            &b.path,
        ))
    });

    let mut builder = ViewBuilder::default();
    let mut read = Vec::with_capacity(sources.len());
    for source in sources {
        match ResultRecord::load(&source.path) {
            Ok(record) => {
                builder.add(&source, &record);
                read.push(source);
            }
            Err(e) => builder.unreadable(source.path.clone(), format!("{e:#}")),
        }
    }
    Ok(Aggregate {
        views: builder.views,
        skips: builder.skips,
        files_read: read.len(),
        sources: read,
    })
}

/// What [`evaluate`] produced
#[derive(Debug)]
pub struct Report {
    /// The aggregated data
    pub aggregate: Aggregate,
    /// The CSV export
    pub csv: PathBuf,
    /// The chart, unless there was nothing to plot
    pub png: Option<PathBuf>,
}

/// Aggregates `dir`, writing the CSV export and the chart into `output_dir`.
///
/// With no usable data the CSV holds only its header and no chart is drawn.
pub fn evaluate(dir: &Path, output_dir: &Path, labels: &OperatorLabels) -> Result<Report> {
    let aggregate = aggregate(dir, labels)?;
    info!(
        "read {} result file(s); {} view(s) skipped",
        aggregate.files_read,
        aggregate.skips.len()
    );
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;

    let csv = output_dir.join(CSV_FILENAME);
    write_buffer_csv_file(&csv, &aggregate.views.buffer)?;

    let png = if aggregate.views == Views::default() {
        warn!("no usable data; not drawing {PNG_FILENAME}");
        None
    } else {
        let path = output_dir.join(PNG_FILENAME);
        plot::render(&path, &aggregate).with_context(|| format!("drawing {}", path.display()))?;
        Some(path)
    };
    Ok(Report {
        aggregate,
        csv,
        png,
    })
}

#[cfg(test)]
mod test {
    use std::path::{Path, PathBuf};

    use assertables::assert_contains;
    use serde_json::json;

    use super::{aggregate, classify, evaluate, parse_operator_label, OperatorLabels, ViewKind};
    use crate::protocol::Protocol;

    fn write(root: &Path, rel: &str, v: &serde_json::Value) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_vec(v).unwrap()).unwrap();
    }

    fn complete(level: f64) -> serde_json::Value {
        json!({
            "chrome_metrics": {
                "currentTime": [1000.0, 2000.0],
                "bufferLevel": [level, level],
                "droppedFrames": [0, 0],
                "resWidth": [1280, 1920],
                "resHeight": [720, 1080],
                "canPlay": [true, true],
                "stallStartTime": [],
                "stallDuration": [],
            },
            "chrome_performanceTiming": {"fetchStart": 500.0},
        })
    }

    #[test]
    fn classify_layouts() {
        let labels = OperatorLabels::default();
        let s = classify(Path::new("r/starlink/20240101-000000/quic-cr_2.json"), &labels).unwrap();
        assert_eq!(s.protocol, Protocol::QuicCarefulResume);
        assert_eq!(s.operator, "starlink");
        assert_eq!(s.file, "quic-cr_2.json");

        let s = classify(Path::new("r/telekom5g/quic/20240622-130543.json"), &labels).unwrap();
        assert_eq!(s.protocol, Protocol::QuicHystart);
        assert_eq!(s.operator, "telekom5g");

        assert!(classify(Path::new("r/lab/misc/notes.json"), &labels).is_none());
        assert!(classify(Path::new("quic-cr_2.json"), &labels).is_some());
    }

    #[test]
    fn operator_labels() {
        let labels: OperatorLabels = [
            parse_operator_label("op9020starlink=Starlink").unwrap(),
            parse_operator_label("telekom5g=Telekom5G").unwrap(),
        ]
        .into_iter()
        .collect();
        let s = classify(Path::new("r/op9020starlink/tcp/x.json"), &labels).unwrap();
        assert_eq!(s.operator, "Starlink");
        assert_eq!(labels.rank("Starlink"), 0);
        assert_eq!(labels.rank("Telekom5G"), 1);
        assert_eq!(labels.rank("other"), 2);
        assert!(parse_operator_label("novalue").is_err());
        assert!(parse_operator_label("=x").is_err());
    }

    #[test]
    fn protocol_order_is_fixed() {
        let dir = tempfile::tempdir().unwrap();
        // created in reverse legend order
        write(dir.path(), "lab/run/quic-cr_0.json", &complete(3.0));
        write(dir.path(), "lab/run/quic-hystart_0.json", &complete(2.0));
        write(dir.path(), "lab/run/tcp_0.json", &complete(1.0));
        let agg = aggregate(dir.path(), &OperatorLabels::default()).unwrap();
        assert_eq!(agg.files_read, 3);
        let order: Vec<Protocol> = agg.views.buffer.iter().map(|r| r.protocol).collect();
        assert_eq!(
            order,
            vec![
                Protocol::Tcp,
                Protocol::Tcp,
                Protocol::QuicHystart,
                Protocol::QuicHystart,
                Protocol::QuicCarefulResume,
                Protocol::QuicCarefulResume
            ]
        );
        assert_eq!(agg.views.startup[0].seconds, 0.5);
        assert!(agg.skips.is_empty());
        assert_eq!(agg.operators(), vec!["lab"]);
        assert_eq!(agg.files_for(Protocol::QuicHystart), 1);
    }

    #[test]
    fn unreadable_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "lab/run/tcp_0.json", &complete(1.0));
        let broken = dir.path().join("lab/run/tcp_1.json");
        std::fs::write(&broken, "{ not json").unwrap();
        write(dir.path(), "lab/run/tcp_2.json", &json!({"chrome_metrics": {"currentTime": [1.0]}}));

        let agg = aggregate(dir.path(), &OperatorLabels::default()).unwrap();
        assert_eq!(agg.files_read, 2);
        let whole: Vec<&PathBuf> = agg
            .skips
            .iter()
            .filter(|s| s.view.is_none())
            .map(|s| &s.file)
            .collect();
        assert_eq!(whole, vec![&broken]);
        assert!(agg
            .skips
            .iter()
            .any(|s| s.view == Some(ViewKind::Buffer) && s.reason.contains("bufferLevel")));
    }

    #[test]
    fn null_sample_keeps_the_file() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "lab/run/tcp_0.json",
            &json!({"chrome_metrics": {
                "currentTime": [0, 1000],
                "bufferLevel": [1.0, 2.0],
                "droppedFrames": [null, 0],
            }}),
        );
        let agg = aggregate(dir.path(), &OperatorLabels::default()).unwrap();
        assert_eq!(agg.files_read, 1);
        assert_eq!(agg.views.buffer.len(), 2);
        assert!(agg.skips.iter().all(|s| s.view.is_some()));
        assert_eq!(
            agg.skips
                .iter()
                .filter(|s| s.view == Some(ViewKind::DroppedFrames))
                .count(),
            1
        );
    }

    #[test]
    fn draws_the_chart() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "lab/run/tcp_0.json", &complete(1.0));
        write(dir.path(), "lab/run/tcp_1.json", &complete(1.5));
        let mut stalled = complete(2.0);
        stalled["chrome_metrics"]["stallStartTime"] = json!([1500.0]);
        stalled["chrome_metrics"]["stallDuration"] = json!([800.0]);
        write(dir.path(), "lab/run/quic-cr_0.json", &stalled);
        let out = tempfile::tempdir().unwrap();

        let report = evaluate(dir.path(), out.path(), &OperatorLabels::default()).unwrap();
        let png = report.png.unwrap();
        assert_eq!(png, out.path().join(super::PNG_FILENAME));
        assert!(std::fs::metadata(&png).unwrap().len() > 0);
        let csv = std::fs::read_to_string(report.csv).unwrap();
        assert_eq!(csv.lines().count(), 1 + 6);
        assert_eq!(report.aggregate.views.stalls.len(), 1);
    }

    #[test]
    fn empty_directory_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let report = evaluate(dir.path(), out.path(), &OperatorLabels::default()).unwrap();
        assert_eq!(report.aggregate.files_read, 0);
        assert!(report.png.is_none());
        let csv = std::fs::read_to_string(report.csv).unwrap();
        assert_eq!(csv, "time,operator,protocol,file,bufferLevel\n");
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = aggregate(&dir.path().join("absent"), &OperatorLabels::default()).unwrap_err();
        assert_contains!(err.to_string(), "not a directory");
    }
}
