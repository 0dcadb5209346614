// Per-protocol summary table
// (c) 2024 Ross Younger

use std::collections::BTreeSet;

use tabled::{settings::style::Style, Table, Tabled};

use super::{stats::median, views::Views};
use crate::protocol::Protocol;

#[derive(Tabled, Debug, Clone, PartialEq)]
struct SummaryRow {
    protocol: String,
    files: usize,
    #[tabled(rename = "median start-up (s)")]
    startup: String,
    stalls: usize,
    #[tabled(rename = "median stall (s)")]
    stall: String,
}

fn seconds(v: Option<f64>) -> String {
    v.map_or_else(|| "-".into(), |s| format!("{s:.2}"))
}

fn summary_rows(views: &Views) -> Vec<SummaryRow> {
    Protocol::ALL
        .into_iter()
        .filter_map(|protocol| {
            let files: BTreeSet<&str> = views
                .buffer
                .iter()
                .filter(|r| r.protocol == protocol)
                .map(|r| r.file.as_str())
                .chain(
                    views
                        .startup
                        .iter()
                        .filter(|r| r.protocol == protocol)
                        .map(|r| r.file.as_str()),
                )
                .collect();
            if files.is_empty() {
                return None;
            }
            let stalls: Vec<f64> = views
                .stalls
                .iter()
                .filter(|r| r.protocol == protocol)
                .map(|r| r.duration)
                .collect();
            Some(SummaryRow {
                protocol: protocol.to_string(),
                files: files.len(),
                startup: seconds(median(
                    views
                        .startup
                        .iter()
                        .filter(|r| r.protocol == protocol)
                        .map(|r| r.seconds),
                )),
                stalls: stalls.len(),
                stall: seconds(median(stalls)),
            })
        })
        .collect()
}

/// Renders the per-protocol summary
#[must_use]
pub fn summary_table(views: &Views) -> String {
    Table::new(summary_rows(views))
        .with(Style::sharp())
        .to_string()
}
