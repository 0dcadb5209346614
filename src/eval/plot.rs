// Multi-panel comparison chart
// (c) 2024 Ross Younger

use std::path::Path;

use anyhow::Result;
use plotters::coord::{
    cartesian::Cartesian2d,
    types::{RangedCoordf64, RangedCoordi64},
    Shift,
};
use plotters::prelude::*;

use super::stats::{bands, Quartiles};
use super::views::{resolution_categories, Views};
use super::Aggregate;
use crate::protocol::Protocol;

const SIZE: (u32, u32) = (1600, 1500);
const CAPTION_FONT: (&str, u32) = ("sans-serif", 24);
const X_DESC: &str = "Duration [s]";

type Area<'a> = DrawingArea<BitMapBackend<'a>, Shift>;
type SeriesChart<'a, 'b> =
    ChartContext<'a, BitMapBackend<'b>, Cartesian2d<RangedCoordi64, RangedCoordf64>>;

fn colour(protocol: Protocol) -> RGBColor {
    match protocol {
        Protocol::Tcp => BLUE,
        Protocol::QuicHystart => RED,
        Protocol::QuicCarefulResume => GREEN,
    }
}

/// `(protocol, time, value)`
type Sample = (Protocol, i64, f64);

fn time_range(samples: &[Sample]) -> std::ops::Range<i64> {
    let max = samples.iter().map(|s| s.1).max().unwrap_or(0);
    0..max.max(1)
}

fn value_ceiling(values: impl Iterator<Item = f64>) -> f64 {
    let max = values.fold(0.0, f64::max);
    if max > 0.0 {
        max * 1.05
    } else {
        1.0
    }
}

/// Median line and interquartile band for each protocol
fn draw_bands<'a>(chart: &mut SeriesChart<'a, 'a>, samples: &[Sample]) -> Result<()> {
    for protocol in Protocol::ALL {
        let bands = bands(
            samples
                .iter()
                .filter(|s| s.0 == protocol)
                .map(|s| (s.1, s.2)),
        );
        if bands.is_empty() {
            continue;
        }
        let colour = colour(protocol);
        let outline: Vec<(i64, f64)> = bands
            .iter()
            .map(|b| (b.time, b.quartiles.high))
            .chain(bands.iter().rev().map(|b| (b.time, b.quartiles.low)))
            .collect();
        let _ = chart.draw_series(std::iter::once(Polygon::new(
            outline,
            colour.mix(0.2).filled(),
        )))?;
        chart
            .draw_series(LineSeries::new(
                bands.iter().map(|b| (b.time, b.quartiles.median)),
                colour.stroke_width(2),
            ))?
            .label(protocol.to_string())
            .legend(move |(x, y)| PathElement::new([(x, y), (x + 20, y)], colour));
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    Ok(())
}

fn series_panel(area: &Area<'_>, caption: &str, y_desc: &str, samples: &[Sample]) -> Result<()> {
    let mut chart = ChartBuilder::on(area)
        .caption(caption, CAPTION_FONT)
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(
            time_range(samples),
            0f64..value_ceiling(samples.iter().map(|s| s.2)),
        )?;
    chart
        .configure_mesh()
        .x_desc(X_DESC)
        .y_desc(y_desc)
        .draw()?;
    draw_bands(&mut chart, samples)
}

/// Resolution is categorical; its axis is ordered by pixel area
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn resolution_panel(area: &Area<'_>, views: &Views) -> Result<()> {
    let categories = resolution_categories(&views.resolution);
    let samples: Vec<Sample> = views
        .resolution
        .iter()
        .map(|r| {
            let label = r.label();
            let rank = categories.iter().position(|c| *c == label).unwrap_or(0);
            (r.protocol, r.time, rank as f64)
        })
        .collect();
    let top = categories.len().max(1) as f64 - 0.5;
    let label_for = |y: &f64| {
        let nearest = y.round();
        if (y - nearest).abs() < 0.01 && nearest >= 0.0 {
            categories
                .get(nearest as usize)
                .cloned()
                .unwrap_or_default()
        } else {
            String::new()
        }
    };

    let mut chart = ChartBuilder::on(area)
        .caption("Resolution", CAPTION_FONT)
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(90)
        .build_cartesian_2d(time_range(&samples), -0.5f64..top)?;
    chart
        .configure_mesh()
        .x_desc(X_DESC)
        .y_labels(categories.len() * 2 + 1)
        .y_label_formatter(&label_for)
        .draw()?;
    draw_bands(&mut chart, &samples)
}

fn stall_panel(area: &Area<'_>, views: &Views) -> Result<()> {
    let max_start = views.stalls.iter().map(|s| s.start).max().unwrap_or(0).max(1);
    let mut chart = ChartBuilder::on(area)
        .caption("Stalls", CAPTION_FONT)
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(
            0..max_start,
            0f64..value_ceiling(views.stalls.iter().map(|s| s.duration)),
        )?;
    chart
        .configure_mesh()
        .x_desc("Stall start [s]")
        .y_desc("Stall duration [s]")
        .draw()?;
    for protocol in Protocol::ALL {
        let colour = colour(protocol);
        let points: Vec<_> = views
            .stalls
            .iter()
            .filter(|s| s.protocol == protocol)
            .map(|s| Circle::new((s.start, s.duration), 4, colour.filled()))
            .collect();
        if points.is_empty() {
            continue;
        }
        chart
            .draw_series(points)?
            .label(protocol.to_string())
            .legend(move |(x, y)| Circle::new((x + 10, y), 4, colour.filled()));
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    Ok(())
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn startup_panel(area: &Area<'_>, views: &Views) -> Result<()> {
    let label_for = |x: &f64| {
        let nearest = x.round();
        if (x - nearest).abs() < 0.01 && nearest >= 0.0 {
            Protocol::ALL
                .get(nearest as usize)
                .map(ToString::to_string)
                .unwrap_or_default()
        } else {
            String::new()
        }
    };
    let mut chart = ChartBuilder::on(area)
        .caption("Time to first playable frame", CAPTION_FONT)
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(
            -0.5f64..(Protocol::ALL.len() as f64 - 0.5),
            0f64..value_ceiling(views.startup.iter().map(|s| s.seconds)),
        )?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(Protocol::ALL.len() * 2 + 1)
        .x_label_formatter(&label_for)
        .y_desc("Start-up [s]")
        .draw()?;

    for (i, protocol) in Protocol::ALL.into_iter().enumerate() {
        let values: Vec<f64> = views
            .startup
            .iter()
            .filter(|s| s.protocol == protocol)
            .map(|s| s.seconds)
            .collect();
        let lowest = values.iter().copied().fold(f64::INFINITY, f64::min);
        let highest = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let Some(q) = Quartiles::of(values) else {
            continue;
        };
        let colour = colour(protocol);
        let x = i as f64;
        let _ = chart.draw_series(std::iter::once(Rectangle::new(
            [(x - 0.25, q.low), (x + 0.25, q.high)],
            colour.mix(0.3).filled(),
        )))?;
        let _ = chart.draw_series([
            PathElement::new(vec![(x - 0.25, q.median), (x + 0.25, q.median)], colour.stroke_width(2)),
            PathElement::new(vec![(x, lowest), (x, q.low)], colour.stroke_width(1)),
            PathElement::new(vec![(x, q.high), (x, highest)], colour.stroke_width(1)),
        ])?;
    }
    Ok(())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn notes_panel(area: &Area<'_>, aggregate: &Aggregate) -> Result<()> {
    let area = area.titled("Sessions", CAPTION_FONT)?;
    let mut lines: Vec<(String, RGBColor)> = Protocol::ALL
        .into_iter()
        .map(|p| {
            let files = aggregate.files_for(p);
            (format!("{p}: {files} file(s)"), colour(p))
        })
        .collect();
    lines.push((
        format!(
            "{} file(s) read, {} view(s) skipped",
            aggregate.files_read,
            aggregate.skips.len()
        ),
        BLACK,
    ));
    for (i, (text, colour)) in lines.into_iter().enumerate() {
        area.draw(&Text::new(
            text,
            (30, 30 + 32 * i as i32),
            ("sans-serif", 20).into_font().color(&colour),
        ))?;
    }
    Ok(())
}

/// Draws every view into one PNG, three rows by two columns
pub fn render(path: &Path, aggregate: &Aggregate) -> Result<()> {
    let views = &aggregate.views;
    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((3, 2));

    let buffer: Vec<Sample> = views
        .buffer
        .iter()
        .map(|r| (r.protocol, r.time, r.value))
        .collect();
    series_panel(&panels[0], "Buffer level", "Buffer level [s]", &buffer)?;
    let dropped: Vec<Sample> = views
        .dropped_frames
        .iter()
        .map(|r| (r.protocol, r.time, r.value))
        .collect();
    series_panel(&panels[1], "Dropped frames", "Dropped frames", &dropped)?;
    resolution_panel(&panels[2], views)?;
    stall_panel(&panels[3], views)?;
    startup_panel(&panels[4], views)?;
    notes_panel(&panels[5], aggregate)?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::{time_range, value_ceiling};
    use crate::protocol::Protocol;

    #[test]
    fn ranges_never_degenerate() {
        assert_eq!(time_range(&[]), 0..1);
        assert_eq!(time_range(&[(Protocol::Tcp, 12, 0.0)]), 0..12);
        assert_eq!(value_ceiling(std::iter::empty()), 1.0);
        assert!((value_ceiling([2.0, 4.0].into_iter()) - 4.2).abs() < 1e-9);
    }
}
