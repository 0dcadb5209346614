// Summary statistics for the charts and the summary table
// (c) 2024 Ross Younger

use std::collections::BTreeMap;

/// Percentile `q` (0..=1) of sorted data, interpolating linearly between samples
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Lower quartile, median, upper quartile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quartiles {
    /// 25th percentile
    pub low: f64,
    /// 50th percentile
    pub median: f64,
    /// 75th percentile
    pub high: f64,
}

impl Quartiles {
    /// Computes the quartiles of unsorted data; `None` if there is none
    #[must_use]
    pub fn of(mut values: Vec<f64>) -> Option<Self> {
        values.sort_by(f64::total_cmp);
        Some(Self {
            low: percentile(&values, 0.25)?,
            median: percentile(&values, 0.5)?,
            high: percentile(&values, 0.75)?,
        })
    }
}

/// Median with an interquartile band, at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    /// Whole seconds
    pub time: i64,
    /// Spread of the samples at this instant
    pub quartiles: Quartiles,
}

/// Groups samples by time and summarises each group
pub fn bands<I>(samples: I) -> Vec<Band>
where
    I: IntoIterator<Item = (i64, f64)>,
{
    let mut by_time = BTreeMap::<i64, Vec<f64>>::new();
    for (time, value) in samples {
        by_time.entry(time).or_default().push(value);
    }
    by_time
        .into_iter()
        .filter_map(|(time, values)| Quartiles::of(values).map(|quartiles| Band { time, quartiles }))
        .collect()
}

/// Median of unsorted data
#[must_use]
pub fn median(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let mut v: Vec<f64> = values.into_iter().collect();
    v.sort_by(f64::total_cmp);
    percentile(&v, 0.5)
}

#[cfg(test)]
mod test {
    use super::{bands, median, percentile, Quartiles};

    #[test]
    fn interpolates() {
        let data = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&data, 0.0), Some(1.0));
        assert_eq!(percentile(&data, 1.0), Some(4.0));
        assert_eq!(percentile(&data, 0.5), Some(2.5));
        assert_eq!(percentile(&data, 0.25), Some(1.75));
        assert_eq!(percentile(&[], 0.5), None);
        assert_eq!(percentile(&[7.0], 0.9), Some(7.0));
    }

    #[test]
    fn quartiles_sort_first() {
        let q = Quartiles::of(vec![5.0, 1.0, 3.0]).unwrap();
        assert_eq!(q.low, 2.0);
        assert_eq!(q.median, 3.0);
        assert_eq!(q.high, 4.0);
        assert!(Quartiles::of(Vec::new()).is_none());
    }

    #[test]
    fn grouped_by_time() {
        let b = bands([(1, 10.0), (0, 1.0), (1, 20.0), (0, 3.0), (1, 30.0)]);
        assert_eq!(b.len(), 2);
        assert_eq!(b[0].time, 0);
        assert_eq!(b[0].quartiles.median, 2.0);
        assert_eq!(b[1].time, 1);
        assert_eq!(b[1].quartiles.median, 20.0);
        assert_eq!(b[1].quartiles.low, 15.0);
    }

    #[test]
    fn median_of_nothing() {
        assert_eq!(median([]), None);
        assert_eq!(median([3.0, 1.0]), Some(2.0));
    }
}
