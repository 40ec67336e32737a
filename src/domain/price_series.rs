//! Price series normalization onto a fixed-interval grid.
//!
//! Fetched bars are deduplicated (first occurrence wins), laid onto a strict
//! grid spanning the observed range, and short gaps are filled by linear
//! interpolation. Gaps longer than the limit stay missing end to end.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;

use super::ohlcv::{Granularity, PriceBar};

/// Longest run of missing bars that is filled by interpolation.
pub const MAX_INTERPOLATED_GAP: usize = 5;

/// One grid slot. Every price field is `None` when the slot was not observed
/// and could not be interpolated.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBar {
    pub timestamp: NaiveDateTime,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

impl NormalizedBar {
    fn observed(bar: &PriceBar) -> Self {
        Self {
            timestamp: bar.timestamp,
            open: Some(bar.open),
            high: Some(bar.high),
            low: Some(bar.low),
            close: Some(bar.close),
            volume: Some(bar.volume),
        }
    }

    fn empty(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            open: None,
            high: None,
            low: None,
            close: None,
            volume: None,
        }
    }

    pub fn is_missing(&self) -> bool {
        self.close.is_none()
    }
}

/// Drops repeated timestamps, keeping the first bar seen for each.
pub fn dedup_keep_first(bars: &[PriceBar]) -> BTreeMap<NaiveDateTime, &PriceBar> {
    let mut unique = BTreeMap::new();
    for bar in bars {
        unique.entry(bar.timestamp).or_insert(bar);
    }
    unique
}

pub fn normalize(bars: &[PriceBar], granularity: Granularity, max_gap: usize) -> Vec<NormalizedBar> {
    let unique = dedup_keep_first(bars);
    let (Some(&first), Some(&last)) = (unique.keys().next(), unique.keys().next_back()) else {
        return Vec::new();
    };

    let step = granularity.step();
    let mut grid = Vec::new();
    let mut ts = first;
    while ts <= last {
        grid.push(match unique.get(&ts) {
            Some(bar) => NormalizedBar::observed(bar),
            None => NormalizedBar::empty(ts),
        });
        ts += step;
    }

    let dropped = unique.len() - grid.iter().filter(|b| !b.is_missing()).count();
    if dropped > 0 {
        tracing::debug!(dropped, granularity = %granularity, "bars off the grid were dropped");
    }

    interpolate_column(&mut grid, max_gap, |b| &mut b.open);
    interpolate_column(&mut grid, max_gap, |b| &mut b.high);
    interpolate_column(&mut grid, max_gap, |b| &mut b.low);
    interpolate_column(&mut grid, max_gap, |b| &mut b.close);
    interpolate_column(&mut grid, max_gap, |b| &mut b.volume);
    grid
}

fn interpolate_column<F>(rows: &mut [NormalizedBar], max_gap: usize, field: F)
where
    F: Fn(&mut NormalizedBar) -> &mut Option<f64>,
{
    let values: Vec<Option<f64>> = rows.iter_mut().map(|r| *field(r)).collect();
    let filled = interpolate_gaps(&values, max_gap);
    for (row, value) in rows.iter_mut().zip(filled) {
        *field(row) = value;
    }
}

/// Linear interpolation across interior runs of `None` no longer than
/// `max_gap`. Leading, trailing and over-long runs are returned untouched.
pub fn interpolate_gaps(values: &[Option<f64>], max_gap: usize) -> Vec<Option<f64>> {
    let mut out = values.to_vec();
    let mut i = 0;
    while i < out.len() {
        if out[i].is_some() {
            i += 1;
            continue;
        }
        let run_start = i;
        while i < out.len() && out[i].is_none() {
            i += 1;
        }
        let run_len = i - run_start;

        let left = run_start.checked_sub(1).and_then(|j| out[j]);
        let right = out.get(i).copied().flatten();
        if let (Some(a), Some(b)) = (left, right) {
            if run_len <= max_gap {
                let span = (run_len + 1) as f64;
                for k in 0..run_len {
                    let frac = (k + 1) as f64 / span;
                    out[run_start + k] = Some(a + (b - a) * frac);
                }
            }
        }
    }
    out
}
