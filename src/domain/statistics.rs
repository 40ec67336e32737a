//! Aggregate statistics over an annotated frame.

use super::annotate::AnnotatedFrame;

/// count / mean / std / min / quartiles / max over a set of values.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; `None` below two values.
    pub std: Option<f64>,
    pub min: f64,
    pub q25: f64,
    pub q50: f64,
    pub q75: f64,
    pub max: f64,
}

impl Distribution {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;
        let std = (n > 1).then(|| {
            let ss: f64 = sorted.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (n - 1) as f64).sqrt()
        });

        Some(Distribution {
            count: n,
            mean,
            std,
            min: sorted[0],
            q25: quantile(&sorted, 0.25),
            q50: quantile(&sorted, 0.50),
            q75: quantile(&sorted, 0.75),
            max: sorted[n - 1],
        })
    }
}

/// Linear-interpolated quantile of an ascending, non-empty slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionReport {
    pub opening_count: usize,
    pub closing_count: usize,
    /// Positive closes over all closes, ×100. `None` when nothing closed.
    pub positive_ratio: Option<f64>,
    pub distribution: Option<Distribution>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Summary {
    /// No position was opened; shown as information, not as a failure.
    NoTransactions,
    Report(TransactionReport),
}

pub fn summarize(frame: &AnnotatedFrame) -> Summary {
    let opening_count = frame.rows.iter().filter(|r| r.opening.is_some()).count();
    if opening_count == 0 {
        return Summary::NoTransactions;
    }

    let returns = frame.transaction_values_pct();
    let positive = frame
        .rows
        .iter()
        .filter(|r| r.positive_transaction.is_some())
        .count();

    let positive_ratio = if returns.is_empty() {
        None
    } else {
        Some(positive as f64 / returns.len() as f64 * 100.0)
    };

    Summary::Report(TransactionReport {
        opening_count,
        closing_count: frame.rows.iter().filter(|r| r.closing.is_some()).count(),
        positive_ratio,
        distribution: Distribution::from_values(&returns),
    })
}
