//! Time-series annotation: merges a normalized price grid with the
//! transaction log into one plot-ready frame.

use chrono::NaiveDateTime;

use super::error::AutotraderError;
use super::experiment::Experiment;
use super::ohlcv::{Granularity, PriceBar};
use super::price_series::{normalize, NormalizedBar, MAX_INTERPOLATED_GAP};
use super::transaction::{format_timestamp, Action};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnotateOptions {
    pub granularity: Granularity,
    pub max_gap: usize,
}

impl Default for AnnotateOptions {
    fn default() -> Self {
        Self {
            granularity: Granularity::M1,
            max_gap: MAX_INTERPOLATED_GAP,
        }
    }
}

/// A grid bar plus transaction markers. Percentages are fractions of the
/// capital deployed at the matching open (0.05 is 5%).
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedRow {
    pub bar: NormalizedBar,
    pub opening: Option<f64>,
    pub closing: Option<f64>,
    pub transaction_value: Option<f64>,
    pub transaction_value_pct: Option<f64>,
    pub positive_transaction: Option<f64>,
    pub negative_transaction: Option<f64>,
    pub buy_plot: Option<f64>,
    pub sell_plot: Option<f64>,
}

impl AnnotatedRow {
    fn unmarked(bar: NormalizedBar) -> Self {
        Self {
            bar,
            opening: None,
            closing: None,
            transaction_value: None,
            transaction_value_pct: None,
            positive_transaction: None,
            negative_transaction: None,
            buy_plot: None,
            sell_plot: None,
        }
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.bar.timestamp
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotatedFrame {
    pub rows: Vec<AnnotatedRow>,
}

impl AnnotatedFrame {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn transaction_values_pct(&self) -> Vec<f64> {
        self.rows.iter().filter_map(|r| r.transaction_value_pct).collect()
    }
}

pub fn annotate(experiment: &Experiment, prices: &[PriceBar]) -> Result<AnnotatedFrame, AutotraderError> {
    annotate_with(experiment, prices, AnnotateOptions::default())
}

pub fn annotate_with(
    experiment: &Experiment,
    prices: &[PriceBar],
    options: AnnotateOptions,
) -> Result<AnnotatedFrame, AutotraderError> {
    experiment.ensure_analyzable()?;

    if prices.is_empty() {
        return Err(AutotraderError::NoPriceData {
            instrument: experiment.execution.instrument.clone(),
            start: format_timestamp(experiment.start),
            end: format_timestamp(experiment.end),
        });
    }

    let grid = normalize(prices, options.granularity, options.max_gap);
    let transactions = experiment.transactions.by_timestamp()?;

    // Single open-cost slot: a second buy before a sell replaces it, and a
    // sell leaves it in place.
    let mut open_cost: Option<f64> = None;
    let mut awaiting_close = false;
    let mut matched = 0usize;
    let mut rows = Vec::with_capacity(grid.len());

    for bar in grid {
        let mut row = AnnotatedRow::unmarked(bar);
        let Some(transaction) = transactions.get(&row.bar.timestamp) else {
            rows.push(row);
            continue;
        };
        matched += 1;

        match transaction.action {
            Action::Buy => {
                row.opening = Some(transaction.volume);
                if let (true, Some(previous)) = (awaiting_close, open_cost) {
                    tracing::warn!(
                        experiment = %experiment.name,
                        at = %row.bar.timestamp,
                        previous,
                        "buy while a position is open; pending open cost overwritten"
                    );
                }
                open_cost = Some(transaction.notional());
                awaiting_close = true;
            }
            Action::Sell => {
                row.closing = Some(transaction.volume);
                let cost = open_cost.ok_or_else(|| AutotraderError::SellWithoutOpen {
                    timestamp: format_timestamp(row.bar.timestamp),
                })?;
                awaiting_close = false;
                let value = -(transaction.price * transaction.signed_volume()) - cost;
                let pct = value / cost;
                row.transaction_value = Some(value);
                row.transaction_value_pct = Some(pct);
                if value <= 0.0 {
                    row.negative_transaction = Some(pct);
                } else {
                    row.positive_transaction = Some(pct);
                }
            }
        }

        row.buy_plot = marker_at_close(row.opening, row.bar.close);
        row.sell_plot = marker_at_close(row.closing, row.bar.close);
        rows.push(row);
    }

    let skipped = transactions.len() - matched;
    if skipped > 0 {
        tracing::warn!(
            experiment = %experiment.name,
            skipped,
            "transactions without a matching price bar were not annotated"
        );
    }

    Ok(AnnotatedFrame { rows })
}

/// `(volume / volume) × close`: the close price where a non-zero marker sits.
fn marker_at_close(volume: Option<f64>, close: Option<f64>) -> Option<f64> {
    volume.filter(|v| *v != 0.0).and(close)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use crate::domain::experiment::{AgentConfig, ExecutionSummary, Failure};
    use crate::domain::transaction::{parse_timestamp, Transaction, TransactionLog};
    use chrono::Duration;

    fn t0() -> NaiveDateTime {
        parse_timestamp("2022-05-02 14:30:00").unwrap()
    }

    fn bars(closes: &[f64]) -> Vec<PriceBar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PriceBar {
                timestamp: t0() + Duration::minutes(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1.0,
            })
            .collect()
    }

    fn experiment(entries: Vec<(i64, Action, f64, f64)>) -> Experiment {
        let mut log = TransactionLog::new();
        for (minute, action, price, volume) in entries {
            log.insert(
                t0() + Duration::minutes(minute),
                Transaction {
                    action,
                    price,
                    volume,
                    reasons: vec![],
                },
            );
        }
        Experiment {
            name: "exp".into(),
            start: t0(),
            end: t0() + Duration::hours(1),
            execution: ExecutionSummary {
                instrument: "SPX500_USD".into(),
                initial_capital: 10_000.0,
                final_capital: 10_000.0,
                initial_stocks: 0.0,
                final_stocks: 0.0,
                final_bid_price: 100.0,
            },
            agent: AgentConfig::default(),
            transactions: log,
            failure: Failure::default(),
        }
    }

    #[test]
    fn marks_open_and_close() {
        let exp = experiment(vec![
            (1, Action::Buy, 100.0, 10.0),
            (3, Action::Sell, 110.0, -10.0),
        ]);
        let frame = annotate(&exp, &bars(&[99.0, 100.0, 105.0, 110.0, 108.0])).unwrap();
        assert_eq!(frame.len(), 5);

        let open = &frame.rows[1];
        assert_eq!(open.opening, Some(10.0));
        assert_eq!(open.buy_plot, Some(100.0));
        assert!(open.transaction_value.is_none());

        let close = &frame.rows[3];
        assert_eq!(close.closing, Some(-10.0));
        assert_eq!(close.sell_plot, Some(110.0));
        assert_abs_diff_eq!(close.transaction_value.unwrap(), 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(close.transaction_value_pct.unwrap(), 0.1, epsilon = 1e-9);
        assert_abs_diff_eq!(close.positive_transaction.unwrap(), 0.1, epsilon = 1e-9);
        assert!(close.negative_transaction.is_none());

        assert!(frame.rows[0].opening.is_none() && frame.rows[0].buy_plot.is_none());
    }

    #[test]
    fn positive_sell_volume_is_treated_as_a_close() {
        let exp = experiment(vec![
            (0, Action::Buy, 100.0, 10.0),
            (1, Action::Sell, 110.0, 10.0),
        ]);
        let frame = annotate(&exp, &bars(&[100.0, 110.0])).unwrap();
        assert_abs_diff_eq!(frame.rows[1].transaction_value.unwrap(), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn zero_value_counts_as_negative() {
        let exp = experiment(vec![
            (0, Action::Buy, 100.0, 1.0),
            (1, Action::Sell, 100.0, -1.0),
        ]);
        let frame = annotate(&exp, &bars(&[100.0, 100.0])).unwrap();
        let row = &frame.rows[1];
        assert_eq!(row.negative_transaction, Some(0.0));
        assert!(row.positive_transaction.is_none());
    }

    #[test]
    fn second_buy_overwrites_pending_cost() {
        let exp = experiment(vec![
            (0, Action::Buy, 100.0, 1.0),
            (1, Action::Buy, 200.0, 1.0),
            (2, Action::Sell, 210.0, -1.0),
        ]);
        let frame = annotate(&exp, &bars(&[100.0, 200.0, 210.0])).unwrap();
        let row = &frame.rows[2];
        assert_abs_diff_eq!(row.transaction_value.unwrap(), 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(row.transaction_value_pct.unwrap(), 0.05, epsilon = 1e-9);
    }

    #[test]
    fn sell_without_open_is_an_error() {
        let exp = experiment(vec![(0, Action::Sell, 100.0, -1.0)]);
        assert!(matches!(
            annotate(&exp, &bars(&[100.0])),
            Err(AutotraderError::SellWithoutOpen { .. })
        ));
    }

    #[test]
    fn empty_prices_are_an_error() {
        let exp = experiment(vec![]);
        assert!(matches!(
            annotate(&exp, &[]),
            Err(AutotraderError::NoPriceData { .. })
        ));
    }

    #[test]
    fn transaction_outside_range_is_skipped() {
        let exp = experiment(vec![(30, Action::Buy, 100.0, 1.0)]);
        let frame = annotate(&exp, &bars(&[100.0, 101.0])).unwrap();
        assert!(frame.rows.iter().all(|r| r.opening.is_none()));
    }

    #[test]
    fn transaction_on_missing_gap_keeps_marker_but_no_plot() {
        let mut prices = bars(&[100.0]);
        prices.push(PriceBar {
            timestamp: t0() + Duration::minutes(8),
            open: 108.0,
            high: 108.0,
            low: 108.0,
            close: 108.0,
            volume: 1.0,
        });
        let exp = experiment(vec![(4, Action::Buy, 104.0, 1.0)]);
        let frame = annotate(&exp, &prices).unwrap();
        assert_eq!(frame.len(), 9);
        let row = &frame.rows[4];
        assert!(row.bar.is_missing());
        assert_eq!(row.opening, Some(1.0));
        assert!(row.buy_plot.is_none());
    }

    #[test]
    fn zero_volume_marker_has_no_plot_point() {
        assert_eq!(marker_at_close(Some(0.0), Some(10.0)), None);
        assert_eq!(marker_at_close(Some(-2.0), Some(10.0)), Some(10.0));
        assert_eq!(marker_at_close(None, Some(10.0)), None);
    }

    #[test]
    fn annotation_is_deterministic() {
        let exp = experiment(vec![
            (0, Action::Buy, 100.0, 1.0),
            (2, Action::Sell, 103.0, -1.0),
        ]);
        let prices = bars(&[100.0, 101.0, 103.0]);
        assert_eq!(annotate(&exp, &prices).unwrap(), annotate(&exp, &prices).unwrap());
    }
}
