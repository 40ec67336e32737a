//! Trade reconstruction: pairs buys with sells into round-trip trades.
//!
//! Pairing is positional: the i-th buy closes with the i-th sell, both in
//! time order. The log is expected to hold one position at a time.

use chrono::NaiveDateTime;

use super::error::AutotraderError;
use super::experiment::Experiment;
use super::transaction::{format_timestamp, Action, Transaction};

const VOLUME_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub open_time: NaiveDateTime,
    pub close_time: NaiveDateTime,
    pub holding_minutes: f64,
    /// Closing volume as recorded.
    pub volume: f64,
    pub open_price: f64,
    pub close_price: f64,
    pub gain: f64,
    /// Gain as a percentage of `open_price × volume`.
    pub gain_pct_deployed: f64,
    /// Gain as a percentage of the experiment's initial capital.
    pub gain_pct_initial_capital: f64,
    pub close_reasons: Vec<String>,
}

impl Trade {
    pub fn deployed_capital(&self) -> f64 {
        self.open_price * self.volume.abs()
    }
}

pub fn reconstruct_trades(experiment: &Experiment) -> Result<Vec<Trade>, AutotraderError> {
    experiment.ensure_analyzable()?;

    let events = experiment.transactions.chronological()?;
    let (buys, sells): (Vec<_>, Vec<_>) = events
        .into_iter()
        .partition(|(_, t)| t.action == Action::Buy);

    if buys.len() != sells.len() {
        return Err(AutotraderError::TradeCountMismatch {
            buys: buys.len(),
            sells: sells.len(),
        });
    }

    let initial_capital = experiment.execution.initial_capital;
    let trades = buys
        .iter()
        .zip(sells.iter())
        .map(|(&(open_time, buy), &(close_time, sell))| {
            pair(open_time, buy, close_time, sell, initial_capital)
        })
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(
        experiment = %experiment.name,
        trades = trades.len(),
        "reconstructed trades"
    );
    Ok(trades)
}

fn pair(
    open_time: NaiveDateTime,
    buy: &Transaction,
    close_time: NaiveDateTime,
    sell: &Transaction,
    initial_capital: f64,
) -> Result<Trade, AutotraderError> {
    if (buy.volume.abs() - sell.volume.abs()).abs() > VOLUME_TOLERANCE {
        return Err(AutotraderError::VolumeMismatch {
            open_time: format_timestamp(open_time),
            buy_volume: buy.volume,
            sell_volume: sell.volume,
        });
    }

    let held = close_time - open_time;
    if held < chrono::Duration::zero() {
        return Err(AutotraderError::NegativeHoldingTime {
            open_time: format_timestamp(open_time),
            close_time: format_timestamp(close_time),
        });
    }

    let deployed = buy.notional();
    let gain = sell.notional() - deployed;

    Ok(Trade {
        open_time,
        close_time,
        holding_minutes: held.num_seconds() as f64 / 60.0,
        volume: sell.volume,
        open_price: buy.price,
        close_price: sell.price,
        gain,
        gain_pct_deployed: if deployed > 0.0 { gain / deployed * 100.0 } else { 0.0 },
        gain_pct_initial_capital: if initial_capital > 0.0 {
            gain / initial_capital * 100.0
        } else {
            0.0
        },
        close_reasons: sell.reasons.clone(),
    })
}

/// Totals over a list of reconstructed trades.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeLedger {
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub total_gain: f64,
    pub avg_holding_minutes: f64,
}

impl TradeLedger {
    pub fn from_trades(trades: &[Trade]) -> Self {
        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut trades_breakeven = 0usize;
        let mut total_gain = 0.0_f64;
        let mut total_minutes = 0.0_f64;

        for trade in trades {
            if trade.gain > 0.0 {
                trades_won += 1;
            } else if trade.gain < 0.0 {
                trades_lost += 1;
            } else {
                trades_breakeven += 1;
            }
            total_gain += trade.gain;
            total_minutes += trade.holding_minutes;
        }

        let avg_holding_minutes = if trades.is_empty() {
            0.0
        } else {
            total_minutes / trades.len() as f64
        };

        TradeLedger {
            total_trades: trades.len(),
            trades_won,
            trades_lost,
            trades_breakeven,
            total_gain,
            avg_holding_minutes,
        }
    }
}
