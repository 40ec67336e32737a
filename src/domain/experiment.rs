//! Experiment records: one backtest run's configuration, execution summary
//! and transaction log.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::AutotraderError;
use super::transaction::TransactionLog;

/// Serde adapter for `YYYY-MM-DD HH:MM:SS` timestamps.
pub mod timestamp_format {
    use crate::domain::transaction::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub instrument: String,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub initial_stocks: f64,
    pub final_stocks: f64,
    pub final_bid_price: f64,
}

/// Agent parameters captured when the experiment was created.
///
/// Known keys are typed; anything else the agent reported is kept verbatim
/// in `extra` so the snapshot round-trips unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsi_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stoch_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_quantity: Option<i64>,
    #[serde(rename = "loss_price_%", default, skip_serializing_if = "Option::is_none")]
    pub loss_price_pct: Option<f64>,
    #[serde(rename = "gain_price_%", default, skip_serializing_if = "Option::is_none")]
    pub gain_price_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_macd: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_rsi_50: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_ema_true: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl AgentConfig {
    /// Typed fields first, then the untyped remainder, as display pairs.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        let mut push = |key: &str, value: Option<String>| {
            if let Some(v) = value {
                out.push((key.to_string(), v));
            }
        };
        push("rsi_threshold", self.rsi_threshold.map(|v| v.to_string()));
        push("stoch_threshold", self.stoch_threshold.map(|v| v.to_string()));
        push("trade_quantity", self.trade_quantity.map(|v| v.to_string()));
        push("loss_price_%", self.loss_price_pct.map(|v| v.to_string()));
        push("gain_price_%", self.gain_price_pct.map(|v| v.to_string()));
        push("activity_limit", self.activity_limit.map(|v| v.to_string()));
        push("condition_macd", self.condition_macd.map(|v| v.to_string()));
        push("condition_rsi_50", self.condition_rsi_50.map(|v| v.to_string()));
        push("condition_ema_true", self.condition_ema_true.map(|v| v.to_string()));
        for (key, value) in &self.extra {
            out.push((key.clone(), value.to_string()));
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    #[serde(default)]
    pub failure_flag: bool,
    #[serde(default)]
    pub traceback: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    /// Document id; not part of the stored body.
    #[serde(skip)]
    pub name: String,
    #[serde(with = "timestamp_format")]
    pub start: NaiveDateTime,
    #[serde(with = "timestamp_format")]
    pub end: NaiveDateTime,
    pub execution: ExecutionSummary,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub transactions: TransactionLog,
    #[serde(default)]
    pub failure: Failure,
}

impl Experiment {
    /// Parses a stored document, either the bare record or the `{name: record}`
    /// wrapper the document store hands back.
    pub fn from_document(name: &str, document: &str) -> Result<Self, AutotraderError> {
        let value: serde_json::Value = serde_json::from_str(document)?;
        let body = match value.get(name) {
            Some(inner) if value.as_object().is_some_and(|o| o.len() == 1) => inner.clone(),
            _ => value,
        };
        let mut experiment: Experiment =
            serde_json::from_value(body).map_err(|e| AutotraderError::InvalidRecord {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        experiment.name = name.to_string();
        Ok(experiment)
    }

    /// Serializes in the wrapped `{name: record}` shape.
    pub fn to_document(&self) -> Result<String, AutotraderError> {
        let mut wrapper = serde_json::Map::new();
        wrapper.insert(self.name.clone(), serde_json::to_value(self)?);
        Ok(serde_json::to_string(&serde_json::Value::Object(wrapper))?)
    }

    pub fn is_failed(&self) -> bool {
        self.failure.failure_flag
    }

    /// Gate every analysis entry point goes through first.
    pub fn ensure_analyzable(&self) -> Result<(), AutotraderError> {
        if self.failure.failure_flag {
            return Err(AutotraderError::ExperimentFailed {
                name: self.name.clone(),
                traceback: self.failure.traceback.clone(),
            });
        }
        Ok(())
    }

    /// Creation-boundary checks. Failed experiments skip the transaction checks
    /// since their log is not expected to be complete.
    pub fn validate(&self) -> Result<(), AutotraderError> {
        let invalid = |reason: String| AutotraderError::InvalidRecord {
            name: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("experiment name must not be empty".into()));
        }
        if self.start >= self.end {
            return Err(invalid("start must be before end".into()));
        }
        if self.execution.instrument.trim().is_empty() {
            return Err(invalid("execution.instrument must not be empty".into()));
        }
        if self.execution.initial_capital <= 0.0 {
            return Err(invalid("execution.initial_capital must be positive".into()));
        }
        if self.is_failed() {
            return Ok(());
        }

        for (key, transaction) in self.transactions.iter() {
            if transaction.price <= 0.0 || !transaction.price.is_finite() {
                return Err(invalid(format!("transaction {key}: price must be positive")));
            }
            if transaction.volume == 0.0 || !transaction.volume.is_finite() {
                return Err(invalid(format!("transaction {key}: volume must be non-zero")));
            }
        }
        self.transactions.chronological()?;
        Ok(())
    }
}

/// Experiment-level performance, independent of trade pairing.
#[derive(Debug, Clone, PartialEq)]
pub struct GainAnalysis {
    pub instrument: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub gain: f64,
    pub gain_pct_initial_capital: f64,
    /// Gain relative to the capital deployed by the first transaction.
    pub gain_pct_first_transaction: Option<f64>,
    pub stock_delta: f64,
    pub capital_equivalent: f64,
}

impl GainAnalysis {
    pub fn compute(experiment: &Experiment) -> Result<Self, AutotraderError> {
        experiment.ensure_analyzable()?;
        let exec = &experiment.execution;
        let gain = exec.final_capital - exec.initial_capital;

        let gain_pct_initial_capital = if exec.initial_capital > 0.0 {
            gain / exec.initial_capital * 100.0
        } else {
            0.0
        };

        let gain_pct_first_transaction = experiment
            .transactions
            .chronological()?
            .first()
            .map(|(_, t)| t.notional())
            .filter(|cost| *cost > 0.0)
            .map(|cost| gain / cost * 100.0);

        Ok(GainAnalysis {
            instrument: exec.instrument.clone(),
            start: experiment.start,
            end: experiment.end,
            initial_capital: exec.initial_capital,
            final_capital: exec.final_capital,
            gain,
            gain_pct_initial_capital,
            gain_pct_first_transaction,
            stock_delta: exec.final_stocks - exec.initial_stocks,
            capital_equivalent: exec.final_bid_price * exec.final_stocks,
        })
    }
}
