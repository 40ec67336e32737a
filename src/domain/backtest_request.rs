//! Pending backtest and live-deployment requests.
//!
//! A request bundles the agent parameters, the execution settings and the
//! weekly trading window. It is validated here, before it reaches the store,
//! so the runner never sees a malformed configuration.

use serde::{Deserialize, Serialize};

use super::error::AutotraderError;
use super::experiment::AgentConfig;
use super::market::{market_for_instrument, WeeklyHours};

pub const MAX_SIM_LEN_DAYS: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BacktestStatus {
    #[default]
    #[serde(rename = "Ready to start")]
    ReadyToStart,
    #[serde(rename = "Running")]
    Running,
    #[serde(rename = "Done")]
    Done,
    #[serde(rename = "Failed")]
    Failed,
}

impl std::fmt::Display for BacktestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BacktestStatus::ReadyToStart => "Ready to start",
            BacktestStatus::Running => "Running",
            BacktestStatus::Done => "Done",
            BacktestStatus::Failed => "Failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub instrument: String,
    pub sim_len_days: u32,
    pub initial_capital: f64,
    pub initial_stocks: u32,
    pub spread_simulation: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub agent_config: AgentConfig,
    pub execution_config: ExecutionConfig,
    pub time_config: WeeklyHours,
    #[serde(default)]
    pub status: BacktestStatus,
    /// UTC creation time, `YYYY-MM-DD HH:MM`.
    pub created_at: String,
}

impl BacktestRequest {
    pub fn validate(&self, name: &str) -> Result<(), AutotraderError> {
        let invalid = |reason: String| AutotraderError::InvalidRecord {
            name: name.to_string(),
            reason,
        };

        if name.trim().is_empty() {
            return Err(invalid("experiment name must not be empty".into()));
        }
        let exec = &self.execution_config;
        if !(1..=MAX_SIM_LEN_DAYS).contains(&exec.sim_len_days) {
            return Err(invalid(format!(
                "sim_len_days must be between 1 and {MAX_SIM_LEN_DAYS}"
            )));
        }
        if exec.initial_capital <= 0.0 {
            return Err(invalid("initial_capital must be positive".into()));
        }
        validate_agent(&self.agent_config).map_err(invalid)?;
        validate_instrument(&exec.instrument).map_err(invalid)?;
        validate_hours(&self.time_config).map_err(invalid)?;
        Ok(())
    }
}

/// Live deployment: same agent and trading window, no simulation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    pub agent_config: AgentConfig,
    pub instrument: String,
    pub time_config: WeeklyHours,
    #[serde(default)]
    pub status: BacktestStatus,
    pub created_at: String,
}

impl DeploymentRequest {
    pub fn validate(&self, name: &str) -> Result<(), AutotraderError> {
        let invalid = |reason: String| AutotraderError::InvalidRecord {
            name: name.to_string(),
            reason,
        };
        if name.trim().is_empty() {
            return Err(invalid("deployment name must not be empty".into()));
        }
        validate_agent(&self.agent_config).map_err(invalid)?;
        validate_instrument(&self.instrument).map_err(invalid)?;
        validate_hours(&self.time_config).map_err(invalid)?;
        Ok(())
    }
}

fn validate_instrument(instrument: &str) -> Result<(), String> {
    match market_for_instrument(instrument) {
        Some(_) => Ok(()),
        None => Err(format!("instrument {instrument} has no known market")),
    }
}

fn validate_agent(agent: &AgentConfig) -> Result<(), String> {
    for (key, value) in [
        ("loss_price_%", agent.loss_price_pct),
        ("gain_price_%", agent.gain_price_pct),
    ] {
        if let Some(v) = value {
            if !(0.0..=100.0).contains(&v) {
                return Err(format!("{key} must be between 0 and 100"));
            }
        }
    }
    if agent.trade_quantity.is_some_and(|q| q < 0) {
        return Err("trade_quantity must be non-negative".into());
    }
    if agent.activity_limit.is_some_and(|l| l < 0) {
        return Err("activity_limit must be non-negative".into());
    }
    Ok(())
}

fn validate_hours(hours: &WeeklyHours) -> Result<(), String> {
    for (day, session) in hours {
        let valid_day = day.parse::<u32>().is_ok_and(|d| d < 7);
        if !valid_day {
            return Err(format!("unknown weekday key {day:?}"));
        }
        let bounded = |(h, m): (u32, u32)| h < 24 && m < 60;
        if !bounded(session.start) || !bounded(session.end) {
            return Err(format!("weekday {day}: hours out of range"));
        }
        if session.start > session.end {
            return Err(format!("weekday {day}: start is after end"));
        }
    }
    Ok(())
}
