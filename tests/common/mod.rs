#![allow(dead_code)]

use autotrader::domain::backtest_request::{BacktestRequest, DeploymentRequest};
use autotrader::domain::error::AutotraderError;
use autotrader::domain::experiment::{AgentConfig, ExecutionSummary, Experiment, Failure};
pub use autotrader::domain::ohlcv::{Granularity, PriceBar};
pub use autotrader::domain::transaction::{parse_timestamp, Action, Transaction, TransactionLog};
use autotrader::ports::experiment_store::{BacktestStore, ExperimentStore};
use autotrader::ports::price_port::PricePort;
use chrono::{Duration, NaiveDateTime};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};

pub const T0: &str = "2022-05-02 14:30:00";

pub fn ts(s: &str) -> NaiveDateTime {
    parse_timestamp(s).unwrap()
}

pub fn minute(offset: i64) -> NaiveDateTime {
    ts(T0) + Duration::minutes(offset)
}

pub struct MockPricePort {
    pub data: HashMap<String, Vec<PriceBar>>,
    pub errors: HashMap<String, String>,
    pub calls: Cell<usize>,
}

impl MockPricePort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            calls: Cell::new(0),
        }
    }

    pub fn with_bars(mut self, instrument: &str, bars: Vec<PriceBar>) -> Self {
        self.data.insert(instrument.to_string(), bars);
        self
    }

    pub fn with_error(mut self, instrument: &str, reason: &str) -> Self {
        self.errors.insert(instrument.to_string(), reason.to_string());
        self
    }
}

impl PricePort for MockPricePort {
    fn fetch_price_series(
        &self,
        instrument: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        _granularity: Granularity,
    ) -> Result<Vec<PriceBar>, AutotraderError> {
        self.calls.set(self.calls.get() + 1);
        if let Some(reason) = self.errors.get(instrument) {
            return Err(AutotraderError::UpstreamFetch {
                instrument: instrument.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(instrument)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.timestamp >= start && b.timestamp <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_instruments(&self) -> Result<Vec<String>, AutotraderError> {
        let mut names: Vec<String> = self.data.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// Store that keeps documents in memory, serialized the way the real store does.
#[derive(Default)]
pub struct InMemoryStore {
    pub experiments: RefCell<BTreeMap<String, String>>,
    pub backtests: RefCell<BTreeMap<String, BacktestRequest>>,
    pub deployments: RefCell<BTreeMap<String, DeploymentRequest>>,
}

impl ExperimentStore for InMemoryStore {
    fn load_experiment(&self, name: &str) -> Result<Experiment, AutotraderError> {
        let docs = self.experiments.borrow();
        let doc = docs
            .get(name)
            .ok_or_else(|| AutotraderError::ExperimentNotFound {
                name: name.to_string(),
            })?;
        Experiment::from_document(name, doc)
    }

    fn save_experiment(&self, experiment: &Experiment) -> Result<(), AutotraderError> {
        let doc = experiment.to_document()?;
        self.experiments
            .borrow_mut()
            .insert(experiment.name.clone(), doc);
        Ok(())
    }

    fn delete_experiment(&self, name: &str) -> Result<(), AutotraderError> {
        self.experiments
            .borrow_mut()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| AutotraderError::ExperimentNotFound {
                name: name.to_string(),
            })
    }

    fn list_experiment_names(&self) -> Result<Vec<String>, AutotraderError> {
        Ok(self.experiments.borrow().keys().cloned().collect())
    }
}

impl BacktestStore for InMemoryStore {
    fn submit_backtest(&self, name: &str, request: &BacktestRequest) -> Result<(), AutotraderError> {
        request.validate(name)?;
        self.backtests
            .borrow_mut()
            .insert(name.to_string(), request.clone());
        Ok(())
    }

    fn list_backtests(&self) -> Result<Vec<(String, BacktestRequest)>, AutotraderError> {
        Ok(self
            .backtests
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn load_backtest(&self, name: &str) -> Result<BacktestRequest, AutotraderError> {
        self.backtests
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| AutotraderError::BacktestNotFound {
                name: name.to_string(),
            })
    }

    fn delete_backtest(&self, name: &str) -> Result<(), AutotraderError> {
        self.backtests
            .borrow_mut()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| AutotraderError::BacktestNotFound {
                name: name.to_string(),
            })
    }

    fn submit_deployment(
        &self,
        name: &str,
        request: &DeploymentRequest,
    ) -> Result<(), AutotraderError> {
        request.validate(name)?;
        self.deployments
            .borrow_mut()
            .insert(name.to_string(), request.clone());
        Ok(())
    }

    fn list_deployments(&self) -> Result<Vec<(String, DeploymentRequest)>, AutotraderError> {
        Ok(self
            .deployments
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

pub fn make_bar(offset: i64, close: f64) -> PriceBar {
    PriceBar {
        timestamp: minute(offset),
        open: close,
        high: close,
        low: close,
        close,
        volume: 1.0,
    }
}

/// One bar per minute starting at `T0`.
pub fn make_bars(closes: &[f64]) -> Vec<PriceBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_bar(i as i64, c))
        .collect()
}

/// `(minute offset, action, price, volume)` entries.
pub fn make_experiment(name: &str, entries: &[(i64, Action, f64, f64)]) -> Experiment {
    let mut log = TransactionLog::new();
    for &(offset, action, price, volume) in entries {
        log.insert(
            minute(offset),
            Transaction {
                action,
                price,
                volume,
                reasons: vec![],
            },
        );
    }
    Experiment {
        name: name.to_string(),
        start: ts(T0),
        end: ts(T0) + Duration::hours(6),
        execution: ExecutionSummary {
            instrument: "SPX500_USD".to_string(),
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

pub fn failed_experiment(name: &str, traceback: &str) -> Experiment {
    let mut exp = make_experiment(name, &[]);
    exp.failure = Failure {
        failure_flag: true,
        traceback: traceback.to_string(),
    };
    exp
}
