//! Document store ports for experiment records and pending requests.

use crate::domain::backtest_request::{BacktestRequest, DeploymentRequest};
use crate::domain::error::AutotraderError;
use crate::domain::experiment::Experiment;

pub trait ExperimentStore {
    /// Missing records are `ExperimentNotFound`.
    fn load_experiment(&self, name: &str) -> Result<Experiment, AutotraderError>;

    /// Inserts or replaces the record under `experiment.name`.
    fn save_experiment(&self, experiment: &Experiment) -> Result<(), AutotraderError>;

    fn delete_experiment(&self, name: &str) -> Result<(), AutotraderError>;

    /// Sorted ascending.
    fn list_experiment_names(&self) -> Result<Vec<String>, AutotraderError>;
}

pub trait BacktestStore {
    fn submit_backtest(&self, name: &str, request: &BacktestRequest) -> Result<(), AutotraderError>;

    fn list_backtests(&self) -> Result<Vec<(String, BacktestRequest)>, AutotraderError>;

    fn load_backtest(&self, name: &str) -> Result<BacktestRequest, AutotraderError>;

    fn delete_backtest(&self, name: &str) -> Result<(), AutotraderError>;

    fn submit_deployment(
        &self,
        name: &str,
        request: &DeploymentRequest,
    ) -> Result<(), AutotraderError>;

    /// Sorted by name.
    fn list_deployments(&self) -> Result<Vec<(String, DeploymentRequest)>, AutotraderError>;
}

/// A store that holds both experiment records and pending requests.
pub trait DocumentStore: ExperimentStore + BacktestStore {}

impl<T: ExperimentStore + BacktestStore> DocumentStore for T {}
