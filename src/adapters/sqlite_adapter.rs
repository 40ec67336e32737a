//! SQLite document store for experiments and pending requests.
//!
//! Every record is one JSON document keyed by name. The experiment body is
//! stored in the `{name: record}` wrapper shape so the same documents can
//! be imported from and exported to the runner's store unchanged.

use crate::domain::backtest_request::{BacktestRequest, DeploymentRequest};
use crate::domain::error::AutotraderError;
use crate::domain::experiment::Experiment;
use crate::ports::config_port::ConfigPort;
use crate::ports::experiment_store::{BacktestStore, ExperimentStore};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};

const EXPERIMENTS: &str = "experiments";
const BACKTESTS: &str = "backtests";
const DEPLOYMENTS: &str = "deployments";

pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

fn db_err(e: r2d2::Error) -> AutotraderError {
    AutotraderError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> AutotraderError {
    AutotraderError::DatabaseQuery {
        reason: e.to_string(),
    }
}

impl SqliteStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, AutotraderError> {
        let db_path = config
            .get_string("store", "path")
            .ok_or_else(|| AutotraderError::ConfigMissing {
                section: "store".into(),
                key: "path".into(),
            })?;

        let pool_size = config.get_int("store", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(db_err)?;

        tracing::debug!(path = %db_path, pool_size, "opened experiment store");
        let store = Self { pool };
        store.initialize_schema()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, AutotraderError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(db_err)?;
        Ok(Self { pool })
    }

    pub fn initialize_schema(&self) -> Result<(), AutotraderError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS experiments (
                name TEXT PRIMARY KEY,
                document TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS backtests (
                name TEXT PRIMARY KEY,
                document TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS deployments (
                name TEXT PRIMARY KEY,
                document TEXT NOT NULL
            );",
        )
        .map_err(query_err)?;
        Ok(())
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, AutotraderError> {
        self.pool.get().map_err(db_err)
    }

    fn put(&self, table: &str, name: &str, document: &str) -> Result<(), AutotraderError> {
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT OR REPLACE INTO {table} (name, document) VALUES (?1, ?2)"),
            params![name, document],
        )
        .map_err(query_err)?;
        tracing::debug!(table, name, "stored document");
        Ok(())
    }

    fn get(&self, table: &str, name: &str) -> Result<Option<String>, AutotraderError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT document FROM {table} WHERE name = ?1"),
            params![name],
            |row| row.get(0),
        )
        .optional()
        .map_err(query_err)
    }

    fn remove(&self, table: &str, name: &str) -> Result<bool, AutotraderError> {
        let conn = self.conn()?;
        let removed = conn
            .execute(&format!("DELETE FROM {table} WHERE name = ?1"), params![name])
            .map_err(query_err)?;
        Ok(removed > 0)
    }

    fn all(&self, table: &str) -> Result<Vec<(String, String)>, AutotraderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT name, document FROM {table} ORDER BY name ASC"))
            .map_err(query_err)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(query_err)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(query_err)?);
        }
        Ok(out)
    }

    fn experiment_document(&self, name: &str) -> Result<String, AutotraderError> {
        self.get(EXPERIMENTS, name)?
            .ok_or_else(|| AutotraderError::ExperimentNotFound {
                name: name.to_string(),
            })
    }
}

impl ExperimentStore for SqliteStore {
    fn load_experiment(&self, name: &str) -> Result<Experiment, AutotraderError> {
        let document = self.experiment_document(name)?;
        Experiment::from_document(name, &document)
    }

    fn save_experiment(&self, experiment: &Experiment) -> Result<(), AutotraderError> {
        let document = experiment.to_document()?;
        self.put(EXPERIMENTS, &experiment.name, &document)
    }

    fn delete_experiment(&self, name: &str) -> Result<(), AutotraderError> {
        if !self.remove(EXPERIMENTS, name)? {
            return Err(AutotraderError::ExperimentNotFound {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn list_experiment_names(&self) -> Result<Vec<String>, AutotraderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT name FROM experiments ORDER BY name ASC")
            .map_err(query_err)?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(query_err)?;

        let mut names = Vec::new();
        for row in rows {
            names.push(row.map_err(query_err)?);
        }
        Ok(names)
    }
}

impl BacktestStore for SqliteStore {
    fn submit_backtest(&self, name: &str, request: &BacktestRequest) -> Result<(), AutotraderError> {
        request.validate(name)?;
        let document = serde_json::to_string(request)?;
        self.put(BACKTESTS, name, &document)?;
        tracing::info!(name, instrument = %request.execution_config.instrument, "backtest submitted");
        Ok(())
    }

    fn list_backtests(&self) -> Result<Vec<(String, BacktestRequest)>, AutotraderError> {
        self.all(BACKTESTS)?
            .into_iter()
            .map(|(name, doc)| {
                serde_json::from_str(&doc)
                    .map(|request| (name, request))
                    .map_err(AutotraderError::from)
            })
            .collect()
    }

    fn load_backtest(&self, name: &str) -> Result<BacktestRequest, AutotraderError> {
        let document = self
            .get(BACKTESTS, name)?
            .ok_or_else(|| AutotraderError::BacktestNotFound {
                name: name.to_string(),
            })?;
        Ok(serde_json::from_str(&document)?)
    }

    fn delete_backtest(&self, name: &str) -> Result<(), AutotraderError> {
        if !self.remove(BACKTESTS, name)? {
            return Err(AutotraderError::BacktestNotFound {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn submit_deployment(
        &self,
        name: &str,
        request: &DeploymentRequest,
    ) -> Result<(), AutotraderError> {
        request.validate(name)?;
        let document = serde_json::to_string(request)?;
        self.put(DEPLOYMENTS, name, &document)?;
        tracing::info!(name, instrument = %request.instrument, "deployment submitted");
        Ok(())
    }

    fn list_deployments(&self) -> Result<Vec<(String, DeploymentRequest)>, AutotraderError> {
        self.all(DEPLOYMENTS)?
            .into_iter()
            .map(|(name, doc)| {
                serde_json::from_str(&doc)
                    .map(|request| (name, request))
                    .map_err(AutotraderError::from)
            })
            .collect()
    }
}
