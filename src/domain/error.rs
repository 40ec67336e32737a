//! Domain error types.

/// Top-level error type for autotrader.
#[derive(Debug, thiserror::Error)]
pub enum AutotraderError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("experiment not found: {name}")]
    ExperimentNotFound { name: String },

    #[error("backtest not found: {name}")]
    BacktestNotFound { name: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid --{argument}: {reason}")]
    InvalidArgument { argument: String, reason: String },

    #[error("price fetch failed for {instrument}: {reason}")]
    UpstreamFetch { instrument: String, reason: String },

    #[error("no price data for {instrument} between {start} and {end}")]
    NoPriceData {
        instrument: String,
        start: String,
        end: String,
    },

    #[error("buy/sell count mismatch: {buys} buys, {sells} sells")]
    TradeCountMismatch { buys: usize, sells: usize },

    #[error("volume mismatch for trade opened at {open_time}: bought {buy_volume}, sold {sell_volume}")]
    VolumeMismatch {
        open_time: String,
        buy_volume: f64,
        sell_volume: f64,
    },

    #[error("negative holding time: opened at {open_time}, closed at {close_time}")]
    NegativeHoldingTime {
        open_time: String,
        close_time: String,
    },

    #[error("sell at {timestamp} has no open position to close")]
    SellWithoutOpen { timestamp: String },

    #[error("invalid timestamp {value:?} (expected YYYY-MM-DD HH:MM:SS)")]
    InvalidTimestamp { value: String },

    #[error("invalid record {name}: {reason}")]
    InvalidRecord { name: String, reason: String },

    #[error("experiment {name} failed: {traceback}")]
    ExperimentFailed { name: String, traceback: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AutotraderError {
    /// True for errors raised by a malformed upstream transaction log.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            AutotraderError::TradeCountMismatch { .. }
                | AutotraderError::VolumeMismatch { .. }
                | AutotraderError::NegativeHoldingTime { .. }
                | AutotraderError::SellWithoutOpen { .. }
                | AutotraderError::InvalidTimestamp { .. }
                | AutotraderError::InvalidRecord { .. }
        )
    }
}

impl From<&AutotraderError> for std::process::ExitCode {
    fn from(err: &AutotraderError) -> Self {
        let code: u8 = match err {
            AutotraderError::Io(_) => 1,
            AutotraderError::ConfigParse { .. }
            | AutotraderError::ConfigMissing { .. }
            | AutotraderError::ConfigInvalid { .. }
            | AutotraderError::InvalidArgument { .. } => 2,
            AutotraderError::Database { .. }
            | AutotraderError::DatabaseQuery { .. }
            | AutotraderError::ExperimentNotFound { .. }
            | AutotraderError::BacktestNotFound { .. }
            | AutotraderError::Json(_) => 3,
            AutotraderError::TradeCountMismatch { .. }
            | AutotraderError::VolumeMismatch { .. }
            | AutotraderError::NegativeHoldingTime { .. }
            | AutotraderError::SellWithoutOpen { .. }
            | AutotraderError::InvalidTimestamp { .. }
            | AutotraderError::InvalidRecord { .. } => 4,
            AutotraderError::UpstreamFetch { .. } | AutotraderError::NoPriceData { .. } => 5,
            AutotraderError::ExperimentFailed { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_mismatch_message() {
        let err = AutotraderError::TradeCountMismatch { buys: 3, sells: 2 };
        assert_eq!(err.to_string(), "buy/sell count mismatch: 3 buys, 2 sells");
        assert!(err.is_integrity());
    }

    #[test]
    fn upstream_errors_are_not_integrity_errors() {
        let err = AutotraderError::UpstreamFetch {
            instrument: "SPX500_USD".into(),
            reason: "timeout".into(),
        };
        assert!(!err.is_integrity());
        assert_eq!(err.to_string(), "price fetch failed for SPX500_USD: timeout");
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: AutotraderError = io_err.into();
        assert!(matches!(err, AutotraderError::Io(_)));
    }
}
