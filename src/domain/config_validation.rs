//! Configuration validation.
//!
//! Validates the application INI and backtest request INIs before anything
//! touches the store or the broker.

use crate::domain::backtest_request::MAX_SIM_LEN_DAYS;
use crate::domain::error::AutotraderError;
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    Csv,
    Oanda,
}

pub fn price_source(config: &dyn ConfigPort) -> Result<PriceSource, AutotraderError> {
    let value = config
        .get_string("prices", "source")
        .unwrap_or_else(|| "csv".to_string());
    match value.trim().to_lowercase().as_str() {
        "csv" => Ok(PriceSource::Csv),
        "oanda" => Ok(PriceSource::Oanda),
        other => Err(AutotraderError::ConfigInvalid {
            section: "prices".to_string(),
            key: "source".to_string(),
            reason: format!("unknown price source {other:?} (expected csv or oanda)"),
        }),
    }
}

pub fn validate_app_config(config: &dyn ConfigPort) -> Result<(), AutotraderError> {
    validate_store(config)?;
    validate_prices(config)?;
    validate_analysis(config)?;
    Ok(())
}

pub fn validate_request_config(config: &dyn ConfigPort) -> Result<(), AutotraderError> {
    require_non_empty(config, "experiment", "name")?;
    require_non_empty(config, "execution", "instrument")?;
    validate_sim_len(config)?;
    validate_request_capital(config)?;
    Ok(())
}

pub fn validate_deployment_config(config: &dyn ConfigPort) -> Result<(), AutotraderError> {
    require_non_empty(config, "experiment", "name")?;
    require_non_empty(config, "execution", "instrument")?;
    Ok(())
}

fn validate_store(config: &dyn ConfigPort) -> Result<(), AutotraderError> {
    require_non_empty(config, "store", "path")?;
    let pool_size = config.get_int("store", "pool_size", 4);
    if pool_size < 1 {
        return Err(AutotraderError::ConfigInvalid {
            section: "store".to_string(),
            key: "pool_size".to_string(),
            reason: "pool_size must be at least 1".to_string(),
        });
    }
    Ok(())
}

fn validate_prices(config: &dyn ConfigPort) -> Result<(), AutotraderError> {
    match price_source(config)? {
        PriceSource::Csv => require_non_empty(config, "prices", "csv_dir"),
        PriceSource::Oanda => {
            require_non_empty(config, "oanda", "hostname")?;
            require_non_empty(config, "oanda", "access_token")?;
            require_non_empty(config, "oanda", "account_id")
        }
    }
}

fn validate_analysis(config: &dyn ConfigPort) -> Result<(), AutotraderError> {
    let gap = config.get_int("analysis", "max_gap_fill", 5);
    if gap < 0 {
        return Err(AutotraderError::ConfigInvalid {
            section: "analysis".to_string(),
            key: "max_gap_fill".to_string(),
            reason: "max_gap_fill must be non-negative".to_string(),
        });
    }
    if let Some(value) = config.get_string("analysis", "granularity") {
        value
            .parse::<crate::domain::ohlcv::Granularity>()
            .map_err(|reason| AutotraderError::ConfigInvalid {
                section: "analysis".to_string(),
                key: "granularity".to_string(),
                reason,
            })?;
    }
    Ok(())
}

fn validate_sim_len(config: &dyn ConfigPort) -> Result<(), AutotraderError> {
    let days = config.get_int("execution", "sim_len_days", 0);
    if days < 1 || days > MAX_SIM_LEN_DAYS as i64 {
        return Err(AutotraderError::ConfigInvalid {
            section: "execution".to_string(),
            key: "sim_len_days".to_string(),
            reason: format!("sim_len_days must be between 1 and {MAX_SIM_LEN_DAYS}"),
        });
    }
    Ok(())
}

fn validate_request_capital(config: &dyn ConfigPort) -> Result<(), AutotraderError> {
    let value = config.get_double("execution", "initial_capital", 0.0);
    if value <= 0.0 {
        return Err(AutotraderError::ConfigInvalid {
            section: "execution".to_string(),
            key: "initial_capital".to_string(),
            reason: "initial_capital must be positive".to_string(),
        });
    }
    let stocks = config.get_int("execution", "initial_stocks", 0);
    if stocks < 0 {
        return Err(AutotraderError::ConfigInvalid {
            section: "execution".to_string(),
            key: "initial_stocks".to_string(),
            reason: "initial_stocks must be non-negative".to_string(),
        });
    }
    Ok(())
}

fn require_non_empty(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), AutotraderError> {
    match config.get_string(section, key) {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(AutotraderError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    #[test]
    fn valid_csv_config_passes() {
        let config = make_config(
            r#"
[store]
path = /tmp/autotrader.db
pool_size = 2

[prices]
source = csv
csv_dir = /tmp/prices

[analysis]
max_gap_fill = 5
granularity = M1
"#,
        );
        assert!(validate_app_config(&config).is_ok());
        assert_eq!(price_source(&config).unwrap(), PriceSource::Csv);
    }

    #[test]
    fn source_defaults_to_csv() {
        let config = make_config("[store]\npath = x.db\n");
        assert_eq!(price_source(&config).unwrap(), PriceSource::Csv);
    }

    #[test]
    fn missing_store_path_fails() {
        let config = make_config("[prices]\ncsv_dir = /tmp\n");
        let err = validate_app_config(&config).unwrap_err();
        assert!(
            matches!(err, AutotraderError::ConfigMissing { section, key } if section == "store" && key == "path")
        );
    }

    #[test]
    fn zero_pool_size_fails() {
        let config = make_config("[store]\npath = x.db\npool_size = 0\n[prices]\ncsv_dir = /tmp\n");
        let err = validate_app_config(&config).unwrap_err();
        assert!(matches!(err, AutotraderError::ConfigInvalid { key, .. } if key == "pool_size"));
    }

    #[test]
    fn unknown_source_fails() {
        let config = make_config("[store]\npath = x.db\n[prices]\nsource = bloomberg\n");
        let err = validate_app_config(&config).unwrap_err();
        assert!(matches!(err, AutotraderError::ConfigInvalid { key, .. } if key == "source"));
    }

    #[test]
    fn oanda_requires_credentials() {
        let config = make_config(
            "[store]\npath = x.db\n[prices]\nsource = oanda\n[oanda]\nhostname = api-fxpractice.oanda.com\naccount_id = 101\n",
        );
        let err = validate_app_config(&config).unwrap_err();
        assert!(matches!(err, AutotraderError::ConfigMissing { key, .. } if key == "access_token"));
    }

    #[test]
    fn negative_gap_fill_fails() {
        let config = make_config("[store]\npath = x.db\n[prices]\ncsv_dir = /tmp\n[analysis]\nmax_gap_fill = -1\n");
        let err = validate_app_config(&config).unwrap_err();
        assert!(matches!(err, AutotraderError::ConfigInvalid { key, .. } if key == "max_gap_fill"));
    }

    #[test]
    fn bad_granularity_fails() {
        let config = make_config("[store]\npath = x.db\n[prices]\ncsv_dir = /tmp\n[analysis]\ngranularity = D7\n");
        let err = validate_app_config(&config).unwrap_err();
        assert!(matches!(err, AutotraderError::ConfigInvalid { key, .. } if key == "granularity"));
    }

    #[test]
    fn valid_request_passes() {
        let config = make_config(
            r#"
[experiment]
name = rsi-sweep-1

[execution]
instrument = SPX500_USD
sim_len_days = 3
initial_capital = 10000
initial_stocks = 0
"#,
        );
        assert!(validate_request_config(&config).is_ok());
    }

    #[test]
    fn request_sim_len_out_of_range_fails() {
        let config = make_config(
            "[experiment]\nname = a\n[execution]\ninstrument = SPX500_USD\nsim_len_days = 9\ninitial_capital = 1\n",
        );
        let err = validate_request_config(&config).unwrap_err();
        assert!(matches!(err, AutotraderError::ConfigInvalid { key, .. } if key == "sim_len_days"));
    }

    #[test]
    fn deployment_needs_only_name_and_instrument() {
        let config = make_config("[experiment]\nname = live-1\n[execution]\ninstrument = US30_USD\n");
        assert!(validate_deployment_config(&config).is_ok());
        assert!(validate_request_config(&config).is_err());
    }

    #[test]
    fn request_without_name_fails() {
        let config = make_config("[execution]\ninstrument = SPX500_USD\nsim_len_days = 1\ninitial_capital = 1\n");
        let err = validate_request_config(&config).unwrap_err();
        assert!(matches!(err, AutotraderError::ConfigMissing { section, .. } if section == "experiment"));
    }
}
