//! CLI definition and dispatch.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use crate::adapters::csv_adapter::CsvPriceAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::annotate::{annotate_with, AnnotateOptions, AnnotatedFrame};
use crate::domain::backtest_request::{
    BacktestRequest, BacktestStatus, DeploymentRequest, ExecutionConfig,
};
use crate::domain::cache::{AnalysisCache, AnalysisKey};
use crate::domain::config_validation::{
    price_source, validate_app_config, validate_deployment_config, validate_request_config,
    PriceSource,
};
use crate::domain::error::AutotraderError;
use crate::domain::experiment::{AgentConfig, Experiment, GainAnalysis};
use crate::domain::market::{market_for_instrument, Market, Session, WeeklyHours};
use crate::domain::ohlcv::Granularity;
use crate::domain::price_series::{normalize, NormalizedBar, MAX_INTERPOLATED_GAP};
use crate::domain::statistics::{summarize, Summary};
use crate::domain::trades::{reconstruct_trades, TradeLedger};
use crate::domain::transaction::format_timestamp;
use crate::ports::config_port::ConfigPort;
use crate::ports::experiment_store::{BacktestStore, DocumentStore, ExperimentStore};
use crate::ports::price_port::PricePort;
use crate::ports::report_port::ReportPort;

const CREATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Parser, Debug)]
#[command(name = "autotrader", about = "Review and manage trading experiments")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug)]
pub struct ConfigArg {
    /// Application INI file
    #[arg(short, long)]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect and analyze stored experiments
    Experiments {
        #[command(subcommand)]
        command: ExperimentsCommand,
    },
    /// Manage pending backtest requests
    Backtest {
        #[command(subcommand)]
        command: BacktestCommand,
    },
    /// Submit live deployment requests
    Deploy {
        #[command(subcommand)]
        command: DeployCommand,
    },
    /// List tradable instruments with a known market
    Instruments {
        #[command(flatten)]
        config: ConfigArg,
    },
    /// Fetch and normalize an instrument's price history
    Prices {
        instrument: String,
        /// `YYYY-MM-DD` or `YYYY-MM-DD HH:MM[:SS]`
        #[arg(long)]
        start: String,
        /// A bare date runs to 23:59 of that day; never past now
        #[arg(long)]
        end: String,
        #[arg(long)]
        granularity: Option<Granularity>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        config: ConfigArg,
    },
    /// Show the current bid/ask spread of an instrument
    Spread {
        instrument: String,
        #[command(flatten)]
        config: ConfigArg,
    },
}

#[derive(Subcommand, Debug)]
pub enum ExperimentsCommand {
    /// List experiment names
    List {
        #[command(flatten)]
        config: ConfigArg,
    },
    /// Execution summary, gain analysis and agent parameters
    Show {
        name: String,
        #[command(flatten)]
        config: ConfigArg,
    },
    /// Reconstructed round-trip trades
    Trades {
        name: String,
        #[command(flatten)]
        config: ConfigArg,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Annotate prices with transactions and summarize returns
    Analyze {
        name: String,
        #[command(flatten)]
        config: ConfigArg,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        granularity: Option<Granularity>,
    },
    /// Validate and store an experiment document
    Import {
        file: PathBuf,
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        config: ConfigArg,
    },
    /// Delete a stored experiment
    Delete {
        name: String,
        #[command(flatten)]
        config: ConfigArg,
    },
}

#[derive(Subcommand, Debug)]
pub enum BacktestCommand {
    /// Submit a backtest request from an INI file
    Submit {
        #[arg(short, long)]
        request: PathBuf,
        #[command(flatten)]
        config: ConfigArg,
    },
    /// List pending backtest requests
    List {
        #[command(flatten)]
        config: ConfigArg,
    },
    /// Delete a pending backtest request
    Delete {
        name: String,
        #[command(flatten)]
        config: ConfigArg,
    },
}

#[derive(Subcommand, Debug)]
pub enum DeployCommand {
    /// Submit a live deployment request from an INI file
    Submit {
        #[arg(short, long)]
        request: PathBuf,
        #[command(flatten)]
        config: ConfigArg,
    },
    /// List submitted deployment requests
    List {
        #[command(flatten)]
        config: ConfigArg,
    },
}

pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("autotrader=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Experiments { command } => run_experiments(command),
        Command::Backtest { command } => run_backtest(command),
        Command::Deploy { command } => run_deploy(command),
        Command::Instruments { config } => run_instruments(&config.config),
        Command::Prices {
            instrument,
            start,
            end,
            granularity,
            output,
            config,
        } => run_prices(&instrument, &start, &end, granularity, output.as_deref(), &config.config),
        Command::Spread { instrument, config } => run_spread(&instrument, &config.config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            if let Some(hint) = error_hint(&e) {
                eprintln!("hint: {hint}");
            }
            (&e).into()
        }
    }
}

/// Follow-up advice printed under an error, when there is any.
pub fn error_hint(err: &AutotraderError) -> Option<&'static str> {
    match err {
        e if e.is_integrity() => {
            Some("the stored record is inconsistent; re-import or re-run the experiment")
        }
        AutotraderError::ExperimentFailed { .. } => {
            Some("the experiment failed upstream; the traceback above is all that was stored")
        }
        AutotraderError::NoPriceData { .. } => {
            Some("check the instrument name and that the range covers market hours")
        }
        _ => None,
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, AutotraderError> {
    eprintln!("Loading config from {}", path.display());
    let config = FileConfigAdapter::from_file(path)?;
    validate_app_config(&config)?;
    Ok(config)
}

pub fn open_store(config: &dyn ConfigPort) -> Result<Box<dyn DocumentStore>, AutotraderError> {
    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_adapter::SqliteStore;
        Ok(Box::new(SqliteStore::from_config(config)?))
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = config;
        Err(AutotraderError::Database {
            reason: "sqlite feature is required for the experiment store".into(),
        })
    }
}

pub fn open_price_port(config: &dyn ConfigPort) -> Result<Box<dyn PricePort>, AutotraderError> {
    match price_source(config)? {
        PriceSource::Csv => {
            let dir = config
                .get_string("prices", "csv_dir")
                .ok_or_else(|| AutotraderError::ConfigMissing {
                    section: "prices".into(),
                    key: "csv_dir".into(),
                })?;
            Ok(Box::new(CsvPriceAdapter::new(PathBuf::from(dir))))
        }
        PriceSource::Oanda => {
            #[cfg(feature = "oanda")]
            {
                use crate::adapters::oanda_adapter::OandaAdapter;
                Ok(Box::new(OandaAdapter::from_config(config)?))
            }

            #[cfg(not(feature = "oanda"))]
            {
                Err(AutotraderError::ConfigInvalid {
                    section: "prices".into(),
                    key: "source".into(),
                    reason: "oanda feature is required for source = oanda".into(),
                })
            }
        }
    }
}

/// Annotation options from `[analysis]`, with an optional granularity override.
pub fn analysis_options(config: &dyn ConfigPort, granularity: Option<Granularity>) -> AnnotateOptions {
    let granularity = granularity.unwrap_or_else(|| {
        config
            .get_string("analysis", "granularity")
            .and_then(|g| g.parse().ok())
            .unwrap_or_default()
    });
    let max_gap = config
        .get_int("analysis", "max_gap_fill", MAX_INTERPOLATED_GAP as i64)
        .max(0) as usize;
    AnnotateOptions {
        granularity,
        max_gap,
    }
}

/// Fetches prices for the experiment window and annotates them, memoized per
/// experiment and price request.
pub fn analyze_experiment(
    experiment: &Experiment,
    prices: &dyn PricePort,
    cache: &mut AnalysisCache,
    options: AnnotateOptions,
) -> Result<Arc<AnnotatedFrame>, AutotraderError> {
    experiment.ensure_analyzable()?;
    let key = AnalysisKey::for_experiment(experiment, options);
    cache.get_or_try_compute(key, || {
        let bars = prices.fetch_price_series(
            &experiment.execution.instrument,
            experiment.start,
            experiment.end,
            options.granularity,
        )?;
        annotate_with(experiment, &bars, options)
    })
}

fn run_experiments(command: ExperimentsCommand) -> Result<(), AutotraderError> {
    match command {
        ExperimentsCommand::List { config } => {
            let config = load_config(&config.config)?;
            let store = open_store(&config)?;
            list_experiments(&*store)
        }
        ExperimentsCommand::Show { name, config } => {
            let config = load_config(&config.config)?;
            let store = open_store(&config)?;
            show_experiment(&*store, &name)
        }
        ExperimentsCommand::Trades {
            name,
            config,
            output,
        } => {
            let config = load_config(&config.config)?;
            let store = open_store(&config)?;
            show_trades(&*store, &name, output.as_deref())
        }
        ExperimentsCommand::Analyze {
            name,
            config,
            output,
            granularity,
        } => {
            let config = load_config(&config.config)?;
            let store = open_store(&config)?;
            let prices = open_price_port(&config)?;
            let options = analysis_options(&config, granularity);
            let mut cache = AnalysisCache::new();
            show_analysis(&*store, &*prices, &mut cache, &name, options, output.as_deref())
        }
        ExperimentsCommand::Import { file, name, config } => {
            let config = load_config(&config.config)?;
            let store = open_store(&config)?;
            import_experiment(&*store, &file, name.as_deref())
        }
        ExperimentsCommand::Delete { name, config } => {
            let config = load_config(&config.config)?;
            let store = open_store(&config)?;
            store.delete_experiment(&name)?;
            eprintln!("Deleted experiment {name}");
            Ok(())
        }
    }
}

pub fn list_experiments<S: ExperimentStore + ?Sized>(store: &S) -> Result<(), AutotraderError> {
    let names = store.list_experiment_names()?;
    if names.is_empty() {
        eprintln!("No experiments stored");
        return Ok(());
    }
    for name in &names {
        println!("{name}");
    }
    eprintln!("{} experiments", names.len());
    Ok(())
}

pub fn show_experiment<S: ExperimentStore + ?Sized>(store: &S, name: &str) -> Result<(), AutotraderError> {
    let experiment = store.load_experiment(name)?;
    print!("{}", describe_experiment(&experiment)?);
    Ok(())
}

/// Execution summary, gain analysis and agent parameters. A flagged
/// experiment yields only its failure.
pub fn describe_experiment(experiment: &Experiment) -> Result<String, AutotraderError> {
    experiment.ensure_analyzable()?;
    let exec = &experiment.execution;
    let analysis = GainAnalysis::compute(experiment)?;

    let mut lines = vec![
        format!("=== {} ===", experiment.name),
        format!("Instrument:       {}", exec.instrument),
        format!("Start:            {}", format_timestamp(experiment.start)),
        format!("End:              {}", format_timestamp(experiment.end)),
        format!("Initial capital:  {:.2}", exec.initial_capital),
        format!("Final capital:    {:.2}", exec.final_capital),
        format!("Initial stocks:   {}", exec.initial_stocks),
        format!("Final stocks:     {}", exec.final_stocks),
        format!("Transactions:     {}", experiment.transactions.len()),
        String::new(),
        "=== Gain Analysis ===".to_string(),
        format!("Gain:             {:.2}", analysis.gain),
        format!("Gain (% capital): {:.4}%", analysis.gain_pct_initial_capital),
    ];
    if let Some(pct) = analysis.gain_pct_first_transaction {
        lines.push(format!("Gain (% 1st tx):  {:.4}%", pct));
    }
    lines.push(format!("Stock delta:      {}", analysis.stock_delta));
    lines.push(format!("Capital equiv.:   {:.2}", analysis.capital_equivalent));

    let entries = experiment.agent.entries();
    if !entries.is_empty() {
        lines.push(String::new());
        lines.push("=== Agent ===".to_string());
        for (key, value) in entries {
            lines.push(format!("  {key}: {value}"));
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    Ok(out)
}

pub fn show_trades<S: ExperimentStore + ?Sized>(
    store: &S,
    name: &str,
    output: Option<&Path>,
) -> Result<(), AutotraderError> {
    let experiment = store.load_experiment(name)?;
    let trades = reconstruct_trades(&experiment)?;
    if trades.is_empty() {
        println!("No transactions were executed in experiment {name}");
        return Ok(());
    }

    println!(
        "{:<19}  {:<19}  {:>9}  {:>8}  {:>12}  {:>12}  {:>10}  {:>8}",
        "open", "close", "held(min)", "volume", "open price", "close price", "gain", "gain %"
    );
    for trade in &trades {
        println!(
            "{:<19}  {:<19}  {:>9.1}  {:>8}  {:>12.4}  {:>12.4}  {:>10.2}  {:>7.3}%",
            format_timestamp(trade.open_time),
            format_timestamp(trade.close_time),
            trade.holding_minutes,
            trade.volume,
            trade.open_price,
            trade.close_price,
            trade.gain,
            trade.gain_pct_deployed,
        );
    }

    let ledger = TradeLedger::from_trades(&trades);
    println!(
        "\n{} trades: {} won, {} lost, {} even; total gain {:.2}; avg hold {:.1} min",
        ledger.total_trades,
        ledger.trades_won,
        ledger.trades_lost,
        ledger.trades_breakeven,
        ledger.total_gain,
        ledger.avg_holding_minutes,
    );

    if let Some(path) = output {
        CsvReportAdapter::new().write_trades(&trades, &path.display().to_string())?;
        eprintln!("Trades written to: {}", path.display());
    }
    Ok(())
}

pub fn show_analysis<S: ExperimentStore + ?Sized>(
    store: &S,
    prices: &dyn PricePort,
    cache: &mut AnalysisCache,
    name: &str,
    options: AnnotateOptions,
    output: Option<&Path>,
) -> Result<(), AutotraderError> {
    let experiment = store.load_experiment(name)?;
    eprintln!(
        "Fetching {} {} prices from {} to {}",
        experiment.execution.instrument,
        options.granularity,
        format_timestamp(experiment.start),
        format_timestamp(experiment.end),
    );
    let frame = analyze_experiment(&experiment, prices, cache, options)?;

    match summarize(&frame) {
        Summary::NoTransactions => {
            println!("No transactions were executed in experiment {name}");
        }
        Summary::Report(report) => {
            println!("=== Transactions ===");
            println!("Opened:           {}", report.opening_count);
            println!("Closed:           {}", report.closing_count);
            match report.positive_ratio {
                Some(ratio) => println!("Positive ratio:   {:.2}%", ratio),
                None => println!("Positive ratio:   n/a (no closed positions)"),
            }
            if let Some(d) = report.distribution {
                println!("\n=== Return per Closed Position ===");
                println!("count  {}", d.count);
                println!("mean   {:.4}%", d.mean * 100.0);
                match d.std {
                    Some(std) => println!("std    {:.4}%", std * 100.0),
                    None => println!("std    n/a"),
                }
                println!("min    {:.4}%", d.min * 100.0);
                println!("25%    {:.4}%", d.q25 * 100.0);
                println!("50%    {:.4}%", d.q50 * 100.0);
                println!("75%    {:.4}%", d.q75 * 100.0);
                println!("max    {:.4}%", d.max * 100.0);
            }
        }
    }

    if let Some(path) = output {
        CsvReportAdapter::new().write_frame(&frame, &path.display().to_string())?;
        eprintln!("Annotated frame written to: {}", path.display());
    }
    Ok(())
}

/// The single key of a `{name: record}` wrapper, when the document has one.
fn wrapped_name(document: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(document).ok()?;
    let object = value.as_object()?;
    if object.len() != 1 {
        return None;
    }
    let (key, inner) = object.iter().next()?;
    inner.get("execution").map(|_| key.clone())
}

pub fn import_experiment<S: ExperimentStore + ?Sized>(
    store: &S,
    file: &Path,
    name: Option<&str>,
) -> Result<(), AutotraderError> {
    let document = fs::read_to_string(file)?;
    let name = match name {
        Some(n) => n.to_string(),
        None => wrapped_name(&document)
            .or_else(|| file.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_default(),
    };

    let experiment = Experiment::from_document(&name, &document)?;
    experiment.validate()?;
    store.save_experiment(&experiment)?;
    tracing::info!(
        experiment = %name,
        transactions = experiment.transactions.len(),
        failed = experiment.is_failed(),
        "experiment imported"
    );
    eprintln!("Imported experiment {name}");
    Ok(())
}

fn run_backtest(command: BacktestCommand) -> Result<(), AutotraderError> {
    match command {
        BacktestCommand::Submit { request, config } => {
            let config = load_config(&config.config)?;
            let store = open_store(&config)?;
            let request_config = FileConfigAdapter::from_file(&request)?;
            let (name, request) = build_backtest_request(&request_config, Utc::now().naive_utc())?;
            store.submit_backtest(&name, &request)?;
            eprintln!("Backtest {name} submitted: {}", request.status);
            Ok(())
        }
        BacktestCommand::List { config } => {
            let config = load_config(&config.config)?;
            let store = open_store(&config)?;
            list_backtests(&*store)
        }
        BacktestCommand::Delete { name, config } => {
            let config = load_config(&config.config)?;
            let store = open_store(&config)?;
            store.delete_backtest(&name)?;
            eprintln!("Deleted backtest {name}");
            Ok(())
        }
    }
}

pub fn list_backtests<S: BacktestStore + ?Sized>(store: &S) -> Result<(), AutotraderError> {
    let backtests = store.list_backtests()?;
    if backtests.is_empty() {
        eprintln!("No pending backtests");
        return Ok(());
    }
    for (name, request) in &backtests {
        println!(
            "{}\t{}\t{} days\t{}\t{}",
            name,
            request.execution_config.instrument,
            request.execution_config.sim_len_days,
            request.status,
            request.created_at,
        );
    }
    Ok(())
}

fn run_deploy(command: DeployCommand) -> Result<(), AutotraderError> {
    match command {
        DeployCommand::Submit { request, config } => {
            let config = load_config(&config.config)?;
            let store = open_store(&config)?;
            let request_config = FileConfigAdapter::from_file(&request)?;
            let (name, request) =
                build_deployment_request(&request_config, Utc::now().naive_utc())?;
            store.submit_deployment(&name, &request)?;
            eprintln!("Deployment {name} submitted: {}", request.status);
            Ok(())
        }
        DeployCommand::List { config } => {
            let config = load_config(&config.config)?;
            let store = open_store(&config)?;
            list_deployments(&*store)
        }
    }
}

pub fn list_deployments<S: BacktestStore + ?Sized>(store: &S) -> Result<(), AutotraderError> {
    let deployments = store.list_deployments()?;
    if deployments.is_empty() {
        eprintln!("No deployments submitted");
        return Ok(());
    }
    for (name, request) in &deployments {
        println!(
            "{}\t{}\t{}\t{}",
            name, request.instrument, request.status, request.created_at,
        );
    }
    Ok(())
}

fn run_instruments(config_path: &Path) -> Result<(), AutotraderError> {
    let config = load_config(config_path)?;
    let prices = open_price_port(&config)?;
    let instruments: Vec<String> = prices
        .list_instruments()?
        .into_iter()
        .filter(|i| market_for_instrument(i).is_some())
        .collect();

    if instruments.is_empty() {
        eprintln!("No instruments with a known market");
    }
    for instrument in &instruments {
        println!("{instrument}");
    }
    Ok(())
}

/// Start of a `--start` value. A bare date starts at midnight.
pub fn parse_range_start(raw: &str) -> Result<NaiveDateTime, AutotraderError> {
    parse_range_bound(raw, "start", NaiveTime::default())
}

/// End of an `--end` value. A bare date runs to 23:59 of that day.
pub fn parse_range_end(raw: &str) -> Result<NaiveDateTime, AutotraderError> {
    parse_range_bound(raw, "end", NaiveTime::from_hms_opt(23, 59, 0).unwrap_or_default())
}

fn parse_range_bound(raw: &str, which: &str, day_time: NaiveTime) -> Result<NaiveDateTime, AutotraderError> {
    let raw = raw.trim();
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(ts);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|date| date.and_time(day_time))
        .map_err(|_| AutotraderError::InvalidArgument {
            argument: which.to_string(),
            reason: format!("expected YYYY-MM-DD or YYYY-MM-DD HH:MM[:SS], got {raw:?}"),
        })
}

/// Fetches `[start, end]` and lays it on the granularity grid. `end` is
/// clamped to `now`.
pub fn fetch_prices(
    prices: &dyn PricePort,
    instrument: &str,
    start: NaiveDateTime,
    end: NaiveDateTime,
    now: NaiveDateTime,
    options: AnnotateOptions,
) -> Result<Vec<NormalizedBar>, AutotraderError> {
    let end = end.min(now);
    if start >= end {
        return Err(AutotraderError::InvalidArgument {
            argument: "start".into(),
            reason: format!(
                "{} is not before {}",
                format_timestamp(start),
                format_timestamp(end)
            ),
        });
    }
    let bars = prices.fetch_price_series(instrument, start, end, options.granularity)?;
    if bars.is_empty() {
        return Err(AutotraderError::NoPriceData {
            instrument: instrument.to_string(),
            start: format_timestamp(start),
            end: format_timestamp(end),
        });
    }
    Ok(normalize(&bars, options.granularity, options.max_gap))
}

pub fn show_prices(
    prices: &dyn PricePort,
    instrument: &str,
    start: NaiveDateTime,
    end: NaiveDateTime,
    now: NaiveDateTime,
    options: AnnotateOptions,
    output: Option<&Path>,
) -> Result<(), AutotraderError> {
    eprintln!(
        "Fetching {instrument} {} prices from {} to {}",
        options.granularity,
        format_timestamp(start),
        format_timestamp(end.min(now)),
    );
    let grid = fetch_prices(prices, instrument, start, end, now, options)?;
    let observed: Vec<&NormalizedBar> = grid.iter().filter(|b| !b.is_missing()).collect();

    println!("=== {instrument} ===");
    println!("Bars:             {}", grid.len());
    println!("Missing:          {}", grid.len() - observed.len());
    if let (Some(first), Some(last)) = (observed.first(), observed.last()) {
        let high = observed.iter().filter_map(|b| b.high).fold(f64::MIN, f64::max);
        let low = observed.iter().filter_map(|b| b.low).fold(f64::MAX, f64::min);
        let open = first.open.unwrap_or_default();
        let close = last.close.unwrap_or_default();
        println!("Open:             {:.4}", open);
        println!("High:             {:.4}", high);
        println!("Low:              {:.4}", low);
        println!("Close:            {:.4}", close);
        if open != 0.0 {
            println!("Change:           {:.4}%", (close - open) / open * 100.0);
        }
    }

    if let Some(path) = output {
        CsvReportAdapter::new().write_prices(&grid, &path.display().to_string())?;
        eprintln!("Prices written to: {}", path.display());
    }
    Ok(())
}

fn run_prices(
    instrument: &str,
    start: &str,
    end: &str,
    granularity: Option<Granularity>,
    output: Option<&Path>,
    config_path: &Path,
) -> Result<(), AutotraderError> {
    let start = parse_range_start(start)?;
    let end = parse_range_end(end)?;
    let config = load_config(config_path)?;
    let prices = open_price_port(&config)?;
    let options = analysis_options(&config, granularity);
    show_prices(
        &*prices,
        instrument,
        start,
        end,
        Utc::now().naive_utc(),
        options,
        output,
    )
}

fn run_spread(instrument: &str, config_path: &Path) -> Result<(), AutotraderError> {
    let config = load_config(config_path)?;

    #[cfg(feature = "oanda")]
    {
        use crate::adapters::oanda_adapter::OandaAdapter;
        let spread = OandaAdapter::from_config(&config)?.spread(instrument)?;
        println!("{instrument} spread: {spread}");
        Ok(())
    }

    #[cfg(not(feature = "oanda"))]
    {
        let _ = (instrument, config);
        Err(AutotraderError::ConfigInvalid {
            section: "prices".into(),
            key: "source".into(),
            reason: "oanda feature is required for spread".into(),
        })
    }
}

fn opt_string(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn opt_parse<T: std::str::FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<T>, AutotraderError> {
    match opt_string(config, section, key) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| AutotraderError::ConfigInvalid {
            section: section.into(),
            key: key.into(),
            reason: format!("cannot parse {raw:?}"),
        }),
    }
}

fn opt_bool(config: &dyn ConfigPort, section: &str, key: &str) -> Option<bool> {
    opt_string(config, section, key).map(|_| config.get_bool(section, key, false))
}

pub fn build_agent_config(config: &dyn ConfigPort) -> Result<AgentConfig, AutotraderError> {
    Ok(AgentConfig {
        rsi_threshold: opt_parse(config, "agent", "rsi_threshold")?,
        stoch_threshold: opt_parse(config, "agent", "stoch_threshold")?,
        trade_quantity: opt_parse(config, "agent", "trade_quantity")?,
        loss_price_pct: opt_parse(config, "agent", "loss_price_%")?,
        gain_price_pct: opt_parse(config, "agent", "gain_price_%")?,
        activity_limit: opt_parse(config, "agent", "activity_limit")?,
        condition_macd: opt_bool(config, "agent", "condition_macd"),
        condition_rsi_50: opt_bool(config, "agent", "condition_rsi_50"),
        condition_ema_true: opt_bool(config, "agent", "condition_ema_true"),
        extra: Default::default(),
    })
}

/// `HH:MM-HH:MM`, or `closed`.
fn parse_session(raw: &str) -> Option<Session> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("closed") {
        return Some(Session::CLOSED);
    }
    let (start, end) = raw.split_once('-')?;
    let hm = |s: &str| -> Option<(u32, u32)> {
        let (h, m) = s.trim().split_once(':')?;
        Some((h.parse().ok()?, m.parse().ok()?))
    };
    Some(Session {
        start: hm(start)?,
        end: hm(end)?,
    })
}

/// Market default hours for the instrument, overridden per weekday by `[hours]`
/// keys `0` (Monday) to `6`.
pub fn build_weekly_hours(config: &dyn ConfigPort, instrument: &str) -> Result<WeeklyHours, AutotraderError> {
    let mut hours = market_for_instrument(instrument)
        .unwrap_or(Market::Nyse)
        .default_hours();
    for day in 0..7u32 {
        let key = day.to_string();
        if let Some(raw) = opt_string(config, "hours", &key) {
            let session = parse_session(&raw).ok_or_else(|| AutotraderError::ConfigInvalid {
                section: "hours".into(),
                key: key.clone(),
                reason: format!("expected HH:MM-HH:MM or closed, got {raw:?}"),
            })?;
            hours.insert(key, session);
        }
    }
    Ok(hours)
}

pub fn build_backtest_request(
    config: &dyn ConfigPort,
    now: NaiveDateTime,
) -> Result<(String, BacktestRequest), AutotraderError> {
    validate_request_config(config)?;
    let name = opt_string(config, "experiment", "name").unwrap_or_default();
    let instrument = opt_string(config, "execution", "instrument").unwrap_or_default();

    let request = BacktestRequest {
        agent_config: build_agent_config(config)?,
        execution_config: ExecutionConfig {
            sim_len_days: config.get_int("execution", "sim_len_days", 1) as u32,
            initial_capital: config.get_double("execution", "initial_capital", 0.0),
            initial_stocks: config.get_int("execution", "initial_stocks", 0) as u32,
            spread_simulation: config.get_bool("execution", "spread_simulation", false),
            instrument: instrument.clone(),
        },
        time_config: build_weekly_hours(config, &instrument)?,
        status: BacktestStatus::ReadyToStart,
        created_at: now.format(CREATED_AT_FORMAT).to_string(),
    };
    request.validate(&name)?;
    Ok((name, request))
}

pub fn build_deployment_request(
    config: &dyn ConfigPort,
    now: NaiveDateTime,
) -> Result<(String, DeploymentRequest), AutotraderError> {
    validate_deployment_config(config)?;
    let name = opt_string(config, "experiment", "name").unwrap_or_default();
    let instrument = opt_string(config, "execution", "instrument").unwrap_or_default();

    let request = DeploymentRequest {
        agent_config: build_agent_config(config)?,
        time_config: build_weekly_hours(config, &instrument)?,
        instrument,
        status: BacktestStatus::ReadyToStart,
        created_at: now.format(CREATED_AT_FORMAT).to_string(),
    };
    request.validate(&name)?;
    Ok((name, request))
}
