//! Core domain types and logic.

pub mod error;
pub mod transaction;
pub mod experiment;
pub mod ohlcv;
pub mod price_series;
pub mod trades;
pub mod annotate;
pub mod statistics;
pub mod cache;
pub mod market;
pub mod backtest_request;
pub mod config_validation;
