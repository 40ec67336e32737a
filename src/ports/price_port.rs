//! Price data port trait.

use crate::domain::error::AutotraderError;
use crate::domain::ohlcv::{Granularity, PriceBar};
use chrono::NaiveDateTime;

pub trait PricePort {
    /// Bars covering `[start, end]`. Order and duplicates are whatever the
    /// source returns; normalization happens downstream.
    fn fetch_price_series(
        &self,
        instrument: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        granularity: Granularity,
    ) -> Result<Vec<PriceBar>, AutotraderError>;

    fn list_instruments(&self) -> Result<Vec<String>, AutotraderError>;
}
