//! CSV file price adapter.
//!
//! One file per instrument and granularity: `<dir>/<INSTRUMENT>_<GRANULARITY>.csv`
//! with a `time,o,h,l,c,volume` header.

use crate::domain::error::AutotraderError;
use crate::domain::ohlcv::{Granularity, PriceBar};
use crate::domain::transaction::parse_timestamp;
use crate::ports::price_port::PricePort;
use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

pub struct CsvPriceAdapter {
    base_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CsvBar {
    time: String,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    volume: f64,
}

impl CsvPriceAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, instrument: &str, granularity: Granularity) -> PathBuf {
        self.base_path
            .join(format!("{}_{}.csv", instrument, granularity.as_str()))
    }
}

/// Accepts `YYYY-MM-DD HH:MM:SS` or an RFC 3339 instant (as the broker exports).
fn parse_time(value: &str) -> Result<NaiveDateTime, AutotraderError> {
    parse_timestamp(value).or_else(|err| {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.naive_utc())
            .map_err(|_| err)
    })
}

impl PricePort for CsvPriceAdapter {
    fn fetch_price_series(
        &self,
        instrument: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        granularity: Granularity,
    ) -> Result<Vec<PriceBar>, AutotraderError> {
        let path = self.csv_path(instrument, granularity);
        let content = fs::read_to_string(&path).map_err(|e| AutotraderError::UpstreamFetch {
            instrument: instrument.to_string(),
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for result in rdr.deserialize() {
            let record: CsvBar = result.map_err(|e| AutotraderError::UpstreamFetch {
                instrument: instrument.to_string(),
                reason: format!("CSV parse error: {}", e),
            })?;

            let timestamp = parse_time(&record.time)?;
            if timestamp < start || timestamp > end {
                continue;
            }

            bars.push(PriceBar {
                timestamp,
                open: record.o,
                high: record.h,
                low: record.l,
                close: record.c,
                volume: record.volume,
            });
        }

        // Stable: duplicate timestamps keep file order.
        bars.sort_by_key(|b| b.timestamp);
        tracing::debug!(
            instrument,
            granularity = %granularity,
            bars = bars.len(),
            file = %path.display(),
            "loaded price series"
        );
        Ok(bars)
    }

    fn list_instruments(&self) -> Result<Vec<String>, AutotraderError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| AutotraderError::UpstreamFetch {
            instrument: "*".to_string(),
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut instruments = BTreeSet::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();

            let Some(stem) = name_str.strip_suffix(".csv") else {
                continue;
            };
            let Some((instrument, granularity)) = stem.rsplit_once('_') else {
                continue;
            };
            if granularity.parse::<Granularity>().is_ok() {
                instruments.insert(instrument.to_string());
            }
        }

        Ok(instruments.into_iter().collect())
    }
}
