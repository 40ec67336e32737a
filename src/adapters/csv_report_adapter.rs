//! CSV export of annotated frames and reconstructed trades.

use crate::domain::annotate::AnnotatedFrame;
use crate::domain::error::AutotraderError;
use crate::domain::price_series::NormalizedBar;
use crate::domain::trades::Trade;
use crate::domain::transaction::format_timestamp;
use crate::ports::report_port::ReportPort;
use std::io::Write;

pub const FRAME_HEADER: [&str; 14] = [
    "time",
    "o",
    "h",
    "l",
    "c",
    "volume",
    "opening",
    "closing",
    "transaction_value",
    "transaction_value_%",
    "positive_transaction",
    "negative_transaction",
    "buy_plot",
    "sell_plot",
];

pub const PRICES_HEADER: [&str; 6] = ["time", "o", "h", "l", "c", "volume"];

pub const TRADES_HEADER: [&str; 10] = [
    "open_time",
    "close_time",
    "holding_minutes",
    "volume",
    "open_price",
    "close_price",
    "gain",
    "gain_%_deployed",
    "gain_%_initial_capital",
    "close_reasons",
];

#[derive(Debug, Default)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }

    pub fn write_frame_to<W: Write>(
        &self,
        frame: &AnnotatedFrame,
        writer: W,
    ) -> Result<(), AutotraderError> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(FRAME_HEADER).map_err(csv_err)?;
        for row in &frame.rows {
            let bar = &row.bar;
            let mut record = vec![format_timestamp(bar.timestamp)];
            record.extend(
                [
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume,
                    row.opening,
                    row.closing,
                    row.transaction_value,
                    row.transaction_value_pct,
                    row.positive_transaction,
                    row.negative_transaction,
                    row.buy_plot,
                    row.sell_plot,
                ]
                .iter()
                .map(|v| cell(*v)),
            );
            wtr.write_record(&record).map_err(csv_err)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn write_trades_to<W: Write>(&self, trades: &[Trade], writer: W) -> Result<(), AutotraderError> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(TRADES_HEADER).map_err(csv_err)?;
        for trade in trades {
            wtr.write_record([
                format_timestamp(trade.open_time),
                format_timestamp(trade.close_time),
                trade.holding_minutes.to_string(),
                trade.volume.to_string(),
                trade.open_price.to_string(),
                trade.close_price.to_string(),
                trade.gain.to_string(),
                trade.gain_pct_deployed.to_string(),
                trade.gain_pct_initial_capital.to_string(),
                trade.close_reasons.join(";"),
            ])
            .map_err(csv_err)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn write_prices_to<W: Write>(&self, bars: &[NormalizedBar], writer: W) -> Result<(), AutotraderError> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(PRICES_HEADER).map_err(csv_err)?;
        for bar in bars {
            let mut record = vec![format_timestamp(bar.timestamp)];
            record.extend([bar.open, bar.high, bar.low, bar.close, bar.volume].iter().map(|v| cell(*v)));
            wtr.write_record(&record).map_err(csv_err)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn csv_err(e: csv::Error) -> AutotraderError {
    AutotraderError::Io(std::io::Error::other(e))
}

impl ReportPort for CsvReportAdapter {
    fn write_frame(&self, frame: &AnnotatedFrame, output_path: &str) -> Result<(), AutotraderError> {
        let file = std::fs::File::create(output_path)?;
        self.write_frame_to(frame, file)?;
        tracing::info!(path = output_path, rows = frame.len(), "wrote annotated frame");
        Ok(())
    }

    fn write_trades(&self, trades: &[Trade], output_path: &str) -> Result<(), AutotraderError> {
        let file = std::fs::File::create(output_path)?;
        self.write_trades_to(trades, file)?;
        tracing::info!(path = output_path, trades = trades.len(), "wrote trades");
        Ok(())
    }

    fn write_prices(&self, bars: &[NormalizedBar], output_path: &str) -> Result<(), AutotraderError> {
        let file = std::fs::File::create(output_path)?;
        self.write_prices_to(bars, file)?;
        tracing::info!(path = output_path, bars = bars.len(), "wrote prices");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::annotate::AnnotatedRow;
    use crate::domain::transaction::parse_timestamp;
    use tempfile::TempDir;

    fn frame() -> AnnotatedFrame {
        let ts = parse_timestamp("2022-05-02 14:30:00").unwrap();
        AnnotatedFrame {
            rows: vec![
                AnnotatedRow {
                    bar: NormalizedBar {
                        timestamp: ts,
                        open: Some(100.0),
                        high: Some(101.0),
                        low: Some(99.0),
                        close: Some(100.5),
                        volume: Some(10.0),
                    },
                    opening: Some(2.0),
                    closing: None,
                    transaction_value: None,
                    transaction_value_pct: None,
                    positive_transaction: None,
                    negative_transaction: None,
                    buy_plot: Some(100.5),
                    sell_plot: None,
                },
                AnnotatedRow {
                    bar: NormalizedBar {
                        timestamp: ts + chrono::Duration::minutes(1),
                        open: None,
                        high: None,
                        low: None,
                        close: None,
                        volume: None,
                    },
                    opening: None,
                    closing: None,
                    transaction_value: None,
                    transaction_value_pct: None,
                    positive_transaction: None,
                    negative_transaction: None,
                    buy_plot: None,
                    sell_plot: None,
                },
            ],
        }
    }

    #[test]
    fn frame_csv_has_empty_cells_for_missing() {
        let mut out = Vec::new();
        CsvReportAdapter::new().write_frame_to(&frame(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("time,o,h,l,c,volume,opening"));
        assert_eq!(lines[1], "2022-05-02 14:30:00,100,101,99,100.5,10,2,,,,,,100.5,");
        assert_eq!(lines[2], "2022-05-02 14:31:00,,,,,,,,,,,,,");
    }

    #[test]
    fn trades_csv_joins_reasons() {
        let trade = Trade {
            open_time: parse_timestamp("2022-05-02 14:30:00").unwrap(),
            close_time: parse_timestamp("2022-05-02 15:00:00").unwrap(),
            holding_minutes: 30.0,
            volume: -2.0,
            open_price: 100.0,
            close_price: 105.0,
            gain: 10.0,
            gain_pct_deployed: 5.0,
            gain_pct_initial_capital: 0.1,
            close_reasons: vec!["gain_price_%".into(), "rsi".into()],
        };
        let mut out = Vec::new();
        CsvReportAdapter::new().write_trades_to(&[trade], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.lines().nth(1).unwrap().ends_with(",gain_price_%;rsi"));
    }

    #[test]
    fn writes_to_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frame.csv");
        CsvReportAdapter::new()
            .write_frame(&frame(), path.to_str().unwrap())
            .unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn prices_csv_keeps_gaps_as_empty_cells() {
        let bars: Vec<NormalizedBar> = frame().rows.into_iter().map(|r| r.bar).collect();
        let mut out = Vec::new();
        CsvReportAdapter::new().write_prices_to(&bars, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "time,o,h,l,c,volume");
        assert_eq!(lines[1], "2022-05-02 14:30:00,100,101,99,100.5,10");
        assert_eq!(lines[2], "2022-05-02 14:31:00,,,,,");
    }
}
