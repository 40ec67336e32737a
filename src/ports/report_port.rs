//! Report output port trait.

use crate::domain::annotate::AnnotatedFrame;
use crate::domain::error::AutotraderError;
use crate::domain::price_series::NormalizedBar;
use crate::domain::trades::Trade;

/// Port for exporting analysis results.
pub trait ReportPort {
    fn write_frame(&self, frame: &AnnotatedFrame, output_path: &str) -> Result<(), AutotraderError>;

    fn write_trades(&self, trades: &[Trade], output_path: &str) -> Result<(), AutotraderError>;

    fn write_prices(&self, bars: &[NormalizedBar], output_path: &str) -> Result<(), AutotraderError>;
}
