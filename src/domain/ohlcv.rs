//! Price bar representation.

use chrono::{Duration, NaiveDateTime};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Fixed interval between consecutive bars, named the way the broker API names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Granularity {
    #[default]
    M1,
    M2,
    M5,
    M15,
    H1,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::M1 => "M1",
            Granularity::M2 => "M2",
            Granularity::M5 => "M5",
            Granularity::M15 => "M15",
            Granularity::H1 => "H1",
        }
    }

    pub fn step(&self) -> Duration {
        match self {
            Granularity::M1 => Duration::minutes(1),
            Granularity::M2 => Duration::minutes(2),
            Granularity::M5 => Duration::minutes(5),
            Granularity::M15 => Duration::minutes(15),
            Granularity::H1 => Duration::hours(1),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "M1" => Ok(Granularity::M1),
            "M2" => Ok(Granularity::M2),
            "M5" => Ok(Granularity::M5),
            "M15" => Ok(Granularity::M15),
            "H1" => Ok(Granularity::H1),
            other => Err(format!("unsupported granularity: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn granularity_round_trips_through_str() {
        for g in [
            Granularity::M1,
            Granularity::M2,
            Granularity::M5,
            Granularity::M15,
            Granularity::H1,
        ] {
            assert_eq!(g.as_str().parse::<Granularity>().unwrap(), g);
        }
    }

    #[test]
    fn granularity_parse_is_case_insensitive() {
        assert_eq!("m5".parse::<Granularity>().unwrap(), Granularity::M5);
        assert!("D".parse::<Granularity>().is_err());
    }

    #[test]
    fn step_durations() {
        assert_eq!(Granularity::M1.step(), Duration::minutes(1));
        assert_eq!(Granularity::M15.step(), Duration::minutes(15));
        assert_eq!(Granularity::H1.step(), Duration::minutes(60));
    }

    #[test]
    fn default_is_one_minute() {
        assert_eq!(Granularity::default(), Granularity::M1);
    }
}
