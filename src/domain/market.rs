//! Static market lookup data: which market an instrument trades on and that
//! market's default weekly session hours (UTC).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Market {
    Nyse,
    Nasdaq,
}

/// One day's session as `(hour, minute)` bounds. `start == end` means closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub start: (u32, u32),
    pub end: (u32, u32),
}

impl Session {
    pub const CLOSED: Session = Session {
        start: (0, 0),
        end: (0, 0),
    };

    pub fn is_closed(&self) -> bool {
        self.start == self.end
    }
}

/// Sessions by weekday, Monday = 0. Serialized with string keys ("0".."6").
pub type WeeklyHours = BTreeMap<String, Session>;

impl Market {
    pub fn name(&self) -> &'static str {
        match self {
            Market::Nyse => "NYSE",
            Market::Nasdaq => "NASDAQ",
        }
    }

    pub fn default_hours(&self) -> WeeklyHours {
        let weekday = Session {
            start: (14, 30),
            end: (21, 0),
        };
        (0..7u32)
            .map(|day| {
                let session = if day < 5 { weekday } else { Session::CLOSED };
                (day.to_string(), session)
            })
            .collect()
    }
}

const NYSE_INSTRUMENTS: &[&str] = &[
    "AUD_CAD", "XAU_USD", "XAU_AUD", "XAU_CAD", "XAU_CHF", "XAU_EUR", "XAU_GBP", "XAU_HKD",
    "XAU_JPY", "XAU_NZD", "XAU_SGD", "XAU_XAG", "XAG_USD", "XAG_AUD", "XAG_CAD", "XAG_CHF",
    "XAG_EUR", "XAG_GBP", "XAG_HKD", "XAG_JPY", "XAG_NZD", "XAG_SGD", "USB10Y_USD",
    "USB02Y_USD", "USB05Y_USD", "NAS100_USD", "US2000_USD", "SPX500_USD", "USB30Y_USD",
    "US30_USD", "USD_CAD", "USD_CHF", "USD_CNH", "USD_CZK", "USD_DKK", "USD_HKD", "USD_HUF",
    "USD_JPY", "USD_MXN", "USD_NOK", "USD_PLN", "USD_SEK", "USD_SGD", "USD_THB", "USD_TRY",
    "USD_ZAR",
];

pub fn market_for_instrument(instrument: &str) -> Option<Market> {
    NYSE_INSTRUMENTS
        .contains(&instrument)
        .then_some(Market::Nyse)
}

pub fn known_instruments() -> &'static [&'static str] {
    NYSE_INSTRUMENTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_instrument_maps_to_nyse() {
        assert_eq!(market_for_instrument("SPX500_USD"), Some(Market::Nyse));
        assert_eq!(market_for_instrument("EUR_USD"), None);
    }

    #[test]
    fn default_hours_close_at_weekend() {
        let hours = Market::Nasdaq.default_hours();
        assert_eq!(hours.len(), 7);
        assert_eq!(hours["0"].start, (14, 30));
        assert_eq!(hours["4"].end, (21, 0));
        assert!(hours["5"].is_closed());
        assert!(hours["6"].is_closed());
    }

    #[test]
    fn session_serializes_as_pairs() {
        let json = serde_json::to_string(&Market::Nyse.default_hours()["1"]).unwrap();
        assert_eq!(json, r#"{"start":[14,30],"end":[21,0]}"#);
    }
}
