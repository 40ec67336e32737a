//! Raw execution events as recorded by the trading agent.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use super::error::AutotraderError;

/// Timestamp format used for transaction keys and experiment bounds.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, AutotraderError> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).map_err(|_| {
        AutotraderError::InvalidTimestamp {
            value: value.to_string(),
        }
    })
}

pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Buy => write!(f, "buy"),
            Action::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub action: Action,
    pub price: f64,
    pub volume: f64,
    #[serde(default, deserialize_with = "one_or_many")]
    pub reasons: Vec<String>,
}

impl Transaction {
    /// Buys count positive, sells negative, whatever sign the log used.
    pub fn signed_volume(&self) -> f64 {
        match self.action {
            Action::Buy => self.volume.abs(),
            Action::Sell => -self.volume.abs(),
        }
    }

    /// Capital moved by this transaction: price × |volume|.
    pub fn notional(&self) -> f64 {
        self.price * self.volume.abs()
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Nothing(()),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) if s.is_empty() => Vec::new(),
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
        OneOrMany::Nothing(()) => Vec::new(),
    })
}

/// Transactions of one experiment keyed by their `YYYY-MM-DD HH:MM:SS` timestamp.
///
/// Key order is lexical, which for this format is also chronological, but
/// callers that pair events go through [`TransactionLog::chronological`] so a
/// malformed key is reported rather than mis-sorted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionLog(BTreeMap<String, Transaction>);

impl TransactionLog {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, ts: NaiveDateTime, transaction: Transaction) {
        self.0.insert(format_timestamp(ts), transaction);
    }

    pub fn get(&self, key: &str) -> Option<&Transaction> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Transaction)> {
        self.0.iter()
    }

    pub fn chronological(&self) -> Result<Vec<(NaiveDateTime, &Transaction)>, AutotraderError> {
        let mut events = self
            .0
            .iter()
            .map(|(key, t)| parse_timestamp(key).map(|ts| (ts, t)))
            .collect::<Result<Vec<_>, _>>()?;
        events.sort_by_key(|(ts, _)| *ts);
        Ok(events)
    }

    /// Transactions keyed by parsed timestamp, for exact-match bar lookups.
    pub fn by_timestamp(&self) -> Result<BTreeMap<NaiveDateTime, &Transaction>, AutotraderError> {
        Ok(self.chronological()?.into_iter().collect())
    }
}

impl FromIterator<(String, Transaction)> for TransactionLog {
    fn from_iter<I: IntoIterator<Item = (String, Transaction)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buy(price: f64, volume: f64) -> Transaction {
        Transaction {
            action: Action::Buy,
            price,
            volume,
            reasons: vec!["rsi".into()],
        }
    }

    #[test]
    fn parse_and_format_timestamp() {
        let ts = parse_timestamp("2022-05-02 14:31:00").unwrap();
        assert_eq!(format_timestamp(ts), "2022-05-02 14:31:00");
    }

    #[test]
    fn parse_timestamp_rejects_minutes_only() {
        let err = parse_timestamp("2022-05-02 14:31").unwrap_err();
        assert!(matches!(err, AutotraderError::InvalidTimestamp { .. }));
    }

    #[test]
    fn signed_volume_ignores_stored_sign() {
        let sell_negative = Transaction {
            action: Action::Sell,
            price: 10.0,
            volume: -3.0,
            reasons: vec![],
        };
        let sell_positive = Transaction {
            volume: 3.0,
            ..sell_negative.clone()
        };
        assert_eq!(sell_negative.signed_volume(), -3.0);
        assert_eq!(sell_positive.signed_volume(), -3.0);
        assert_eq!(buy(10.0, -3.0).signed_volume(), 3.0);
    }

    #[test]
    fn reasons_accepts_string_or_list() {
        let single: Transaction =
            serde_json::from_str(r#"{"action":"sell","price":1.5,"volume":-2,"reasons":"take_profit"}"#)
                .unwrap();
        assert_eq!(single.reasons, vec!["take_profit"]);

        let many: Transaction = serde_json::from_str(
            r#"{"action":"buy","price":1.5,"volume":2,"reasons":["macd","rsi_50"]}"#,
        )
        .unwrap();
        assert_eq!(many.reasons, vec!["macd", "rsi_50"]);

        let missing: Transaction =
            serde_json::from_str(r#"{"action":"buy","price":1.5,"volume":2}"#).unwrap();
        assert!(missing.reasons.is_empty());
    }

    #[test]
    fn chronological_sorts_by_parsed_time() {
        let log: TransactionLog = vec![
            ("2022-05-02 14:35:00".to_string(), buy(2.0, 1.0)),
            ("2022-05-02 14:31:00".to_string(), buy(1.0, 1.0)),
        ]
        .into_iter()
        .collect();

        let events = log.chronological().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].1.price, 1.0);
        assert_eq!(events[1].1.price, 2.0);
    }

    #[test]
    fn chronological_reports_bad_key() {
        let log: TransactionLog = vec![("yesterday".to_string(), buy(1.0, 1.0))]
            .into_iter()
            .collect();
        assert!(matches!(
            log.chronological(),
            Err(AutotraderError::InvalidTimestamp { .. })
        ));
    }
}
