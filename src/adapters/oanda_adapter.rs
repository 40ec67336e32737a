//! OANDA v3 REST price adapter.
//!
//! Candles are requested with mid prices and only complete candles are kept.
//! The API caps a single response at 5000 candles, so long ranges are
//! fetched in consecutive windows.

use crate::domain::error::AutotraderError;
use crate::domain::ohlcv::{Granularity, PriceBar};
use crate::ports::config_port::ConfigPort;
use crate::ports::price_port::PricePort;
use chrono::{DateTime, NaiveDateTime};
use reqwest::blocking::Client;
use reqwest::header;
use serde::Deserialize;

/// Candles per request; below the API's 5000 limit.
const CANDLES_PER_REQUEST: i32 = 4000;
const RFC3339_SECONDS: &str = "%Y-%m-%dT%H:%M:%SZ";

pub struct OandaAdapter {
    client: Client,
    base_url: String,
    account_id: String,
}

#[derive(Debug, Deserialize)]
struct CandlesResponse {
    #[serde(default)]
    candles: Vec<Candle>,
}

#[derive(Debug, Deserialize)]
struct Candle {
    complete: bool,
    #[serde(default)]
    volume: f64,
    time: String,
    mid: Option<CandlePrices>,
}

/// OANDA sends prices as decimal strings.
#[derive(Debug, Deserialize)]
struct CandlePrices {
    o: String,
    h: String,
    l: String,
    c: String,
}

#[derive(Debug, Deserialize)]
struct InstrumentsResponse {
    instruments: Vec<InstrumentEntry>,
}

#[derive(Debug, Deserialize)]
struct InstrumentEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PricingResponse {
    prices: Vec<PriceEntry>,
}

#[derive(Debug, Deserialize)]
struct PriceEntry {
    #[serde(default)]
    bids: Vec<PriceBucket>,
    #[serde(default)]
    asks: Vec<PriceBucket>,
}

#[derive(Debug, Deserialize)]
struct PriceBucket {
    price: String,
}

fn upstream(instrument: &str, reason: impl ToString) -> AutotraderError {
    AutotraderError::UpstreamFetch {
        instrument: instrument.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_price(instrument: &str, field: &str, value: &str) -> Result<f64, AutotraderError> {
    value
        .parse::<f64>()
        .map_err(|e| upstream(instrument, format!("invalid {field} price {value:?}: {e}")))
}

pub fn parse_candles(instrument: &str, body: &str) -> Result<Vec<PriceBar>, AutotraderError> {
    let response: CandlesResponse =
        serde_json::from_str(body).map_err(|e| upstream(instrument, e))?;

    let mut bars = Vec::with_capacity(response.candles.len());
    for candle in response.candles.into_iter().filter(|c| c.complete) {
        let Some(mid) = candle.mid else {
            continue;
        };
        let timestamp = DateTime::parse_from_rfc3339(&candle.time)
            .map_err(|e| upstream(instrument, format!("invalid candle time {:?}: {e}", candle.time)))?
            .naive_utc();
        bars.push(PriceBar {
            timestamp,
            open: parse_price(instrument, "open", &mid.o)?,
            high: parse_price(instrument, "high", &mid.h)?,
            low: parse_price(instrument, "low", &mid.l)?,
            close: parse_price(instrument, "close", &mid.c)?,
            volume: candle.volume,
        });
    }
    Ok(bars)
}

pub fn parse_instruments(body: &str) -> Result<Vec<String>, AutotraderError> {
    let response: InstrumentsResponse =
        serde_json::from_str(body).map_err(|e| upstream("*", e))?;
    let mut names: Vec<String> = response.instruments.into_iter().map(|i| i.name).collect();
    names.sort();
    Ok(names)
}

/// Best ask minus best bid. An inverted or locked book is an error.
pub fn parse_spread(instrument: &str, body: &str) -> Result<f64, AutotraderError> {
    let response: PricingResponse =
        serde_json::from_str(body).map_err(|e| upstream(instrument, e))?;
    let entry = response
        .prices
        .first()
        .ok_or_else(|| upstream(instrument, "no pricing returned"))?;
    let bid = entry
        .bids
        .first()
        .ok_or_else(|| upstream(instrument, "no bid price"))?;
    let ask = entry
        .asks
        .first()
        .ok_or_else(|| upstream(instrument, "no ask price"))?;

    let bid = parse_price(instrument, "bid", &bid.price)?;
    let ask = parse_price(instrument, "ask", &ask.price)?;
    if ask <= bid {
        return Err(upstream(
            instrument,
            format!("unexpected bid/ask values: bid {bid}, ask {ask}"),
        ));
    }
    Ok(ask - bid)
}

/// Splits `[start, end]` into windows of at most `CANDLES_PER_REQUEST` bars.
fn request_windows(
    start: NaiveDateTime,
    end: NaiveDateTime,
    granularity: Granularity,
) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    let span = granularity.step() * CANDLES_PER_REQUEST;
    let mut windows = Vec::new();
    let mut from = start;
    while from < end {
        let to = (from + span).min(end);
        windows.push((from, to));
        from = to;
    }
    windows
}

impl OandaAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, AutotraderError> {
        let get = |key: &str| {
            config
                .get_string("oanda", key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AutotraderError::ConfigMissing {
                    section: "oanda".into(),
                    key: key.into(),
                })
        };
        let hostname = get("hostname")?;
        let access_token = get("access_token")?;
        let account_id = get("account_id")?;

        let base_url = if hostname.starts_with("http://") || hostname.starts_with("https://") {
            hostname
        } else {
            format!("https://{hostname}")
        };
        Self::new(base_url, &access_token, account_id)
    }

    pub fn new(
        base_url: String,
        access_token: &str,
        account_id: String,
    ) -> Result<Self, AutotraderError> {
        let invalid = |reason: String| AutotraderError::ConfigInvalid {
            section: "oanda".into(),
            key: "access_token".into(),
            reason,
        };

        let mut headers = header::HeaderMap::new();
        let mut auth = header::HeaderValue::from_str(&format!("Bearer {access_token}"))
            .map_err(|e| invalid(e.to_string()))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            account_id,
        })
    }

    fn get_text(
        &self,
        instrument: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<String, AutotraderError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .map_err(|e| upstream(instrument, e))?;

        let status = response.status();
        let body = response.text().map_err(|e| upstream(instrument, e))?;
        if !status.is_success() {
            tracing::warn!(instrument, %status, "broker request failed");
            return Err(upstream(instrument, format!("HTTP {status}: {body}")));
        }
        Ok(body)
    }

    pub fn spread(&self, instrument: &str) -> Result<f64, AutotraderError> {
        let body = self.get_text(
            instrument,
            &format!("/v3/accounts/{}/pricing", self.account_id),
            &[("instruments", instrument.to_string())],
        )?;
        parse_spread(instrument, &body)
    }
}

impl PricePort for OandaAdapter {
    fn fetch_price_series(
        &self,
        instrument: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        granularity: Granularity,
    ) -> Result<Vec<PriceBar>, AutotraderError> {
        let path = format!("/v3/instruments/{instrument}/candles");
        let mut bars = Vec::new();

        for (from, to) in request_windows(start, end, granularity) {
            let body = self.get_text(
                instrument,
                &path,
                &[
                    ("price", "M".to_string()),
                    ("granularity", granularity.as_str().to_string()),
                    ("from", from.format(RFC3339_SECONDS).to_string()),
                    ("to", to.format(RFC3339_SECONDS).to_string()),
                ],
            )?;
            bars.extend(parse_candles(instrument, &body)?);
        }

        tracing::info!(
            instrument,
            granularity = %granularity,
            bars = bars.len(),
            "fetched candles"
        );
        Ok(bars)
    }

    fn list_instruments(&self) -> Result<Vec<String>, AutotraderError> {
        let body = self.get_text(
            "*",
            &format!("/v3/accounts/{}/instruments", self.account_id),
            &[],
        )?;
        parse_instruments(&body)
    }
}
