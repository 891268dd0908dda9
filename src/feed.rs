use crate::candles::Bar;
use crate::error::{Error, Result};
use crate::types::{Ticker, Timeframe};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value as JsonValue;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Source of candles and 24h tickers.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Up to `limit` bars for `symbol`, in any order.
    async fn fetch_candles(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Bar>>;
    async fn fetch_tickers(&self) -> Result<Vec<Ticker>>;
}

/// Bounded retry with linear backoff (`backoff * attempt`).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 3, backoff: Duration::from_millis(500) }
    }
}

impl RetryPolicy {
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < attempts => {
                    debug!("{} attempt {}/{} failed: {}", label, attempt, attempts, e);
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[derive(Clone)]
pub struct BitunixClient {
    client: Client,
    base_url: String,
    kline_path: String,
    tickers_path: String,
    retry: RetryPolicy,
}

impl BitunixClient {
    pub fn new(
        base_url: &str,
        kline_path: &str,
        tickers_path: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            kline_path: kline_path.to_string(),
            tickers_path: tickers_path.to_string(),
            retry,
        })
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<JsonValue> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl MarketFeed for BitunixClient {
    async fn fetch_candles(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Bar>> {
        let query = [
            ("symbol", symbol.to_string()),
            ("period", timeframe.exchange_period().to_string()),
            ("size", limit.to_string()),
        ];
        let query = &query;
        let label = format!("[Feed] klines {} {}", symbol, timeframe);
        self.retry
            .run(&label, || async move {
                let body = self.get_json(&self.kline_path, query).await?;
                parse_klines(&body)
            })
            .await
    }

    async fn fetch_tickers(&self) -> Result<Vec<Ticker>> {
        let body = self
            .retry
            .run("[Feed] tickers", || async move { self.get_json(&self.tickers_path, &[]).await })
            .await?;
        let tickers = parse_tickers(&body);
        if tickers.is_empty() {
            warn!("[Feed] Ticker payload had no usable rows");
        }
        Ok(tickers)
    }
}

fn num(v: Option<&JsonValue>) -> Option<f64> {
    let parsed = match v? {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|x| x.is_finite())
}

fn field<'a>(obj: &'a JsonValue, names: &[&str]) -> Option<&'a JsonValue> {
    names.iter().find_map(|n| obj.get(*n)).filter(|v| !v.is_null())
}

/// Accepts `{"data": [...]}`, `{"data": {"list": [...]}}` or a bare list.
fn rows(body: &JsonValue) -> Option<&Vec<JsonValue>> {
    match body {
        JsonValue::Array(rows) => Some(rows),
        JsonValue::Object(_) => {
            let data = body.get("data")?;
            data.as_array().or_else(|| data.get("list").and_then(|l| l.as_array()))
        }
        _ => None,
    }
}

/// 9999-12-31T23:59:59.999Z; anything later is not a millisecond timestamp.
const MAX_TS_MS: f64 = 253_402_300_799_999.0;

fn parse_bar(row: &JsonValue) -> Option<Bar> {
    let (ts, open, high, low, close, volume) = match row {
        JsonValue::Array(cols) => (
            num(cols.first()),
            num(cols.get(1)),
            num(cols.get(2)),
            num(cols.get(3)),
            num(cols.get(4)),
            num(cols.get(5)),
        ),
        JsonValue::Object(_) => (
            num(field(row, &["ts", "time", "timestamp"])),
            num(field(row, &["open", "o"])),
            num(field(row, &["high", "h"])),
            num(field(row, &["low", "l"])),
            num(field(row, &["close", "c"])),
            num(field(row, &["vol", "volume", "baseVol", "quoteVol"])),
        ),
        _ => return None,
    };
    let ts = ts.filter(|t| (0.0..=MAX_TS_MS).contains(t))?;
    Some(Bar::new(ts as i64, open?, high?, low?, close?, volume.unwrap_or(0.0)))
}

/// Parses a kline payload into bars in feed order.
pub fn parse_klines(body: &JsonValue) -> Result<Vec<Bar>> {
    if let Some(code) = body.get("code").and_then(|c| c.as_i64()) {
        if code != 0 {
            let msg = body.get("msg").and_then(|m| m.as_str()).unwrap_or("unknown");
            return Err(Error::Feed(format!("exchange error {}: {}", code, msg)));
        }
    }
    let rows = rows(body).ok_or_else(|| Error::Feed("kline payload has no data list".into()))?;
    let bars: Vec<Bar> = rows.iter().filter_map(parse_bar).collect();
    if bars.is_empty() && !rows.is_empty() {
        return Err(Error::Feed(format!("none of {} kline rows parsed", rows.len())));
    }
    Ok(bars)
}

fn parse_ticker(row: &JsonValue) -> Option<Ticker> {
    let symbol = field(row, &["symbol", "instId", "instrument_id"])?;
    let symbol = match symbol {
        JsonValue::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    if symbol.is_empty() {
        return None;
    }

    let change_pct = num(field(row, &["changeRate", "change", "priceChangePercent"])).or_else(|| {
        let last = num(field(row, &["last", "lastPrice"]))?;
        let open = num(field(row, &["open", "open24h"]))?;
        (open != 0.0).then(|| (last - open) / open * 100.0)
    });
    let volume = num(field(row, &["quoteVol", "vol", "volume", "baseVol"]));

    Some(Ticker { symbol, change_pct, volume })
}

/// Lenient ticker parsing. Anything unrecognizable yields an empty list.
pub fn parse_tickers(body: &JsonValue) -> Vec<Ticker> {
    rows(body)
        .map(|rows| rows.iter().filter_map(parse_ticker).collect())
        .unwrap_or_default()
}
