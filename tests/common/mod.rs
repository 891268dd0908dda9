#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use engulf_signals::candles::Bar;
use engulf_signals::feed::MarketFeed;
use engulf_signals::notifier::Notifier;
use engulf_signals::types::{Ticker, Timeframe};
use engulf_signals::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore};

pub const BASE_TS: i64 = 1_699_999_200_000; // aligned to 30m
pub const HALF_HOUR: i64 = 1_800_000;

pub fn ts(i: usize) -> i64 {
    BASE_TS + i as i64 * HALF_HOUR
}

/// Two minutes after bar `i` closed.
pub fn after_close(i: usize) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ts(i) + HALF_HOUR + 120_000).unwrap()
}

/// 70 bars: 68 rising bars, then a bearish bar and a bullish engulfing bar
/// whose low dips to the 30 EMA while staying above the 55 EMA.
pub fn bullish_setup() -> Vec<Bar> {
    let mut bars: Vec<Bar> = (0..68)
        .map(|i| {
            let close = 29_000.0 + 20.0 * i as f64;
            let open = close - 10.0;
            Bar::new(ts(i), open, close + 15.0, open - 15.0, close, 100.0)
        })
        .collect();
    bars.push(Bar::new(ts(68), 30_100.0, 30_110.0, 29_950.0, 29_960.0, 150.0));
    bars.push(Bar::new(ts(69), 29_955.0, 30_160.0, 29_940.0, 30_150.0, 220.0));
    bars
}

/// 10 flat bars (no trend), 58 rising bars, then the engulfing pair.
/// `dip_at` pushes that bar's low through the 55 EMA.
pub fn leg_setup(dip_at: Option<usize>) -> Vec<Bar> {
    let mut bars: Vec<Bar> = (0..68)
        .map(|i| {
            if i < 10 {
                return Bar::new(ts(i), 29_000.0, 29_005.0, 28_995.0, 29_000.0, 100.0);
            }
            let close = 29_000.0 + 20.0 * (i as f64 - 9.0);
            let open = close - 10.0;
            let low = if dip_at == Some(i) { 29_380.0 } else { open - 2.0 };
            Bar::new(ts(i), open, close + 5.0, low, close, 100.0)
        })
        .collect();
    bars.push(Bar::new(ts(68), 30_000.0, 30_010.0, 29_870.0, 29_880.0, 150.0));
    bars.push(Bar::new(ts(69), 29_875.0, 30_060.0, 29_860.0, 30_050.0, 220.0));
    bars
}

/// Reflects every price through `pivot`, turning an up-move into a down-move.
pub fn mirrored(bars: &[Bar], pivot: f64) -> Vec<Bar> {
    bars.iter()
        .map(|b| {
            Bar::new(b.ts, 2.0 * pivot - b.open, 2.0 * pivot - b.low, 2.0 * pivot - b.high, 2.0 * pivot - b.close, b.volume)
        })
        .collect()
}

pub fn ticker(symbol: &str, change: f64, volume: f64) -> Ticker {
    Ticker { symbol: symbol.to_string(), change_pct: Some(change), volume: Some(volume) }
}

#[derive(Default)]
pub struct FakeFeed {
    pub candles: HashMap<(String, Timeframe), Vec<Bar>>,
    /// `None` makes `fetch_tickers` fail.
    pub tickers: Option<Vec<Ticker>>,
    pub failing: HashSet<String>,
    pub candle_calls: Mutex<Vec<(String, Timeframe)>>,
    /// Holds `fetch_tickers` until a permit is added; `entered` fires on arrival.
    pub gate: Option<(Arc<Notify>, Arc<Semaphore>)>,
}

impl FakeFeed {
    pub fn with(symbol: &str, timeframe: Timeframe, bars: Vec<Bar>) -> Self {
        let mut feed = Self { tickers: Some(Vec::new()), ..Default::default() };
        feed.candles.insert((symbol.to_string(), timeframe), bars);
        feed
    }
}

#[async_trait]
impl MarketFeed for FakeFeed {
    async fn fetch_candles(&self, symbol: &str, timeframe: Timeframe, _limit: usize) -> Result<Vec<Bar>> {
        self.candle_calls.lock().unwrap().push((symbol.to_string(), timeframe));
        if self.failing.contains(symbol) {
            return Err(Error::Feed(format!("{} unavailable", symbol)));
        }
        Ok(self.candles.get(&(symbol.to_string(), timeframe)).cloned().unwrap_or_default())
    }

    async fn fetch_tickers(&self) -> Result<Vec<Ticker>> {
        if let Some((entered, permits)) = &self.gate {
            entered.notify_one();
            let _permit = permits.acquire().await.unwrap();
        }
        self.tickers.clone().ok_or_else(|| Error::Feed("tickers down".into()))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<String>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self { fail: true, ..Default::default() }
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        if self.fail {
            return Err(Error::Notify("sink down".into()));
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}
