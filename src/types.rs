use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum SignalType { #[default] LONG, SHORT }

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self { Self::LONG => "LONG", Self::SHORT => "SHORT" })
    }
}

impl FromStr for SignalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LONG" | "BULL" => Ok(Self::LONG),
            "SHORT" | "BEAR" => Ok(Self::SHORT),
            other => Err(format!("unknown signal type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendRegime { Bullish, Bearish, None }

impl TrendRegime {
    pub fn signal_type(self) -> Option<SignalType> {
        match self {
            Self::Bullish => Some(SignalType::LONG),
            Self::Bearish => Some(SignalType::SHORT),
            Self::None => None,
        }
    }
}

/// Candle interval. Only the intervals the kline endpoint serves are listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")] M1,
    #[serde(rename = "5m")] M5,
    #[serde(rename = "15m")] M15,
    #[serde(rename = "30m")] M30,
    #[serde(rename = "1h")] H1,
    #[serde(rename = "4h")] H4,
    #[serde(rename = "1d")] D1,
}

impl Timeframe {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
        }
    }

    /// Period name used by the exchange's kline endpoint.
    pub fn exchange_period(self) -> &'static str {
        match self {
            Self::M1 => "1min",
            Self::M5 => "5min",
            Self::M15 => "15min",
            Self::M30 => "30min",
            Self::H1 => "60min",
            Self::H4 => "4hour",
            Self::D1 => "1day",
        }
    }

    pub fn duration_ms(self) -> i64 {
        const MIN: i64 = 60_000;
        match self {
            Self::M1 => MIN,
            Self::M5 => 5 * MIN,
            Self::M15 => 15 * MIN,
            Self::M30 => 30 * MIN,
            Self::H1 => 60 * MIN,
            Self::H4 => 240 * MIN,
            Self::D1 => 1440 * MIN,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1m" | "1min" => Ok(Self::M1),
            "5m" | "5min" => Ok(Self::M5),
            "15m" | "15min" => Ok(Self::M15),
            "30m" | "30min" => Ok(Self::M30),
            "1h" | "60m" | "60min" => Ok(Self::H1),
            "4h" | "4hour" => Ok(Self::H4),
            "1d" | "1day" => Ok(Self::D1),
            other => Err(format!("unknown timeframe: {other}")),
        }
    }
}

/// Output of the pattern detector for one reference bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Signal {
    pub signal_type: SignalType,
    pub reference_close: f64,
    pub reference_timestamp: i64,
}

/// Identity of one alert: at most one notification per key while it is tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalKey {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub candle_ts: i64,
    pub signal_type: SignalType,
}

impl SignalKey {
    pub fn new(symbol: &str, timeframe: Timeframe, candle_ts: i64, signal_type: SignalType) -> Self {
        Self { symbol: symbol.to_string(), timeframe, candle_ts, signal_type }
    }
}

impl fmt::Display for SignalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}|{}", self.symbol, self.timeframe, self.candle_ts, self.signal_type)
    }
}

impl FromStr for SignalKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('|').collect();
        let [symbol, timeframe, ts, signal_type] = parts.as_slice() else {
            return Err(format!("malformed signal key: {s}"));
        };
        if symbol.is_empty() {
            return Err(format!("malformed signal key: {s}"));
        }
        Ok(Self {
            symbol: symbol.to_string(),
            timeframe: timeframe.parse()?,
            candle_ts: ts.parse().map_err(|_| format!("bad candle timestamp in key: {s}"))?,
            signal_type: signal_type.parse()?,
        })
    }
}

/// One row of the 24h ticker feed after lenient parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub change_pct: Option<f64>,
    pub volume: Option<f64>,
}
