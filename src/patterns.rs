use crate::candles::{Bar, CandleSeries};
use crate::types::{Signal, SignalType, TrendRegime};

/// How far back the "slow EMA not touched" rule looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefensiveCheck {
    /// Only the reference bar must stay clear of the slow EMA.
    #[default]
    ReferenceBar,
    /// Every bar since the EMA ordering last formed must stay clear of it.
    WholeLeg,
}

impl std::str::FromStr for DefensiveCheck {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reference" | "bar" | "reference_bar" => Ok(Self::ReferenceBar),
            "leg" | "whole_leg" => Ok(Self::WholeLeg),
            other => Err(format!("unknown defensive check: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    pub defensive_check: DefensiveCheck,
    /// Engulfing body must be at least this multiple of the engulfed body.
    /// 1.0 adds nothing beyond containment; 1.1 is the stricter variant.
    pub min_body_ratio: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self { defensive_check: DefensiveCheck::ReferenceBar, min_body_ratio: 1.0 }
    }
}

/// Any non-finite EMA reads as no trend.
pub fn trend_regime(fast: f64, mid: f64, slow: f64) -> TrendRegime {
    if !(fast.is_finite() && mid.is_finite() && slow.is_finite()) {
        return TrendRegime::None;
    }
    if fast > mid && mid > slow {
        TrendRegime::Bullish
    } else if fast < mid && mid < slow {
        TrendRegime::Bearish
    } else {
        TrendRegime::None
    }
}

/// Low reached the mid EMA (inclusive) without reaching the slow EMA.
pub fn bullish_pullback(bar: &Bar, ema_mid: f64, ema_slow: f64) -> bool {
    bar.low <= ema_mid && bar.low > ema_slow
}

/// High reached the mid EMA (inclusive) without reaching the slow EMA.
pub fn bearish_pullback(bar: &Bar, ema_mid: f64, ema_slow: f64) -> bool {
    bar.high >= ema_mid && bar.high < ema_slow
}

pub fn is_bullish_engulfing(prev_open: f64, prev_close: f64, curr_open: f64, curr_close: f64) -> bool {
    prev_close < prev_open
        && curr_close > curr_open
        && curr_close >= prev_open
        && curr_open <= prev_close
}

pub fn is_bearish_engulfing(prev_open: f64, prev_close: f64, curr_open: f64, curr_close: f64) -> bool {
    prev_close > prev_open
        && curr_close < curr_open
        && curr_close <= prev_open
        && curr_open >= prev_close
}

#[derive(Debug, Clone, Default)]
pub struct PatternDetector {
    config: DetectorConfig,
}

impl PatternDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Evaluates the last bar of `series` against its predecessor.
    ///
    /// The caller must already have removed any still-forming bar. Short or
    /// malformed input yields `None`, never an error.
    pub fn detect(&self, series: &CandleSeries) -> Option<Signal> {
        let bars = series.bars();
        if bars.len() < 2 || series.emas().len() != bars.len() {
            return None;
        }
        let idx = bars.len() - 1;
        let (prev, curr) = (&bars[idx - 1], &bars[idx]);
        if !prev.is_well_formed() || !curr.is_well_formed() {
            return None;
        }

        let (fast, mid, slow) = series.ema_at(idx)?;
        let regime = trend_regime(fast, mid, slow);
        let signal_type = regime.signal_type()?;

        let pulled_back = match signal_type {
            SignalType::LONG => bullish_pullback(curr, mid, slow),
            SignalType::SHORT => bearish_pullback(curr, mid, slow),
        };
        if !pulled_back {
            return None;
        }
        if self.config.defensive_check == DefensiveCheck::WholeLeg
            && !leg_respects_slow_ema(series, idx, regime)
        {
            return None;
        }

        let engulfing = match signal_type {
            SignalType::LONG => is_bullish_engulfing(prev.open, prev.close, curr.open, curr.close),
            SignalType::SHORT => is_bearish_engulfing(prev.open, prev.close, curr.open, curr.close),
        };
        if !engulfing || !self.body_ratio_ok(prev, curr) {
            return None;
        }

        Some(Signal {
            signal_type,
            reference_close: curr.close,
            reference_timestamp: curr.ts,
        })
    }

    fn body_ratio_ok(&self, prev: &Bar, curr: &Bar) -> bool {
        self.config.min_body_ratio <= 1.0 || curr.body() >= prev.body() * self.config.min_body_ratio
    }
}

/// Walks back from `idx` while the EMA ordering still matches `regime`; no bar
/// in that stretch may have touched the slow EMA.
fn leg_respects_slow_ema(series: &CandleSeries, idx: usize, regime: TrendRegime) -> bool {
    let bars = series.bars();
    for i in (0..=idx).rev() {
        let Some((fast, mid, slow)) = series.ema_at(i) else { break };
        if trend_regime(fast, mid, slow) != regime {
            break;
        }
        let touched = match regime {
            TrendRegime::Bullish => bars[i].low <= slow,
            TrendRegime::Bearish => bars[i].high >= slow,
            TrendRegime::None => false,
        };
        if touched {
            return false;
        }
    }
    true
}
