use crate::indicators::EmaSet;
use serde::{Deserialize, Serialize};

/// One OHLCV candle. `ts` is the open time in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ts: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(ts: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self { ts, open, high, low, close, volume }
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// Finite prices with the wick enclosing the body.
    pub fn is_well_formed(&self) -> bool {
        [self.open, self.high, self.low, self.close].iter().all(|v| v.is_finite())
            && self.high >= self.open.max(self.close)
            && self.low <= self.open.min(self.close)
    }
}

/// Bars ordered oldest to newest, annotated with the 12/30/55 EMAs.
///
/// Rebuilt from scratch on every fetch and dropped after one evaluation.
#[derive(Debug, Clone, Default)]
pub struct CandleSeries {
    bars: Vec<Bar>,
    emas: EmaSet,
}

impl CandleSeries {
    /// Sorts by timestamp, keeps the last bar for a repeated timestamp, and
    /// computes the EMAs. Feeds may deliver newest-first.
    pub fn new(mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.ts);
        let mut deduped: Vec<Bar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.ts == bar.ts => *last = bar,
                _ => deduped.push(bar),
            }
        }
        let closes: Vec<f64> = deduped.iter().map(|b| b.close).collect();
        Self { emas: EmaSet::compute(&closes), bars: deduped }
    }

    /// Same series minus any bar still forming at `now_ms`.
    pub fn closed_at(self, now_ms: i64, bar_ms: i64) -> Self {
        let closed = self.bars.iter().take_while(|b| b.ts.saturating_add(bar_ms) <= now_ms).count();
        if closed == self.bars.len() {
            return self;
        }
        let mut bars = self.bars;
        bars.truncate(closed);
        Self::new(bars)
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn emas(&self) -> &EmaSet {
        &self.emas
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// `(fast, mid, slow)` EMA values at `idx`.
    pub fn ema_at(&self, idx: usize) -> Option<(f64, f64, f64)> {
        self.emas.at(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ts: i64, close: f64) -> Bar {
        Bar::new(ts, close, close + 1.0, close - 1.0, close, 1.0)
    }

    #[test]
    fn test_newest_first_is_normalized() {
        let series = CandleSeries::new(vec![bar(3, 3.0), bar(2, 2.0), bar(1, 1.0)]);
        let ts: Vec<i64> = series.bars().iter().map(|b| b.ts).collect();
        assert_eq!(ts, vec![1, 2, 3]);
        assert_eq!(series.emas().fast[0], 1.0);
    }

    #[test]
    fn test_duplicate_timestamps_collapse() {
        let series = CandleSeries::new(vec![bar(1, 1.0), bar(2, 2.0), bar(2, 2.5)]);
        assert_eq!(series.len(), 2);
        assert_eq!(series.last().unwrap().close, 2.5);
    }

    #[test]
    fn test_forming_bar_is_dropped() {
        let series = CandleSeries::new(vec![bar(0, 1.0), bar(1_000, 2.0), bar(2_000, 3.0)]);
        let closed = series.closed_at(2_500, 1_000);
        assert_eq!(closed.len(), 2);
        assert_eq!(closed.emas().len(), 2);
        assert_eq!(closed.last().unwrap().ts, 1_000);
    }

    #[test]
    fn test_far_future_bar_counts_as_forming() {
        let series = CandleSeries::new(vec![bar(0, 1.0), bar(i64::MAX, 2.0)]);
        let closed = series.closed_at(5_000, 1_000);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed.last().unwrap().ts, 0);
    }

    #[test]
    fn test_well_formed() {
        assert!(Bar::new(0, 10.0, 12.0, 9.0, 11.0, 0.0).is_well_formed());
        assert!(!Bar::new(0, 10.0, 10.5, 9.0, 11.0, 0.0).is_well_formed());
        assert!(!Bar::new(0, f64::NAN, 12.0, 9.0, 11.0, 0.0).is_well_formed());
    }
}
