use crate::candles::CandleSeries;
use crate::deduplication::Deduplicator;
use crate::feed::MarketFeed;
use crate::notifier::{format_signal_message, reset_message, send_best_effort, Notifier};
use crate::patterns::PatternDetector;
use crate::types::{SignalKey, Timeframe};
use crate::universe::{Universe, UniverseSelector};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub timeframes: Vec<Timeframe>,
    pub candle_limit: usize,
    /// Series shorter than this (after dropping the forming bar) are skipped.
    pub min_bars: usize,
    /// Offset used to render candle times in alerts.
    pub display_offset: FixedOffset,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            timeframes: vec![Timeframe::M30],
            candle_limit: 200,
            min_bars: 60,
            display_offset: Utc.fix(),
        }
    }
}

/// Counters for one `run_cycle` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    /// The `now` the cycle evaluated against.
    pub started_at: Option<DateTime<Utc>>,
    /// Wall time the cycle took.
    pub elapsed_ms: u64,
    /// Set when another cycle held the guard and this one did nothing.
    pub skipped: bool,
    pub symbols: usize,
    pub evaluated: usize,
    pub fetch_failures: usize,
    pub insufficient: usize,
    pub signals: usize,
    pub notified: usize,
    pub suppressed: usize,
    pub send_failures: usize,
    pub evicted: usize,
}

pub struct MarketScanner {
    feed: Arc<dyn MarketFeed>,
    notifier: Arc<dyn Notifier>,
    deduplicator: Deduplicator,
    universe: UniverseSelector,
    detector: PatternDetector,
    config: ScannerConfig,
    cycle_guard: Mutex<()>,
    last_report: RwLock<Option<CycleReport>>,
    signals_sent: RwLock<u64>,
}

impl MarketScanner {
    pub fn new(
        feed: Arc<dyn MarketFeed>,
        notifier: Arc<dyn Notifier>,
        deduplicator: Deduplicator,
        universe: UniverseSelector,
        detector: PatternDetector,
        config: ScannerConfig,
    ) -> Self {
        Self {
            feed,
            notifier,
            deduplicator,
            universe,
            detector,
            config,
            cycle_guard: Mutex::new(()),
            last_report: RwLock::new(None),
            signals_sent: RwLock::new(0),
        }
    }

    pub async fn run_cycle(&self) -> CycleReport {
        self.run_cycle_at(Utc::now()).await
    }

    /// One pass over universe × timeframes as of `now`.
    ///
    /// Returns immediately with `skipped` set if another cycle is running.
    /// Failures are isolated per symbol/timeframe and only counted.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> CycleReport {
        let Ok(_guard) = self.cycle_guard.try_lock() else {
            warn!("[Scanner] Previous cycle still running, skipping trigger");
            return CycleReport { skipped: true, ..Default::default() };
        };

        let clock = Instant::now();
        let mut report = CycleReport { started_at: Some(now), ..Default::default() };
        report.evicted = self.deduplicator.sweep(now).await;

        let universe = self.universe.select_universe(self.feed.as_ref()).await;
        let symbols = universe.symbols();
        report.symbols = symbols.len();

        for symbol in &symbols {
            for &timeframe in &self.config.timeframes {
                self.evaluate(&universe, symbol, timeframe, now, &mut report).await;
            }
        }

        report.elapsed_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            "[Scanner] Cycle done: {} symbol(s), {} evaluated, {} signal(s), {} sent, {} duplicate(s), {} fetch failure(s), {} short series in {}ms",
            report.symbols,
            report.evaluated,
            report.signals,
            report.notified,
            report.suppressed,
            report.fetch_failures,
            report.insufficient,
            report.elapsed_ms
        );
        *self.last_report.write().await = Some(report.clone());
        report
    }

    async fn evaluate(
        &self,
        universe: &Universe,
        symbol: &str,
        timeframe: Timeframe,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) {
        let bars = match self.feed.fetch_candles(symbol, timeframe, self.config.candle_limit).await {
            Ok(bars) => bars,
            Err(e) => {
                warn!("[Scanner] {} {}: fetch failed: {}", symbol, timeframe, e);
                report.fetch_failures += 1;
                return;
            }
        };

        let series = CandleSeries::new(bars).closed_at(now.timestamp_millis(), timeframe.duration_ms());
        if series.len() < self.config.min_bars {
            debug!("{} {}: {} closed bar(s), need {}", symbol, timeframe, series.len(), self.config.min_bars);
            report.insufficient += 1;
            return;
        }
        report.evaluated += 1;

        let Some(signal) = self.detector.detect(&series) else {
            debug!("{} {}: no signal", symbol, timeframe);
            return;
        };
        report.signals += 1;

        let key = SignalKey::new(symbol, timeframe, signal.reference_timestamp, signal.signal_type);
        if !self.deduplicator.should_notify(&key).await {
            debug!("FILTERED: {} - already notified", key);
            report.suppressed += 1;
            return;
        }

        info!("SIGNAL: {} {} {} close {}", symbol, timeframe, signal.signal_type, signal.reference_close);
        let text = format_signal_message(
            symbol,
            timeframe,
            universe.label(symbol),
            &signal,
            self.config.display_offset,
        );
        if send_best_effort(self.notifier.as_ref(), &text).await {
            report.notified += 1;
            *self.signals_sent.write().await += 1;
        } else {
            report.send_failures += 1;
        }
        // a failed send still counts as attempted
        self.deduplicator.record(key, now).await;
    }

    /// Clears the dedup store and announces it.
    pub async fn daily_reset(&self, now: DateTime<Utc>) -> usize {
        let cleared = self.deduplicator.daily_reset(now).await;
        send_best_effort(self.notifier.as_ref(), &reset_message(cleared)).await;
        cleared
    }

    pub fn deduplicator(&self) -> &Deduplicator {
        &self.deduplicator
    }

    pub fn universe(&self) -> &UniverseSelector {
        &self.universe
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub async fn last_report(&self) -> Option<CycleReport> {
        self.last_report.read().await.clone()
    }

    pub async fn signals_sent(&self) -> u64 {
        *self.signals_sent.read().await
    }
}
