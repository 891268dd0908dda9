use crate::error::{Error, Result};
use crate::feed::RetryPolicy;
use crate::patterns::{DefensiveCheck, DetectorConfig};
use crate::scheduler::{parse_offset, parse_reset_time, CronSchedule, DailyReset};
use crate::types::Timeframe;
use crate::universe::UniverseConfig;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub api_url: String,
    pub token: String,
    pub chat_id: String,
}

/// Service configuration read from environment variables (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,

    // ── Exchange REST ──────────────────────────────────────────────
    pub base_url: String,
    pub kline_path: String,
    pub tickers_path: String,
    pub http_timeout: Duration,
    pub retry: RetryPolicy,

    // ── Alerts ─────────────────────────────────────────────────────
    /// `None` ⇒ alerts only go to the log.
    pub telegram: Option<TelegramConfig>,

    // ── Scanning ───────────────────────────────────────────────────
    pub universe: UniverseConfig,
    pub timeframes: Vec<Timeframe>,
    pub candle_limit: usize,
    pub min_bars: usize,
    pub detector: DetectorConfig,
    pub cycle: CronSchedule,

    // ── Dedup ──────────────────────────────────────────────────────
    pub reset: DailyReset,
    pub retention: chrono::Duration,
    pub state_file: PathBuf,
}

/// Lookup wrapper: unset or blank falls back to the default, set but
/// unparseable is an error.
struct Vars<F: Fn(&str) -> Option<String>> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn raw(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn str(&self, name: &str, default: &str) -> String {
        self.raw(name).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, name: &str, default: T) -> Result<T> {
        match self.raw(name) {
            None => Ok(default),
            Some(s) => s
                .parse()
                .map_err(|_| Error::Config(format!("{} has an invalid value: {}", name, s))),
        }
    }

    fn list(&self, name: &str, default: &str) -> Vec<String> {
        self.str(name, default)
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vars = Vars { lookup };

        let telegram = match (vars.raw("TELEGRAM_BOT_TOKEN"), vars.raw("TELEGRAM_CHAT_ID")) {
            (Some(token), Some(chat_id)) => Some(TelegramConfig {
                api_url: vars.str("TELEGRAM_API_URL", "https://api.telegram.org"),
                token,
                chat_id,
            }),
            (Some(_), None) => {
                return Err(Error::Config("TELEGRAM_BOT_TOKEN is set but TELEGRAM_CHAT_ID is not".into()))
            }
            _ => None,
        };

        let timeframes = vars
            .list("TIMEFRAMES", "30m")
            .iter()
            .map(|s| s.parse::<Timeframe>().map_err(Error::Config))
            .collect::<Result<Vec<_>>>()?;
        if timeframes.is_empty() {
            return Err(Error::Config("TIMEFRAMES is empty".into()));
        }

        let candle_limit: usize = vars.parse("CANDLE_LIMIT", 200)?;
        let min_bars: usize = vars.parse("MIN_BARS", 60)?;
        if min_bars < 2 {
            return Err(Error::Config("MIN_BARS must be at least 2".into()));
        }
        if candle_limit < min_bars {
            return Err(Error::Config(format!(
                "CANDLE_LIMIT ({}) is below MIN_BARS ({})",
                candle_limit, min_bars
            )));
        }

        let min_body_ratio: f64 = vars.parse("MIN_BODY_RATIO", 1.0)?;
        if !min_body_ratio.is_finite() || min_body_ratio <= 0.0 {
            return Err(Error::Config("MIN_BODY_RATIO must be positive".into()));
        }

        let retention_hours: i64 = vars.parse("DEDUP_RETENTION_HOURS", 6)?;
        if retention_hours <= 0 {
            return Err(Error::Config("DEDUP_RETENTION_HOURS must be positive".into()));
        }

        Ok(Self {
            port: vars.parse("PORT", 8080)?,
            base_url: vars.str("BITUNIX_BASE_URL", "https://fapi.bitunix.com"),
            kline_path: vars.str("KLINE_PATH", "/api/v1/market/historyKlines"),
            tickers_path: vars.str("TICKERS_PATH", "/api/v1/market/tickers"),
            http_timeout: Duration::from_secs(vars.parse("HTTP_TIMEOUT_SECS", 8)?),
            retry: RetryPolicy {
                attempts: vars.parse("HTTP_RETRIES", 3)?,
                backoff: Duration::from_millis(vars.parse("RETRY_BACKOFF_MS", 500)?),
            },
            telegram,
            universe: UniverseConfig {
                watchlist: vars.list("WATCHLIST", "BTCUSDT,ETHUSDT,SOLUSDT"),
                top_movers: vars.parse("TOP_MOVERS", 3)?,
                top_volume: vars.parse("TOP_VOLUME", 3)?,
                quote_asset: vars.str("QUOTE_ASSET", "USDT").to_ascii_uppercase(),
            },
            timeframes,
            candle_limit,
            min_bars,
            detector: DetectorConfig {
                defensive_check: vars.parse("DEFENSIVE_CHECK", DefensiveCheck::ReferenceBar)?,
                min_body_ratio,
            },
            cycle: CronSchedule::parse(&vars.str("CYCLE_MINUTES", "2,32"))?,
            reset: DailyReset::new(
                parse_reset_time(&vars.str("RESET_TIME", "00:00"))?,
                parse_offset(&vars.str("RESET_UTC_OFFSET", "+08:00"))?,
            ),
            retention: chrono::Duration::hours(retention_hours),
            state_file: PathBuf::from(vars.str("STATE_FILE", "state.json")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(move |name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_with(&[]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.timeframes, vec![Timeframe::M30]);
        assert_eq!(config.min_bars, 60);
        assert_eq!(config.cycle.minutes(), &[2, 32]);
        assert_eq!(config.reset.offset.local_minus_utc(), 8 * 3600);
        assert_eq!(config.retention, chrono::Duration::hours(6));
        assert_eq!(config.universe.watchlist.len(), 3);
        assert_eq!(config.detector, DetectorConfig::default());
        assert!(config.telegram.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_with(&[
            ("TIMEFRAMES", "15m, 30m"),
            ("WATCHLIST", "BTCUSDT,XRPUSDT"),
            ("DEFENSIVE_CHECK", "leg"),
            ("MIN_BODY_RATIO", "1.1"),
            ("TELEGRAM_BOT_TOKEN", "abc"),
            ("TELEGRAM_CHAT_ID", "42"),
            ("PORT", " "),
        ])
        .unwrap();
        assert_eq!(config.timeframes, vec![Timeframe::M15, Timeframe::M30]);
        assert_eq!(config.universe.watchlist, vec!["BTCUSDT", "XRPUSDT"]);
        assert_eq!(config.detector.defensive_check, DefensiveCheck::WholeLeg);
        assert_eq!(config.detector.min_body_ratio, 1.1);
        assert_eq!(config.telegram.unwrap().chat_id, "42");
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_invalid_values_are_fatal() {
        assert!(config_with(&[("TIMEFRAMES", "7m")]).is_err());
        assert!(config_with(&[("CYCLE_MINUTES", "2,99")]).is_err());
        assert!(config_with(&[("PORT", "http")]).is_err());
        assert!(config_with(&[("RESET_UTC_OFFSET", "Asia/Taipei")]).is_err());
        assert!(config_with(&[("MIN_BARS", "1")]).is_err());
        assert!(config_with(&[("CANDLE_LIMIT", "30")]).is_err());
        assert!(config_with(&[("TELEGRAM_BOT_TOKEN", "abc")]).is_err());
    }
}
