use crate::feed::MarketFeed;
use crate::types::Ticker;
use serde::Serialize;
use std::collections::HashSet;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct UniverseConfig {
    pub watchlist: Vec<String>,
    /// Gainers and losers are each capped at this many symbols.
    pub top_movers: usize,
    pub top_volume: usize,
    pub quote_asset: String,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            watchlist: vec!["BTCUSDT".into(), "ETHUSDT".into(), "SOLUSDT".into()],
            top_movers: 3,
            top_volume: 3,
            quote_asset: "USDT".into(),
        }
    }
}

/// Symbols to scan in one cycle, remembering which list each came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Universe {
    pub watchlist: Vec<String>,
    pub gainers: Vec<String>,
    pub losers: Vec<String>,
    pub volume_leaders: Vec<String>,
}

impl Universe {
    /// Union of every list, each symbol once.
    pub fn symbols(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.watchlist
            .iter()
            .chain(&self.gainers)
            .chain(&self.losers)
            .chain(&self.volume_leaders)
            .filter(|s| seen.insert(s.as_str()))
            .cloned()
            .collect()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols().iter().any(|s| s == symbol)
    }

    pub fn len(&self) -> usize {
        self.symbols().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ranking list a symbol came from, for alert text. Watchlist-only symbols have none.
    pub fn label(&self, symbol: &str) -> Option<&'static str> {
        let has = |list: &[String]| list.iter().any(|s| s == symbol);
        if has(&self.gainers) {
            Some("top gainer")
        } else if has(&self.losers) {
            Some("top loser")
        } else if has(&self.volume_leaders) {
            Some("top volume")
        } else {
            None
        }
    }
}

/// `btc_usdt`, `BTC-USDT` and `BTC` all become `BTCUSDT` for quote `USDT`.
pub fn normalize_symbol(raw: &str, quote: &str) -> String {
    let s: String = raw
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .collect::<String>()
        .trim()
        .to_ascii_uppercase();
    let quote = quote.to_ascii_uppercase();
    if s.ends_with(&quote) {
        s
    } else {
        format!("{}{}", s, quote)
    }
}

/// Quote assets other than the configured one that mark a ticker as foreign.
const KNOWN_QUOTES: &[&str] = &["USDT", "USDC", "FDUSD", "BUSD", "TUSD", "USD", "BTC", "ETH", "BNB", "EUR", "TRY"];

/// True when `raw` trades against `quote`, or is a bare base name with no quote at all.
pub fn quoted_in(raw: &str, quote: &str) -> bool {
    let quote = quote.to_ascii_uppercase();
    let upper = raw.trim().to_ascii_uppercase();
    if let Some((_, suffix)) = upper.rsplit_once(|c: char| c == '-' || c == '_') {
        return suffix == quote;
    }
    if upper.ends_with(&quote) {
        return true;
    }
    !KNOWN_QUOTES.iter().any(|q| upper.len() > q.len() && upper.ends_with(q))
}

/// Top `k` symbols by `field`. Stable, so ties keep feed order.
pub fn rank_by<F>(tickers: &[Ticker], k: usize, descending: bool, field: F) -> Vec<String>
where
    F: Fn(&Ticker) -> Option<f64>,
{
    let mut scored: Vec<(&Ticker, f64)> = tickers
        .iter()
        .filter_map(|t| field(t).filter(|v| v.is_finite()).map(|v| (t, v)))
        .collect();
    scored.sort_by(|a, b| {
        let ord = a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal);
        if descending { ord.reverse() } else { ord }
    });
    scored.into_iter().take(k).map(|(t, _)| t.symbol.clone()).collect()
}

pub struct UniverseSelector {
    config: UniverseConfig,
    last: RwLock<Option<Universe>>,
}

impl UniverseSelector {
    pub fn new(config: UniverseConfig) -> Self {
        Self { config, last: RwLock::new(None) }
    }

    pub fn config(&self) -> &UniverseConfig {
        &self.config
    }

    /// Builds the universe from an already fetched ticker list.
    pub fn build(&self, tickers: &[Ticker]) -> Universe {
        let quote = &self.config.quote_asset;
        let normalized: Vec<Ticker> = tickers
            .iter()
            .filter(|t| !t.symbol.trim().is_empty() && quoted_in(&t.symbol, quote))
            .map(|t| Ticker { symbol: normalize_symbol(&t.symbol, quote), ..t.clone() })
            .collect();

        Universe {
            watchlist: self.config.watchlist.iter().map(|s| normalize_symbol(s, quote)).collect(),
            gainers: rank_by(&normalized, self.config.top_movers, true, |t| t.change_pct),
            losers: rank_by(&normalized, self.config.top_movers, false, |t| t.change_pct),
            volume_leaders: rank_by(&normalized, self.config.top_volume, true, |t| t.volume),
        }
    }

    /// Fetches tickers and builds the universe, degrading to the watchlist
    /// alone when the ticker feed fails or returns nothing usable.
    pub async fn select_universe(&self, feed: &dyn MarketFeed) -> Universe {
        let tickers = match feed.fetch_tickers().await {
            Ok(tickers) => tickers,
            Err(e) => {
                warn!("[Universe] Ticker fetch failed, using watchlist only: {}", e);
                Vec::new()
            }
        };
        if tickers.is_empty() {
            warn!("[Universe] No usable tickers, using watchlist only");
        }

        let universe = self.build(&tickers);
        info!(
            "[Universe] {} symbol(s): gainers {:?} losers {:?} volume {:?}",
            universe.len(),
            universe.gainers,
            universe.losers,
            universe.volume_leaders
        );
        *self.last.write().await = Some(universe.clone());
        universe
    }

    pub async fn last(&self) -> Option<Universe> {
        self.last.read().await.clone()
    }
}

impl Default for UniverseSelector {
    fn default() -> Self {
        Self::new(UniverseConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol("btc_usdt", "USDT"), "BTCUSDT");
        assert_eq!(normalize_symbol("ETH-USDT", "USDT"), "ETHUSDT");
        assert_eq!(normalize_symbol("sol", "USDT"), "SOLUSDT");
        assert_eq!(normalize_symbol("XRPUSDT", "usdt"), "XRPUSDT");
    }

    #[test]
    fn test_quoted_in() {
        assert!(quoted_in("BTCUSDT", "USDT"));
        assert!(quoted_in("btc_usdt", "USDT"));
        assert!(quoted_in("BTC", "USDT"));
        assert!(quoted_in("ETH", "USDT"));
        assert!(!quoted_in("ETHBTC", "USDT"));
        assert!(!quoted_in("ETH-BTC", "USDT"));
        assert!(!quoted_in("SOLUSDC", "USDT"));
    }
}
