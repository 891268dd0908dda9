mod common;

use common::{ticker, FakeFeed};
use engulf_signals::types::Ticker;
use engulf_signals::universe::{rank_by, UniverseConfig, UniverseSelector};

fn selector(top_movers: usize, top_volume: usize) -> UniverseSelector {
    UniverseSelector::new(UniverseConfig {
        watchlist: vec!["BTCUSDT".into(), "ETHUSDT".into()],
        top_movers,
        top_volume,
        quote_asset: "USDT".into(),
    })
}

fn market() -> Vec<Ticker> {
    vec![
        ticker("AAAUSDT", 12.0, 10.0),
        ticker("BBBUSDT", -8.0, 500.0),
        ticker("CCCUSDT", 3.0, 900.0),
        ticker("DDDUSDT", -15.0, 50.0),
        ticker("EEEUSDT", 25.0, 5.0),
        ticker("BTCUSDT", 1.0, 10_000.0),
    ]
}

#[test]
fn test_rankings() {
    let universe = selector(2, 2).build(&market());
    assert_eq!(universe.watchlist, vec!["BTCUSDT", "ETHUSDT"]);
    assert_eq!(universe.gainers, vec!["EEEUSDT", "AAAUSDT"]);
    assert_eq!(universe.losers, vec!["DDDUSDT", "BBBUSDT"]);
    assert_eq!(universe.volume_leaders, vec!["BTCUSDT", "CCCUSDT"]);
}

#[test]
fn test_union_lists_each_symbol_once() {
    let universe = selector(2, 2).build(&market());
    assert_eq!(
        universe.symbols(),
        vec!["BTCUSDT", "ETHUSDT", "EEEUSDT", "AAAUSDT", "DDDUSDT", "BBBUSDT", "CCCUSDT"]
    );
    assert_eq!(universe.len(), 7);
    assert!(universe.contains("CCCUSDT"));
    assert!(!universe.contains("XYZUSDT"));
}

#[test]
fn test_ties_keep_feed_order() {
    let tickers = vec![
        ticker("XUSDT", 5.0, 1.0),
        ticker("YUSDT", 5.0, 1.0),
        ticker("ZUSDT", 5.0, 1.0),
    ];
    assert_eq!(rank_by(&tickers, 2, true, |t| t.change_pct), vec!["XUSDT", "YUSDT"]);
    assert_eq!(rank_by(&tickers, 2, false, |t| t.change_pct), vec!["XUSDT", "YUSDT"]);
}

#[test]
fn test_missing_or_non_finite_fields_are_not_ranked() {
    let tickers = vec![
        Ticker { symbol: "NOCHG".into(), change_pct: None, volume: Some(1e9) },
        Ticker { symbol: "NANUSDT".into(), change_pct: Some(f64::NAN), volume: None },
        ticker("OKUSDT", 1.0, 1.0),
    ];
    assert_eq!(rank_by(&tickers, 3, true, |t| t.change_pct), vec!["OKUSDT"]);
    assert_eq!(rank_by(&tickers, 3, true, |t| t.volume), vec!["NOCHG", "OKUSDT"]);
}

#[test]
fn test_symbols_are_normalized() {
    let tickers = vec![ticker("sol_usdt", 9.0, 1.0), ticker("XRP-USDT", -9.0, 2.0)];
    let universe = selector(1, 0).build(&tickers);
    assert_eq!(universe.gainers, vec!["SOLUSDT"]);
    assert_eq!(universe.losers, vec!["XRPUSDT"]);
    assert!(universe.volume_leaders.is_empty());
}

#[test]
fn test_other_quote_assets_are_ignored() {
    let tickers = vec![
        ticker("ETHBTC", 50.0, 1e12),
        ticker("SOL-USDC", 40.0, 1e11),
        ticker("SOLUSDT", 5.0, 10.0),
        ticker("DOGE", -3.0, 5.0),
    ];
    let universe = selector(1, 1).build(&tickers);
    assert_eq!(universe.gainers, vec!["SOLUSDT"]);
    assert_eq!(universe.losers, vec!["DOGEUSDT"]);
    assert_eq!(universe.volume_leaders, vec!["SOLUSDT"]);
    assert!(!universe.contains("ETHBTCUSDT"));
}

#[test]
fn test_labels() {
    let universe = selector(1, 1).build(&market());
    assert_eq!(universe.label("EEEUSDT"), Some("top gainer"));
    assert_eq!(universe.label("DDDUSDT"), Some("top loser"));
    assert_eq!(universe.label("BTCUSDT"), Some("top volume"));
    assert_eq!(universe.label("ETHUSDT"), None);
}

#[tokio::test]
async fn test_ticker_failure_falls_back_to_watchlist() {
    let feed = FakeFeed { tickers: None, ..Default::default() };
    let selector = selector(3, 3);
    let universe = selector.select_universe(&feed).await;
    assert_eq!(universe.symbols(), vec!["BTCUSDT", "ETHUSDT"]);
    assert_eq!(selector.last().await, Some(universe));
}

#[tokio::test]
async fn test_empty_tickers_fall_back_to_watchlist() {
    let feed = FakeFeed { tickers: Some(Vec::new()), ..Default::default() };
    let universe = selector(3, 3).select_universe(&feed).await;
    assert_eq!(universe.symbols(), vec!["BTCUSDT", "ETHUSDT"]);
}

#[tokio::test]
async fn test_select_universe_uses_live_tickers() {
    let feed = FakeFeed { tickers: Some(market()), ..Default::default() };
    let universe = selector(1, 1).select_universe(&feed).await;
    assert_eq!(universe.symbols(), vec!["BTCUSDT", "ETHUSDT", "EEEUSDT", "DDDUSDT"]);
}
