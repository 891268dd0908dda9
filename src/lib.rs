pub mod candles;
pub mod config;
pub mod deduplication;
pub mod error;
pub mod feed;
pub mod indicators;
pub mod notifier;
pub mod patterns;
pub mod scanner;
pub mod scheduler;
pub mod server;
pub mod types;
pub mod universe;

pub use error::{Error, Result};
pub use scanner::MarketScanner;
