use crate::error::{Error, Result};
use crate::feed::RetryPolicy;
use crate::types::{Signal, SignalType, Timeframe};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use reqwest::Client;
use std::time::Duration;
use tracing::{info, warn};

/// Outbound sink for plain-text alerts. Delivery is best-effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

/// Used when no bot token is configured; alerts only reach the log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        info!("[Notify] {}", text.replace('\n', " | "));
        Ok(())
    }
}

#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    token: String,
    chat_id: String,
    retry: RetryPolicy,
}

impl TelegramNotifier {
    pub fn new(api_url: &str, token: &str, chat_id: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            chat_id: chat_id.to_string(),
            retry,
        })
    }

    async fn post(&self, text: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/bot{}/sendMessage", self.api_url, self.token))
            .json(&serde_json::json!({ "chat_id": self.chat_id, "text": text }))
            .send()
            .await
            .map_err(redact)?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(Error::Notify(format!("telegram {}: {}", status, body)))
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        self.retry.run("[Notify] telegram", || self.post(text)).await?;
        info!("[Notify] Sent: {}", text.lines().next().unwrap_or_default());
        Ok(())
    }
}

/// The request URL carries the bot token, so it never reaches an error message.
fn redact(e: reqwest::Error) -> Error {
    Error::Http(e.without_url())
}

/// Sends and logs a failure instead of returning it.
pub async fn send_best_effort(notifier: &dyn Notifier, text: &str) -> bool {
    match notifier.send(text).await {
        Ok(()) => true,
        Err(e) => {
            warn!("[Notify] Failed to send: {}", e);
            false
        }
    }
}

/// A chat the bot has seen, as reported by `getUpdates`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatInfo {
    pub id: i64,
    pub chat_type: String,
    pub name: String,
}

/// Extracts chats from a `getUpdates` response, one per chat id.
pub fn parse_updates(body: &serde_json::Value) -> Result<Vec<ChatInfo>> {
    if !body.get("ok").and_then(|v| v.as_bool()).unwrap_or(false) {
        return Err(Error::Notify(format!("getUpdates failed: {}", body)));
    }
    let mut chats: Vec<ChatInfo> = Vec::new();
    let updates = body.get("result").and_then(|r| r.as_array()).cloned().unwrap_or_default();
    for update in &updates {
        let Some(chat) = update.get("message").and_then(|m| m.get("chat")) else { continue };
        let Some(id) = chat.get("id").and_then(|v| v.as_i64()) else { continue };
        if chats.iter().any(|c| c.id == id) {
            continue;
        }
        let chat_type = chat.get("type").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
        let name_field = if chat_type == "private" { "first_name" } else { "title" };
        let name = chat.get(name_field).and_then(|v| v.as_str()).unwrap_or_default().to_string();
        chats.push(ChatInfo { id, chat_type, name });
    }
    Ok(chats)
}

pub async fn fetch_chats(api_url: &str, token: &str, timeout: Duration) -> Result<Vec<ChatInfo>> {
    let client = Client::builder().timeout(timeout).build()?;
    let body: serde_json::Value = client
        .get(format!("{}/bot{}/getUpdates", api_url.trim_end_matches('/'), token))
        .send()
        .await
        .map_err(redact)?
        .json()
        .await
        .map_err(redact)?;
    parse_updates(&body)
}

pub fn format_candle_time(ts_ms: i64, offset: FixedOffset) -> String {
    Utc.timestamp_millis_opt(ts_ms)
        .single()
        .map(|dt: DateTime<Utc>| dt.with_timezone(&offset).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts_ms.to_string())
}

pub fn format_signal_message(
    symbol: &str,
    timeframe: Timeframe,
    label: Option<&str>,
    signal: &Signal,
    offset: FixedOffset,
) -> String {
    let (prefix, pattern, pullback) = match signal.signal_type {
        SignalType::LONG => ("🟢", "Bullish engulfing (closed candle)", "Touched EMA30, EMA55 intact"),
        SignalType::SHORT => ("🔴", "Bearish engulfing (closed candle)", "Touched EMA30, EMA55 intact"),
    };
    let label = label.map(|l| format!(" ({})", l)).unwrap_or_default();
    format!(
        "{}{} [{}]{}\n{}\n{}\nClose: {} ({})",
        prefix,
        symbol,
        timeframe,
        label,
        pattern,
        pullback,
        signal.reference_close,
        format_candle_time(signal.reference_timestamp, offset)
    )
}

pub fn startup_message(watchlist: &[String], timeframes: &[Timeframe]) -> String {
    let tfs: Vec<&str> = timeframes.iter().map(|t| t.as_str()).collect();
    format!(
        "🚀 EMA engulfing monitor started ✅\nWatchlist: {} + top movers/volume\nTimeframes: {}",
        watchlist.join(", "),
        tfs.join(", ")
    )
}

pub fn reset_message(cleared: usize) -> String {
    format!("🧹 Daily reset: cleared {} tracked signal(s), top movers will be refreshed.", cleared)
}

pub fn diagnostic_message(context: &str, err: &dyn std::fmt::Display) -> String {
    format!("⚠️ {}: {}", context, err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_message_layout() {
        let signal = Signal {
            signal_type: SignalType::LONG,
            reference_close: 30150.0,
            reference_timestamp: 1_704_067_200_000, // 2024-01-01T00:00Z
        };
        let offset = FixedOffset::east_opt(8 * 3600).unwrap();
        let msg = format_signal_message("BTCUSDT", Timeframe::M30, Some("top gainer"), &signal, offset);
        let lines: Vec<&str> = msg.lines().collect();
        assert_eq!(lines[0], "🟢BTCUSDT [30m] (top gainer)");
        assert_eq!(lines[1], "Bullish engulfing (closed candle)");
        assert_eq!(lines[3], "Close: 30150 (2024-01-01 08:00)");
    }

    #[test]
    fn test_parse_updates() {
        let body = serde_json::json!({"ok": true, "result": [
            {"message": {"chat": {"id": 1634, "type": "private", "first_name": "Amy"}}},
            {"message": {"chat": {"id": -100, "type": "group", "title": "Alerts"}}},
            {"message": {"chat": {"id": 1634, "type": "private", "first_name": "Amy"}}},
            {"edited_message": {}},
        ]});
        let chats = parse_updates(&body).unwrap();
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[0].name, "Amy");
        assert_eq!(chats[1], ChatInfo { id: -100, chat_type: "group".into(), name: "Alerts".into() });
    }

    #[tokio::test]
    async fn test_send_error_hides_token() {
        let token = "123456:SECRET-TOKEN";
        let retry = RetryPolicy { attempts: 1, backoff: Duration::ZERO };
        let notifier =
            TelegramNotifier::new("http://127.0.0.1:1", token, "42", Duration::from_secs(2), retry).unwrap();
        let err = notifier.send("hello").await.unwrap_err();
        assert!(!err.to_string().contains(token), "{err}");

        let err = fetch_chats("http://127.0.0.1:1", token, Duration::from_secs(2)).await.unwrap_err();
        assert!(!err.to_string().contains(token), "{err}");
    }

    #[test]
    fn test_parse_updates_not_ok() {
        let body = serde_json::json!({"ok": false, "description": "Unauthorized"});
        assert!(parse_updates(&body).is_err());
    }

    #[test]
    fn test_short_message_without_label() {
        let signal = Signal { signal_type: SignalType::SHORT, reference_close: 1.5, reference_timestamp: 0 };
        let msg = format_signal_message("ETHUSDT", Timeframe::M15, None, &signal, FixedOffset::east_opt(0).unwrap());
        assert!(msg.starts_with("🔴ETHUSDT [15m]\n"));
    }
}
