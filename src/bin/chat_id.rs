//! Lists the chats that have messaged the bot, to find `TELEGRAM_CHAT_ID`.
//! Send `/start` to the bot (or post in the group) before running this.

use engulf_signals::notifier::fetch_chats;
use std::env;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter("engulf_signals=info")
        .init();

    let token = env::var("TELEGRAM_BOT_TOKEN").map_err(|_| "TELEGRAM_BOT_TOKEN required")?;
    let api_url = env::var("TELEGRAM_API_URL").unwrap_or("https://api.telegram.org".into());

    let chats = fetch_chats(&api_url, &token, Duration::from_secs(10)).await?;
    if chats.is_empty() {
        println!("No messages yet. Send /start to the bot or post in the group, then retry.");
        return Ok(());
    }

    println!("Chats seen by the bot:");
    for chat in chats {
        println!("{}: {} → {}", chat.chat_type, chat.name, chat.id);
    }
    Ok(())
}
