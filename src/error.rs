use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error("feed error: {0}")]
    Feed(String),
    #[error("notify error: {0}")]
    Notify(String),
    #[error("persist error: {0}")]
    Persist(String),
}

pub type Result<T> = std::result::Result<T, Error>;
