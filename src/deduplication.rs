use crate::error::{Error, Result};
use crate::types::SignalKey;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub const DEFAULT_RETENTION_HOURS: i64 = 6;

/// Backing storage for notified signal keys.
///
/// Mutating calls update memory first; an `Err` means only the durable copy
/// is behind, and the in-memory view stays authoritative.
pub trait DedupStore: Send + Sync {
    /// Replaces the in-memory view with the durable copy, returning the entry count.
    /// On `Err` the in-memory view is empty.
    fn load(&mut self) -> Result<usize>;
    fn snapshot(&self) -> HashMap<SignalKey, DateTime<Utc>>;
    fn contains(&self, key: &SignalKey) -> bool;
    fn record(&mut self, key: SignalKey, at: DateTime<Utc>) -> Result<()>;
    /// Drops entries recorded before `cutoff`, returning how many went.
    fn evict(&mut self, cutoff: DateTime<Utc>) -> Result<usize>;
    fn clear(&mut self) -> Result<()>;
    fn len(&self) -> usize;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<SignalKey, DateTime<Utc>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DedupStore for MemoryStore {
    fn load(&mut self) -> Result<usize> {
        Ok(self.entries.len())
    }

    fn snapshot(&self) -> HashMap<SignalKey, DateTime<Utc>> {
        self.entries.clone()
    }

    fn contains(&self, key: &SignalKey) -> bool {
        self.entries.contains_key(key)
    }

    fn record(&mut self, key: SignalKey, at: DateTime<Utc>) -> Result<()> {
        self.entries.entry(key).or_insert(at);
        Ok(())
    }

    fn evict(&mut self, cutoff: DateTime<Utc>) -> Result<usize> {
        let before = self.entries.len();
        self.entries.retain(|_, at| *at >= cutoff);
        Ok(before - self.entries.len())
    }

    fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Memory store mirrored to a JSON object of `key -> RFC 3339 timestamp`.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    memory: MemoryStore,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), memory: MemoryStore::new() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        let body: BTreeMap<String, String> = self
            .memory
            .entries
            .iter()
            .map(|(k, at)| (k.to_string(), at.to_rfc3339()))
            .collect();
        let json = serde_json::to_string_pretty(&body)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|e| Error::Persist(format!("{}: {}", self.path.display(), e)))
    }
}

fn parse_recorded_at(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // naive ISO-8601 timestamps are taken as UTC
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

impl DedupStore for JsonFileStore {
    fn load(&mut self) -> Result<usize> {
        self.memory.entries.clear();
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::Persist(format!("{}: {}", self.path.display(), e))),
        };
        if raw.trim().is_empty() {
            return Ok(0);
        }

        let parsed: HashMap<String, String> = serde_json::from_str(&raw).map_err(|e| {
            Error::Persist(format!("corrupt snapshot {}: {}", self.path.display(), e))
        })?;

        for (key, at) in parsed {
            match (key.parse::<SignalKey>(), parse_recorded_at(&at)) {
                (Ok(key), Some(at)) => {
                    self.memory.entries.insert(key, at);
                }
                _ => debug!("[Dedup] Skipping unreadable snapshot entry {} = {}", key, at),
            }
        }
        Ok(self.memory.entries.len())
    }

    fn snapshot(&self) -> HashMap<SignalKey, DateTime<Utc>> {
        self.memory.snapshot()
    }

    fn contains(&self, key: &SignalKey) -> bool {
        self.memory.contains(key)
    }

    fn record(&mut self, key: SignalKey, at: DateTime<Utc>) -> Result<()> {
        self.memory.record(key, at)?;
        self.flush()
    }

    fn evict(&mut self, cutoff: DateTime<Utc>) -> Result<usize> {
        let removed = self.memory.evict(cutoff)?;
        if removed > 0 {
            self.flush()?;
        }
        Ok(removed)
    }

    fn clear(&mut self) -> Result<()> {
        self.memory.clear()?;
        self.flush()
    }

    fn len(&self) -> usize {
        self.memory.len()
    }
}

/// Gates alerts so each [`SignalKey`] is notified at most once while tracked.
///
/// Callers pair `should_notify` with `record`; cycles are serialized by the
/// scanner, so the two are not raced for the same key.
pub struct Deduplicator {
    store: RwLock<Box<dyn DedupStore>>,
    retention: Duration,
    last_reset: RwLock<Option<DateTime<Utc>>>,
}

impl Deduplicator {
    pub fn new(store: Box<dyn DedupStore>, retention: Duration) -> Self {
        Self {
            store: RwLock::new(store),
            retention,
            last_reset: RwLock::new(None),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::new()), Duration::hours(DEFAULT_RETENTION_HOURS))
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Loads the durable copy. On error the store is left empty and the
    /// unreadable file is left as it was.
    pub async fn load(&self) -> Result<usize> {
        let n = self.store.write().await.load()?;
        info!("[Dedup] Loaded {} tracked signal(s)", n);
        Ok(n)
    }

    pub async fn should_notify(&self, key: &SignalKey) -> bool {
        !self.store.read().await.contains(key)
    }

    pub async fn record(&self, key: SignalKey, now: DateTime<Utc>) {
        let mut store = self.store.write().await;
        let label = key.to_string();
        if let Err(e) = store.record(key, now) {
            warn!("[Dedup] Failed to persist {}: {}", label, e);
        }
    }

    /// Evicts entries older than the retention window.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.retention;
        let mut store = self.store.write().await;
        let before = store.len();
        if let Err(e) = store.evict(cutoff) {
            warn!("[Dedup] Failed to persist eviction: {}", e);
        }
        let removed = before.saturating_sub(store.len());
        if removed > 0 {
            debug!("[Dedup] Evicted {} signal(s) older than {}", removed, cutoff);
        }
        removed
    }

    /// Clears every tracked key, returning how many were dropped.
    pub async fn daily_reset(&self, now: DateTime<Utc>) -> usize {
        let mut store = self.store.write().await;
        let cleared = store.len();
        if let Err(e) = store.clear() {
            warn!("[Dedup] Failed to persist daily reset: {}", e);
        }
        *self.last_reset.write().await = Some(now);
        info!("[Dedup] Daily reset cleared {} signal(s)", cleared);
        cleared
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn snapshot(&self) -> HashMap<SignalKey, DateTime<Utc>> {
        self.store.read().await.snapshot()
    }

    pub async fn last_reset(&self) -> Option<DateTime<Utc>> {
        *self.last_reset.read().await
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::in_memory()
    }
}
