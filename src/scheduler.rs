use crate::error::{Error, Result};
use crate::scanner::MarketScanner;
use chrono::{DateTime, Duration, FixedOffset, NaiveTime, TimeZone, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Fires at fixed minutes of every UTC hour, e.g. `2,32` for 30m candles
/// plus a settle delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minutes: Vec<u32>,
}

impl CronSchedule {
    pub fn new(mut minutes: Vec<u32>) -> Result<Self> {
        minutes.sort_unstable();
        minutes.dedup();
        if minutes.is_empty() {
            return Err(Error::Config("cycle minute list is empty".into()));
        }
        if let Some(bad) = minutes.iter().find(|m| **m >= 60) {
            return Err(Error::Config(format!("cycle minute out of range: {}", bad)));
        }
        Ok(Self { minutes })
    }

    /// Parses a comma separated minute list such as `2,32`.
    pub fn parse(s: &str) -> Result<Self> {
        let minutes = s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| p.parse::<u32>().map_err(|_| Error::Config(format!("bad cycle minute: {}", p))))
            .collect::<Result<Vec<_>>>()?;
        Self::new(minutes)
    }

    pub fn minutes(&self) -> &[u32] {
        &self.minutes
    }

    /// First fire time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let secs = now.timestamp();
        let hour_start = Utc
            .timestamp_opt(secs - secs.rem_euclid(3600), 0)
            .single()
            .unwrap_or(now);
        (0..=1)
            .flat_map(|h| {
                self.minutes
                    .iter()
                    .map(move |m| hour_start + Duration::hours(h) + Duration::minutes(*m as i64))
            })
            .find(|t| *t > now)
            .unwrap_or(hour_start + Duration::hours(1))
    }
}

/// Wall-clock boundary at which the dedup store is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyReset {
    pub time: NaiveTime,
    pub offset: FixedOffset,
}

impl DailyReset {
    pub fn new(time: NaiveTime, offset: FixedOffset) -> Self {
        Self { time, offset }
    }

    /// First reset instant strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut date = now.with_timezone(&self.offset).date_naive();
        for _ in 0..3 {
            let candidate = self
                .offset
                .from_local_datetime(&date.and_time(self.time))
                .single()
                .map(|dt| dt.with_timezone(&Utc));
            if let Some(at) = candidate.filter(|at| *at > now) {
                return at;
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }
        now + Duration::days(1)
    }
}

/// `+08:00`, `-05:30`, `+8`, `UTC` or `Z`.
pub fn parse_offset(s: &str) -> Result<FixedOffset> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("utc") || s.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0).ok_or_else(|| Error::Config("bad offset".into()));
    }
    let bad = || Error::Config(format!("bad UTC offset: {}", s));
    let (sign, rest) = match s.chars().next() {
        Some('+') => (1, &s[1..]),
        Some('-') => (-1, &s[1..]),
        _ => (1, s),
    };
    let (h, m) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None => (rest, "0"),
    };
    let h: i32 = h.parse().map_err(|_| bad())?;
    let m: i32 = m.parse().map_err(|_| bad())?;
    if !(0..=14).contains(&h) || !(0..60).contains(&m) {
        return Err(bad());
    }
    FixedOffset::east_opt(sign * (h * 3600 + m * 60)).ok_or_else(bad)
}

pub fn parse_reset_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| Error::Config(format!("bad reset time (want HH:MM): {}", s)))
}

async fn sleep_until(at: DateTime<Utc>) {
    let wait = (at - Utc::now()).to_std().unwrap_or_default();
    tokio::time::sleep(wait).await;
}

/// Drives cycles and daily resets from one task, so they never overlap.
/// A cycle that overruns its slot just delays the next computed trigger.
pub async fn run(scanner: Arc<MarketScanner>, cron: CronSchedule, reset: DailyReset, run_immediately: bool) {
    if run_immediately {
        scanner.run_cycle().await;
    }

    loop {
        let now = Utc::now();
        let next_cycle = cron.next_after(now);
        let next_reset = reset.next_after(now);
        debug!("[Scheduler] Next cycle {} next reset {}", next_cycle, next_reset);

        if next_reset <= next_cycle {
            sleep_until(next_reset).await;
            info!("[Scheduler] Daily reset boundary reached");
            scanner.daily_reset(Utc::now()).await;
            if next_reset == next_cycle {
                scanner.run_cycle().await;
            }
        } else {
            sleep_until(next_cycle).await;
            scanner.run_cycle().await;
        }
    }
}
