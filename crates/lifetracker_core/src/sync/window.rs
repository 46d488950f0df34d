//! How far back a sync reaches.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::fmt::{Display, Formatter};

pub const DEFAULT_SYNC_DAYS: u32 = 30;
const ROLLING_ALL_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SyncSource {
    Whoop,
    Withings,
    Toggl,
    Cronometer,
}

impl SyncSource {
    pub const ALL: [SyncSource; 4] = [Self::Whoop, Self::Withings, Self::Toggl, Self::Cronometer];

    pub fn name(self) -> &'static str {
        match self {
            Self::Whoop => "Whoop",
            Self::Withings => "Withings",
            Self::Toggl => "Toggl",
            Self::Cronometer => "Cronometer",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|source| source.name().eq_ignore_ascii_case(value.trim()))
    }
}

impl Display for SyncSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncWindow {
    Days(u32),
    /// Everything the provider keeps. Each source has its own floor.
    All,
}

impl Default for SyncWindow {
    fn default() -> Self {
        Self::Days(DEFAULT_SYNC_DAYS)
    }
}

impl SyncWindow {
    /// `--all` wins over `--days`.
    pub fn from_flags(days: Option<u32>, all: bool) -> Self {
        if all {
            return Self::All;
        }
        Self::Days(days.unwrap_or(DEFAULT_SYNC_DAYS))
    }

    pub fn start_for(self, source: SyncSource, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Days(days) => now
                .checked_sub_signed(Duration::days(i64::from(days)))
                .unwrap_or_else(|| Self::All.start_for(source, now)),
            Self::All => match source {
                SyncSource::Whoop => utc_midnight(2020, 1, 1).unwrap_or(now),
                SyncSource::Withings => utc_midnight(2010, 1, 1).unwrap_or(now),
                SyncSource::Toggl | SyncSource::Cronometer => {
                    now - Duration::days(ROLLING_ALL_DAYS)
                }
            },
        }
    }

    pub fn describe(self) -> String {
        match self {
            Self::Days(days) => format!("last {days} days"),
            Self::All => "all history".to_string(),
        }
    }
}

fn utc_midnight(year: i32, month: u32, day: u32) -> Option<DateTime<Utc>> {
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}
