//! Timezone-aware day and month windows.
//!
//! # Responsibility
//! - Resolve IANA zone names, falling back to UTC for unknown names.
//! - Convert local calendar days and months into UTC half-open ranges.
//!
//! # Invariants
//! - Day ranges are `[local midnight, next local midnight)` in UTC, so a
//!   DST transition day spans 23 or 25 hours.
//! - When local midnight does not exist, the day starts at the first valid
//!   local instant after it.

use crate::model::objective::month_bounds;
use crate::query::QueryWindow;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use log::warn;

/// Resolves an IANA name such as `America/Chicago`; unknown names yield UTC.
pub fn resolve_tz(name: &str) -> Tz {
    match name.trim().parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            warn!("event=tz_resolve module=service status=fallback tz=UTC");
            Tz::UTC
        }
    }
}

/// UTC instant of the start of `date` in `tz`.
pub fn local_day_start(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    for step in 0..=8 {
        let candidate = midnight + Duration::minutes(30 * step);
        if let Some(local) = tz.from_local_datetime(&candidate).earliest() {
            return local.with_timezone(&Utc);
        }
    }
    Utc.from_utc_datetime(&midnight)
}

/// `[start, end)` of `date` in `tz`, expressed in UTC.
pub fn day_bounds(date: NaiveDate, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let next = date.succ_opt().unwrap_or(date);
    (local_day_start(date, tz), local_day_start(next, tz))
}

/// Local date for `now` in `tz` plus its UTC bounds.
pub fn user_today(now: DateTime<Utc>, tz: Tz) -> (NaiveDate, DateTime<Utc>, DateTime<Utc>) {
    let today = now.with_timezone(&tz).date_naive();
    let (start, end) = day_bounds(today, tz);
    (today, start, end)
}

/// `[start, end)` covering the inclusive local date range `first..=last`.
pub fn range_bounds(first: NaiveDate, last: NaiveDate, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let (start, _) = day_bounds(first, tz);
    let (_, end) = day_bounds(last, tz);
    (start, end)
}

/// Snippet window for one local day whose period is the given date range.
pub fn window_for(day: NaiveDate, first: NaiveDate, last: NaiveDate, tz: Tz) -> QueryWindow {
    let (day_start, day_end) = day_bounds(day, tz);
    let (period_start, period_end) = range_bounds(first, last, tz);
    QueryWindow::for_day(day, day_start, day_end).with_period(period_start, period_end)
}

/// Snippet window for one local day inside its calendar month.
pub fn window_in_month(day: NaiveDate, tz: Tz) -> QueryWindow {
    match month_bounds(day.year(), day.month()) {
        Some((first, last)) => window_for(day, first, last, tz),
        None => window_for(day, day, day, tz),
    }
}
