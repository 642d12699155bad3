//! Report date window resolution.
//!
//! Scheduled runs derive the window from "today" in the report time zone:
//! on the 16th the window covers the first half of the month, on any other
//! day the whole month. Manual runs take explicit bounds.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt;

use crate::config::JobEnv;

/// How the job was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Scheduled,
    Manual,
}

impl Trigger {
    /// Map a CI event name. Unset means a manual run.
    pub fn from_event_name(event: Option<&str>) -> Result<Self> {
        match event.map(str::trim).unwrap_or("workflow_dispatch") {
            "schedule" | "workflow_run" => Ok(Trigger::Scheduled),
            "workflow_dispatch" => Ok(Trigger::Manual),
            other => bail!("Unsupported event: {}", other),
        }
    }
}

/// Closed interval of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateWindow {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if from > to {
            bail!("FROM_DATE {} is after TO_DATE {}", from, to);
        }
        Ok(Self { from, to })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} .. {}", self.from, self.to)
    }
}

/// Window for a scheduled run on `today`.
pub fn scheduled_window(today: NaiveDate) -> DateWindow {
    let first = today.with_day(1).unwrap_or(today);
    let to = if today.day() == 16 {
        today.with_day(15).unwrap_or(today)
    } else {
        last_day_of_month(today)
    };
    DateWindow { from: first, to }
}

fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    let (y, m) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)
        .and_then(|d| d.pred_opt())
        .unwrap_or(date)
}

/// Parse a manual bound into a calendar date in `tz`.
///
/// A bare `YYYY-MM-DD` is taken as that date. Timestamps with an offset
/// are converted to `tz`; naive timestamps are read as UTC first.
pub fn parse_bound(raw: &str, tz: &Tz) -> Result<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(tz).date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(Utc.from_utc_datetime(&naive).with_timezone(tz).date_naive());
        }
    }
    bail!("cannot parse date '{}' (expected YYYY-MM-DD or RFC 3339)", raw)
}

/// Resolve the report window for `trigger`, with `today` in the report zone.
pub fn resolve_window(
    trigger: Trigger,
    today: NaiveDate,
    from: Option<&str>,
    to: Option<&str>,
    tz: &Tz,
) -> Result<DateWindow> {
    match trigger {
        Trigger::Scheduled => Ok(scheduled_window(today)),
        Trigger::Manual => {
            let (Some(from), Some(to)) = (from, to) else {
                bail!("FROM_DATE and TO_DATE must be set for a manual trigger");
            };
            let from = parse_bound(from, tz).context("invalid FROM_DATE")?;
            let to = parse_bound(to, tz).context("invalid TO_DATE")?;
            DateWindow::new(from, to)
        }
    }
}

/// Resolve the window from the job environment and the current time.
pub fn window_from_env(env: &JobEnv, tz: &Tz) -> Result<DateWindow> {
    let trigger = Trigger::from_event_name(env.event_name.as_deref())?;
    let today = Utc::now().with_timezone(tz).date_naive();
    resolve_window(
        trigger,
        today,
        env.from_date.as_deref(),
        env.to_date.as_deref(),
        tz,
    )
}
