//! Time-trigger evaluation.
//!
//! A time rule is either one-time (`scheduledTime`) or recurring
//! (`cronPattern`). One-time rules fire at most once ever; recurring rules
//! fire at most once per wall-clock minute, tracked through the rule's
//! `last_executed_at`.

pub mod cron;

use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::EngineError;
use crate::types::TimeTrigger;

pub use cron::CronSchedule;

/// The interpreted firing mode of a time trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleMode {
    Once(DateTime<Utc>),
    Recurring { cron: CronSchedule, timezone: Tz },
}

impl TimeTrigger {
    /// Interpret the trigger. `scheduledTime` wins when both fields are set.
    pub fn mode(&self) -> Result<ScheduleMode, EngineError> {
        let timezone = parse_timezone(self.timezone.as_deref())?;

        if let Some(raw) = non_blank(self.scheduled_time.as_deref()) {
            return Ok(ScheduleMode::Once(resolve_scheduled_time(raw, timezone)?));
        }
        if let Some(pattern) = non_blank(self.cron_pattern.as_deref()) {
            return Ok(ScheduleMode::Recurring {
                cron: CronSchedule::parse(pattern)?,
                timezone,
            });
        }
        Err(EngineError::Validation(
            "time trigger needs scheduledTime or cronPattern".to_string(),
        ))
    }
}

/// Whether a time rule should fire at `now`.
pub fn is_due(
    trigger: &TimeTrigger,
    last_executed_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<bool, EngineError> {
    Ok(match trigger.mode()? {
        ScheduleMode::Once(at) => now >= at && last_executed_at.is_none(),
        ScheduleMode::Recurring { cron, timezone } => {
            let not_this_minute = match last_executed_at {
                None => true,
                Some(last) => epoch_minute(last) < epoch_minute(now),
            };
            not_this_minute && cron.matches(&now.with_timezone(&timezone))
        }
    })
}

/// Whole minutes since the Unix epoch.
pub fn epoch_minute(at: DateTime<Utc>) -> i64 {
    at.timestamp().div_euclid(60)
}

/// Parse an IANA zone name. Absent or blank is UTC.
pub fn parse_timezone(name: Option<&str>) -> Result<Tz, EngineError> {
    match non_blank(name) {
        None => Ok(Tz::UTC),
        Some(name) => name
            .parse::<Tz>()
            .map_err(|_| EngineError::Validation(format!("unknown timezone '{}'", name))),
    }
}

/// Resolve a one-time instant. Offsets in the string win; a naive local time
/// is placed in `timezone`.
pub fn resolve_scheduled_time(raw: &str, timezone: Tz) -> Result<DateTime<Utc>, EngineError> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }

    let naive = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| EngineError::Validation(format!("invalid scheduledTime '{}'", raw)))?;

    match timezone.from_local_datetime(&naive) {
        LocalResult::Single(at) => Ok(at.with_timezone(&Utc)),
        // Ambiguous (clocks fall back): take the earlier instant.
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => Err(EngineError::Validation(format!(
            "scheduledTime '{}' does not exist in {}",
            raw, timezone
        ))),
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
