//! Five-field cron expressions.
//!
//! Fields are minute, hour, day-of-month, month, and day-of-week, with the
//! usual crontab semantics: names in any case, weekday `0` and `7` both
//! Sunday, and day-of-month/day-of-week combined with OR when both are
//! restricted. Parsing and matching are delegated to `croner`.

use chrono::{DateTime, TimeZone, Timelike};
use croner::Cron;

use crate::error::EngineError;

/// A parsed cron expression.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    pattern: String,
    cron: Cron,
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self, EngineError> {
        // croner also accepts a leading seconds field; rules never carry one.
        let fields = expr.split_whitespace().count();
        if fields != 5 {
            return Err(invalid(expr, &format!("expected 5 fields, got {}", fields)));
        }

        let cron = Cron::new(expr)
            .parse()
            .map_err(|e| invalid(expr, &e.to_string()))?;
        Ok(Self {
            pattern: expr.trim().to_string(),
            cron,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether the wall-clock minute of `at` (in its own zone) matches.
    pub fn matches<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> bool {
        // A five-field pattern only matches second zero.
        let Some(minute) = at.with_second(0).and_then(|t| t.with_nanosecond(0)) else {
            return false;
        };
        self.cron.is_time_matching(&minute).unwrap_or(false)
    }
}

impl PartialEq for CronSchedule {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

fn invalid(expr: &str, reason: &str) -> EngineError {
    EngineError::Validation(format!("invalid cron pattern '{}': {}", expr, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    // ---- parsing ----

    #[test]
    fn test_parse_every_minute() {
        let cron = CronSchedule::parse("* * * * *").unwrap();
        assert!(cron.matches(&at(2026, 3, 1, 0, 0)));
        assert!(cron.matches(&at(2026, 12, 31, 23, 59)));
        assert_eq!(cron.pattern(), "* * * * *");
    }

    #[test]
    fn test_parse_rejects_wrong_field_count() {
        assert!(CronSchedule::parse("0 9 * *").is_err());
        assert!(CronSchedule::parse("0 0 9 * * MON").is_err());
        assert!(CronSchedule::parse("").is_err());
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        assert!(CronSchedule::parse("60 * * * *").is_err());
        assert!(CronSchedule::parse("* 24 * * *").is_err());
        assert!(CronSchedule::parse("* * 0 * *").is_err());
        assert!(CronSchedule::parse("* * * 13 *").is_err());
        assert!(CronSchedule::parse("* * * * 8").is_err());
    }

    #[test]
    fn test_parse_rejects_malformed_items() {
        assert!(CronSchedule::parse("*/0 * * * *").is_err());
        assert!(CronSchedule::parse("* * * * FUNDAY").is_err());
        let err = CronSchedule::parse("abc * * * *").unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_huge_step_does_not_panic() {
        let parsed = std::panic::catch_unwind(|| CronSchedule::parse("1/4294967295 * * * *"));
        match parsed.expect("parsing must not panic") {
            Err(err) => assert!(matches!(err, EngineError::Validation(_))),
            // Accepted: the step never lands again, so only minute 1 matches.
            Ok(cron) => {
                assert!(!cron.matches(&at(2026, 1, 12, 9, 0)));
                assert!(!cron.matches(&at(2026, 1, 12, 9, 2)));
            }
        }
    }

    // ---- matching ----

    #[test]
    fn test_weekday_range_by_name() {
        let cron = CronSchedule::parse("0 9 * * MON-FRI").unwrap();
        // 2026-01-12 is a Monday, 2026-01-17 a Saturday.
        assert!(cron.matches(&at(2026, 1, 12, 9, 0)));
        assert!(!cron.matches(&at(2026, 1, 12, 9, 1)));
        assert!(!cron.matches(&at(2026, 1, 17, 9, 0)));
        assert!(cron.matches(&at(2026, 1, 16, 9, 0)));
    }

    #[test]
    fn test_matches_anywhere_within_the_minute() {
        let cron = CronSchedule::parse("0 9 * * *").unwrap();
        let late = Utc.with_ymd_and_hms(2026, 1, 12, 9, 0, 40).unwrap();
        assert!(cron.matches(&late));
        assert!(cron.matches(&(late + chrono::Duration::milliseconds(500))));
    }

    #[test]
    fn test_names_are_case_insensitive() {
        let cron = CronSchedule::parse("0 0 1 jan,Jul *").unwrap();
        assert!(cron.matches(&at(2026, 1, 1, 0, 0)));
        assert!(cron.matches(&at(2026, 7, 1, 0, 0)));
        assert!(!cron.matches(&at(2026, 2, 1, 0, 0)));
    }

    #[test]
    fn test_step_and_lists() {
        let cron = CronSchedule::parse("*/15 8-10 * * *").unwrap();
        assert!(cron.matches(&at(2026, 5, 5, 8, 0)));
        assert!(cron.matches(&at(2026, 5, 5, 10, 45)));
        assert!(!cron.matches(&at(2026, 5, 5, 10, 50)));
        assert!(!cron.matches(&at(2026, 5, 5, 11, 0)));

        let cron = CronSchedule::parse("0,30 12 * * *").unwrap();
        assert!(cron.matches(&at(2026, 5, 5, 12, 30)));
        assert!(!cron.matches(&at(2026, 5, 5, 12, 15)));
    }

    #[test]
    fn test_sunday_as_zero_or_seven() {
        // 2026-01-18 is a Sunday.
        let zero = CronSchedule::parse("0 12 * * 0").unwrap();
        let seven = CronSchedule::parse("0 12 * * 7").unwrap();
        assert!(zero.matches(&at(2026, 1, 18, 12, 0)));
        assert!(seven.matches(&at(2026, 1, 18, 12, 0)));
        assert!(!zero.matches(&at(2026, 1, 19, 12, 0)));
        assert!(!seven.matches(&at(2026, 1, 17, 12, 0)));
    }

    #[test]
    fn test_numeric_weekdays_start_at_sunday() {
        let cron = CronSchedule::parse("0 9 * * 1-5").unwrap();
        assert!(cron.matches(&at(2026, 1, 12, 9, 0))); // Monday
        assert!(!cron.matches(&at(2026, 1, 18, 9, 0))); // Sunday
    }

    #[test]
    fn test_day_of_month_or_day_of_week_when_both_restricted() {
        // Fires on the 1st and on every Friday.
        let cron = CronSchedule::parse("0 0 1 * FRI").unwrap();
        assert!(cron.matches(&at(2026, 1, 1, 0, 0))); // Thursday the 1st
        assert!(cron.matches(&at(2026, 1, 9, 0, 0))); // Friday
        assert!(!cron.matches(&at(2026, 1, 8, 0, 0))); // Thursday
    }

    #[test]
    fn test_unrestricted_weekday_uses_day_of_month_only() {
        let cron = CronSchedule::parse("0 0 15 * *").unwrap();
        assert!(cron.matches(&at(2026, 4, 15, 0, 0)));
        assert!(!cron.matches(&at(2026, 4, 16, 0, 0)));
    }

    #[test]
    fn test_matches_in_local_zone() {
        let cron = CronSchedule::parse("0 9 * * *").unwrap();
        let tz: chrono_tz::Tz = "America/New_York".parse().unwrap();
        // 14:00 UTC is 09:00 EST in January.
        assert!(cron.matches(&at(2026, 1, 12, 14, 0).with_timezone(&tz)));
        assert!(!cron.matches(&at(2026, 1, 12, 9, 0).with_timezone(&tz)));
    }
}
