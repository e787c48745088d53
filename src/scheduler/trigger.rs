//! Trigger parsing and fire decisions, pure functions of the clock

use crate::core::config::Schedule;
use chrono::{DateTime, Duration, Local, Timelike};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// A malformed trigger value; the schedule is skipped for the tick
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TriggerError {
    #[error("invalid time of day '{0}', expected HH:MM")]
    InvalidTime(String),

    #[error("invalid interval '{0}'")]
    InvalidInterval(String),
}

/// Decide whether a schedule should fire at `now`
///
/// Time-of-day triggers fire when the wall-clock hour:minute matches and
/// at least 23 hours passed since the last firing, which bounds them to
/// once per day across one-minute ticks. Interval triggers fire when the
/// configured duration has elapsed. A schedule with both forms uses the
/// time of day; one with neither never fires.
pub fn due(
    schedule: &Schedule,
    last_fired: Option<DateTime<Local>>,
    now: DateTime<Local>,
) -> Result<bool, TriggerError> {
    if let Some(at) = schedule.at.as_deref() {
        let (hour, minute) = parse_at(at)?;
        if now.hour() == hour && now.minute() == minute {
            return Ok(match last_fired {
                None => true,
                Some(last) => now.signed_duration_since(last) >= Duration::hours(23),
            });
        }
        return Ok(false);
    }

    if let Some(every) = schedule.every.as_deref() {
        let interval = parse_every(every)?;
        return Ok(match last_fired {
            None => true,
            Some(last) => now.signed_duration_since(last) >= interval,
        });
    }

    Ok(false)
}

/// Parse "HH:MM"
pub fn parse_at(at: &str) -> Result<(u32, u32), TriggerError> {
    let invalid = || TriggerError::InvalidTime(at.to_string());

    let (hour, minute) = at.split_once(':').ok_or_else(invalid)?;
    let hour: u32 = hour.parse().map_err(|_| invalid())?;
    let minute: u32 = minute.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok((hour, minute))
}

/// Parse interval strings like "90s", "45m", "2h", "1h30m"
pub fn parse_every(every: &str) -> Result<Duration, TriggerError> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern =
        PATTERN.get_or_init(|| Regex::new(r"^(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$").unwrap());

    let invalid = || TriggerError::InvalidInterval(every.to_string());

    let captures = pattern.captures(every).ok_or_else(invalid)?;
    if captures.get(1).is_none() && captures.get(2).is_none() && captures.get(3).is_none() {
        return Err(invalid());
    }

    let component = |index: usize| -> Result<i64, TriggerError> {
        match captures.get(index) {
            Some(m) => m.as_str().parse().map_err(|_| invalid()),
            None => Ok(0),
        }
    };

    Ok(Duration::hours(component(1)?)
        + Duration::minutes(component(2)?)
        + Duration::seconds(component(3)?))
}

/// The configured trigger value, for logs and events
pub fn describe(schedule: &Schedule) -> String {
    schedule
        .at
        .clone()
        .or_else(|| schedule.every.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_schedule(at: &str) -> Schedule {
        Schedule {
            at: Some(at.to_string()),
            ..Default::default()
        }
    }

    fn every_schedule(every: &str) -> Schedule {
        Schedule {
            every: Some(every.to_string()),
            ..Default::default()
        }
    }

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_parse_at() {
        assert_eq!(parse_at("09:00"), Ok((9, 0)));
        assert_eq!(parse_at("23:59"), Ok((23, 59)));
        assert!(parse_at("24:00").is_err());
        assert!(parse_at("12:60").is_err());
        assert!(parse_at("noon").is_err());
        assert!(parse_at("9").is_err());
    }

    #[test]
    fn test_parse_every() {
        assert_eq!(parse_every("90s"), Ok(Duration::seconds(90)));
        assert_eq!(parse_every("45m"), Ok(Duration::minutes(45)));
        assert_eq!(parse_every("2h"), Ok(Duration::hours(2)));
        assert_eq!(parse_every("1h30m"), Ok(Duration::minutes(90)));
        assert_eq!(parse_every("1h30m15s"), Ok(Duration::seconds(5415)));
        assert!(parse_every("").is_err());
        assert!(parse_every("soon").is_err());
        assert!(parse_every("1x").is_err());
    }

    #[test]
    fn test_at_fires_once_per_day() {
        let schedule = at_schedule("09:00");

        // Never fired: fires at the matching minute
        assert_eq!(due(&schedule, None, local(2026, 8, 5, 9, 0)), Ok(true));

        // Same-day re-check a few minutes later does not fire
        let last = local(2026, 8, 5, 9, 0);
        assert_eq!(due(&schedule, Some(last), local(2026, 8, 5, 9, 5)), Ok(false));

        // Another tick inside the same minute does not refire
        assert_eq!(due(&schedule, Some(last), local(2026, 8, 5, 9, 0)), Ok(false));

        // The next day at the configured time fires again
        assert_eq!(due(&schedule, Some(last), local(2026, 8, 6, 9, 0)), Ok(true));
    }

    #[test]
    fn test_at_does_not_fire_off_minute() {
        let schedule = at_schedule("09:00");
        assert_eq!(due(&schedule, None, local(2026, 8, 5, 9, 1)), Ok(false));
        assert_eq!(due(&schedule, None, local(2026, 8, 5, 8, 59)), Ok(false));
    }

    #[test]
    fn test_every_respects_interval() {
        let schedule = every_schedule("1h30m");
        let last = local(2026, 8, 5, 12, 0);

        assert_eq!(due(&schedule, None, local(2026, 8, 5, 12, 0)), Ok(true));
        assert_eq!(due(&schedule, Some(last), local(2026, 8, 5, 13, 29)), Ok(false));
        assert_eq!(due(&schedule, Some(last), local(2026, 8, 5, 13, 31)), Ok(true));
    }

    #[test]
    fn test_at_takes_priority_over_every() {
        let schedule = Schedule {
            at: Some("09:00".to_string()),
            every: Some("1m".to_string()),
            ..Default::default()
        };
        // The interval would be long past due, but the time of day rules
        assert_eq!(due(&schedule, None, local(2026, 8, 5, 10, 0)), Ok(false));
        assert_eq!(due(&schedule, None, local(2026, 8, 5, 9, 0)), Ok(true));
    }

    #[test]
    fn test_empty_schedule_never_fires() {
        let schedule = Schedule::default();
        assert_eq!(due(&schedule, None, local(2026, 8, 5, 9, 0)), Ok(false));
    }

    #[test]
    fn test_malformed_trigger_is_an_error() {
        assert!(due(&at_schedule("25:00"), None, local(2026, 8, 5, 9, 0)).is_err());
        assert!(due(&every_schedule("later"), None, local(2026, 8, 5, 9, 0)).is_err());
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(&at_schedule("09:00")), "09:00");
        assert_eq!(describe(&every_schedule("30m")), "30m");
        assert_eq!(describe(&Schedule::default()), "");
    }
}
