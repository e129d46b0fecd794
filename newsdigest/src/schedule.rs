use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use common::SchedulerConfig;

use crate::article::TimeWindow;

/// When scheduled runs happen: wall-clock times in a zone, every day or on
/// one weekday.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    times: Vec<NaiveTime>,
    weekday: Option<Weekday>,
    timezone: Tz,
}

impl Schedule {
    pub fn daily(times: Vec<NaiveTime>) -> Self {
        Self {
            times,
            weekday: None,
            timezone: Tz::UTC,
        }
    }

    pub fn weekly(times: Vec<NaiveTime>, weekday: Weekday) -> Self {
        Self {
            weekday: Some(weekday),
            ..Self::daily(times)
        }
    }

    pub fn in_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn from_config(config: &SchedulerConfig) -> anyhow::Result<Self> {
        let times = config
            .times
            .iter()
            .map(|t| common::parse_schedule_time(t))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self {
            times,
            weekday: config.weekday()?,
            timezone: config.timezone()?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Next slot strictly after `now`. Local times that do not exist on a
    /// given day (DST gap) are skipped for that day; ambiguous ones resolve
    /// to their first occurrence.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = now.with_timezone(&self.timezone).date_naive();

        // A week ahead covers the same weekday next week
        (0..=7)
            .map(|offset| today + Duration::days(offset))
            .filter(|day| self.weekday.map_or(true, |w| day.weekday() == w))
            .flat_map(|day| {
                self.times
                    .iter()
                    .filter_map(move |t| self.timezone.from_local_datetime(&day.and_time(*t)).earliest())
            })
            .map(|at| at.with_timezone(&Utc))
            .filter(|at| *at > now)
            .min()
    }
}

/// Window for a scheduled run: from the previous run, or `lookback_hours` back
/// when there was none.
pub fn window_since(last_run: Option<DateTime<Utc>>, now: DateTime<Utc>, lookback_hours: u64) -> TimeWindow {
    match last_run {
        Some(start) if start < now => TimeWindow::new(start, now),
        _ => TimeWindow::lookback(now, lookback_hours),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn picks_the_next_time_today_or_tomorrow() {
        let schedule = Schedule::daily(vec![hm(7, 0), hm(18, 0)]);
        assert_eq!(schedule.next_run_after(utc(2024, 3, 5, 10, 30)), Some(utc(2024, 3, 5, 18, 0)));
        assert_eq!(schedule.next_run_after(utc(2024, 3, 5, 19, 0)), Some(utc(2024, 3, 6, 7, 0)));
    }

    #[test]
    fn exact_time_is_not_rerun() {
        let now = utc(2024, 3, 5, 7, 0);
        assert_eq!(Schedule::daily(vec![hm(7, 0)]).next_run_after(now), Some(utc(2024, 3, 6, 7, 0)));
        assert_eq!(Schedule::daily(Vec::new()).next_run_after(now), None);
    }

    #[test]
    fn weekly_waits_for_the_weekday() {
        // 2024-03-05 is a Tuesday
        let schedule = Schedule::weekly(vec![hm(9, 0)], Weekday::Mon);
        assert_eq!(schedule.next_run_after(utc(2024, 3, 5, 10, 0)), Some(utc(2024, 3, 11, 9, 0)));

        // On the day itself, before and after the slot
        assert_eq!(schedule.next_run_after(utc(2024, 3, 11, 8, 0)), Some(utc(2024, 3, 11, 9, 0)));
        assert_eq!(schedule.next_run_after(utc(2024, 3, 11, 9, 0)), Some(utc(2024, 3, 18, 9, 0)));
    }

    #[test]
    fn times_are_read_in_the_configured_zone() {
        let schedule = Schedule::daily(vec![hm(7, 0)]).in_timezone(chrono_tz::Europe::Paris);
        // CET in winter, CEST in summer
        assert_eq!(schedule.next_run_after(utc(2024, 1, 10, 12, 0)), Some(utc(2024, 1, 11, 6, 0)));
        assert_eq!(schedule.next_run_after(utc(2024, 7, 10, 12, 0)), Some(utc(2024, 7, 11, 5, 0)));

        // Local date differs from the UTC date: 23:30 UTC is already Thursday in Tokyo
        let tokyo = Schedule::weekly(vec![hm(9, 0)], Weekday::Thu).in_timezone(chrono_tz::Asia::Tokyo);
        assert_eq!(tokyo.next_run_after(utc(2024, 3, 6, 23, 30)), Some(utc(2024, 3, 7, 0, 0)));
    }

    #[test]
    fn nonexistent_local_time_skips_to_the_next_day() {
        // 02:30 does not exist in New York on 2024-03-10
        let schedule = Schedule::daily(vec![hm(2, 30)]).in_timezone(chrono_tz::America::New_York);
        assert_eq!(schedule.next_run_after(utc(2024, 3, 10, 0, 0)), Some(utc(2024, 3, 11, 6, 30)));
    }

    #[test]
    fn built_from_scheduler_config() {
        let config = SchedulerConfig {
            times: vec!["08:15".to_string()],
            frequency: None,
            day_of_week: Some("friday".to_string()),
            timezone: Some("Europe/Paris".to_string()),
            lookback_hours: Some(168),
        };
        let schedule = Schedule::from_config(&config).unwrap();
        assert_eq!(
            schedule,
            Schedule::weekly(vec![hm(8, 15)], Weekday::Fri).in_timezone(chrono_tz::Europe::Paris)
        );

        let bad = SchedulerConfig {
            timezone: Some("Nowhere/Special".to_string()),
            ..config
        };
        assert!(Schedule::from_config(&bad).is_err());
    }

    #[test]
    fn window_starts_at_last_run() {
        let now = utc(2024, 3, 5, 18, 0);
        let last = utc(2024, 3, 5, 7, 0);
        assert_eq!(window_since(Some(last), now, 24), TimeWindow::new(last, now));
        assert_eq!(window_since(None, now, 24), TimeWindow::lookback(now, 24));
    }
}
