// Homewatt - Household energy telemetry collector and process supervisor
//
// Copyright 2026 The Homewatt Authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

//! Wall-clock time and fixed-cadence jobs for the tick loops.
//!
//! All times are local, naive wall-clock times with second precision. Changes
//! to the local offset (daylight saving) are not compensated: a daily job at
//! 02:30 is skipped or repeated on the days the clock jumps.

use crate::reading::truncate_seconds;
use chrono::{Datelike, Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime, Weekday};
use std::time::Duration;

/// Source of the current local time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// The local wall clock, truncated to whole seconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        truncate_seconds(Local::now().naive_local())
    }
}

/// How often a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Every(Duration),
    DailyAt(NaiveTime),
    WeeklyAt(Weekday, NaiveTime),
}

impl Cadence {
    /// The first time strictly after `now` this cadence fires.
    pub fn next_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        match *self {
            Cadence::Every(interval) => now + ChronoDuration::seconds(interval.as_secs().max(1) as i64),
            Cadence::DailyAt(at) => {
                let today = now.date().and_time(at);
                if today > now {
                    today
                } else {
                    today + ChronoDuration::days(1)
                }
            }
            Cadence::WeeklyAt(weekday, at) => {
                let days_ahead = (7 + weekday.num_days_from_monday() - now.weekday().num_days_from_monday()) % 7;
                let candidate = now.date().and_time(at) + ChronoDuration::days(days_ahead as i64);
                if candidate > now {
                    candidate
                } else {
                    candidate + ChronoDuration::weeks(1)
                }
            }
        }
    }
}

#[derive(Debug)]
struct ScheduledJob<J> {
    job: J,
    cadence: Cadence,
    next_run: NaiveDateTime,
}

/// Set of jobs checked on every tick of a loop.
///
/// Interval jobs are due right away when added; daily and weekly jobs wait for
/// their next occurrence.
#[derive(Debug)]
pub struct Schedule<J> {
    jobs: Vec<ScheduledJob<J>>,
}

impl<J: Clone> Schedule<J> {
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    pub fn add(&mut self, job: J, cadence: Cadence, now: NaiveDateTime) {
        let next_run = match cadence {
            Cadence::Every(_) => now,
            _ => cadence.next_after(now),
        };

        self.jobs.push(ScheduledJob { job, cadence, next_run });
    }

    /// Return the jobs due at `now`, in the order they were added, and move each
    /// of them to its next occurrence. A job that was missed several times (the
    /// host was suspended) is returned only once.
    pub fn due(&mut self, now: NaiveDateTime) -> Vec<J> {
        let mut due = Vec::new();
        for entry in self.jobs.iter_mut() {
            if entry.next_run <= now {
                due.push(entry.job.clone());
                entry.next_run = entry.cadence.next_after(now);
            }
        }

        due
    }
}

impl<J: Clone> Default for Schedule<J> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::{Cadence, Schedule};
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};
    use std::time::Duration;

    fn at(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        // 2026-06-01 is a Monday
        NaiveDate::from_ymd_opt(2026, 6, day).unwrap().and_hms_opt(h, m, s).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_daily_next_after() {
        let noon = Cadence::DailyAt(time(12, 0));

        assert_eq!(at(3, 12, 0, 0), noon.next_after(at(3, 11, 0, 0)));
        assert_eq!(at(4, 12, 0, 0), noon.next_after(at(3, 12, 0, 0)));
        assert_eq!(at(4, 12, 0, 0), noon.next_after(at(3, 12, 5, 31)));
        assert_eq!(at(4, 12, 0, 0), noon.next_after(at(4, 0, 0, 0)));
    }

    #[test]
    fn test_weekly_next_after() {
        let monday = Cadence::WeeklyAt(Weekday::Mon, time(0, 0));

        assert_eq!(at(8, 0, 0, 0), monday.next_after(at(1, 0, 0, 0)));
        assert_eq!(at(8, 0, 0, 0), monday.next_after(at(3, 15, 0, 0)));
        assert_eq!(at(8, 0, 0, 0), monday.next_after(at(7, 23, 59, 59)));

        let friday = Cadence::WeeklyAt(Weekday::Fri, time(18, 30));
        assert_eq!(at(5, 18, 30, 0), friday.next_after(at(1, 9, 0, 0)));
        assert_eq!(at(12, 18, 30, 0), friday.next_after(at(5, 18, 30, 0)));
    }

    #[test]
    fn test_every_next_after() {
        let every = Cadence::Every(Duration::from_secs(5));
        assert_eq!(at(1, 10, 0, 5), every.next_after(at(1, 10, 0, 0)));
    }

    #[test]
    fn test_schedule_due() {
        let start = at(1, 0, 4, 58);
        let mut schedule = Schedule::new();
        schedule.add("check", Cadence::Every(Duration::from_secs(5)), start);
        schedule.add("recycle", Cadence::DailyAt(time(0, 5)), start);

        // Interval jobs run immediately
        assert_eq!(vec!["check"], schedule.due(start));
        assert!(schedule.due(at(1, 0, 4, 59)).is_empty());
        assert!(schedule.due(at(1, 0, 5, 2)).contains(&"recycle"));

        // Suspended for an hour, both run exactly once
        assert_eq!(vec!["check"], schedule.due(at(1, 1, 0, 0)));
        assert_eq!(vec!["check", "recycle"], schedule.due(at(2, 1, 0, 0)));
        assert!(schedule.due(at(2, 1, 0, 0)).is_empty());
    }
}
