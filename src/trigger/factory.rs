//! Factory constructors for the recurrence policies
//!
//! These build validated [`Trigger`] records from primitive parameters;
//! registration itself goes through [`crate::Scheduler::schedule`].

use chrono::{DateTime, Local, NaiveTime, TimeDelta, Weekday};

use super::recurrence::{self, Recurrence};
use super::{Job, Trigger};
use crate::error::SchedulerError;

/// Trigger firing `times` times, `interval` apart, starting at `start`
///
/// `times == 0` means unbounded.
pub fn times(
    name: &str,
    times: i64,
    interval: TimeDelta,
    start: DateTime<Local>,
    job: Job,
) -> Result<Trigger, SchedulerError> {
    interval_trigger(name, times, interval, start, None, job)
}

/// Unbounded trigger firing every `interval`, starting at `start`
pub fn forever(name: &str, interval: TimeDelta, start: DateTime<Local>, job: Job) -> Result<Trigger, SchedulerError> {
    interval_trigger(name, 0, interval, start, None, job)
}

/// Unbounded trigger firing every `interval` between `start` and `end`
/// (exclusive)
pub fn forever_until(
    name: &str,
    interval: TimeDelta,
    start: DateTime<Local>,
    end: DateTime<Local>,
    job: Job,
) -> Result<Trigger, SchedulerError> {
    interval_trigger(name, 0, interval, start, Some(end), job)
}

/// Trigger firing exactly once at `at`
pub fn once(name: &str, at: DateTime<Local>, job: Job) -> Result<Trigger, SchedulerError> {
    interval_trigger(name, 1, TimeDelta::zero(), at, None, job)
}

/// Trigger firing every day at `at`
///
/// Starts today if the time of day is still ahead, tomorrow otherwise.
pub fn daily(name: &str, at: NaiveTime, job: Job) -> Result<Trigger, SchedulerError> {
    let now = Local::now();
    let today = recurrence::resolve_local(now.date_naive(), at);
    let start = if today < now {
        recurrence::resolve_local(now.date_naive() + TimeDelta::days(1), at)
    } else {
        today
    };
    interval_trigger(name, 0, TimeDelta::days(1), start, None, job)
}

/// Trigger firing on the given weekdays at time `at`, indefinitely
///
/// Days are deduplicated and sorted ascending from Monday.
pub fn weekly(name: &str, days: &[Weekday], at: NaiveTime, job: Job) -> Result<Trigger, SchedulerError> {
    if name.is_empty() {
        return Err(SchedulerError::MissingName);
    }
    if days.is_empty() {
        return Err(SchedulerError::EmptyWeekdays);
    }

    let mut days: Vec<Weekday> = days.to_vec();
    days.sort_by_key(|day| day.num_days_from_monday());
    days.dedup();

    let execute_time = recurrence::next_weekday_time(&days, at, Local::now());
    Ok(Trigger::new(name, execute_time, Recurrence::Weekly { days, at }, job))
}

fn interval_trigger(
    name: &str,
    times: i64,
    interval: TimeDelta,
    start: DateTime<Local>,
    end: Option<DateTime<Local>>,
    job: Job,
) -> Result<Trigger, SchedulerError> {
    if name.is_empty() {
        return Err(SchedulerError::MissingName);
    }
    if times < 0 {
        return Err(SchedulerError::InvalidTimes(times));
    }
    if interval < TimeDelta::zero() {
        return Err(SchedulerError::NegativeInterval);
    }

    // times - 1 = occurrences left after the pending one; 0 maps onto the
    // unbounded sentinel
    let recurrence = Recurrence::Interval {
        remaining: times - 1,
        every: interval,
        end,
    };
    Ok(Trigger::new(name, start, recurrence, job))
}
