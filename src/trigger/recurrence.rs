//! Recurrence policies - how a trigger computes its next occurrence

use chrono::{DateTime, Datelike, Local, LocalResult, NaiveDate, NaiveTime, TimeDelta, Weekday};

/// Sentinel for an interval policy with no occurrence bound
pub(crate) const UNBOUNDED: i64 = -1;

/// Closed set of recurrence policies
#[derive(Debug, Clone)]
pub enum Recurrence {
    /// Fire every `every`, optionally bounded by a remaining occurrence
    /// count and an exclusive end instant
    Interval {
        /// Occurrences left after the current one; `-1` means unbounded
        remaining: i64,
        every: TimeDelta,
        end: Option<DateTime<Local>>,
    },

    /// Fire on the given weekdays at a fixed time of day, indefinitely
    Weekly { days: Vec<Weekday>, at: NaiveTime },
}

impl Recurrence {
    /// Compute the policy state and due time of the successor occurrence
    ///
    /// Pure function of the policy state and `now`. Returns `None` when
    /// the chain ends: a bounded count hit zero, or the end boundary has
    /// passed (exclusive, compared against `now`).
    pub(crate) fn advance(&self, now: DateTime<Local>) -> Option<(Recurrence, DateTime<Local>)> {
        match self {
            Recurrence::Interval { remaining, every, end } => {
                if *remaining == 0 {
                    return None;
                }
                if end.is_some_and(|end| end < now) {
                    return None;
                }

                let remaining = if *remaining == UNBOUNDED { UNBOUNDED } else { remaining - 1 };
                let next = Recurrence::Interval {
                    remaining,
                    every: *every,
                    end: *end,
                };
                Some((next, now + *every))
            }
            Recurrence::Weekly { days, at } => Some((self.clone(), next_weekday_time(days, *at, now))),
        }
    }
}

/// Next instant >= `now` matching one of `days` at time `at`
///
/// `days` must be sorted ascending from Monday. If every configured slot
/// this week has already passed, the first configured day next week wins.
pub(crate) fn next_weekday_time(days: &[Weekday], at: NaiveTime, now: DateTime<Local>) -> DateTime<Local> {
    let today = now.date_naive();

    days.iter()
        .map(|day| resolve_local(date_in_week_of(today, *day), at))
        .find(|candidate| *candidate >= now)
        .unwrap_or_else(|| {
            let first = days.first().copied().unwrap_or(Weekday::Mon);
            resolve_local(date_in_week_of(today, first) + TimeDelta::days(7), at)
        })
}

/// The date of `day` within the Monday-based week containing `today`
fn date_in_week_of(today: NaiveDate, day: Weekday) -> NaiveDate {
    let offset = day.num_days_from_monday() as i64 - today.weekday().num_days_from_monday() as i64;
    today + TimeDelta::days(offset)
}

pub(crate) fn resolve_local(date: NaiveDate, time: NaiveTime) -> DateTime<Local> {
    match date.and_time(time).and_local_timezone(Local) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        // DST gap: shift past the missing hour
        LocalResult::None => (date.and_time(time) + TimeDelta::hours(1))
            .and_local_timezone(Local)
            .earliest()
            .unwrap_or_else(Local::now),
    }
}
