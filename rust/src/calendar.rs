//! Per-project working calendar: working weekdays, excluded dates and a timezone.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use rustc_hash::FxHashSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalendarError {
    #[error("Calendar must have at least one working weekday")]
    NoWorkingDays,
    #[error("Working days per week must be between 1 and 7 (got {0})")]
    WorkingDaysOutOfRange(u8),
    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),
    #[error("Moving {working_days} working days from {start} leaves the supported date range")]
    OutOfRange {
        start: DateTime<Utc>,
        working_days: i64,
    },
}

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Longest walk, in calendar days, a single working-day addition may take (about 1000 years).
const MAX_STEP_DAYS: u64 = 366 * 1000;

/// Converts calendar-day offsets into working-day offsets.
///
/// An instant is mapped to its local date in `timezone` before the weekday
/// and exclusion checks, so the mapping follows daylight-saving changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkingCalendar {
    /// Indexed by days from Monday.
    working_weekdays: [bool; 7],
    excluded_dates: FxHashSet<NaiveDate>,
    timezone: Tz,
}

impl Default for WorkingCalendar {
    /// Monday through Friday, UTC, no exclusions.
    fn default() -> Self {
        Self {
            working_weekdays: [true, true, true, true, true, false, false],
            excluded_dates: FxHashSet::default(),
            timezone: Tz::UTC,
        }
    }
}

impl WorkingCalendar {
    pub fn new(working_weekdays: &[Weekday], timezone: Tz) -> Result<Self, CalendarError> {
        let mut days = [false; 7];
        for weekday in working_weekdays {
            days[weekday.num_days_from_monday() as usize] = true;
        }
        if !days.contains(&true) {
            return Err(CalendarError::NoWorkingDays);
        }
        Ok(Self {
            working_weekdays: days,
            excluded_dates: FxHashSet::default(),
            timezone,
        })
    }

    /// Like `new`, with an IANA timezone name such as "Europe/Berlin".
    pub fn with_timezone_name(working_weekdays: &[Weekday], name: &str) -> Result<Self, CalendarError> {
        let timezone: Tz = name
            .parse()
            .map_err(|_| CalendarError::UnknownTimezone(name.to_string()))?;
        Self::new(working_weekdays, timezone)
    }

    /// The first `days_per_week` weekdays starting Monday, in UTC.
    pub fn monday_based(days_per_week: u8) -> Result<Self, CalendarError> {
        if !(1..=7).contains(&days_per_week) {
            return Err(CalendarError::WorkingDaysOutOfRange(days_per_week));
        }
        Self::new(&WEEK[..days_per_week as usize], Tz::UTC)
    }

    pub fn with_excluded_dates(mut self, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.excluded_dates.extend(dates);
        self
    }

    pub fn add_excluded_date(&mut self, date: NaiveDate) {
        self.excluded_dates.insert(date);
    }

    pub fn remove_excluded_date(&mut self, date: NaiveDate) -> bool {
        self.excluded_dates.remove(&date)
    }

    pub fn excluded_dates(&self) -> &FxHashSet<NaiveDate> {
        &self.excluded_dates
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn working_weekdays(&self) -> Vec<Weekday> {
        WEEK.iter()
            .copied()
            .filter(|day| self.working_weekdays[day.num_days_from_monday() as usize])
            .collect()
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.timezone).date_naive()
    }

    pub fn is_working_date(&self, date: NaiveDate) -> bool {
        self.working_weekdays[date.weekday().num_days_from_monday() as usize]
            && !self.excluded_dates.contains(&date)
    }

    pub fn is_working_day(&self, instant: DateTime<Utc>) -> bool {
        self.is_working_date(self.local_date(instant))
    }

    /// Step one calendar day at a time, counting only days that land on a working day.
    ///
    /// Negative `working_days` walks backward. The time of day is preserved.
    /// Fails when the walk would leave chrono's date range or exceed about 1000 years.
    pub fn add_working_days(
        &self,
        start: DateTime<Utc>,
        working_days: i64,
    ) -> Result<DateTime<Utc>, CalendarError> {
        let out_of_range = || CalendarError::OutOfRange {
            start,
            working_days,
        };
        let step = if working_days >= 0 {
            Duration::days(1)
        } else {
            Duration::days(-1)
        };
        let target = working_days.unsigned_abs();
        let mut current = start;
        let mut counted = 0;
        let mut stepped = 0;
        while counted < target {
            stepped += 1;
            if stepped > MAX_STEP_DAYS {
                return Err(out_of_range());
            }
            current = current.checked_add_signed(step).ok_or_else(out_of_range)?;
            if self.is_working_day(current) {
                counted += 1;
            }
        }
        Ok(current)
    }

    /// Signed number of working days stepped over going from `from` to `to`.
    ///
    /// Inverse of `add_working_days` when both instants share a time of day.
    pub fn working_days_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
        if to < from {
            return -self.working_days_between(to, from);
        }
        let step = Duration::days(1);
        let mut count = 0;
        let mut current = from;
        while let Some(next) = current.checked_add_signed(step) {
            if next > to {
                break;
            }
            if self.is_working_day(next) {
                count += 1;
            }
            current = next;
        }
        count
    }
}
