use std::fmt;

use chrono::{DateTime, NaiveTime, TimeDelta, TimeZone, Utc};

/// How far back a backfill starts. SLOs run on 28 day rolling windows.
pub const BACKFILL_LOOKBACK_DAYS: i64 = 28;

pub const HOURS_PER_DAY: u32 = 24;

/// Half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(start <= end, "window start must not be after its end");
        Self { start, end }
    }

    /// The window of length `length` ending at `end`.
    pub fn trailing(end: DateTime<Utc>, length: TimeDelta) -> Self {
        Self::new(end - length, end)
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    /// Whether a unix timestamp (seconds) falls inside the window.
    pub fn contains_timestamp(&self, timestamp: i64) -> bool {
        self.start.timestamp() <= timestamp && timestamp < self.end.timestamp()
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Start of the backfill: `now` minus the look-back, truncated to UTC midnight.
pub fn backfill_origin(now: DateTime<Utc>) -> DateTime<Utc> {
    let day = (now - TimeDelta::days(BACKFILL_LOOKBACK_DAYS)).date_naive();
    Utc.from_utc_datetime(&day.and_time(NaiveTime::default()))
}

/// Splits `days` days starting at `origin` into contiguous one-hour windows.
pub fn hourly_slices(origin: DateTime<Utc>, days: u32) -> HourlySlices {
    HourlySlices {
        day_start: origin,
        days_left: days,
        hour: 0,
    }
}

/// Iterator over the hourly backfill slices, day by day.
///
/// The day start is advanced as an accumulator after each 24-hour run, so the
/// slices tile the backfill span with no gaps and no overlaps.
#[derive(Debug, Clone)]
pub struct HourlySlices {
    day_start: DateTime<Utc>,
    days_left: u32,
    hour: u32,
}

impl Iterator for HourlySlices {
    type Item = TimeWindow;

    fn next(&mut self) -> Option<Self::Item> {
        if self.days_left == 0 {
            return None;
        }

        let from = self.day_start + TimeDelta::hours(i64::from(self.hour));
        let to = from + TimeDelta::hours(1);

        self.hour += 1;
        if self.hour == HOURS_PER_DAY {
            self.hour = 0;
            self.days_left -= 1;
            self.day_start += TimeDelta::days(1);
        }

        Some(TimeWindow::new(from, to))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.days_left as usize * HOURS_PER_DAY as usize)
            .saturating_sub(self.hour as usize);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for HourlySlices {}
