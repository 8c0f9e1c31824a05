//! # Business Day
//!
//! A corte covers one business day of one location. The day is a half-open
//! UTC window `[local midnight, next local midnight)` computed in the
//! store's fixed UTC offset, so the result never depends on the server's
//! own timezone.
//!
//! ```text
//!  offset -06:00, as_of = 2024-03-10T03:30Z (local 2024-03-09 21:30)
//!
//!  2024-03-09T06:00Z ─────────────────────────────► 2024-03-10T06:00Z
//!  start (inclusive)                                end (exclusive)
//! ```

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// One business day expressed as a UTC window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessDay {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BusinessDay {
    /// The business day that contains `instant`.
    pub fn containing(instant: DateTime<Utc>, offset: FixedOffset) -> Self {
        let date = instant.with_timezone(&offset).date_naive();
        Self::for_date(date, offset)
    }

    /// The window of a given local date.
    pub fn for_date(date: NaiveDate, offset: FixedOffset) -> Self {
        let local_midnight = date.and_time(NaiveTime::default());
        let start = Utc.from_utc_datetime(
            &(local_midnight - Duration::seconds(i64::from(offset.local_minus_utc()))),
        );
        BusinessDay {
            date,
            start,
            end: start + Duration::days(1),
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// Builds the business offset from minutes east of UTC.
pub fn offset_from_minutes(minutes: i32) -> Result<FixedOffset, ValidationError> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| ValidationError::OutOfRange {
            field: "utc_offset_minutes".to_string(),
            min: -24 * 60 + 1,
            max: 24 * 60 - 1,
        })
}
