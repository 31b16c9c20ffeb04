//! Calendar month buckets (`YYYYMM`) for monthly aggregates.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors building a bucket from a raw integer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MonthBucketError {
    #[error("month bucket {0} is not in YYYYMM form")]
    Malformed(i64),
}

/// An integer calendar-month identifier, e.g. `202510` for October 2025.
///
/// Buckets are derived from UTC timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct MonthBucket {
    year: i32,
    month: u32,
}

impl MonthBucket {
    /// Bucket containing `timestamp`.
    pub fn of(timestamp: DateTime<Utc>) -> Self {
        Self {
            year: timestamp.year(),
            month: timestamp.month(),
        }
    }

    /// Bucket for one calendar month before the one containing `now`.
    pub fn previous_of(now: DateTime<Utc>) -> Self {
        Self::of(now).previous()
    }

    pub const fn previous(self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub const fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// True when `timestamp` falls inside this bucket.
    pub fn matches(self, timestamp: DateTime<Utc>) -> bool {
        self == Self::of(timestamp)
    }

    /// Half-open `[start, end)` UTC range covered by this bucket.
    pub fn range(self) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.first_instant(), self.next().first_instant())
    }

    pub const fn year(self) -> i32 {
        self.year
    }

    pub const fn month(self) -> u32 {
        self.month
    }

    /// The `YYYYMM` integer form.
    pub fn id(self) -> i64 {
        i64::from(self.year) * 100 + i64::from(self.month)
    }

    fn first_instant(self) -> DateTime<Utc> {
        // month is kept in 1..=12, so the fallback is unreachable
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map_or(DateTime::<Utc>::MIN_UTC, |naive| Utc.from_utc_datetime(&naive))
    }
}

impl TryFrom<i64> for MonthBucket {
    type Error = MonthBucketError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        let month = value % 100;
        let year = value / 100;
        if !(1..=12).contains(&month) || !(1..=9999).contains(&year) {
            return Err(MonthBucketError::Malformed(value));
        }
        Ok(Self {
            year: i32::try_from(year).map_err(|_| MonthBucketError::Malformed(value))?,
            month: u32::try_from(month).map_err(|_| MonthBucketError::Malformed(value))?,
        })
    }
}

impl From<MonthBucket> for i64 {
    fn from(bucket: MonthBucket) -> Self {
        bucket.id()
    }
}

impl fmt::Display for MonthBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:02}", self.year, self.month)
    }
}
