use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minutes of class time per credit.
pub const MINUTES_PER_CREDIT: i64 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OfferingId(String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(StudentId);
string_id!(OfferingId);

/// An offering joined with the course it schedules.
///
/// Fields are kept as loosely typed as the underlying rows so corrupt data
/// reaches the validator instead of failing somewhere in between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferingDetails {
    pub offering_id: OfferingId,
    pub capacity: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub credit_load: i64,
}

/// One of a student's existing enrollments with the schedule of its offering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEnrollment {
    pub offering_id: OfferingId,
    pub start_time: Option<DateTime<Utc>>,
    pub credit_load: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: u64,
    pub student_id: StudentId,
    pub offering_id: OfferingId,
    pub enrolled_at: DateTime<Utc>,
}

/// Half-open class interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeSlot {
    /// Builds the slot an offering occupies: `credit_load * 50` minutes from
    /// `start`. Returns `None` when the credit load is not positive or the
    /// end falls outside the representable range.
    pub fn from_credits(start: DateTime<Utc>, credit_load: i64) -> Option<Self> {
        if credit_load <= 0 {
            return None;
        }
        let minutes = credit_load.checked_mul(MINUTES_PER_CREDIT)?;
        let end = start.checked_add_signed(TimeDelta::try_minutes(minutes)?)?;
        Some(Self { start, end })
    }

    /// `[s1,e1)` and `[s2,e2)` overlap iff `s1 < e2 && s2 < e1`.
    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} - {})",
            self.start.format("%Y-%m-%d %H:%M"),
            self.end.format("%Y-%m-%d %H:%M")
        )
    }
}
