use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Granularity {
    Day,
    Hour,
    Minute,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Hour => "hour",
            Granularity::Minute => "minute",
        }
    }

    /// The coarser of two granularities. `Day` is coarser than `Hour`,
    /// which is coarser than `Minute`.
    pub fn coarser(self, other: Granularity) -> Granularity {
        self.min(other)
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "day" => Ok(Granularity::Day),
            "hour" => Ok(Granularity::Hour),
            "minute" => Ok(Granularity::Minute),
            other => Err(format!("unknown granularity {other}")),
        }
    }
}

impl From<Granularity> for String {
    fn from(granularity: Granularity) -> Self {
        granularity.as_str().to_string()
    }
}

/// A calendar instant carrying its own precision. The stored instant is
/// always truncated to the granularity, so two `TimePoint`s with the same
/// granularity compare by plain instant order.
///
/// Day granularity is canonical for time-off resources; hour granularity
/// serves shift work.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimePoint {
    at: NaiveDateTime,
    granularity: Granularity,
}

impl TimePoint {
    pub fn new(at: NaiveDateTime, granularity: Granularity) -> Self {
        Self {
            at: truncate(at, granularity),
            granularity,
        }
    }

    pub fn day(date: NaiveDate) -> Self {
        Self::new(date.and_time(NaiveTime::MIN), Granularity::Day)
    }

    pub fn hour(at: NaiveDateTime) -> Self {
        Self::new(at, Granularity::Hour)
    }

    pub fn minute(at: NaiveDateTime) -> Self {
        Self::new(at, Granularity::Minute)
    }

    pub fn instant(&self) -> NaiveDateTime {
        self.at
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn date(&self) -> NaiveDate {
        self.at.date()
    }

    /// Equality after truncating both points to the coarser of the two
    /// granularities. This is deliberately not `PartialEq`: it is not
    /// transitive across granularities (two distinct hours coincide with
    /// the same day), so the derived instant-order `Eq`/`Ord` stay lawful
    /// and this comparison is an explicit operation.
    pub fn coincides_with(&self, other: &TimePoint) -> bool {
        let coarse = self.granularity.coarser(other.granularity);
        truncate(self.at, coarse) == truncate(other.at, coarse)
    }

    /// Exclusive upper edge of this point's granularity window. A day point
    /// covers the whole day; an hour point covers the hour. Range queries
    /// treat a `to` bound as inclusive of its entire window.
    pub fn window_end(&self) -> NaiveDateTime {
        let step = match self.granularity {
            Granularity::Day => chrono::Duration::days(1),
            Granularity::Hour => chrono::Duration::hours(1),
            Granularity::Minute => chrono::Duration::minutes(1),
        };
        self.at.checked_add_signed(step).unwrap_or(NaiveDateTime::MAX)
    }

    /// Whether this point falls within `[from, to]`, where `from` is read
    /// as the start instant of its window and `to` covers its whole window.
    pub fn in_range(&self, from: &TimePoint, to: &TimePoint) -> bool {
        self.at >= from.instant() && self.at < to.window_end()
    }
}

impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.granularity {
            Granularity::Day => write!(f, "{}", self.at.date()),
            Granularity::Hour => write!(f, "{}", self.at.format("%Y-%m-%dT%H:00")),
            Granularity::Minute => write!(f, "{}", self.at.format("%Y-%m-%dT%H:%M")),
        }
    }
}

fn truncate(at: NaiveDateTime, granularity: Granularity) -> NaiveDateTime {
    match granularity {
        Granularity::Day => at.date().and_time(NaiveTime::MIN),
        Granularity::Hour => at
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(at),
        Granularity::Minute => at
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(at),
    }
}
