use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::services::errors::EngineError;

use super::time::TimePoint;

/// An inclusive interval of days over which a balance is computed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, EngineError> {
        if end < start {
            return Err(EngineError::InvalidPeriod {
                reason: format!("period end {end} precedes start {start}"),
            });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn start_point(&self) -> TimePoint {
        TimePoint::day(self.start)
    }

    pub fn end_point(&self) -> TimePoint {
        TimePoint::day(self.end)
    }
}

/// How a policy carves the calendar into balance periods.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PeriodConfig {
    /// Jan 1 through Dec 31 of the year containing the query date.
    CalendarYear,
    /// Twelve months starting at `start_month`; dates before that month
    /// fall in the previous fiscal year.
    FiscalYear { start_month: u32 },
    /// Twelve months anchored on `anchor`'s month and day, rolling forward
    /// each year. Feb 29 anchors clamp to Feb 28 in non-leap years.
    Anniversary { anchor: NaiveDate },
    /// The twelve months ending at the query date.
    Rolling,
}

impl PeriodConfig {
    /// Resolves the period containing `date`.
    pub fn period_for(&self, date: NaiveDate) -> Result<Period, EngineError> {
        match self {
            PeriodConfig::CalendarYear => {
                let start = ymd(date.year(), 1, 1)?;
                let end = ymd(date.year(), 12, 31)?;
                Period::new(start, end)
            }
            PeriodConfig::FiscalYear { start_month } => {
                let month = *start_month;
                if !(1..=12).contains(&month) {
                    return Err(EngineError::InvalidPeriod {
                        reason: format!("fiscal start month {month} out of range"),
                    });
                }
                let start_year = if date.month() < month {
                    date.year() - 1
                } else {
                    date.year()
                };
                let start = ymd(start_year, month, 1)?;
                let end = add_months(start, 12)?
                    .pred_opt()
                    .ok_or_else(|| invalid("fiscal period end underflow"))?;
                Period::new(start, end)
            }
            PeriodConfig::Anniversary { anchor } => {
                // Walk in one-year strides from the anchor to the stride
                // containing the query date. Dates before the anchor land in
                // negative strides.
                let mut k = i64::from(date.year() - anchor.year());
                let mut start = add_months(*anchor, 12 * k)?;
                if start > date {
                    k -= 1;
                    start = add_months(*anchor, 12 * k)?;
                }
                let end = add_months(*anchor, 12 * (k + 1))?
                    .pred_opt()
                    .ok_or_else(|| invalid("anniversary period end underflow"))?;
                Period::new(start, end)
            }
            PeriodConfig::Rolling => {
                let start = sub_months(date, 12)?
                    .succ_opt()
                    .ok_or_else(|| invalid("rolling period start overflow"))?;
                Period::new(start, date)
            }
        }
    }
}

fn ymd(year: i32, month: u32, day: u32) -> Result<NaiveDate, EngineError> {
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| invalid(format!("invalid date {year}-{month:02}-{day:02}")))
}

fn add_months(date: NaiveDate, months: i64) -> Result<NaiveDate, EngineError> {
    let result = if months >= 0 {
        date.checked_add_months(Months::new(months as u32))
    } else {
        date.checked_sub_months(Months::new((-months) as u32))
    };
    result.ok_or_else(|| invalid(format!("date arithmetic overflow from {date}")))
}

fn sub_months(date: NaiveDate, months: u32) -> Result<NaiveDate, EngineError> {
    date.checked_sub_months(Months::new(months))
        .ok_or_else(|| invalid(format!("date arithmetic underflow from {date}")))
}

fn invalid(reason: impl Into<String>) -> EngineError {
    EngineError::InvalidPeriod {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn calendar_year_spans_january_through_december() {
        let period = PeriodConfig::CalendarYear
            .period_for(date(2025, 6, 15))
            .unwrap();
        assert_eq!(period.start, date(2025, 1, 1));
        assert_eq!(period.end, date(2025, 12, 31));
        assert_eq!(period.days(), 365);
    }

    #[test]
    fn fiscal_year_boundary_april_start() {
        let config = PeriodConfig::FiscalYear { start_month: 4 };

        let before = config.period_for(date(2025, 2, 15)).unwrap();
        assert_eq!(before.start, date(2024, 4, 1));
        assert_eq!(before.end, date(2025, 3, 31));

        let after = config.period_for(date(2025, 7, 15)).unwrap();
        assert_eq!(after.start, date(2025, 4, 1));
        assert_eq!(after.end, date(2026, 3, 31));
    }

    #[test]
    fn fiscal_year_rejects_month_out_of_range() {
        let config = PeriodConfig::FiscalYear { start_month: 13 };
        assert!(config.period_for(date(2025, 1, 1)).is_err());
    }

    #[test]
    fn anniversary_rolls_forward_each_year() {
        let config = PeriodConfig::Anniversary {
            anchor: date(2020, 6, 15),
        };

        let period = config.period_for(date(2025, 6, 14)).unwrap();
        assert_eq!(period.start, date(2024, 6, 15));
        assert_eq!(period.end, date(2025, 6, 14));

        let period = config.period_for(date(2025, 6, 15)).unwrap();
        assert_eq!(period.start, date(2025, 6, 15));
        assert_eq!(period.end, date(2026, 6, 14));
    }

    #[test]
    fn anniversary_before_anchor_lands_in_negative_stride() {
        let config = PeriodConfig::Anniversary {
            anchor: date(2025, 6, 15),
        };
        let period = config.period_for(date(2024, 1, 1)).unwrap();
        assert_eq!(period.start, date(2023, 6, 15));
        assert_eq!(period.end, date(2024, 6, 14));
        assert!(period.contains(date(2024, 1, 1)));
    }

    #[test]
    fn anniversary_leap_day_anchor_clamps() {
        let config = PeriodConfig::Anniversary {
            anchor: date(2020, 2, 29),
        };
        let period = config.period_for(date(2021, 3, 1)).unwrap();
        assert_eq!(period.start, date(2021, 2, 28));
        assert_eq!(period.end, date(2022, 2, 27));
    }

    #[test]
    fn rolling_window_ends_at_query_date() {
        let period = PeriodConfig::Rolling.period_for(date(2025, 7, 15)).unwrap();
        assert_eq!(period.start, date(2024, 7, 16));
        assert_eq!(period.end, date(2025, 7, 15));
    }

    #[test]
    fn every_config_contains_its_query_date() {
        let configs = [
            PeriodConfig::CalendarYear,
            PeriodConfig::FiscalYear { start_month: 10 },
            PeriodConfig::Anniversary {
                anchor: date(2019, 11, 3),
            },
            PeriodConfig::Rolling,
        ];
        let probes = [
            date(2024, 1, 1),
            date(2024, 2, 29),
            date(2025, 9, 30),
            date(2025, 10, 1),
            date(2025, 12, 31),
        ];
        for config in &configs {
            for probe in probes {
                let period = config.period_for(probe).unwrap();
                assert!(
                    period.contains(probe),
                    "{config:?} period {period:?} does not contain {probe}"
                );
            }
        }
    }
}
