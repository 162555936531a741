use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::amount::{Amount, Unit};
use super::time::TimePoint;

/// A single scheduled or observed balance increase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccrualEvent {
    pub at: TimePoint,
    pub amount: Amount,
    pub reason: String,
}

/// Capability describing how a balance grows over time.
///
/// Deterministic schedules know their future events a priori (fixed monthly
/// grants, upfront grants). Non-deterministic schedules depend on external
/// inputs; their future events cannot be generated, and the balance
/// calculator falls back to actually recorded grants for entitlement.
pub trait AccrualSchedule: Send + Sync {
    /// Events falling within the inclusive `[from, to]` day range.
    fn generate_accruals(&self, from: NaiveDate, to: NaiveDate) -> Vec<AccrualEvent>;

    fn is_deterministic(&self) -> bool;
}

/// Sum of event amounts in `unit`. Events in another unit indicate a
/// misconfigured schedule and panic via `Amount` arithmetic.
pub fn sum_events(events: &[AccrualEvent], unit: Unit) -> Amount {
    events
        .iter()
        .fold(Amount::zero(unit), |acc, event| acc.add(&event.amount))
}

/// Fixed grant on the first of each month in range. With proration enabled,
/// a range starting mid-month also gets a fractional grant at the range
/// start covering the remainder of that month.
#[derive(Debug, Clone)]
pub struct MonthlyAccrual {
    per_month: Amount,
    prorate_partial: bool,
}

impl MonthlyAccrual {
    pub fn new(per_month: Amount, prorate_partial: bool) -> Self {
        Self {
            per_month,
            prorate_partial,
        }
    }

    /// Convenience for policies expressed as an annual figure.
    pub fn annual(total: Amount, prorate_partial: bool) -> Self {
        Self {
            per_month: Amount::new(total.value / Decimal::from(12), total.unit),
            prorate_partial,
        }
    }
}

impl AccrualSchedule for MonthlyAccrual {
    fn generate_accruals(&self, from: NaiveDate, to: NaiveDate) -> Vec<AccrualEvent> {
        let mut events = Vec::new();
        if from > to {
            return events;
        }

        if self.prorate_partial && from.day() != 1 {
            if let Some(fraction) = remaining_month_fraction(from) {
                events.push(AccrualEvent {
                    at: TimePoint::day(from),
                    amount: Amount::new(self.per_month.value * fraction, self.per_month.unit),
                    reason: format!("prorated accrual for remainder of {}", from.format("%Y-%m")),
                });
            }
        }

        let mut cursor = if from.day() == 1 {
            Some(from)
        } else {
            first_of_next_month(from)
        };
        while let Some(first) = cursor {
            if first > to {
                break;
            }
            events.push(AccrualEvent {
                at: TimePoint::day(first),
                amount: self.per_month,
                reason: format!("monthly accrual for {}", first.format("%Y-%m")),
            });
            cursor = first_of_next_month(first);
        }
        events
    }

    fn is_deterministic(&self) -> bool {
        true
    }
}

/// The whole entitlement granted at the start of the range.
#[derive(Debug, Clone)]
pub struct UpfrontGrant {
    amount: Amount,
}

impl UpfrontGrant {
    pub fn new(amount: Amount) -> Self {
        Self { amount }
    }
}

impl AccrualSchedule for UpfrontGrant {
    fn generate_accruals(&self, from: NaiveDate, to: NaiveDate) -> Vec<AccrualEvent> {
        if from > to {
            return Vec::new();
        }
        vec![AccrualEvent {
            at: TimePoint::day(from),
            amount: self.amount,
            reason: "upfront grant".to_string(),
        }]
    }

    fn is_deterministic(&self) -> bool {
        true
    }
}

/// Accruals replayed from an externally supplied activity log (hours
/// worked, peer kudos). Only already-observed events exist; the schedule is
/// non-deterministic because future activity is unknown.
#[derive(Debug, Clone, Default)]
pub struct ActivityLog {
    events: Vec<AccrualEvent>,
}

impl ActivityLog {
    pub fn new(mut events: Vec<AccrualEvent>) -> Self {
        events.sort_by_key(|event| event.at);
        Self { events }
    }

    pub fn record(&mut self, event: AccrualEvent) {
        self.events.push(event);
        self.events.sort_by_key(|event| event.at);
    }
}

impl AccrualSchedule for ActivityLog {
    fn generate_accruals(&self, from: NaiveDate, to: NaiveDate) -> Vec<AccrualEvent> {
        self.events
            .iter()
            .filter(|event| {
                let date = event.at.date();
                date >= from && date <= to
            })
            .cloned()
            .collect()
    }

    fn is_deterministic(&self) -> bool {
        false
    }
}

/// Merges several schedules into one stream, ordered by event time.
/// Deterministic only when every part is.
pub struct CompositeSchedule {
    parts: Vec<Box<dyn AccrualSchedule>>,
}

impl CompositeSchedule {
    pub fn new(parts: Vec<Box<dyn AccrualSchedule>>) -> Self {
        Self { parts }
    }
}

impl AccrualSchedule for CompositeSchedule {
    fn generate_accruals(&self, from: NaiveDate, to: NaiveDate) -> Vec<AccrualEvent> {
        let mut events: Vec<AccrualEvent> = self
            .parts
            .iter()
            .flat_map(|part| part.generate_accruals(from, to))
            .collect();
        events.sort_by_key(|event| event.at);
        events
    }

    fn is_deterministic(&self) -> bool {
        self.parts.iter().all(|part| part.is_deterministic())
    }
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
        .and_then(|first| first.checked_add_months(Months::new(1)))
}

fn remaining_month_fraction(date: NaiveDate) -> Option<Decimal> {
    let next = first_of_next_month(date)?;
    let month_start = NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?;
    let days_in_month = (next - month_start).num_days();
    let days_remaining = (next - date).num_days();
    Some(Decimal::from(days_remaining) / Decimal::from(days_in_month))
}
