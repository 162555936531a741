use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Unit {
    Days,
    Hours,
    Minutes,
    Points,
    Dollars,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Days => "days",
            Unit::Hours => "hours",
            Unit::Minutes => "minutes",
            Unit::Points => "points",
            Unit::Dollars => "dollars",
        }
    }
}

impl FromStr for Unit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "days" => Ok(Unit::Days),
            "hours" => Ok(Unit::Hours),
            "minutes" => Ok(Unit::Minutes),
            "points" => Ok(Unit::Points),
            "dollars" => Ok(Unit::Dollars),
            other => Err(format!("unknown unit {other}")),
        }
    }
}

impl From<Unit> for String {
    fn from(unit: Unit) -> Self {
        unit.as_str().to_string()
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A quantity of one resource unit. Arithmetic is closed within a unit;
/// combining amounts of different units is a programming error and panics.
/// Values may be negative (debt), zero, or positive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Amount {
    pub value: Decimal,
    pub unit: Unit,
}

impl Amount {
    pub fn new(value: Decimal, unit: Unit) -> Self {
        Self { value, unit }
    }

    pub fn zero(unit: Unit) -> Self {
        Self {
            value: Decimal::ZERO,
            unit,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.value.is_sign_negative() && !self.value.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.value.is_sign_positive() && !self.value.is_zero()
    }

    pub fn add(&self, other: &Amount) -> Amount {
        self.assert_same_unit(other, "add");
        Amount::new(self.value + other.value, self.unit)
    }

    pub fn sub(&self, other: &Amount) -> Amount {
        self.assert_same_unit(other, "sub");
        Amount::new(self.value - other.value, self.unit)
    }

    pub fn neg(&self) -> Amount {
        Amount::new(-self.value, self.unit)
    }

    pub fn abs(&self) -> Amount {
        Amount::new(self.value.abs(), self.unit)
    }

    pub fn min(&self, other: &Amount) -> Amount {
        self.assert_same_unit(other, "min");
        Amount::new(self.value.min(other.value), self.unit)
    }

    pub fn max(&self, other: &Amount) -> Amount {
        self.assert_same_unit(other, "max");
        Amount::new(self.value.max(other.value), self.unit)
    }

    /// Panics when units differ. Callers that accept amounts across an API
    /// boundary must validate units first (`EngineError::UnitMismatch`);
    /// inside the engine a mismatch is a bug, not a runtime condition.
    fn assert_same_unit(&self, other: &Amount, op: &str) {
        assert_eq!(
            self.unit, other.unit,
            "amount {op} across units: {} vs {}",
            self.unit, other.unit
        );
    }
}

impl PartialOrd for Amount {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        if self.unit != other.unit {
            return None;
        }
        self.value.partial_cmp(&other.value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}
