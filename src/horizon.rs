//! Horizon resolution
//!
//! A horizon is a named, pre-defined time range selector resolved relative
//! to the current date. Resolution is a pure function from
//! `(horizon, today)` to an ordered list of bucket tokens plus a
//! granularity flag; no store access is involved.
//!
//! Unknown horizon names are rejected at parse time
//! ([`Horizon::from_str`]), so `resolve` itself is total: a valid horizon
//! that happens to bound no buckets (e.g. `All` with an inception month in
//! the future) returns an empty token list, which is a different state
//! from "unknown horizon" and is never conflated with it.

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::QueryError;
use crate::types::Granularity;

/// Inception month of the record namespace, used as the lower bound of the
/// `All` horizon when none is configured.
pub const DEFAULT_INCEPTION_MONTH: YearMonth = YearMonth {
    year: 2022,
    month: 10,
};

/// A named time range selector
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Horizon {
    /// Inception month through the current month, monthly buckets
    All,
    /// January of the current year through the current month (year to date)
    OneYear,
    /// The six months ending at the current month
    SixMonths,
    /// Every calendar day of the current month
    OneMonth,
    /// The seven days ending today
    OneWeek,
}

impl Horizon {
    /// Display label, as shown to users
    pub fn label(&self) -> &'static str {
        match self {
            Horizon::All => "All",
            Horizon::OneYear => "1 Year",
            Horizon::SixMonths => "6 Months",
            Horizon::OneMonth => "1 Month",
            Horizon::OneWeek => "1 Week",
        }
    }

    /// Short tag, used in export file names
    pub fn tag(&self) -> &'static str {
        match self {
            Horizon::All => "all",
            Horizon::OneYear => "1yr",
            Horizon::SixMonths => "6mo",
            Horizon::OneMonth => "1mo",
            Horizon::OneWeek => "1w",
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Horizon {
    type Err = QueryError;

    /// Accepts the display label or the short tag.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "All" | "all" => Ok(Horizon::All),
            "1 Year" | "1yr" => Ok(Horizon::OneYear),
            "6 Months" | "6mo" => Ok(Horizon::SixMonths),
            "1 Month" | "1mo" => Ok(Horizon::OneMonth),
            "1 Week" | "1w" => Ok(Horizon::OneWeek),
            other => Err(QueryError::UnknownHorizon(other.to_string())),
        }
    }
}

/// A calendar month, used for month-token arithmetic.
///
/// Month walking always steps exactly one calendar month at a time,
/// wrapping December into January of the next year. No fixed 28-31 day
/// blocks are ever assumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct YearMonth {
    /// Calendar year
    pub year: i32,
    /// Calendar month, 1-12
    pub month: u32,
}

impl YearMonth {
    /// The month containing `date`
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Parse a `YYYYMM` token
    pub fn parse(token: &str) -> Option<Self> {
        if token.len() != 6 || !token.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let year = token[..4].parse().ok()?;
        let month = token[4..].parse().ok()?;
        if !(1..=12).contains(&month) {
            return None;
        }
        Some(Self { year, month })
    }

    /// The bucket token for this month
    pub fn token(&self) -> String {
        format!("{:04}{:02}", self.year, self.month)
    }

    /// The following calendar month
    pub fn succ(&self) -> Self {
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

    /// The preceding calendar month
    pub fn pred(&self) -> Self {
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
}

/// The resolved bucket set of a horizon
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HorizonBuckets {
    /// Ordered bucket tokens, oldest first, contiguous, no duplicates.
    /// May be empty for a valid horizon with no applicable buckets.
    pub tokens: Vec<String>,
    /// Bucket width the tokens were generated at
    pub granularity: Granularity,
}

/// Resolves horizons into bucket token lists
#[derive(Clone, Copy, Debug)]
pub struct HorizonResolver {
    inception: YearMonth,
}

impl Default for HorizonResolver {
    fn default() -> Self {
        Self {
            inception: DEFAULT_INCEPTION_MONTH,
        }
    }
}

impl HorizonResolver {
    /// Create a resolver with a custom inception month for `All`
    pub fn new(inception: YearMonth) -> Self {
        Self { inception }
    }

    /// Resolve a horizon relative to `today`.
    ///
    /// Pure and total: every known horizon resolves deterministically, and
    /// an empty token list is a valid result, not an error.
    pub fn resolve(&self, horizon: Horizon, today: NaiveDate) -> HorizonBuckets {
        let current = YearMonth::of(today);
        match horizon {
            Horizon::All => monthly(months_between(self.inception, current)),
            Horizon::OneYear => {
                let january = YearMonth {
                    year: today.year(),
                    month: 1,
                };
                monthly(months_between(january, current))
            }
            Horizon::SixMonths => {
                let mut start = current;
                for _ in 0..5 {
                    start = start.pred();
                }
                monthly(months_between(start, current))
            }
            Horizon::OneMonth => {
                let mut tokens = Vec::new();
                for day in 1..=31 {
                    if let Some(date) = NaiveDate::from_ymd_opt(today.year(), today.month(), day) {
                        tokens.push(date.format("%Y%m%d").to_string());
                    }
                }
                HorizonBuckets {
                    tokens,
                    granularity: Granularity::Daily,
                }
            }
            Horizon::OneWeek => {
                let tokens = (0..7)
                    .rev()
                    .filter_map(|back| today.checked_sub_days(Days::new(back)))
                    .map(|date| date.format("%Y%m%d").to_string())
                    .collect();
                HorizonBuckets {
                    tokens,
                    granularity: Granularity::Daily,
                }
            }
        }
    }
}

fn monthly(tokens: Vec<String>) -> HorizonBuckets {
    HorizonBuckets {
        tokens,
        granularity: Granularity::Monthly,
    }
}

/// All month tokens from `start` through `end`, inclusive, ascending.
/// Empty when `start` is after `end`.
fn months_between(start: YearMonth, end: YearMonth) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = start;
    while current <= end {
        tokens.push(current.token());
        current = current.succ();
    }
    tokens
}
