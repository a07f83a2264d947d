//! Simplified five-field cron expressions.
//!
//! Only three shapes get an exact next-run computation:
//!
//! | Shape | Next run |
//! |-------|----------|
//! | `M * * * *` | next `:M`, rolling to the next hour when passed |
//! | `M H * * D` | next weekday `D` at `H:M`, rolling a full week when passed or now |
//! | `M H * * *` | next `H:M`, rolling to the next day when passed |
//!
//! Every other expression (steps, lists, ranges, fixed day-of-month or
//! month, `* * * * *`, …) falls back to *one hour after the reference time*.
//! This is not a general cron implementation.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::time::Timestamp;

/// Reasons a schedule cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CronError {
    #[error("expected 5 cron fields, got {0}")]
    FieldCount(usize),

    #[error("invalid {field} field {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("{field} value {value} is outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("unknown timezone {0:?}")]
    UnknownTimezone(String),
}

/// One position of a cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CronField {
    /// `*`
    Any,
    /// A single number within the field's range.
    Value(u32),
    /// Steps, lists or ranges (`*/5`, `1,2`, `1-5`). Accepted but never computed exactly.
    Complex(String),
}

impl CronField {
    fn parse(raw: &str, field: &'static str, min: u32, max: u32) -> Result<Self, CronError> {
        if raw == "*" {
            return Ok(Self::Any);
        }
        if raw.bytes().all(|b| b.is_ascii_digit()) {
            let value: u32 = raw.parse().map_err(|_| CronError::InvalidField {
                field,
                value: raw.to_string(),
            })?;
            if value < min || value > max {
                return Err(CronError::OutOfRange {
                    field,
                    value,
                    min,
                    max,
                });
            }
            return Ok(Self::Value(value));
        }
        if raw.bytes().all(|b| b.is_ascii_digit() || b"*/,-".contains(&b)) {
            return Ok(Self::Complex(raw.to_string()));
        }
        Err(CronError::InvalidField {
            field,
            value: raw.to_string(),
        })
    }
}

/// A parsed `minute hour day-of-month month day-of-week` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpression {
    pub minute: CronField,
    pub hour: CronField,
    pub day_of_month: CronField,
    pub month: CronField,
    /// `0` and `7` are both Sunday.
    pub day_of_week: CronField,
    source: String,
}

impl FromStr for CronExpression {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        let [minute, hour, day_of_month, month, day_of_week] = parts.as_slice() else {
            return Err(CronError::FieldCount(parts.len()));
        };
        Ok(Self {
            minute: CronField::parse(minute, "minute", 0, 59)?,
            hour: CronField::parse(hour, "hour", 0, 23)?,
            day_of_month: CronField::parse(day_of_month, "day-of-month", 1, 31)?,
            month: CronField::parse(month, "month", 1, 12)?,
            day_of_week: CronField::parse(day_of_week, "day-of-week", 0, 7)?,
            source: parts.join(" "),
        })
    }
}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl CronExpression {
    /// Human-readable rendering of the common patterns.
    #[must_use]
    pub fn describe(&self) -> String {
        use CronField::{Any, Value};

        match (
            &self.minute,
            &self.hour,
            &self.day_of_month,
            &self.month,
            &self.day_of_week,
        ) {
            (Any, Any, Any, Any, Any) => "every minute".to_string(),
            (Value(0), Any, Any, Any, Any) => "every hour".to_string(),
            (Value(0), Value(0), Value(1), Any, Any) => {
                "monthly on the 1st at midnight".to_string()
            }
            (Value(minute), Value(hour), Any, Any, Any) => {
                format!("daily at {hour:02}:{minute:02}")
            }
            (Value(minute), Value(hour), Any, Any, Value(day)) => {
                format!("weekly on {} at {hour:02}:{minute:02}", weekday_name(*day))
            }
            _ => format!("custom: {}", self.source),
        }
    }
}

/// Render any expression for display; unparsable input is shown as custom.
#[must_use]
pub fn describe(expression: &str) -> String {
    expression.parse::<CronExpression>().map_or_else(
        |_| format!("custom: {}", expression.trim()),
        |parsed| parsed.describe(),
    )
}

fn weekday_name(day: u32) -> &'static str {
    match day {
        1 => "Monday",
        2 => "Tuesday",
        3 => "Wednesday",
        4 => "Thursday",
        5 => "Friday",
        6 => "Saturday",
        _ => "Sunday",
    }
}

/// A validated expression bound to the timezone it is interpreted in.
///
/// Building a `Schedule` is the only fallible step; computing run times
/// afterwards cannot fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    expression: CronExpression,
    timezone: Tz,
}

impl Schedule {
    /// Parse `cron` and resolve `timezone` (an IANA name; empty means UTC).
    ///
    /// # Errors
    ///
    /// Returns [`CronError`] for a malformed expression or unknown timezone.
    pub fn new(cron: &str, timezone: &str) -> Result<Self, CronError> {
        let expression = cron.parse()?;
        let timezone = if timezone.trim().is_empty() {
            Tz::UTC
        } else {
            timezone
                .trim()
                .parse::<Tz>()
                .map_err(|_| CronError::UnknownTimezone(timezone.to_string()))?
        };
        Ok(Self {
            expression,
            timezone,
        })
    }

    #[must_use]
    pub fn expression(&self) -> &CronExpression {
        &self.expression
    }

    #[must_use]
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    #[must_use]
    pub fn describe(&self) -> String {
        self.expression.describe()
    }

    /// Next run strictly after `after`.
    #[must_use]
    pub fn next_after(&self, after: Timestamp) -> Timestamp {
        use CronField::{Any, Value};

        let local = after.with_timezone(&self.timezone).naive_local();
        let e = &self.expression;
        match (&e.minute, &e.hour, &e.day_of_month, &e.day_of_week) {
            (Value(minute), Any, _, _) => {
                let candidate = at(local.date(), local.hour(), *minute);
                self.first_after(after, candidate, Duration::hours(1))
            }
            (Value(minute), Value(hour), _, Value(day)) => {
                let target = day % 7;
                let current = local.weekday().num_days_from_sunday();
                let ahead = (target + 7 - current) % 7;
                let date = local.date() + Duration::days(i64::from(ahead));
                self.first_after(after, at(date, *hour, *minute), Duration::weeks(1))
            }
            (Value(minute), Value(hour), Any, Any) => {
                self.first_after(after, at(local.date(), *hour, *minute), Duration::days(1))
            }
            _ => after + Duration::hours(1),
        }
    }

    /// The next `count` run times starting at `from` (inclusive), each
    /// strictly later than the one before.
    #[must_use]
    pub fn upcoming(&self, from: Timestamp, count: usize) -> Vec<Timestamp> {
        let mut runs = Vec::with_capacity(count);
        let mut current = from;
        for _ in 0..count {
            runs.push(current);
            let mut next = self.next_after(current);
            if next <= current {
                next = current + Duration::minutes(1);
            }
            current = next;
        }
        runs
    }

    fn first_after(&self, after: Timestamp, candidate: NaiveDateTime, step: Duration) -> Timestamp {
        let first = self.to_utc(candidate);
        if first <= after {
            self.to_utc(candidate + step)
        } else {
            first
        }
    }

    fn to_utc(&self, local: NaiveDateTime) -> Timestamp {
        if let Some(dt) = self.timezone.from_local_datetime(&local).earliest() {
            return dt.with_timezone(&Utc);
        }
        // Wall-clock time skipped by a DST jump.
        self.timezone
            .from_local_datetime(&(local + Duration::hours(1)))
            .earliest()
            .map_or_else(
                || Utc.from_utc_datetime(&local),
                |dt| dt.with_timezone(&Utc),
            )
    }
}

fn at(date: NaiveDate, hour: u32, minute: u32) -> NaiveDateTime {
    date.and_time(NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN))
}
