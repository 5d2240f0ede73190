//! Week keys: the Monday (UTC) that anchors a rotation slot.
//!
//! Every scheduling operation is keyed by a [`WeekKey`]. Arbitrary dates are
//! normalized back to the Monday of their ISO week, and arithmetic happens in
//! whole weeks only.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use regex::Regex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::RotationError;

const WEEK_FORMAT: &str = "%Y-%m-%d";

fn re_week_input() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap())
}

/// Monday-anchored calendar week, rendered as `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WeekKey(NaiveDate);

impl WeekKey {
    /// The week containing `date`.
    pub fn containing(date: NaiveDate) -> Self {
        let days_from_monday = date.weekday().num_days_from_monday() as i64;
        WeekKey(date - Duration::days(days_from_monday))
    }

    /// The week containing the given instant, read as a UTC calendar date.
    pub fn of(instant: DateTime<Utc>) -> Self {
        Self::containing(instant.date_naive())
    }

    /// The current UTC week.
    pub fn current() -> Self {
        Self::of(Utc::now())
    }

    /// Parse user input. The value must be `YYYY-MM-DD`; any day of the week
    /// is accepted and normalized to its Monday.
    pub fn parse(input: &str) -> Result<Self, RotationError> {
        let trimmed = input.trim();
        if !re_week_input().is_match(trimmed) {
            return Err(RotationError::InvalidWeek(
                "Week must be in YYYY-MM-DD format".to_string(),
            ));
        }
        let date = NaiveDate::parse_from_str(trimmed, WEEK_FORMAT)
            .map_err(|_| RotationError::InvalidWeek(format!("Invalid date: {}", trimmed)))?;
        Ok(Self::containing(date))
    }

    /// Parse optional input, falling back to the current week when it is
    /// absent or blank.
    pub fn parse_or_current(input: Option<&str>) -> Result<Self, RotationError> {
        match input.map(str::trim) {
            Some(value) if !value.is_empty() => Self::parse(value),
            _ => Ok(Self::current()),
        }
    }

    pub fn offset(self, weeks: i64) -> Self {
        WeekKey(self.0 + Duration::weeks(weeks))
    }

    pub fn next(self) -> Self {
        self.offset(1)
    }

    pub fn previous(self) -> Self {
        self.offset(-1)
    }

    /// The Monday date itself.
    pub fn start_date(self) -> NaiveDate {
        self.0
    }

    /// Midnight UTC at the start of the week.
    pub fn start_instant(self) -> DateTime<Utc> {
        self.0.and_time(NaiveTime::MIN).and_utc()
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(WEEK_FORMAT))
    }
}

impl FromStr for WeekKey {
    type Err = RotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for WeekKey {
    type Error = RotationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<WeekKey> for String {
    fn from(week: WeekKey) -> Self {
        week.to_string()
    }
}

impl ToSql for WeekKey {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for WeekKey {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        NaiveDate::parse_from_str(raw, WEEK_FORMAT)
            .map(WeekKey::containing)
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}
