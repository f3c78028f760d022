//! Calendar date identifying one daily log

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Days, Local, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

static LOG_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("Invalid regex"));

/// Whether a storage key holds a daily log (`YYYY-MM-DD`).
///
/// Classification is purely lexical so that malformed-but-date-shaped keys
/// written by older clients are still treated as logs.
#[must_use]
pub fn is_log_key(key: &str) -> bool {
    LOG_KEY_RE.is_match(key)
}

/// A validated `YYYY-MM-DD` date; one log exists per date per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogDate(NaiveDate);

impl LogDate {
    /// Today's date in the local timezone.
    #[must_use]
    pub fn today() -> Self {
        Self(Local::now().date_naive())
    }

    #[must_use]
    pub const fn from_naive(date: NaiveDate) -> Self {
        Self(date)
    }

    /// The day before, saturating at the minimum representable date.
    #[must_use]
    pub fn previous(self) -> Self {
        Self(self.0.checked_sub_days(Days::new(1)).unwrap_or(self.0))
    }

    /// The day after, saturating at the maximum representable date.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0.checked_add_days(Days::new(1)).unwrap_or(self.0))
    }

    /// Storage key for this date.
    #[must_use]
    pub fn key(self) -> String {
        self.to_string()
    }

    #[must_use]
    pub const fn as_naive(self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for LogDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for LogDate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if !is_log_key(trimmed) {
            return Err(Error::InvalidInput(format!(
                "date must be formatted as YYYY-MM-DD: {trimmed}"
            )));
        }
        NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .map(Self)
            .map_err(|_| Error::InvalidInput(format!("not a calendar date: {trimmed}")))
    }
}

impl Serialize for LogDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LogDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
