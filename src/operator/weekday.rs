// src/operator/weekday.rs

//! Week-day sets used by the day-of-week branch.

use std::fmt;
use std::str::FromStr;

use chrono::Weekday;

use crate::errors::{Result, SubdagError};

/// A non-empty set of ISO week days (Monday = 1 ... Sunday = 7).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    /// Parse full English day names, case-insensitively.
    ///
    /// An empty input or an unknown name is a configuration error.
    pub fn parse<I, S>(days: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut bits = 0u8;
        for day in days {
            bits |= bit(parse_day(day.as_ref())?);
        }
        if bits == 0 {
            return Err(SubdagError::ConfigError(
                "week_day needs at least one day".to_string(),
            ));
        }
        Ok(Self(bits))
    }

    pub fn from_days(days: &[Weekday]) -> Result<Self> {
        let bits = days.iter().fold(0u8, |acc, d| acc | bit(*d));
        if bits == 0 {
            return Err(SubdagError::ConfigError(
                "week_day needs at least one day".to_string(),
            ));
        }
        Ok(Self(bits))
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & bit(day) != 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        ALL_DAYS.into_iter().filter(|d| self.contains(*d))
    }
}

const ALL_DAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

fn bit(day: Weekday) -> u8 {
    1 << (day.number_from_monday() - 1)
}

fn parse_day(name: &str) -> Result<Weekday> {
    let day = match name.trim().to_ascii_lowercase().as_str() {
        "monday" => Weekday::Mon,
        "tuesday" => Weekday::Tue,
        "wednesday" => Weekday::Wed,
        "thursday" => Weekday::Thu,
        "friday" => Weekday::Fri,
        "saturday" => Weekday::Sat,
        "sunday" => Weekday::Sun,
        other => {
            return Err(SubdagError::ConfigError(format!(
                "invalid week day '{other}'; expected a full day name such as \"Monday\""
            )));
        }
    };
    Ok(day)
}

impl FromStr for WeekdaySet {
    type Err = SubdagError;

    /// Comma-separated day names, e.g. `"Saturday,Sunday"`.
    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s.split(',').filter(|p| !p.trim().is_empty()))
    }
}

impl fmt::Debug for WeekdaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
