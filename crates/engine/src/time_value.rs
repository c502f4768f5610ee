use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;
use thiserror::Error;

const MILLIS_PER_SECOND: i64 = 1_000;
const MILLIS_PER_MINUTE: i64 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeParseError {
    #[error("'{component}' is not a number in time value '{input}'")]
    NotNumeric { input: String, component: String },
    #[error("time value '{0}' has more than three ':' separated components")]
    TooManyComponents(String),
    #[error("time value '{0}' is out of range")]
    OutOfRange(String),
}

/// Signed duration with millisecond precision.
///
/// Accepts `hh:mm:ss[.mmm]` as well as the partial forms `mm:ss` and `ss`.
/// Every component may be empty (read as zero); the rightmost clock component
/// is always seconds. Milliseconds may be separated by `.` or `,` and are read
/// as a decimal fraction of a second (`.5` is 500 ms).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeValue {
    millis: i64,
}

impl TimeValue {
    pub const ZERO: TimeValue = TimeValue { millis: 0 };

    pub const fn from_millis(millis: i64) -> Self {
        Self { millis }
    }

    pub const fn from_hms(hours: i64, minutes: i64, seconds: i64) -> Self {
        Self {
            millis: hours
                .saturating_mul(MILLIS_PER_HOUR)
                .saturating_add(minutes.saturating_mul(MILLIS_PER_MINUTE))
                .saturating_add(seconds.saturating_mul(MILLIS_PER_SECOND)),
        }
    }

    pub const fn as_millis(&self) -> i64 {
        self.millis
    }

    pub const fn is_negative(&self) -> bool {
        self.millis < 0
    }

    pub fn parse(text: &str) -> Result<Self, TimeParseError> {
        let input = text.trim();
        let (clock, fraction) = match input.find(|c| c == '.' || c == ',') {
            Some(pos) => (&input[..pos], Some(&input[pos + 1..])),
            None => (input, None),
        };

        // Seconds first, then minutes, then hours
        let components: Vec<&str> = clock.rsplit(':').collect();
        if components.len() > 3 {
            return Err(TimeParseError::TooManyComponents(input.to_string()));
        }

        let out_of_range = || TimeParseError::OutOfRange(input.to_string());
        let mut millis = 0i64;
        for (component, unit) in components
            .iter()
            .zip([MILLIS_PER_SECOND, MILLIS_PER_MINUTE, MILLIS_PER_HOUR])
        {
            millis = parse_component(input, component)?
                .checked_mul(unit)
                .and_then(|part| millis.checked_add(part))
                .ok_or_else(out_of_range)?;
        }

        if let Some(fraction) = fraction {
            millis = millis
                .checked_add(parse_fraction(input, fraction)?)
                .ok_or_else(out_of_range)?;
        }

        Ok(Self { millis })
    }

    /// Canonical subtitle form: zero-padded `hh:mm:ss,mmm`.
    pub fn format(&self) -> String {
        let (sign, h, m, s, ms) = self.parts();
        format!("{}{:02}:{:02}:{:02},{:03}", sign, h, m, s, ms)
    }

    /// Clock form used in menu fields, job labels and tool arguments:
    /// `hh:mm:ss`, with `.mmm` appended only when there are milliseconds.
    pub fn to_clock(&self) -> String {
        let (sign, h, m, s, ms) = self.parts();
        if ms == 0 {
            format!("{}{:02}:{:02}:{:02}", sign, h, m, s)
        } else {
            format!("{}{:02}:{:02}:{:02}.{:03}", sign, h, m, s, ms)
        }
    }

    /// Move by `by`, backwards when `negative` is set.
    pub fn shifted(self, by: TimeValue, negative: bool) -> Self {
        if negative {
            self - by
        } else {
            self + by
        }
    }

    /// Raise the value to `floor` if it falls below it.
    pub fn at_least(self, floor: TimeValue) -> Self {
        self.max(floor)
    }

    fn parts(&self) -> (&'static str, u64, u64, u64, u64) {
        let sign = if self.millis < 0 { "-" } else { "" };
        let total = self.millis.unsigned_abs();
        let hours = total / MILLIS_PER_HOUR as u64;
        let minutes = (total % MILLIS_PER_HOUR as u64) / MILLIS_PER_MINUTE as u64;
        let seconds = (total % MILLIS_PER_MINUTE as u64) / MILLIS_PER_SECOND as u64;
        let millis = total % MILLIS_PER_SECOND as u64;
        (sign, hours, minutes, seconds, millis)
    }
}

fn parse_component(input: &str, component: &str) -> Result<i64, TimeParseError> {
    let component = component.trim();
    if component.is_empty() {
        return Ok(0);
    }
    if !component.chars().all(|c| c.is_ascii_digit()) {
        return Err(not_numeric(input, component));
    }
    component
        .parse::<i64>()
        .map_err(|_| TimeParseError::OutOfRange(input.to_string()))
}

fn parse_fraction(input: &str, fraction: &str) -> Result<i64, TimeParseError> {
    let fraction = fraction.trim();
    if !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(not_numeric(input, fraction));
    }
    let digits: String = fraction.chars().chain("000".chars()).take(3).collect();
    digits.parse::<i64>().map_err(|_| not_numeric(input, fraction))
}

fn not_numeric(input: &str, component: &str) -> TimeParseError {
    TimeParseError::NotNumeric {
        input: input.to_string(),
        component: component.to_string(),
    }
}

impl Add for TimeValue {
    type Output = TimeValue;

    fn add(self, rhs: TimeValue) -> TimeValue {
        TimeValue::from_millis(self.millis.saturating_add(rhs.millis))
    }
}

impl Sub for TimeValue {
    type Output = TimeValue;

    fn sub(self, rhs: TimeValue) -> TimeValue {
        TimeValue::from_millis(self.millis.saturating_sub(rhs.millis))
    }
}

impl fmt::Display for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_clock())
    }
}

impl FromStr for TimeValue {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TimeValue::parse(s)
    }
}

impl Serialize for TimeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_clock())
    }
}

impl<'de> Deserialize<'de> for TimeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        TimeValue::parse(&text).map_err(serde::de::Error::custom)
    }
}
