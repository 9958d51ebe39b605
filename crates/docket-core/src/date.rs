//! Source date handling.
//!
//! The court system renders dates as `dd/mm/yyyy`, sometimes followed by a
//! time (`dd/mm/yyyy hh:mm`). Only the day is kept: comparisons and document
//! names work at day granularity.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DateError {
    #[error("malformed source date: {0:?}")]
    Malformed(String),
    #[error("source date out of range: {0:?}")]
    OutOfRange(String),
}

/// Parse a `dd/mm/yyyy[ hh:mm]` date.
///
/// Years must fall in `1000..=9999`; months and days are checked against the
/// calendar, so `31/02/2024` is rejected.
pub fn parse_source_date(s: &str) -> Result<NaiveDate, DateError> {
    let day_part = s.trim().split_whitespace().next().unwrap_or_default();
    let parts: Vec<&str> = day_part.split('/').collect();
    let [day, month, year] = parts.as_slice() else {
        return Err(DateError::Malformed(s.to_string()));
    };

    let parse = |p: &str| {
        p.trim()
            .parse::<u32>()
            .map_err(|_| DateError::Malformed(s.to_string()))
    };
    let (day, month, year) = (parse(*day)?, parse(*month)?, parse(*year)?);

    if !(1000..=9999).contains(&year) {
        return Err(DateError::OutOfRange(s.to_string()));
    }
    NaiveDate::from_ymd_opt(year as i32, month, day)
        .ok_or_else(|| DateError::OutOfRange(s.to_string()))
}

/// Serde adapter for extraction payloads: accepts ISO `yyyy-mm-dd` as well
/// as the source's `dd/mm/yyyy[ hh:mm]`, and always writes ISO.
pub mod flexible {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        date.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if let Ok(date) = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
            return Ok(date);
        }
        super::parse_source_date(&raw).map_err(serde::de::Error::custom)
    }
}

/// Render the six-digit `yyMMdd` code used in document names.
pub fn yymmdd(date: NaiveDate) -> String {
    date.format("%y%m%d").to_string()
}
