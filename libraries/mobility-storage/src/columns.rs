//! Column codecs shared by the slices
//!
//! Timestamps are RFC 3339 text, dates are `YYYY-MM-DD`, counters are
//! `INTEGER` (i64) and ledgers are JSON text.

use crate::error::{Result, StorageError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{de::DeserializeOwned, Serialize};

pub(crate) fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::corrupt(column, e))
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_timestamp(column, &v)).transpose()
}

pub(crate) fn date(value: Option<NaiveDate>) -> Option<String> {
    value.map(|d| d.format("%Y-%m-%d").to_string())
}

pub(crate) fn parse_date(column: &str, value: Option<String>) -> Result<Option<NaiveDate>> {
    value
        .map(|v| {
            NaiveDate::parse_from_str(&v, "%Y-%m-%d").map_err(|e| StorageError::corrupt(column, e))
        })
        .transpose()
}

pub(crate) fn counter(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|e| StorageError::corrupt("counter", e))
}

pub(crate) fn optional_counter(value: Option<u64>) -> Result<Option<i64>> {
    value.map(counter).transpose()
}

pub(crate) fn parse_counter(column: &str, value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|e| StorageError::corrupt(column, e))
}

pub(crate) fn parse_optional_counter(column: &str, value: Option<i64>) -> Result<Option<u64>> {
    value.map(|v| parse_counter(column, v)).transpose()
}

pub(crate) fn json<T: Serialize>(value: Option<&T>) -> Result<Option<String>> {
    Ok(value.map(serde_json::to_string).transpose()?)
}

pub(crate) fn parse_json<T: DeserializeOwned>(value: Option<String>) -> Result<Option<T>> {
    Ok(value.map(|v| serde_json::from_str(&v)).transpose()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_survive_text_storage() {
        let now = Utc::now();
        assert_eq!(parse_timestamp("t", &timestamp(now)).unwrap(), now);
        assert!(parse_timestamp("t", "yesterday").is_err());
    }

    #[test]
    fn negative_counters_are_corrupt() {
        assert_eq!(parse_counter("c", 7).unwrap(), 7);
        assert!(matches!(
            parse_counter("c", -1),
            Err(StorageError::Corrupt { .. })
        ));
    }
}
