//! Date-partition naming convention
//!
//! Vendor exports are laid out as one directory per day. The day is the first
//! path segment that is either `YYYY-MM-DD` or `<name>=YYYY-MM-DD`
//! (`date=2024-01-01`, `dt=2024-01-01`, ...).

use chrono::NaiveDate;

/// Partition for keys that carry no date segment
pub const UNDATED_PARTITION: &str = "undated";

/// Date partition of an object key
pub fn partition_date(key: &str) -> &str {
    key.split('/')
        .filter_map(|segment| {
            let value = segment.rsplit_once('=').map_or(segment, |(_, v)| v);
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .filter(|_| value.len() == 10)
                .map(|_| value)
        })
        .next()
        .unwrap_or(UNDATED_PARTITION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_hive_style_segments() {
        assert_eq!(partition_date("exports/date=2024-01-02/part-0.csv.gz"), "2024-01-02");
        assert_eq!(partition_date("x/dt=2023-12-31/y/z.parquet"), "2023-12-31");
    }

    #[test]
    fn reads_bare_date_segments() {
        assert_eq!(partition_date("2024-02-29/file.csv"), "2024-02-29");
    }

    #[test]
    fn ignores_non_dates() {
        assert_eq!(partition_date("exports/manifest.json"), UNDATED_PARTITION);
        assert_eq!(partition_date("date=2024-13-01/a"), UNDATED_PARTITION);
        assert_eq!(partition_date("date=2024-1-1/a"), UNDATED_PARTITION);
    }
}
