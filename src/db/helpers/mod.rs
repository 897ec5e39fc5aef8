use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::db::models::ScanSessionStatus;

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub fn to_u32(value: Option<i64>, field: &str) -> Result<Option<u32>> {
    value
        .map(|raw| u32::try_from(raw).map_err(|_| anyhow!("{field} out of range: {raw}")))
        .transpose()
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn parse_status(value: &str) -> Result<ScanSessionStatus> {
    match value {
        "Active" => Ok(ScanSessionStatus::Active),
        "Completed" => Ok(ScanSessionStatus::Completed),
        "Interrupted" => Ok(ScanSessionStatus::Interrupted),
        other => Err(anyhow!("unknown scan session status {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_integers() {
        assert!(to_i64(u64::MAX).is_err());
        assert!(to_u64(-1, "accepted_count").is_err());
        assert_eq!(to_u32(Some(1080), "height").unwrap(), Some(1080));
        assert!(to_u32(Some(-5), "width").is_err());
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            ScanSessionStatus::Active,
            ScanSessionStatus::Completed,
            ScanSessionStatus::Interrupted,
        ] {
            assert_eq!(parse_status(status.as_str()).unwrap(), status);
        }
        assert!(parse_status("Running").is_err());
    }
}
