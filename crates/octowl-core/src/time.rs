//! Local wall-clock helpers.
//!
//! The `time` crate refuses to read the local UTC offset once a process has
//! more than one thread, so binaries call [`init_local_offset`] first thing in
//! `main`. Without it every helper here falls back to UTC.

use std::sync::OnceLock;
use time::{OffsetDateTime, UtcOffset};

use crate::error::{CoreError, Result};

static LOCAL_OFFSET: OnceLock<UtcOffset> = OnceLock::new();

/// Capture the local UTC offset. Returns the offset that will be used.
pub fn init_local_offset() -> UtcOffset {
    *LOCAL_OFFSET.get_or_init(|| UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC))
}

pub fn local_offset() -> UtcOffset {
    LOCAL_OFFSET.get().copied().unwrap_or(UtcOffset::UTC)
}

pub fn now_local() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(local_offset())
}

/// Milliseconds since the Unix epoch.
pub fn unix_millis(datetime: OffsetDateTime) -> i64 {
    (datetime.unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn from_unix_millis(millis: i64) -> Result<OffsetDateTime> {
    let datetime = OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000)
        .map_err(|e| {
            CoreError::invalid_value("timestamp", format!("Invalid Unix millis {millis}: {e}"))
        })?;
    Ok(datetime.to_offset(local_offset()))
}

/// `HH:MM:SS` as used in the status error log.
pub fn format_log_time(datetime: OffsetDateTime) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        datetime.hour(),
        datetime.minute(),
        datetime.second()
    )
}

pub fn log_timestamp() -> String {
    format_log_time(now_local())
}

/// `YYYYMMDD_HHMMSS_mmm` as used in dataset file names.
pub fn file_stamp(datetime: OffsetDateTime) -> String {
    format!(
        "{:04}{:02}{:02}_{:02}{:02}{:02}_{:03}",
        datetime.year(),
        u8::from(datetime.month()),
        datetime.day(),
        datetime.hour(),
        datetime.minute(),
        datetime.second(),
        datetime.millisecond()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_format_log_time() {
        let dt = datetime!(2024-03-07 09:05:03 UTC);
        assert_eq!(format_log_time(dt), "09:05:03");
    }

    #[test]
    fn test_file_stamp_pads_all_fields() {
        let dt = datetime!(2024-03-07 09:05:03.007 UTC);
        assert_eq!(file_stamp(dt), "20240307_090503_007");
    }

    #[test]
    fn test_unix_millis_roundtrip() {
        let dt = datetime!(2023-05-15 14:30:00.250 UTC);
        let millis = unix_millis(dt);
        let back = from_unix_millis(millis).unwrap();
        assert_eq!(back, dt);
        assert_eq!(back.millisecond(), 250);
    }

    #[test]
    fn test_from_unix_millis_out_of_range() {
        assert!(from_unix_millis(i64::MAX).is_err());
    }

    #[test]
    fn test_log_timestamp_shape() {
        let stamp = log_timestamp();
        assert_eq!(stamp.len(), 8);
        assert_eq!(&stamp[2..3], ":");
        assert_eq!(&stamp[5..6], ":");
    }
}
