//! Helpers for types that don't natively implement ToSql.

use std::{
    convert::TryFrom,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Converts a time to whole seconds since the epoch, saturating at the ends
/// of the `i64` range.
pub(crate) fn from_time(time: &SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since) => i64::try_from(since.as_secs()).unwrap_or(i64::MAX),
        Err(before) => i64::try_from(before.duration().as_secs())
            .map(|secs| -secs)
            .unwrap_or(i64::MIN),
    }
}

pub(crate) fn into_time(timestamp: i64) -> SystemTime {
    if timestamp >= 0 {
        UNIX_EPOCH + Duration::from_secs(timestamp as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(timestamp.unsigned_abs())
    }
}
