//! Wall-clock handling: hour windows, relative timestamp compression, and
//! the fixed-zone file naming scheme.
//!
//! Event files cover one UTC-aligned hour window each. Timestamps inside a
//! file are stored as 32-bit second offsets from the file's base time, which
//! keeps entry headers small and is safe because files rotate once per hour.
//! File names render the window start in a fixed display zone so that names
//! sort lexicographically in time order.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Unix timestamp in whole seconds.
pub type Timestamp = i64;

/// Width of one rotation window in seconds (one UTC hour).
pub const WINDOW_SECS: i64 = 3600;

/// Offset of the fixed display zone used for file names: UTC+8
/// (Asia/Shanghai). The zone has a whole-hour offset and no DST, so names
/// formatted in it stay aligned with UTC hour windows.
pub const DISPLAY_ZONE_OFFSET_SECS: i32 = 8 * 3600;

/// File name pattern: 12 ASCII digits, `YYYYMMDDhhmm`. Windows start on the
/// hour, so the minute digits are always `00`.
pub const FILE_NAME_PATTERN: &str = "%Y%m%d%H%M";

/// Length of an event file name in bytes.
pub const FILE_NAME_LEN: usize = 12;

fn display_zone() -> FixedOffset {
    FixedOffset::east_opt(DISPLAY_ZONE_OFFSET_SECS).unwrap()
}

/// Returns the hour window containing `ts`.
pub fn window_of(ts: Timestamp) -> i64 {
    ts.div_euclid(WINDOW_SECS)
}

/// Returns the Unix second at which `window` starts.
pub fn base_time_of(window: i64) -> Timestamp {
    window * WINDOW_SECS
}

/// Compresses an absolute timestamp into a 32-bit offset from `base_time`.
///
/// Timestamps older than `base_time` wrap; rotation keeps offsets within one
/// window plus slack under normal operation.
pub fn compress(base_time: Timestamp, ts: Timestamp) -> u32 {
    (ts - base_time) as u32
}

/// Expands a 32-bit offset back into an absolute timestamp.
pub fn decompress(base_time: Timestamp, cts: u32) -> Timestamp {
    base_time + i64::from(cts)
}

/// Formats the file name for the window starting at `base_time`.
pub fn file_name_for(base_time: Timestamp) -> String {
    let utc = DateTime::from_timestamp(base_time, 0).unwrap_or_default();
    utc.with_timezone(&display_zone())
        .format(FILE_NAME_PATTERN)
        .to_string()
}

/// Parses an event file name back into its window-start Unix second.
///
/// Returns `None` for anything that is not exactly twelve ASCII digits
/// denoting a valid date-time; directory scans use this to ignore foreign
/// entries.
pub fn parse_file_name(name: &str) -> Option<Timestamp> {
    if name.len() != FILE_NAME_LEN || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(name, FILE_NAME_PATTERN).ok()?;
    display_zone()
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.timestamp())
}

/// A source of "now", injected into the store at construction.
pub trait Clock: Send + Sync {
    /// Returns the current Unix time in whole seconds.
    fn now_unix(&self) -> Timestamp;
}

/// Wall-clock time from the operating system.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// A manually driven clock for deterministic tests.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Creates a clock frozen at `now`.
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::Relaxed);
    }

    /// Advances the clock by `secs` seconds.
    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_unix(&self) -> Timestamp {
        self.now.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_math() {
        assert_eq!(window_of(0), 0);
        assert_eq!(window_of(3599), 0);
        assert_eq!(window_of(3600), 1);
        assert_eq!(window_of(-1), -1);
        assert_eq!(base_time_of(window_of(1483228900)), 1483228800);
    }

    #[test]
    fn test_compress_roundtrip() {
        let base = 1483228800;
        assert_eq!(compress(base, base), 0);
        assert_eq!(compress(base, base + 100), 100);
        assert_eq!(decompress(base, 100), base + 100);
        assert_eq!(decompress(base, compress(base, base + 3599)), base + 3599);
    }

    #[test]
    fn test_file_name_display_zone() {
        // 2017-01-01 00:00:00 UTC renders as 08:00 in the display zone.
        assert_eq!(file_name_for(1483228800), "201701010800");
        assert_eq!(file_name_for(1483232400), "201701010900");
    }

    #[test]
    fn test_parse_file_name_roundtrip() {
        for base in [1483228800i64, 1483232400, 0, 1704067200] {
            let name = file_name_for(base);
            assert_eq!(parse_file_name(&name), Some(base));
        }
    }

    #[test]
    fn test_parse_file_name_rejects_foreign_entries() {
        assert_eq!(parse_file_name(""), None);
        assert_eq!(parse_file_name("2017010108"), None);
        assert_eq!(parse_file_name("201701010800x"), None);
        assert_eq!(parse_file_name("20170101080a"), None);
        assert_eq!(parse_file_name("201713010800"), None); // month 13
        assert_eq!(parse_file_name(".DS_Store"), None);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(100);
        assert_eq!(clock.now_unix(), 100);
        clock.advance(50);
        assert_eq!(clock.now_unix(), 150);
        clock.set(7);
        assert_eq!(clock.now_unix(), 7);
    }
}
