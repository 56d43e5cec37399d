/*!
 * Clocks
 * Realtime and monotonic clock reads shared by the VFS and guest imports
 */

use std::sync::OnceLock;
use std::time::Instant;
use time::OffsetDateTime;

use super::types::TimestampMs;

static MONOTONIC_ORIGIN: OnceLock<Instant> = OnceLock::new();

/// Wall-clock milliseconds since the UNIX epoch
pub fn now_ms() -> TimestampMs {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000).max(0) as TimestampMs
}

/// Wall-clock nanoseconds since the UNIX epoch
pub fn realtime_ns() -> u64 {
    OffsetDateTime::now_utc().unix_timestamp_nanos().max(0) as u64
}

/// Nanoseconds since the first monotonic read in this process
pub fn monotonic_ns() -> u64 {
    let origin = MONOTONIC_ORIGIN.get_or_init(Instant::now);
    origin.elapsed().as_nanos() as u64
}
