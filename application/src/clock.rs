use time::OffsetDateTime;

/// Current unix time in whole seconds; every persisted timestamp in the
/// system uses this resolution.
#[must_use]
pub fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}
