use time::{Duration, OffsetDateTime, Time, UtcOffset};

/// True when the instant has zero minutes, seconds and sub-seconds in UTC.
pub fn is_hour_aligned(ts: OffsetDateTime) -> bool {
    let ts = ts.to_offset(UtcOffset::UTC);
    ts.minute() == 0 && ts.second() == 0 && ts.nanosecond() == 0
}

/// Drop everything below the hour, normalising to UTC.
pub fn truncate_to_hour(ts: OffsetDateTime) -> OffsetDateTime {
    let ts = ts.to_offset(UtcOffset::UTC);
    ts - Duration::minutes(i64::from(ts.minute()))
        - Duration::seconds(i64::from(ts.second()))
        - Duration::nanoseconds(i64::from(ts.nanosecond()))
}

/// Midnight UTC of the day containing `ts`.
pub fn start_of_day(ts: OffsetDateTime) -> OffsetDateTime {
    ts.to_offset(UtcOffset::UTC).replace_time(Time::MIDNIGHT)
}
