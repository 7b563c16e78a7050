//! Day boundaries
//!
//! Builds the `[local midnight, now)` range queried for a daily summary.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};

use crate::error::FetchError;
use crate::types::TimeRange;

/// Range from the start of `now`'s local day up to `now`.
///
/// When midnight does not exist locally (a DST gap at 00:00), the day starts at
/// the first minute that does, searching up to 03:00.
pub fn start_of_day_until<Tz: TimeZone>(now: &DateTime<Tz>) -> Result<TimeRange, FetchError> {
    const MAX_GAP_MINUTES: i64 = 3 * 60;

    let tz = now.timezone();
    let date = now.date_naive();
    let midnight = date.and_time(NaiveTime::MIN);

    let start = (0..=MAX_GAP_MINUTES)
        .find_map(|minute| {
            tz.from_local_datetime(&(midnight + Duration::minutes(minute)))
                .earliest()
        })
        .ok_or_else(|| FetchError::InvalidTimeRange(format!("no start of day for {date}")))?;

    Ok(TimeRange::new(
        start.with_timezone(&Utc),
        now.with_timezone(&Utc),
    ))
}
