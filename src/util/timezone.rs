use chrono::{DateTime, Days, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use time::{OffsetDateTime, UtcOffset};

pub fn localized_datetime(time: OffsetDateTime, tz: Tz) -> DateTime<Tz> {
    let utc = time.to_offset(UtcOffset::UTC);
    let datetime_utc = DateTime::<Utc>::from_timestamp(utc.unix_timestamp(), utc.nanosecond())
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    tz.from_utc_datetime(&datetime_utc.naive_utc())
}

/// `YYYY-MM-DD HH:MM` in the given zone.
pub fn format_local_minute(time: OffsetDateTime, tz: Tz) -> String {
    localized_datetime(time, tz)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

/// Start (inclusive) and end (exclusive) of the local day containing `now`.
pub fn local_day_bounds(now: OffsetDateTime, tz: Tz) -> (OffsetDateTime, OffsetDateTime) {
    let today = localized_datetime(now, tz).date_naive();
    let start = start_of_day(today, tz).unwrap_or(now);
    let end = today
        .checked_add_days(Days::new(1))
        .and_then(|tomorrow| start_of_day(tomorrow, tz))
        .unwrap_or(start + time::Duration::DAY);
    (start, end)
}

fn start_of_day(date: NaiveDate, tz: Tz) -> Option<OffsetDateTime> {
    let midnight = date.and_hms_opt(0, 0, 0)?;
    let local = match tz.from_local_datetime(&midnight) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        // Midnight skipped by a DST jump: the day starts at the first valid hour.
        LocalResult::None => first_valid_after(midnight, tz)?,
    };
    OffsetDateTime::from_unix_timestamp(local.timestamp()).ok()
}

fn first_valid_after(midnight: NaiveDateTime, tz: Tz) -> Option<DateTime<Tz>> {
    (1..=3)
        .filter_map(|hours| midnight.checked_add_signed(chrono::TimeDelta::hours(hours)))
        .find_map(|candidate| tz.from_local_datetime(&candidate).earliest())
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn utc_day_bounds() {
        let (start, end) = local_day_bounds(datetime!(2024-03-10 15:30 UTC), Tz::UTC);
        assert_eq!(start, datetime!(2024-03-10 00:00 UTC));
        assert_eq!(end, datetime!(2024-03-11 00:00 UTC));
    }

    #[test]
    fn shanghai_day_starts_previous_utc_evening() {
        let tz: Tz = "Asia/Shanghai".parse().unwrap();
        let (start, end) = local_day_bounds(datetime!(2024-03-10 17:00 UTC), tz);
        assert_eq!(start, datetime!(2024-03-10 16:00 UTC));
        assert_eq!(end, datetime!(2024-03-11 16:00 UTC));
    }

    #[test]
    fn formats_in_local_time() {
        let tz: Tz = "Asia/Shanghai".parse().unwrap();
        assert_eq!(
            format_local_minute(datetime!(2024-03-10 17:05 UTC), tz),
            "2024-03-11 01:05"
        );
    }
}
