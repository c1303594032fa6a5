use chrono::{DateTime, Datelike, Duration, Months, TimeZone, Utc};

/// First and last instant (millisecond precision) of the UTC calendar month
/// containing `now`, both inclusive.
pub fn month_bounds(now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = Utc
        .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()?;
    let next = start.checked_add_months(Months::new(1))?;
    Some((start, next - Duration::milliseconds(1)))
}
