use chrono::{DateTime, NaiveDate, TimeZone, Utc};

/// Calendar day of `ts` as seen from the given timezone.
///
/// Two events on the same local day collapse into one bucket even when their
/// UTC instants straddle midnight.
pub fn local_day<Tz: TimeZone>(tz: &Tz, ts: DateTime<Utc>) -> NaiveDate {
    ts.with_timezone(tz).date_naive()
}
