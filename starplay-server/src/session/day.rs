use chrono::{Duration, NaiveDate, Utc};
use chrono_tz::Tz;

/// Calendar-day key for "now" in the family's timezone. All usage and
/// challenge rows are keyed on this, so a day rolls over at local
/// midnight rather than UTC midnight.
pub fn today(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

pub fn prev_day(day: NaiveDate) -> NaiveDate {
    day - Duration::days(1)
}
