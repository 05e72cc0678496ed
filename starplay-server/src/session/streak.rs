use std::collections::BTreeSet;

use chrono::NaiveDate;

use super::day::prev_day;

/// Length of the current consecutive-day run in `dates`.
///
/// The walk anchors at `today` when the child already played today,
/// otherwise at yesterday, so a streak is not considered broken until
/// the day has fully elapsed without play. A run that ended more than
/// one day ago yields zero.
pub fn current_streak(dates: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let mut check = if dates.contains(&today) {
        today
    } else {
        prev_day(today)
    };
    let mut streak = 0;
    while dates.contains(&check) {
        streak += 1;
        check = prev_day(check);
    }
    streak
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn set(days: &[&str]) -> BTreeSet<NaiveDate> {
        days.iter().map(|s| d(s)).collect()
    }

    #[test]
    fn single_day_today() {
        assert_eq!(current_streak(&set(&["2026-08-30"]), d("2026-08-30")), 1);
    }

    #[test]
    fn three_consecutive_days() {
        let dates = set(&["2026-08-30", "2026-08-29", "2026-08-28"]);
        assert_eq!(current_streak(&dates, d("2026-08-30")), 3);
    }

    #[test]
    fn old_usage_only_yields_zero() {
        assert_eq!(current_streak(&set(&["2026-08-28"]), d("2026-08-30")), 0);
    }

    #[test]
    fn yesterday_only_keeps_streak_alive() {
        assert_eq!(current_streak(&set(&["2026-08-29"]), d("2026-08-30")), 1);
    }

    #[test]
    fn gap_truncates_the_walk() {
        // Played today and yesterday, skipped the 28th, played before.
        let dates = set(&["2026-08-30", "2026-08-29", "2026-08-27", "2026-08-26"]);
        assert_eq!(current_streak(&dates, d("2026-08-30")), 2);
    }

    #[test]
    fn no_usage_at_all() {
        assert_eq!(current_streak(&BTreeSet::new(), d("2026-08-30")), 0);
    }
}
