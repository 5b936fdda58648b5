use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Day of the month bills come due.
const DUE_DAY: u32 = 20;

/// Next billing due date for a reference date.
///
/// The 20th of the reference month when the reference falls on or before
/// the 20th, otherwise the 20th of the following month (December rolls
/// into January of the next year). A target landing on a weekend shifts
/// forward to the following Monday.
///
/// Calendar arithmetic only; callers holding an instant convert to a
/// local calendar date before calling.
pub fn due_date_for(reference: NaiveDate) -> NaiveDate {
    let (year, month) = if reference.day() <= DUE_DAY {
        (reference.year(), reference.month())
    } else if reference.month() == 12 {
        (reference.year() + 1, 1)
    } else {
        (reference.year(), reference.month() + 1)
    };

    // Day 20 exists in every month, so the fallback never fires.
    let target = NaiveDate::from_ymd_opt(year, month, DUE_DAY).unwrap_or(reference);

    match target.weekday() {
        Weekday::Sat => target + Duration::days(2),
        Weekday::Sun => target + Duration::days(1),
        _ => target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_same_month_when_on_or_before_due_day() {
        // 2024-03-20 is a Wednesday, no shift
        assert_eq!(due_date_for(date(2024, 3, 15)), date(2024, 3, 20));
        assert_eq!(due_date_for(date(2024, 3, 20)), date(2024, 3, 20));
        assert_eq!(due_date_for(date(2024, 3, 1)), date(2024, 3, 20));
    }

    #[test]
    fn test_next_month_after_due_day() {
        // 2024-04-20 is a Saturday, shifts to Monday the 22nd
        assert_eq!(due_date_for(date(2024, 3, 25)), date(2024, 4, 22));
        assert_eq!(due_date_for(date(2024, 3, 21)), date(2024, 4, 22));
    }

    #[test]
    fn test_saturday_shifts_two_days() {
        // 2024-07-20 is a Saturday
        assert_eq!(due_date_for(date(2024, 7, 10)), date(2024, 7, 22));
        assert_eq!(due_date_for(date(2024, 7, 22)).weekday(), Weekday::Tue);
    }

    #[test]
    fn test_sunday_shifts_one_day() {
        // 2024-10-20 is a Sunday
        assert_eq!(due_date_for(date(2024, 10, 5)), date(2024, 10, 21));
        assert_eq!(due_date_for(date(2024, 10, 21)).weekday(), Weekday::Wed);
    }

    #[test]
    fn test_december_rolls_into_next_year() {
        // 2025-01-20 is a Monday
        assert_eq!(due_date_for(date(2024, 12, 25)), date(2025, 1, 20));
    }

    #[test]
    fn test_result_never_lands_on_weekend() {
        let mut day = date(2024, 1, 1);
        let end = date(2026, 1, 1);
        while day < end {
            let due = due_date_for(day);
            assert_ne!(due.weekday(), Weekday::Sat, "due date for {day} is a Saturday");
            assert_ne!(due.weekday(), Weekday::Sun, "due date for {day} is a Sunday");
            assert!(due >= day);
            day += Duration::days(1);
        }
    }
}
