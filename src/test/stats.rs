use chrono::{NaiveDate, Utc};

use crate::models::Completion;
use crate::stats::{assignment_stats, completed_by_any};

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

fn completion(assignment_id: i64, player_id: i64) -> Completion {
    Completion {
        id: 0,
        assignment_id,
        player_id,
        completed_at: Utc::now(),
    }
}

#[test]
fn zero_players_means_zero_rate() {
    let stats = assignment_stats(0, 0, date(2026, 6, 1), date(2026, 5, 1));

    assert_eq!(stats.completion_rate, 0);
    assert_eq!(stats.completion_count, 0);
}

#[test]
fn two_of_four_players_is_fifty_percent() {
    let stats = assignment_stats(2, 4, date(2026, 6, 1), date(2026, 5, 1));

    assert_eq!(stats.completion_rate, 50);
    assert_eq!(stats.completion_count, 2);
}

#[test]
fn rate_rounds_to_nearest_integer() {
    let one_third = assignment_stats(1, 3, date(2026, 6, 1), date(2026, 5, 1));
    let two_thirds = assignment_stats(2, 3, date(2026, 6, 1), date(2026, 5, 1));

    assert_eq!(one_third.completion_rate, 33);
    assert_eq!(two_thirds.completion_rate, 67);
}

#[test]
fn past_due_date_is_overdue() {
    let stats = assignment_stats(0, 4, date(2026, 5, 1), date(2026, 5, 2));

    assert!(stats.is_overdue);
    assert_eq!(stats.days_until_due, None);
}

#[test]
fn same_day_due_date_is_not_overdue() {
    let stats = assignment_stats(0, 4, date(2026, 5, 1), date(2026, 5, 1));

    assert!(!stats.is_overdue);
    assert_eq!(stats.days_until_due, Some(0));
}

#[test]
fn future_due_date_counts_down() {
    let stats = assignment_stats(0, 4, date(2026, 5, 8), date(2026, 5, 1));

    assert!(!stats.is_overdue);
    assert_eq!(stats.days_until_due, Some(7));
}

#[test]
fn rate_never_decreases_as_completions_accrue() {
    let due = date(2026, 6, 1);
    let today = date(2026, 5, 1);

    let mut previous = -1;
    for count in 0..=4 {
        let stats = assignment_stats(count, 4, due, today);
        assert!(stats.completion_rate >= previous);
        previous = stats.completion_rate;
    }
}

#[test]
fn smaller_roster_never_lowers_the_rate() {
    let due = date(2026, 6, 1);
    let today = date(2026, 5, 1);

    let before = assignment_stats(2, 4, due, today);
    let after = assignment_stats(2, 3, due, today);

    assert!(after.completion_rate >= before.completion_rate);
}

#[test]
fn completed_by_any_is_a_membership_test() {
    let completions = vec![completion(1, 10), completion(1, 11)];

    assert!(completed_by_any(&completions, &[11, 99]));
    assert!(!completed_by_any(&completions, &[12, 13]));
    assert!(!completed_by_any(&completions, &[]));
    assert!(!completed_by_any(&[], &[10, 11]));
}
