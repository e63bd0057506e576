use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::Completion;

/// Completion statistics for one assignment, recomputed from current data on
/// every render. The denominator is the team's player count at query time, so
/// the rate moves when the roster changes.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AssignmentStats {
    pub completion_count: i64,
    pub completion_rate: i64,
    pub is_overdue: bool,
    pub days_until_due: Option<i64>,
}

pub fn assignment_stats(
    completion_count: i64,
    player_count: i64,
    due_date: NaiveDate,
    today: NaiveDate,
) -> AssignmentStats {
    let completion_rate = if player_count > 0 {
        ((completion_count as f64 / player_count as f64) * 100.0).round() as i64
    } else {
        0
    };

    // A same-day due date is not overdue.
    let is_overdue = due_date < today;
    let days_until_due = if is_overdue {
        None
    } else {
        Some((due_date - today).num_days())
    };

    AssignmentStats {
        completion_count,
        completion_rate,
        is_overdue,
        days_until_due,
    }
}

/// Parent-view completion: true iff any completion belongs to one of the
/// parent's linked players. A membership test, not a count.
pub fn completed_by_any(completions: &[Completion], player_ids: &[i64]) -> bool {
    completions
        .iter()
        .any(|completion| player_ids.contains(&completion.player_id))
}
