use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

fn to_utc(dt: Option<NaiveDateTime>) -> DateTime<Utc> {
    dt.map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        .unwrap_or_else(Utc::now)
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Team {
    pub id: i64,
    pub coach_id: i64,
    pub name: String,
    pub age_group: String,
    pub season: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbTeam {
    pub id: Option<i64>,
    pub coach_id: Option<i64>,
    pub name: Option<String>,
    pub age_group: Option<String>,
    pub season: Option<String>,
    pub code: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbTeam> for Team {
    fn from(team: DbTeam) -> Self {
        Self {
            id: team.id.unwrap_or_default(),
            coach_id: team.coach_id.unwrap_or_default(),
            name: team.name.unwrap_or_default(),
            age_group: team.age_group.unwrap_or_default(),
            season: team.season.unwrap_or_default(),
            code: team.code.unwrap_or_default(),
            created_at: to_utc(team.created_at),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct Player {
    pub id: i64,
    pub team_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub number: Option<i64>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbPlayer {
    pub id: Option<i64>,
    pub team_id: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub number: Option<i64>,
}

impl From<DbPlayer> for Player {
    fn from(player: DbPlayer) -> Self {
        Self {
            id: player.id.unwrap_or_default(),
            team_id: player.team_id.unwrap_or_default(),
            first_name: player.first_name.unwrap_or_default(),
            last_name: player.last_name.unwrap_or_default(),
            number: player.number,
        }
    }
}

/// A parent-linked player joined with its team, for the parent dashboard.
#[derive(Debug, Serialize, Clone)]
pub struct LinkedPlayer {
    pub id: i64,
    pub team_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub number: Option<i64>,
    pub team_name: String,
    pub team_code: String,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbLinkedPlayer {
    pub id: Option<i64>,
    pub team_id: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub number: Option<i64>,
    pub team_name: Option<String>,
    pub team_code: Option<String>,
}

impl From<DbLinkedPlayer> for LinkedPlayer {
    fn from(player: DbLinkedPlayer) -> Self {
        Self {
            id: player.id.unwrap_or_default(),
            team_id: player.team_id.unwrap_or_default(),
            first_name: player.first_name.unwrap_or_default(),
            last_name: player.last_name.unwrap_or_default(),
            number: player.number,
            team_name: player.team_name.unwrap_or_default(),
            team_code: player.team_code.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct Parent {
    pub id: i64,
    pub user_id: i64,
    pub email: String,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbParent {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub email: Option<String>,
}

impl From<DbParent> for Parent {
    fn from(parent: DbParent) -> Self {
        Self {
            id: parent.id.unwrap_or_default(),
            user_id: parent.user_id.unwrap_or_default(),
            email: parent.email.unwrap_or_default(),
        }
    }
}

pub const DRILL_CATEGORIES: &[&str] =
    &["throwing", "catching", "batting", "fielding", "baserunning"];

pub const DRILL_DIFFICULTIES: &[&str] = &["beginner", "intermediate", "advanced"];

pub fn validate_category(category: &str) -> Result<(), AppError> {
    if DRILL_CATEGORIES.contains(&category) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Unknown drill category: {}",
            category
        )))
    }
}

pub fn validate_difficulty(difficulty: &str) -> Result<(), AppError> {
    if DRILL_DIFFICULTIES.contains(&difficulty) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Unknown drill difficulty: {}",
            difficulty
        )))
    }
}

/// Normalizes a stored list column. Drills imported at different times carry
/// either a JSON array or delimited text; everything past this function is a
/// plain Vec<String>.
pub fn parse_list(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };

    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str(raw) {
        return items
            .into_iter()
            .filter_map(|item| item.as_str().map(String::from))
            .collect();
    }

    let separator = if raw.contains('\n') { '\n' } else { ',' };
    raw.split(separator)
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

#[derive(Debug, Serialize, Clone)]
pub struct Drill {
    pub id: i64,
    pub title: String,
    pub category: String,
    pub difficulty: String,
    pub duration_minutes: i64,
    pub description: String,
    pub video_url: Option<String>,
    pub instructions: Vec<String>,
    pub equipment: Vec<String>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbDrill {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub category: Option<String>,
    pub difficulty: Option<String>,
    pub duration_minutes: Option<i64>,
    pub description: Option<String>,
    pub video_url: Option<String>,
    pub instructions: Option<String>,
    pub equipment: Option<String>,
}

impl From<DbDrill> for Drill {
    fn from(drill: DbDrill) -> Self {
        Self {
            id: drill.id.unwrap_or_default(),
            title: drill.title.unwrap_or_default(),
            category: drill.category.unwrap_or_default(),
            difficulty: drill.difficulty.unwrap_or_default(),
            duration_minutes: drill.duration_minutes.unwrap_or_default(),
            description: drill.description.unwrap_or_default(),
            video_url: drill.video_url,
            instructions: parse_list(drill.instructions.as_deref()),
            equipment: parse_list(drill.equipment.as_deref()),
        }
    }
}

/// An assignment joined with the drill it tasks, as listed on dashboards.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Assignment {
    pub id: i64,
    pub team_id: i64,
    pub drill_id: i64,
    pub target_player_id: Option<i64>,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub drill_title: String,
    pub drill_category: String,
    pub drill_difficulty: String,
    pub drill_duration_minutes: i64,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbAssignment {
    pub id: Option<i64>,
    pub team_id: Option<i64>,
    pub drill_id: Option<i64>,
    pub target_player_id: Option<i64>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub drill_title: Option<String>,
    pub drill_category: Option<String>,
    pub drill_difficulty: Option<String>,
    pub drill_duration_minutes: Option<i64>,
}

impl From<DbAssignment> for Assignment {
    fn from(assignment: DbAssignment) -> Self {
        Self {
            id: assignment.id.unwrap_or_default(),
            team_id: assignment.team_id.unwrap_or_default(),
            drill_id: assignment.drill_id.unwrap_or_default(),
            target_player_id: assignment.target_player_id,
            due_date: assignment
                .due_date
                .unwrap_or_else(|| Utc::now().date_naive()),
            notes: assignment.notes,
            created_at: to_utc(assignment.created_at),
            drill_title: assignment.drill_title.unwrap_or_default(),
            drill_category: assignment.drill_category.unwrap_or_default(),
            drill_difficulty: assignment.drill_difficulty.unwrap_or_default(),
            drill_duration_minutes: assignment.drill_duration_minutes.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct Completion {
    pub id: i64,
    pub assignment_id: i64,
    pub player_id: i64,
    pub completed_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbCompletion {
    pub id: Option<i64>,
    pub assignment_id: Option<i64>,
    pub player_id: Option<i64>,
    pub completed_at: Option<NaiveDateTime>,
}

impl From<DbCompletion> for Completion {
    fn from(completion: DbCompletion) -> Self {
        Self {
            id: completion.id.unwrap_or_default(),
            assignment_id: completion.assignment_id.unwrap_or_default(),
            player_id: completion.player_id.unwrap_or_default(),
            completed_at: to_utc(completion.completed_at),
        }
    }
}
