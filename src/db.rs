use chrono::{Duration, NaiveDate, Utc};
use rand::Rng;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument, warn};

use crate::auth::magic::LOGIN_CODE_TTL_MINUTES;
use crate::auth::session::SESSION_TTL_DAYS;
use crate::auth::{DbUser, User};
use crate::error::AppError;
use crate::models::{
    Assignment, Completion, DbAssignment, DbCompletion, DbDrill, DbLinkedPlayer, DbParent,
    DbPlayer, DbTeam, Drill, LinkedPlayer, Parent, Player, Team,
};

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

// --- users ---

#[instrument(skip(pool))]
pub async fn find_user_by_email(
    pool: &Pool<Sqlite>,
    email: &str,
) -> Result<Option<User>, AppError> {
    let row = sqlx::query_as::<_, DbUser>("SELECT id, email FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(User::from))
}

#[instrument(skip(pool))]
pub async fn create_user(pool: &Pool<Sqlite>, email: &str) -> Result<User, AppError> {
    info!("Creating identity");
    let res = sqlx::query("INSERT INTO users (email) VALUES (?)")
        .bind(email)
        .execute(pool)
        .await?;

    Ok(User {
        id: res.last_insert_rowid(),
        email: email.to_string(),
    })
}

#[instrument(skip(pool))]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<Option<User>, AppError> {
    let row = sqlx::query_as::<_, DbUser>("SELECT id, email FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(User::from))
}

// --- sessions ---

#[instrument(skip(pool, token))]
pub async fn create_session(
    pool: &Pool<Sqlite>,
    user_id: i64,
    token: &str,
) -> Result<i64, AppError> {
    info!("Creating session");
    let expires_at = (Utc::now() + Duration::days(SESSION_TTL_DAYS)).naive_utc();

    let res = sqlx::query("INSERT INTO sessions (user_id, token, expires_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

/// Loads the user for a session token and slides the expiry forward. Returns
/// None for unknown or expired tokens; expired rows are deleted on sight.
#[instrument(skip(pool, token))]
pub async fn refresh_session(pool: &Pool<Sqlite>, token: &str) -> Result<Option<User>, AppError> {
    let session = sqlx::query_as::<_, crate::auth::DbSession>(
        "SELECT id, user_id, token, expires_at FROM sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    let Some(session) = session.map(crate::auth::Session::from) else {
        return Ok(None);
    };

    if !session.is_valid() {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session.id)
            .execute(pool)
            .await?;
        return Ok(None);
    }

    let expires_at = (Utc::now() + Duration::days(SESSION_TTL_DAYS)).naive_utc();
    sqlx::query("UPDATE sessions SET expires_at = ? WHERE id = ?")
        .bind(expires_at)
        .bind(session.id)
        .execute(pool)
        .await?;

    get_user(pool, session.user_id).await
}

#[instrument(skip(pool, token))]
pub async fn invalidate_session(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    info!("Invalidating session");
    sqlx::query("DELETE FROM sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn clean_expired_sessions(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    let now = Utc::now().naive_utc();

    let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

// --- login codes ---

#[instrument(skip(pool, code))]
pub async fn create_login_code(
    pool: &Pool<Sqlite>,
    user_id: i64,
    code: &str,
    redirect_to: Option<&str>,
) -> Result<i64, AppError> {
    info!("Creating login code");
    let expires_at = (Utc::now() + Duration::minutes(LOGIN_CODE_TTL_MINUTES)).naive_utc();

    let res = sqlx::query(
        "INSERT INTO login_codes (user_id, code, redirect_to, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(code)
    .bind(redirect_to)
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

/// Redeems a one-time code. The conditional UPDATE makes double redemption
/// lose even when two callbacks race on the same code.
#[instrument(skip(pool, code))]
pub async fn consume_login_code(
    pool: &Pool<Sqlite>,
    code: &str,
) -> Result<Option<i64>, AppError> {
    #[derive(sqlx::FromRow)]
    struct CodeRow {
        id: i64,
        user_id: i64,
        expires_at: chrono::NaiveDateTime,
    }

    let row = sqlx::query_as::<_, CodeRow>(
        "SELECT id, user_id, expires_at FROM login_codes WHERE code = ? AND consumed = 0",
    )
    .bind(code)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    if row.expires_at < Utc::now().naive_utc() {
        warn!("Expired login code presented");
        return Ok(None);
    }

    let res = sqlx::query("UPDATE login_codes SET consumed = 1 WHERE id = ? AND consumed = 0")
        .bind(row.id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 1 {
        Ok(Some(row.user_id))
    } else {
        Ok(None)
    }
}

#[instrument(skip(pool))]
pub async fn clean_expired_login_codes(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    let now = Utc::now().naive_utc();

    let result = sqlx::query("DELETE FROM login_codes WHERE expires_at < ? OR consumed = 1")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

// --- teams ---

const TEAM_SELECT: &str =
    "SELECT id, coach_id, name, age_group, season, code, created_at FROM teams";

// No ambiguous characters; codes are read over the phone and typed by hand.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const TEAM_CODE_LEN: usize = 6;

pub fn generate_team_code() -> String {
    let mut rng = rand::rng();
    (0..TEAM_CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

#[instrument(skip(pool))]
pub async fn create_team(
    pool: &Pool<Sqlite>,
    coach_id: i64,
    name: &str,
    age_group: &str,
    season: &str,
) -> Result<Team, AppError> {
    info!("Creating team");

    for _ in 0..10 {
        let code = generate_team_code();

        let taken = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM teams WHERE code = ?")
            .bind(&code)
            .fetch_one(pool)
            .await?;

        if taken > 0 {
            continue;
        }

        let res = sqlx::query(
            "INSERT INTO teams (coach_id, name, age_group, season, code) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(coach_id)
        .bind(name)
        .bind(age_group)
        .bind(season)
        .bind(&code)
        .execute(pool)
        .await?;

        let team_id = res.last_insert_rowid();
        return get_team_for_coach(pool, team_id, coach_id).await;
    }

    Err(AppError::Internal(
        "Could not generate a unique team code".to_string(),
    ))
}

/// The Role Resolver's existence check: LIMIT 1, no full fetch.
#[instrument(skip(pool))]
pub async fn owns_any_team(pool: &Pool<Sqlite>, user_id: i64) -> Result<bool, AppError> {
    let row = sqlx::query_scalar::<_, i64>("SELECT id FROM teams WHERE coach_id = ? LIMIT 1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.is_some())
}

#[instrument(skip(pool))]
pub async fn get_teams_for_coach(
    pool: &Pool<Sqlite>,
    coach_id: i64,
) -> Result<Vec<Team>, AppError> {
    let sql = format!("{} WHERE coach_id = ? ORDER BY created_at DESC", TEAM_SELECT);
    let rows = sqlx::query_as::<_, DbTeam>(&sql)
        .bind(coach_id)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(Team::from).collect())
}

/// Scoped by owner: a team that exists but belongs to another coach is
/// indistinguishable from one that does not exist.
#[instrument(skip(pool))]
pub async fn get_team_for_coach(
    pool: &Pool<Sqlite>,
    team_id: i64,
    coach_id: i64,
) -> Result<Team, AppError> {
    let sql = format!("{} WHERE id = ? AND coach_id = ?", TEAM_SELECT);
    let row = sqlx::query_as::<_, DbTeam>(&sql)
        .bind(team_id)
        .bind(coach_id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(team) => Ok(Team::from(team)),
        None => Err(AppError::NotFound(format!(
            "Team with id {} not found",
            team_id
        ))),
    }
}

#[instrument(skip(pool))]
pub async fn find_team_by_code(
    pool: &Pool<Sqlite>,
    code: &str,
) -> Result<Option<Team>, AppError> {
    let sql = format!("{} WHERE code = ?", TEAM_SELECT);
    let row = sqlx::query_as::<_, DbTeam>(&sql)
        .bind(code.to_uppercase())
        .fetch_optional(pool)
        .await?;

    Ok(row.map(Team::from))
}

#[instrument(skip(pool))]
pub async fn count_players(pool: &Pool<Sqlite>, team_id: i64) -> Result<i64, AppError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM players WHERE team_id = ?")
        .bind(team_id)
        .fetch_one(pool)
        .await?;

    Ok(count)
}

#[instrument(skip(pool))]
pub async fn count_assignments(pool: &Pool<Sqlite>, team_id: i64) -> Result<i64, AppError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM assignments WHERE team_id = ?")
        .bind(team_id)
        .fetch_one(pool)
        .await?;

    Ok(count)
}

// --- parents ---

#[instrument(skip(pool))]
pub async fn find_parent_by_user(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Option<Parent>, AppError> {
    let row =
        sqlx::query_as::<_, DbParent>("SELECT id, user_id, email FROM parents WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(Parent::from))
}

#[instrument(skip(pool))]
pub async fn find_parent_by_email(
    pool: &Pool<Sqlite>,
    email: &str,
) -> Result<Option<Parent>, AppError> {
    let row =
        sqlx::query_as::<_, DbParent>("SELECT id, user_id, email FROM parents WHERE email = ?")
            .bind(email)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(Parent::from))
}

/// First-login provisioning. Read-then-insert keeps repeated auth callbacks
/// from stacking up duplicate rows; two truly concurrent first logins can
/// still race (no unique constraint backs this up).
#[instrument(skip(pool))]
pub async fn ensure_parent_record(
    pool: &Pool<Sqlite>,
    user_id: i64,
    email: &str,
) -> Result<Parent, AppError> {
    if let Some(parent) = find_parent_by_user(pool, user_id).await? {
        return Ok(parent);
    }

    info!("Provisioning parent profile");
    let res = sqlx::query("INSERT INTO parents (user_id, email) VALUES (?, ?)")
        .bind(user_id)
        .bind(email)
        .execute(pool)
        .await?;

    Ok(Parent {
        id: res.last_insert_rowid(),
        user_id,
        email: email.to_string(),
    })
}

#[instrument(skip(pool))]
pub async fn get_linked_players(
    pool: &Pool<Sqlite>,
    parent_id: i64,
) -> Result<Vec<LinkedPlayer>, AppError> {
    let rows = sqlx::query_as::<_, DbLinkedPlayer>(
        "SELECT p.id, p.team_id, p.first_name, p.last_name, p.number,
                t.name AS team_name, t.code AS team_code
         FROM player_parents pp
         JOIN players p ON p.id = pp.player_id
         JOIN teams t ON t.id = p.team_id
         WHERE pp.parent_id = ?
         ORDER BY p.last_name, p.first_name",
    )
    .bind(parent_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(LinkedPlayer::from).collect())
}

#[instrument(skip(pool))]
pub async fn parent_has_player(
    pool: &Pool<Sqlite>,
    parent_id: i64,
    player_id: i64,
) -> Result<bool, AppError> {
    let row = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM player_parents WHERE parent_id = ? AND player_id = ? LIMIT 1",
    )
    .bind(parent_id)
    .bind(player_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}

#[instrument(skip(pool))]
pub async fn link_parent_to_player(
    pool: &Pool<Sqlite>,
    player_id: i64,
    parent_id: i64,
) -> Result<(), AppError> {
    if parent_has_player(pool, parent_id, player_id).await? {
        return Ok(());
    }

    info!("Linking parent to player");
    sqlx::query("INSERT INTO player_parents (player_id, parent_id) VALUES (?, ?)")
        .bind(player_id)
        .bind(parent_id)
        .execute(pool)
        .await?;

    Ok(())
}

// --- players ---

#[instrument(skip(pool))]
pub async fn get_players_for_team(
    pool: &Pool<Sqlite>,
    team_id: i64,
) -> Result<Vec<Player>, AppError> {
    let rows = sqlx::query_as::<_, DbPlayer>(
        "SELECT id, team_id, first_name, last_name, number
         FROM players WHERE team_id = ? ORDER BY number",
    )
    .bind(team_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Player::from).collect())
}

#[instrument(skip(pool))]
pub async fn get_player_in_team(
    pool: &Pool<Sqlite>,
    team_id: i64,
    player_id: i64,
) -> Result<Option<Player>, AppError> {
    let row = sqlx::query_as::<_, DbPlayer>(
        "SELECT id, team_id, first_name, last_name, number
         FROM players WHERE id = ? AND team_id = ?",
    )
    .bind(player_id)
    .bind(team_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Player::from))
}

#[instrument(skip(pool))]
pub async fn add_player(
    pool: &Pool<Sqlite>,
    team_id: i64,
    first_name: &str,
    last_name: &str,
    number: Option<i64>,
) -> Result<i64, AppError> {
    info!("Adding player to roster");
    let res = sqlx::query(
        "INSERT INTO players (team_id, first_name, last_name, number) VALUES (?, ?, ?, ?)",
    )
    .bind(team_id)
    .bind(first_name)
    .bind(last_name)
    .bind(number)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn remove_player(
    pool: &Pool<Sqlite>,
    team_id: i64,
    player_id: i64,
) -> Result<(), AppError> {
    info!("Removing player from roster");
    let res = sqlx::query("DELETE FROM players WHERE id = ? AND team_id = ?")
        .bind(player_id)
        .bind(team_id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Player with id {} not found",
            player_id
        )));
    }

    Ok(())
}

// --- drills ---

const DRILL_SELECT: &str = "SELECT id, title, category, difficulty, duration_minutes, \
     description, video_url, instructions, equipment FROM drills";

#[instrument(skip(pool))]
pub async fn get_drills(
    pool: &Pool<Sqlite>,
    category: Option<&str>,
    difficulty: Option<&str>,
) -> Result<Vec<Drill>, AppError> {
    let mut sql = format!("{} WHERE 1 = 1", DRILL_SELECT);
    if category.is_some() {
        sql.push_str(" AND category = ?");
    }
    if difficulty.is_some() {
        sql.push_str(" AND difficulty = ?");
    }
    sql.push_str(" ORDER BY title");

    let mut query = sqlx::query_as::<_, DbDrill>(&sql);
    if let Some(category) = category {
        query = query.bind(category.to_string());
    }
    if let Some(difficulty) = difficulty {
        query = query.bind(difficulty.to_string());
    }

    let rows = query.fetch_all(pool).await?;

    Ok(rows.into_iter().map(Drill::from).collect())
}

#[instrument(skip(pool))]
pub async fn get_drill(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Drill>, AppError> {
    let sql = format!("{} WHERE id = ?", DRILL_SELECT);
    let row = sqlx::query_as::<_, DbDrill>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(Drill::from))
}

#[instrument(skip(pool))]
pub async fn get_related_drills(
    pool: &Pool<Sqlite>,
    category: &str,
    exclude_id: i64,
) -> Result<Vec<Drill>, AppError> {
    let sql = format!("{} WHERE category = ? AND id != ? LIMIT 4", DRILL_SELECT);
    let rows = sqlx::query_as::<_, DbDrill>(&sql)
        .bind(category)
        .bind(exclude_id)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(Drill::from).collect())
}

// --- assignments ---

const ASSIGNMENT_SELECT: &str =
    "SELECT a.id, a.team_id, a.drill_id, a.target_player_id, a.due_date, a.notes, a.created_at, \
            d.title AS drill_title, d.category AS drill_category, \
            d.difficulty AS drill_difficulty, d.duration_minutes AS drill_duration_minutes \
     FROM assignments a JOIN drills d ON d.id = a.drill_id";

#[instrument(skip(pool))]
pub async fn create_assignment(
    pool: &Pool<Sqlite>,
    team_id: i64,
    drill_id: i64,
    target_player_id: Option<i64>,
    due_date: NaiveDate,
    notes: Option<&str>,
) -> Result<i64, AppError> {
    info!("Creating assignment");
    let res = sqlx::query(
        "INSERT INTO assignments (team_id, drill_id, target_player_id, due_date, notes)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(team_id)
    .bind(drill_id)
    .bind(target_player_id)
    .bind(due_date)
    .bind(notes)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

/// Deletes completions first, then the assignment itself.
#[instrument(skip(pool))]
pub async fn delete_assignment(
    pool: &Pool<Sqlite>,
    team_id: i64,
    assignment_id: i64,
) -> Result<(), AppError> {
    info!("Deleting assignment");

    let exists = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM assignments WHERE id = ? AND team_id = ? LIMIT 1",
    )
    .bind(assignment_id)
    .bind(team_id)
    .fetch_optional(pool)
    .await?;

    if exists.is_none() {
        return Err(AppError::NotFound(format!(
            "Assignment with id {} not found",
            assignment_id
        )));
    }

    sqlx::query("DELETE FROM completions WHERE assignment_id = ?")
        .bind(assignment_id)
        .execute(pool)
        .await?;

    sqlx::query("DELETE FROM assignments WHERE id = ?")
        .bind(assignment_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn get_assignment(
    pool: &Pool<Sqlite>,
    assignment_id: i64,
) -> Result<Option<Assignment>, AppError> {
    let sql = format!("{} WHERE a.id = ?", ASSIGNMENT_SELECT);
    let row = sqlx::query_as::<_, DbAssignment>(&sql)
        .bind(assignment_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(Assignment::from))
}

#[instrument(skip(pool))]
pub async fn get_assignments_for_team(
    pool: &Pool<Sqlite>,
    team_id: i64,
) -> Result<Vec<Assignment>, AppError> {
    let sql = format!(
        "{} WHERE a.team_id = ? ORDER BY a.due_date ASC",
        ASSIGNMENT_SELECT
    );
    let rows = sqlx::query_as::<_, DbAssignment>(&sql)
        .bind(team_id)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(Assignment::from).collect())
}

/// Assignments visible to a set of players: targeted at one of them directly,
/// or team-wide on one of their teams.
#[instrument(skip(pool, player_ids, team_ids))]
pub async fn get_assignments_for_players(
    pool: &Pool<Sqlite>,
    player_ids: &[i64],
    team_ids: &[i64],
) -> Result<Vec<Assignment>, AppError> {
    if player_ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "{} WHERE a.target_player_id IN ({})
            OR (a.target_player_id IS NULL AND a.team_id IN ({}))
         ORDER BY a.created_at DESC",
        ASSIGNMENT_SELECT,
        placeholders(player_ids.len()),
        placeholders(team_ids.len()),
    );

    let mut query = sqlx::query_as::<_, DbAssignment>(&sql);
    for id in player_ids {
        query = query.bind(id);
    }
    for id in team_ids {
        query = query.bind(id);
    }

    let rows = query.fetch_all(pool).await?;

    Ok(rows.into_iter().map(Assignment::from).collect())
}

// --- completions ---

#[instrument(skip(pool, assignment_ids))]
pub async fn get_completions_for_assignments(
    pool: &Pool<Sqlite>,
    assignment_ids: &[i64],
) -> Result<Vec<Completion>, AppError> {
    if assignment_ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT id, assignment_id, player_id, completed_at
         FROM completions WHERE assignment_id IN ({})",
        placeholders(assignment_ids.len()),
    );

    let mut query = sqlx::query_as::<_, DbCompletion>(&sql);
    for id in assignment_ids {
        query = query.bind(id);
    }

    let rows = query.fetch_all(pool).await?;

    Ok(rows.into_iter().map(Completion::from).collect())
}

/// Marking complete is idempotent per (assignment, player): a second mark
/// returns the existing completion instead of inserting another row.
#[instrument(skip(pool))]
pub async fn mark_assignment_complete(
    pool: &Pool<Sqlite>,
    assignment_id: i64,
    player_id: i64,
) -> Result<i64, AppError> {
    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM completions WHERE assignment_id = ? AND player_id = ?",
    )
    .bind(assignment_id)
    .bind(player_id)
    .fetch_optional(pool)
    .await?;

    if let Some(id) = existing {
        return Ok(id);
    }

    info!("Recording completion");
    let res = sqlx::query("INSERT INTO completions (assignment_id, player_id) VALUES (?, ?)")
        .bind(assignment_id)
        .bind(player_id)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}
