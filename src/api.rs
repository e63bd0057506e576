use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rocket::State;
use rocket::http::{Cookie, Status};
use rocket::response::Redirect;
use rocket::response::status::Custom;
use rocket::serde::{Deserialize, Serialize, json::Json};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::auth::session::{SESSION_COOKIE, session_cookie};
use crate::auth::{Coach, Role, User, exchange_code, issue_magic_link, resolve_role};
use crate::db;
use crate::error::AppError;
use crate::models::{
    Assignment, Completion, Drill, LinkedPlayer, Player, Team, validate_category,
    validate_difficulty,
};
use crate::stats::{AssignmentStats, assignment_stats, completed_by_any};
use crate::validation::{AppErrorExt, JsonValidateExt, ValidationResponse};

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

// --- login / auth ---

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "A valid email address is required"))]
    email: String,
    redirect_to: Option<String>,
    // Join-flow hint: a team code carried through from /teams/lookup.
    team: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    pub team_name: Option<String>,
}

#[post("/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<LoginResponse>, Custom<Json<ValidationResponse>>> {
    let validated = login.validate_custom()?;

    let team_name = match validated.team.as_deref() {
        Some(code) => db::find_team_by_code(db, code)
            .await
            .validate_custom()?
            .map(|team| team.name),
        None => None,
    };

    issue_magic_link(db, &validated.email, validated.redirect_to.as_deref())
        .await
        .validate_custom()?;

    Ok(Json(LoginResponse {
        success: true,
        message: format!("Magic link sent to {}", validated.email),
        team_name,
    }))
}

/// Completes login. The code exchange result always drives the final route;
/// `next` is accepted but never overrides role routing. All failure modes
/// converge on the one auth-error page.
#[get("/auth/callback?<code>&<next>")]
pub async fn auth_callback(
    code: Option<String>,
    next: Option<String>,
    cookies: &rocket::http::CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
) -> Redirect {
    let _ = next;

    let Some(code) = code else {
        return Redirect::to("/auth/error");
    };

    let (user, token) = match exchange_code(db, &code).await {
        Ok(exchanged) => exchanged,
        Err(err) => {
            err.log_and_record("Auth callback code exchange");
            return Redirect::to("/auth/error");
        }
    };

    cookies.add_private(session_cookie(token));

    match resolve_role(db, user.id).await {
        Ok(Role::Coach) => Redirect::to("/coach"),
        Ok(Role::Parent) => {
            if let Err(err) = db::ensure_parent_record(db, user.id, &user.email).await {
                err.log_and_record("Parent provisioning on auth callback");
                return Redirect::to("/auth/error");
            }
            Redirect::to("/dashboard")
        }
        Err(err) => {
            err.log_and_record("Role resolution on auth callback");
            Redirect::to("/auth/error")
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct AuthErrorResponse {
    pub error: String,
    pub message: String,
    pub retry: String,
}

#[get("/auth/error")]
pub fn auth_error() -> Json<AuthErrorResponse> {
    Json(AuthErrorResponse {
        error: "login_failed".to_string(),
        message: "Your login link is invalid or has expired. Request a new one to continue."
            .to_string(),
        retry: "/login".to_string(),
    })
}

#[post("/logout")]
pub async fn api_logout(
    cookies: &rocket::http::CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
) -> Redirect {
    let token = cookies
        .get_private(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string());

    if let Some(token) = token {
        let _ = db::invalidate_session(db, &token).await;
    }

    cookies.remove_private(Cookie::build(SESSION_COOKIE));

    Redirect::to("/")
}

#[derive(Serialize, Deserialize)]
pub struct MeResponse {
    pub id: i64,
    pub email: String,
    pub role: String,
}

#[get("/me")]
pub async fn api_me(user: User, db: &State<Pool<Sqlite>>) -> Result<Json<MeResponse>, AppError> {
    let role = resolve_role(db, user.id).await?;

    Ok(Json(MeResponse {
        id: user.id,
        email: user.email,
        role: role.to_string(),
    }))
}

// --- join flow ---

#[derive(Serialize, Deserialize)]
pub struct TeamLookupResponse {
    pub id: i64,
    pub name: String,
}

#[get("/teams/lookup?<code>")]
pub async fn team_lookup(
    code: String,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<TeamLookupResponse>, AppError> {
    match db::find_team_by_code(db, &code).await? {
        Some(team) => Ok(Json(TeamLookupResponse {
            id: team.id,
            name: team.name,
        })),
        None => Err(AppError::NotFound(format!(
            "No team with code {}",
            code.to_uppercase()
        ))),
    }
}

// --- parent dashboard ---

#[derive(Serialize, Deserialize)]
pub struct ParentAssignment {
    pub assignment: Assignment,
    pub is_completed: bool,
}

#[derive(Serialize)]
pub struct ParentDashboardResponse {
    pub email: String,
    pub players: Vec<LinkedPlayer>,
    pub assignments: Vec<ParentAssignment>,
}

fn group_completions(completions: Vec<Completion>) -> HashMap<i64, Vec<Completion>> {
    let mut grouped: HashMap<i64, Vec<Completion>> = HashMap::new();
    for completion in completions {
        grouped
            .entry(completion.assignment_id)
            .or_default()
            .push(completion);
    }
    grouped
}

#[get("/dashboard")]
pub async fn parent_dashboard(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<ParentDashboardResponse>, AppError> {
    let players = match db::find_parent_by_user(db, user.id).await? {
        Some(parent) => db::get_linked_players(db, parent.id).await?,
        None => Vec::new(),
    };

    let player_ids: Vec<i64> = players.iter().map(|player| player.id).collect();
    let team_ids: Vec<i64> = players.iter().map(|player| player.team_id).collect();

    let assignments = db::get_assignments_for_players(db, &player_ids, &team_ids).await?;
    let assignment_ids: Vec<i64> = assignments.iter().map(|assignment| assignment.id).collect();
    let mut completions = group_completions(
        db::get_completions_for_assignments(db, &assignment_ids).await?,
    );

    let assignments = assignments
        .into_iter()
        .map(|assignment| {
            let attached = completions.remove(&assignment.id).unwrap_or_default();
            let is_completed = completed_by_any(&attached, &player_ids);
            ParentAssignment {
                assignment,
                is_completed,
            }
        })
        .collect();

    Ok(Json(ParentDashboardResponse {
        email: user.email,
        players,
        assignments,
    }))
}

#[derive(Deserialize)]
pub struct CompleteRequest {
    player_id: i64,
}

#[post("/assignments/<id>/complete", data = "<request>")]
pub async fn complete_assignment(
    id: i64,
    request: Json<CompleteRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, AppError> {
    let parent = db::find_parent_by_user(db, user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Parent profile not found".to_string()))?;

    // "Not yours" and "doesn't exist" look identical from here on out.
    if !db::parent_has_player(db, parent.id, request.player_id).await? {
        return Err(AppError::NotFound(format!(
            "Player with id {} not found",
            request.player_id
        )));
    }

    let assignment = db::get_assignment(db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Assignment with id {} not found", id)))?;

    let visible = match assignment.target_player_id {
        Some(target) => target == request.player_id,
        None => db::get_player_in_team(db, assignment.team_id, request.player_id)
            .await?
            .is_some(),
    };

    if !visible {
        return Err(AppError::NotFound(format!(
            "Assignment with id {} not found",
            id
        )));
    }

    db::mark_assignment_complete(db, id, request.player_id).await?;

    Ok(Status::Ok)
}

// --- coach dashboard ---

#[derive(Serialize, Deserialize)]
pub struct TeamSummary {
    pub team: Team,
    pub player_count: i64,
    pub assignment_count: i64,
}

#[derive(Serialize)]
pub struct CoachDashboardResponse {
    pub email: String,
    pub teams: Vec<TeamSummary>,
}

#[get("/coach")]
pub async fn coach_dashboard(
    coach: Coach,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<CoachDashboardResponse>, AppError> {
    let teams = db::get_teams_for_coach(db, coach.0.id).await?;

    let mut summaries = Vec::with_capacity(teams.len());
    for team in teams {
        let player_count = db::count_players(db, team.id).await?;
        let assignment_count = db::count_assignments(db, team.id).await?;
        summaries.push(TeamSummary {
            team,
            player_count,
            assignment_count,
        });
    }

    Ok(Json(CoachDashboardResponse {
        email: coach.0.email,
        teams: summaries,
    }))
}

#[derive(Deserialize, Validate)]
pub struct CreateTeamRequest {
    #[validate(length(min = 1, max = 80, message = "Team name is required"))]
    name: String,
    #[validate(length(min = 1, max = 40, message = "Age group is required"))]
    age_group: String,
    #[validate(length(min = 1, max = 40, message = "Season is required"))]
    season: String,
}

#[post("/coach/teams", data = "<request>")]
pub async fn create_team(
    request: Json<CreateTeamRequest>,
    coach: Coach,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<Team>>, Custom<Json<ValidationResponse>>> {
    let validated = request.validate_custom()?;

    let team = db::create_team(
        db,
        coach.0.id,
        &validated.name,
        &validated.age_group,
        &validated.season,
    )
    .await
    .validate_custom()?;

    Ok(Custom(Status::Created, Json(team)))
}

#[derive(Serialize, Deserialize)]
pub struct AssignmentWithStats {
    pub assignment: Assignment,
    pub stats: AssignmentStats,
}

#[derive(Serialize)]
pub struct TeamDetailResponse {
    pub team: Team,
    pub players: Vec<Player>,
    pub assignments: Vec<AssignmentWithStats>,
    pub player_count: i64,
}

async fn team_assignments_with_stats(
    db: &Pool<Sqlite>,
    team_id: i64,
    player_count: i64,
) -> Result<Vec<AssignmentWithStats>, AppError> {
    let assignments = db::get_assignments_for_team(db, team_id).await?;
    let assignment_ids: Vec<i64> = assignments.iter().map(|assignment| assignment.id).collect();
    let completions = group_completions(
        db::get_completions_for_assignments(db, &assignment_ids).await?,
    );

    let today = Utc::now().date_naive();

    Ok(assignments
        .into_iter()
        .map(|assignment| {
            let completion_count = completions
                .get(&assignment.id)
                .map(|attached| attached.len() as i64)
                .unwrap_or(0);
            let stats =
                assignment_stats(completion_count, player_count, assignment.due_date, today);
            AssignmentWithStats { assignment, stats }
        })
        .collect())
}

#[get("/coach/team/<id>")]
pub async fn team_detail(
    id: i64,
    coach: Coach,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<TeamDetailResponse>, AppError> {
    let team = db::get_team_for_coach(db, id, coach.0.id).await?;
    let players = db::get_players_for_team(db, id).await?;
    let player_count = players.len() as i64;
    let assignments = team_assignments_with_stats(db, id, player_count).await?;

    Ok(Json(TeamDetailResponse {
        team,
        players,
        assignments,
        player_count,
    }))
}

// --- roster ---

#[get("/coach/team/<id>/roster")]
pub async fn get_roster(
    id: i64,
    coach: Coach,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Player>>, AppError> {
    db::get_team_for_coach(db, id, coach.0.id).await?;
    let players = db::get_players_for_team(db, id).await?;

    Ok(Json(players))
}

#[derive(Deserialize, Validate)]
pub struct AddPlayerRequest {
    #[validate(length(min = 1, max = 60, message = "First name is required"))]
    first_name: String,
    #[validate(length(min = 1, max = 60, message = "Last name is required"))]
    last_name: String,
    number: Option<i64>,
}

#[post("/coach/team/<id>/roster", data = "<request>")]
pub async fn add_player(
    id: i64,
    request: Json<AddPlayerRequest>,
    coach: Coach,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    let validated = request.validate_custom()?;

    db::get_team_for_coach(db, id, coach.0.id)
        .await
        .validate_custom()?;

    db::add_player(
        db,
        id,
        &validated.first_name,
        &validated.last_name,
        validated.number,
    )
    .await
    .validate_custom()?;

    Ok(Status::Created)
}

#[delete("/coach/team/<id>/roster/<player_id>")]
pub async fn remove_player(
    id: i64,
    player_id: i64,
    coach: Coach,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, AppError> {
    db::get_team_for_coach(db, id, coach.0.id).await?;
    db::remove_player(db, id, player_id).await?;

    Ok(Status::Ok)
}

#[derive(Deserialize, Validate)]
pub struct LinkParentRequest {
    #[validate(email(message = "A valid email address is required"))]
    email: String,
}

/// Links an existing parent profile to a player on the coach's roster. The
/// UI links one parent at a time; the relation itself is many-to-many.
#[post("/coach/team/<id>/roster/<player_id>/link", data = "<request>")]
pub async fn link_parent(
    id: i64,
    player_id: i64,
    request: Json<LinkParentRequest>,
    coach: Coach,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    let validated = request.validate_custom()?;

    db::get_team_for_coach(db, id, coach.0.id)
        .await
        .validate_custom()?;

    db::get_player_in_team(db, id, player_id)
        .await
        .validate_custom()?
        .ok_or_else(|| AppError::NotFound(format!("Player with id {} not found", player_id)))
        .validate_custom()?;

    let parent = db::find_parent_by_email(db, &validated.email)
        .await
        .validate_custom()?
        .ok_or_else(|| {
            AppError::NotFound(format!("No parent profile for {}", validated.email))
        })
        .validate_custom()?;

    db::link_parent_to_player(db, player_id, parent.id)
        .await
        .validate_custom()?;

    Ok(Status::Ok)
}

// --- assignments ---

#[derive(Serialize)]
pub struct TeamAssignmentsResponse {
    pub assignments: Vec<AssignmentWithStats>,
    pub player_count: i64,
}

#[get("/coach/team/<id>/assignments")]
pub async fn team_assignments(
    id: i64,
    coach: Coach,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<TeamAssignmentsResponse>, AppError> {
    db::get_team_for_coach(db, id, coach.0.id).await?;
    let player_count = db::count_players(db, id).await?;
    let assignments = team_assignments_with_stats(db, id, player_count).await?;

    Ok(Json(TeamAssignmentsResponse {
        assignments,
        player_count,
    }))
}

#[derive(Deserialize)]
pub struct CreateAssignmentRequest {
    drill_id: i64,
    due_date: NaiveDate,
    notes: Option<String>,
    target_player_id: Option<i64>,
}

#[post("/coach/team/<id>/assignments", data = "<request>")]
pub async fn create_assignment(
    id: i64,
    request: Json<CreateAssignmentRequest>,
    coach: Coach,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, AppError> {
    db::get_team_for_coach(db, id, coach.0.id).await?;

    db::get_drill(db, request.drill_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Drill with id {} not found", request.drill_id))
        })?;

    if let Some(target) = request.target_player_id {
        db::get_player_in_team(db, id, target)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Player with id {} not found", target)))?;
    }

    db::create_assignment(
        db,
        id,
        request.drill_id,
        request.target_player_id,
        request.due_date,
        request.notes.as_deref(),
    )
    .await?;

    Ok(Status::Created)
}

#[delete("/coach/team/<id>/assignments/<assignment_id>")]
pub async fn delete_assignment(
    id: i64,
    assignment_id: i64,
    coach: Coach,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, AppError> {
    db::get_team_for_coach(db, id, coach.0.id).await?;
    db::delete_assignment(db, id, assignment_id).await?;

    Ok(Status::Ok)
}

// --- drill library ---

#[derive(Serialize)]
pub struct DrillsResponse {
    pub drills: Vec<Drill>,
}

#[get("/coach/drills?<category>&<difficulty>")]
pub async fn list_drills(
    category: Option<String>,
    difficulty: Option<String>,
    _coach: Coach,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<DrillsResponse>, AppError> {
    if let Some(category) = category.as_deref() {
        validate_category(category)?;
    }
    if let Some(difficulty) = difficulty.as_deref() {
        validate_difficulty(difficulty)?;
    }

    let drills = db::get_drills(db, category.as_deref(), difficulty.as_deref()).await?;

    Ok(Json(DrillsResponse { drills }))
}

static YOUTUBE_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:youtu\.be/|youtube\.com/(?:embed/|v/|watch\?v=|watch\?.+&v=))([^&?/]+)")
        .expect("YouTube id pattern is valid")
});

pub fn youtube_video_id(url: &str) -> Option<String> {
    YOUTUBE_ID
        .captures(url)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
}

#[derive(Serialize)]
pub struct RelatedDrill {
    pub id: i64,
    pub title: String,
    pub difficulty: String,
}

#[derive(Serialize)]
pub struct DrillDetailResponse {
    pub drill: Drill,
    pub video_id: Option<String>,
    pub related: Vec<RelatedDrill>,
}

#[get("/coach/drills/<id>")]
pub async fn drill_detail(
    id: i64,
    _coach: Coach,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<DrillDetailResponse>, AppError> {
    let drill = db::get_drill(db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Drill with id {} not found", id)))?;

    let video_id = drill.video_url.as_deref().and_then(youtube_video_id);

    let related = db::get_related_drills(db, &drill.category, drill.id)
        .await?
        .into_iter()
        .map(|related| RelatedDrill {
            id: related.id,
            title: related.title,
            difficulty: related.difficulty,
        })
        .collect();

    Ok(Json(DrillDetailResponse {
        drill,
        video_id,
        related,
    }))
}
