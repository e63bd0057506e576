use chrono::{DateTime, NaiveDateTime, Utc};
use rocket::Request;
use rocket::http::{Cookie, SameSite, Status};
use rocket::request::{FromRequest, Outcome};
use rocket::response::Redirect;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde_json::{Value, json};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::auth::{Role, User, resolve_role};
use crate::db;

pub const SESSION_COOKIE: &str = "session_token";

/// Sessions slide: every guarded request pushes expiry out again.
pub const SESSION_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbSession {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub token: Option<String>,
    pub expires_at: Option<NaiveDateTime>,
}

impl From<DbSession> for Session {
    fn from(session: DbSession) -> Self {
        Self {
            id: session.id.unwrap_or_default(),
            user_id: session.user_id.unwrap_or_default(),
            token: session.token.unwrap_or_default(),
            expires_at: session
                .expires_at
                .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
                .unwrap_or_else(Utc::now),
        }
    }
}

impl Session {
    pub fn is_valid(&self) -> bool {
        self.expires_at > Utc::now()
    }
}

pub fn generate_session_token() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .same_site(SameSite::Lax)
        .http_only(true)
        .max_age(rocket::time::Duration::days(SESSION_TTL_DAYS))
        .build()
}

/// Session guard. Refreshes the session (db expiry and cookie max-age) on
/// every invocation; a failing store call is treated as unauthenticated
/// rather than crashing the request.
#[rocket::async_trait]
impl<'r> FromRequest<'r> for User {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let auth_span = tracing::info_span!("session_guard");
        let _guard = auth_span.enter();

        let cookies = request.cookies();

        let token = match cookies.get_private(SESSION_COOKIE) {
            Some(cookie) => cookie.value().to_string(),
            None => return Outcome::Forward(Status::Unauthorized),
        };

        let pool = match request.rocket().state::<SqlitePool>() {
            Some(pool) => pool,
            None => {
                tracing::error!("Database pool not found in managed state");
                return Outcome::Error((Status::InternalServerError, ()));
            }
        };

        match db::refresh_session(pool, &token).await {
            Ok(Some(user)) => {
                cookies.add_private(session_cookie(token));
                tracing::info!(email = %user.email, "User authenticated via session token");
                Outcome::Success(user)
            }
            Ok(None) => {
                tracing::warn!("Session token invalid or expired");
                cookies.remove_private(Cookie::build(SESSION_COOKIE));
                Outcome::Forward(Status::Unauthorized)
            }
            Err(err) => {
                tracing::warn!(error = ?err, "Session refresh failed, treating as unauthenticated");
                Outcome::Forward(Status::Unauthorized)
            }
        }
    }
}

/// Coach gate for `/coach` routes: the session guard plus the role existence
/// check. Parents forward to the 403 catcher, which sends them back to the
/// parent dashboard.
pub struct Coach(pub User);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Coach {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let user = match request.guard::<User>().await {
            Outcome::Success(user) => user,
            Outcome::Forward(status) => return Outcome::Forward(status),
            Outcome::Error(err) => return Outcome::Error(err),
        };

        let pool = match request.rocket().state::<SqlitePool>() {
            Some(pool) => pool,
            None => {
                tracing::error!("Database pool not found in managed state");
                return Outcome::Error((Status::InternalServerError, ()));
            }
        };

        match resolve_role(pool, user.id).await {
            Ok(Role::Coach) => Outcome::Success(Coach(user)),
            Ok(Role::Parent) => {
                tracing::warn!(email = %user.email, "Non-coach on coach path");
                Outcome::Forward(Status::Forbidden)
            }
            Err(err) => {
                err.log_and_record("Role resolution in coach guard");
                Outcome::Error((Status::InternalServerError, ()))
            }
        }
    }
}

#[catch(401)]
pub fn unauthorized(req: &Request) -> Redirect {
    Redirect::to(format!("/login?redirectTo={}", req.uri().path()))
}

#[catch(403)]
pub fn forbidden(_req: &Request) -> Redirect {
    Redirect::to("/dashboard")
}

#[catch(404)]
pub fn not_found(_req: &Request) -> Custom<Json<Value>> {
    Custom(
        Status::NotFound,
        Json(json!({
            "error": "Not found",
            "message": "The requested resource does not exist"
        })),
    )
}
