use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::User;
use crate::db;
use crate::env;
use crate::error::AppError;

/// How long a magic-link code stays redeemable.
pub const LOGIN_CODE_TTL_MINUTES: i64 = 15;

pub fn generate_login_code() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Issues a passwordless login code for an email address, creating the
/// identity on first contact. Mail delivery happens out-of-band; the callback
/// URL is logged so operators can trace delivery problems.
#[instrument(skip(pool))]
pub async fn issue_magic_link(
    pool: &Pool<Sqlite>,
    email: &str,
    redirect_to: Option<&str>,
) -> Result<(), AppError> {
    let user = match db::find_user_by_email(pool, email).await? {
        Some(user) => user,
        None => db::create_user(pool, email).await?,
    };

    let code = generate_login_code();
    db::create_login_code(pool, user.id, &code, redirect_to).await?;

    let mut link = format!("{}/auth/callback?code={}", env::base_url(), code);
    if let Some(next) = redirect_to {
        link.push_str(&format!("&next={}", next));
    }

    info!(email = %email, link = %link, "Magic link issued");

    Ok(())
}

/// Exchanges a one-time code for a session. Fails on unknown, expired, or
/// already-consumed codes, and when the identity behind a nominally valid
/// code no longer resolves.
#[instrument(skip(pool, code))]
pub async fn exchange_code(pool: &Pool<Sqlite>, code: &str) -> Result<(User, String), AppError> {
    let user_id = db::consume_login_code(pool, code)
        .await?
        .ok_or_else(|| AppError::Authentication("Invalid or expired login code".to_string()))?;

    let user = db::get_user(pool, user_id)
        .await?
        .ok_or_else(|| AppError::Authentication("No identity for login code".to_string()))?;

    let token = crate::auth::session::generate_session_token();
    db::create_session(pool, user.id, &token).await?;

    info!(user_id = %user.id, "Login code exchanged for session");

    Ok((user, token))
}
