use chrono::{Duration, Utc};

use crate::auth::magic::{exchange_code, generate_login_code};
use crate::auth::role::{Role, resolve_role};
use crate::db;
use crate::error::AppError;
use crate::test::test_db::{TestDbBuilder, create_standard_test_db};

#[rocket::async_test]
async fn user_with_a_team_resolves_to_coach() {
    let test_db = create_standard_test_db().await;

    let role = resolve_role(&test_db.pool, test_db.user_id("coach@example.com"))
        .await
        .expect("Failed to resolve role");

    assert_eq!(role, Role::Coach);
}

#[rocket::async_test]
async fn user_without_teams_resolves_to_parent() {
    let test_db = create_standard_test_db().await;

    let role = resolve_role(&test_db.pool, test_db.user_id("parent@example.com"))
        .await
        .expect("Failed to resolve role");

    assert_eq!(role, Role::Parent);
}

#[rocket::async_test]
async fn login_code_exchanges_exactly_once() {
    let test_db = TestDbBuilder::new()
        .user("fan@example.com")
        .build()
        .await
        .expect("Failed to build test db");

    let user_id = test_db.user_id("fan@example.com");
    let code = generate_login_code();
    db::create_login_code(&test_db.pool, user_id, &code, None)
        .await
        .expect("Failed to create login code");

    let (user, token) = exchange_code(&test_db.pool, &code)
        .await
        .expect("First exchange should succeed");
    assert_eq!(user.id, user_id);
    assert!(!token.is_empty());

    let second = exchange_code(&test_db.pool, &code).await;
    assert!(matches!(second, Err(AppError::Authentication(_))));
}

#[rocket::async_test]
async fn expired_login_code_is_rejected() {
    let test_db = TestDbBuilder::new()
        .user("fan@example.com")
        .build()
        .await
        .expect("Failed to build test db");

    let code = generate_login_code();
    let expired = (Utc::now() - Duration::minutes(1)).naive_utc();
    sqlx::query("INSERT INTO login_codes (user_id, code, expires_at) VALUES (?, ?, ?)")
        .bind(test_db.user_id("fan@example.com"))
        .bind(&code)
        .bind(expired)
        .execute(&test_db.pool)
        .await
        .expect("Failed to insert expired code");

    let result = exchange_code(&test_db.pool, &code).await;
    assert!(matches!(result, Err(AppError::Authentication(_))));
}

#[rocket::async_test]
async fn unknown_login_code_is_rejected() {
    let test_db = TestDbBuilder::new()
        .build()
        .await
        .expect("Failed to build test db");

    let result = exchange_code(&test_db.pool, "not-a-real-code").await;
    assert!(matches!(result, Err(AppError::Authentication(_))));
}

#[rocket::async_test]
async fn parent_provisioning_is_idempotent() {
    let test_db = TestDbBuilder::new()
        .user("fan@example.com")
        .build()
        .await
        .expect("Failed to build test db");

    let user_id = test_db.user_id("fan@example.com");

    let first = db::ensure_parent_record(&test_db.pool, user_id, "fan@example.com")
        .await
        .expect("First provisioning should succeed");
    let second = db::ensure_parent_record(&test_db.pool, user_id, "fan@example.com")
        .await
        .expect("Second provisioning should succeed");

    assert_eq!(first.id, second.id);
    assert_eq!(test_db.count_parents_for_user("fan@example.com").await, 1);
}

#[rocket::async_test]
async fn refresh_slides_session_expiry_forward() {
    let test_db = TestDbBuilder::new()
        .user("fan@example.com")
        .build()
        .await
        .expect("Failed to build test db");

    let user_id = test_db.user_id("fan@example.com");
    let token = crate::auth::session::generate_session_token();
    db::create_session(&test_db.pool, user_id, &token)
        .await
        .expect("Failed to create session");

    let before = sqlx::query_scalar::<_, chrono::NaiveDateTime>(
        "SELECT expires_at FROM sessions WHERE token = ?",
    )
    .bind(&token)
    .fetch_one(&test_db.pool)
    .await
    .expect("Failed to read expiry");

    let user = db::refresh_session(&test_db.pool, &token)
        .await
        .expect("Refresh should succeed")
        .expect("Session should resolve to a user");
    assert_eq!(user.id, user_id);

    let after = sqlx::query_scalar::<_, chrono::NaiveDateTime>(
        "SELECT expires_at FROM sessions WHERE token = ?",
    )
    .bind(&token)
    .fetch_one(&test_db.pool)
    .await
    .expect("Failed to read expiry");

    assert!(after >= before);
}

#[rocket::async_test]
async fn expired_session_is_deleted_on_refresh() {
    let test_db = TestDbBuilder::new()
        .user("fan@example.com")
        .build()
        .await
        .expect("Failed to build test db");

    let token = crate::auth::session::generate_session_token();
    let expired = (Utc::now() - Duration::days(1)).naive_utc();
    sqlx::query("INSERT INTO sessions (user_id, token, expires_at) VALUES (?, ?, ?)")
        .bind(test_db.user_id("fan@example.com"))
        .bind(&token)
        .bind(expired)
        .execute(&test_db.pool)
        .await
        .expect("Failed to insert expired session");

    let user = db::refresh_session(&test_db.pool, &token)
        .await
        .expect("Refresh should not error");
    assert!(user.is_none());

    let remaining =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sessions WHERE token = ?")
            .bind(&token)
            .fetch_one(&test_db.pool)
            .await
            .expect("Failed to count sessions");
    assert_eq!(remaining, 0);
}

#[rocket::async_test]
async fn cleanup_sweeps_expired_sessions_and_spent_codes() {
    let test_db = TestDbBuilder::new()
        .user("fan@example.com")
        .build()
        .await
        .expect("Failed to build test db");

    let user_id = test_db.user_id("fan@example.com");
    let expired = (Utc::now() - Duration::days(1)).naive_utc();

    sqlx::query("INSERT INTO sessions (user_id, token, expires_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind("stale-token")
        .bind(expired)
        .execute(&test_db.pool)
        .await
        .expect("Failed to insert expired session");

    let code = generate_login_code();
    db::create_login_code(&test_db.pool, user_id, &code, None)
        .await
        .expect("Failed to create login code");
    exchange_code(&test_db.pool, &code)
        .await
        .expect("Exchange should succeed");

    let sessions_swept = db::clean_expired_sessions(&test_db.pool)
        .await
        .expect("Session cleanup should succeed");
    let codes_swept = db::clean_expired_login_codes(&test_db.pool)
        .await
        .expect("Code cleanup should succeed");

    assert_eq!(sessions_swept, 1);
    assert_eq!(codes_swept, 1);
}
