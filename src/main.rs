#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod db;
mod env;
mod error;
mod models;
mod stats;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;

use api::{
    add_player, api_login, api_logout, api_me, auth_callback, auth_error, coach_dashboard,
    complete_assignment, create_assignment, create_team, delete_assignment, drill_detail,
    get_roster, health, link_parent, list_drills, parent_dashboard, remove_player,
    team_assignments, team_detail, team_lookup,
};
use auth::{forbidden, not_found, unauthorized};
use db::{clean_expired_login_codes, clean_expired_sessions};
use error::AppError;
use rocket::fairing::AdHoc;
use rocket::{Build, Rocket, tokio};
use telemetry::TelemetryFairing;
use telemetry::init_tracing;
use thiserror::Error;

use sqlx::SqlitePool;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Anyhow(anyhow::Error),
    #[error("{0}")]
    Figment(rocket::figment::Error),
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Error::Anyhow(value)
    }
}

impl From<rocket::figment::Error> for Error {
    fn from(value: rocket::figment::Error) -> Self {
        Error::Figment(value)
    }
}

#[launch]
async fn rocket() -> _ {
    if let Err(e) = env::load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }

    init_tracing();

    let database_url = std::env::var("DATABASE_URL").unwrap_or_default();

    let pool = SqlitePool::connect(&database_url)
        .await
        .expect("Failed to connect to SQLite database");

    let pool_clone = pool.clone();

    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            match clean_expired_sessions(&pool_clone).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean expired sessions: {}", e);
                }
            }

            match clean_expired_login_codes(&pool_clone).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} spent login codes", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean login codes: {}", e);
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(3600)).await;
        }
    });

    info!("Running database migrations...");
    match sqlx::migrate!("./migrations").run(&pool).await {
        Ok(_) => info!("Migrations completed successfully"),
        Err(e) => {
            error!("Failed to run migrations: {}", e);
            panic!("Database migration failed: {}", e);
        }
    }

    init_rocket(pool).await
}

pub async fn init_rocket(pool: SqlitePool) -> Rocket<Build> {
    info!("Starting dugout");

    rocket::build()
        .manage(pool)
        .mount(
            "/",
            routes![
                health,
                api_login,
                auth_callback,
                auth_error,
                api_logout,
                api_me,
                team_lookup,
                parent_dashboard,
                complete_assignment,
                coach_dashboard,
                create_team,
                team_detail,
                get_roster,
                add_player,
                remove_player,
                link_parent,
                team_assignments,
                create_assignment,
                delete_assignment,
                list_drills,
                drill_detail,
            ],
        )
        .register("/", catchers![unauthorized, forbidden, not_found])
        .attach(TelemetryFairing)
        .attach(AdHoc::on_shutdown("Telemetry shutdown", |_| {
            Box::pin(async {
                telemetry::shutdown_telemetry();
            })
        }))
}
