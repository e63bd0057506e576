use serde::Serialize;
use sqlx::{Pool, Sqlite};
use std::fmt;
use tracing::instrument;

use crate::db;
use crate::error::AppError;

/// Derived, never stored: an identity owning at least one team is a coach,
/// everyone else is a parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    Coach,
    Parent,
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Coach => "coach",
            Role::Parent => "parent",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single place role derivation happens. Re-runs on every coach-path request;
/// the underlying query is an indexed equality lookup with LIMIT 1. Swapping
/// in an explicit role column later only touches this function.
#[instrument(skip(pool))]
pub async fn resolve_role(pool: &Pool<Sqlite>, user_id: i64) -> Result<Role, AppError> {
    if db::owns_any_team(pool, user_id).await? {
        Ok(Role::Coach)
    } else {
        Ok(Role::Parent)
    }
}
