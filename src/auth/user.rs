use serde::Serialize;

/// An authenticated identity. Rows are created the first time a magic link is
/// requested for an email; nothing in the app mutates them afterwards.
#[derive(Debug, Serialize, Clone)]
pub struct User {
    pub id: i64,
    pub email: String,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUser {
    pub id: Option<i64>,
    pub email: Option<String>,
}

impl From<DbUser> for User {
    fn from(user: DbUser) -> Self {
        Self {
            id: user.id.unwrap_or_default(),
            email: user.email.unwrap_or_default(),
        }
    }
}
