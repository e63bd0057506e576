#[cfg(test)]
pub mod test_db {
    use crate::auth::magic::generate_login_code;
    use crate::db::{
        add_player, create_assignment, create_login_code, create_team, create_user,
        find_user_by_email, link_parent_to_player, mark_assignment_complete,
    };
    use crate::error::AppError;
    use crate::init_rocket;
    use chrono::{Duration, Utc};
    use rocket::http::Status;
    use rocket::local::asynchronous::Client;
    use sqlx::{Pool, Sqlite, SqlitePool};
    use std::collections::HashMap;
    use std::sync::Once;
    use tracing::log::LevelFilter;

    static INIT: Once = Once::new();

    #[derive(Default)]
    pub struct TestDbBuilder {
        users: Vec<String>,
        teams: Vec<TestTeam>,
        players: Vec<TestPlayer>,
        parents: Vec<String>,
        links: Vec<(String, String)>,
        drills: Vec<TestDrill>,
        assignments: Vec<TestAssignment>,
        completions: Vec<(String, String)>,
    }

    pub struct TestTeam {
        pub name: String,
        pub age_group: String,
        pub season: String,
        pub coach_email: String,
    }

    pub struct TestPlayer {
        pub team_name: String,
        pub first_name: String,
        pub last_name: String,
        pub number: Option<i64>,
    }

    pub struct TestDrill {
        pub title: String,
        pub category: String,
        pub difficulty: String,
        pub duration_minutes: i64,
        pub instructions: Option<String>,
        pub equipment: Option<String>,
    }

    pub struct TestAssignment {
        pub team_name: String,
        pub drill_title: String,
        pub due_in_days: i64,
        pub notes: Option<String>,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn user(mut self, email: &str) -> Self {
            self.users.push(email.to_string());
            self
        }

        pub fn team(mut self, name: &str, age_group: &str, season: &str, coach: &str) -> Self {
            self.teams.push(TestTeam {
                name: name.to_string(),
                age_group: age_group.to_string(),
                season: season.to_string(),
                coach_email: coach.to_string(),
            });
            self
        }

        pub fn player(
            mut self,
            team_name: &str,
            first_name: &str,
            last_name: &str,
            number: Option<i64>,
        ) -> Self {
            self.players.push(TestPlayer {
                team_name: team_name.to_string(),
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                number,
            });
            self
        }

        /// Creates the identity and a provisioned parent profile for it.
        pub fn parent(mut self, email: &str) -> Self {
            self.users.push(email.to_string());
            self.parents.push(email.to_string());
            self
        }

        pub fn link(mut self, player_name: &str, parent_email: &str) -> Self {
            self.links
                .push((player_name.to_string(), parent_email.to_string()));
            self
        }

        pub fn drill(
            mut self,
            title: &str,
            category: &str,
            difficulty: &str,
            duration_minutes: i64,
        ) -> Self {
            self.drills.push(TestDrill {
                title: title.to_string(),
                category: category.to_string(),
                difficulty: difficulty.to_string(),
                duration_minutes,
                instructions: None,
                equipment: None,
            });
            self
        }

        pub fn assignment(mut self, team_name: &str, drill_title: &str, due_in_days: i64) -> Self {
            self.assignments.push(TestAssignment {
                team_name: team_name.to_string(),
                drill_title: drill_title.to_string(),
                due_in_days,
                notes: None,
            });
            self
        }

        pub fn completion(mut self, drill_title: &str, player_name: &str) -> Self {
            self.completions
                .push((drill_title.to_string(), player_name.to_string()));
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder()
                    .filter_level(LevelFilter::Debug)
                    .is_test(true)
                    .try_init();
            });

            let pool = SqlitePool::connect("sqlite::memory:").await?;

            sqlx::migrate!("./migrations").run(&pool).await?;

            let mut user_ids: HashMap<String, i64> = HashMap::new();
            let mut team_ids: HashMap<String, i64> = HashMap::new();
            let mut team_codes: HashMap<String, String> = HashMap::new();
            let mut player_ids: HashMap<String, i64> = HashMap::new();
            let mut parent_ids: HashMap<String, i64> = HashMap::new();
            let mut drill_ids: HashMap<String, i64> = HashMap::new();
            let mut assignment_ids: HashMap<String, i64> = HashMap::new();

            for email in &self.users {
                let user = create_user(&pool, email).await?;
                user_ids.insert(email.clone(), user.id);
            }

            for team in &self.teams {
                let coach_id = user_ids[&team.coach_email];
                let created =
                    create_team(&pool, coach_id, &team.name, &team.age_group, &team.season)
                        .await?;
                team_ids.insert(team.name.clone(), created.id);
                team_codes.insert(team.name.clone(), created.code);
            }

            for player in &self.players {
                let team_id = team_ids[&player.team_name];
                let id = add_player(
                    &pool,
                    team_id,
                    &player.first_name,
                    &player.last_name,
                    player.number,
                )
                .await?;
                player_ids.insert(format!("{} {}", player.first_name, player.last_name), id);
            }

            for email in &self.parents {
                let user_id = user_ids[email];
                let parent =
                    crate::db::ensure_parent_record(&pool, user_id, email).await?;
                parent_ids.insert(email.clone(), parent.id);
            }

            for (player_name, parent_email) in &self.links {
                link_parent_to_player(&pool, player_ids[player_name], parent_ids[parent_email])
                    .await?;
            }

            for drill in &self.drills {
                let res = sqlx::query(
                    "INSERT INTO drills
                     (title, category, difficulty, duration_minutes, description,
                      instructions, equipment)
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&drill.title)
                .bind(&drill.category)
                .bind(&drill.difficulty)
                .bind(drill.duration_minutes)
                .bind(format!("{} drill", drill.title))
                .bind(&drill.instructions)
                .bind(&drill.equipment)
                .execute(&pool)
                .await?;
                drill_ids.insert(drill.title.clone(), res.last_insert_rowid());
            }

            for assignment in &self.assignments {
                let due_date =
                    (Utc::now() + Duration::days(assignment.due_in_days)).date_naive();
                let id = create_assignment(
                    &pool,
                    team_ids[&assignment.team_name],
                    drill_ids[&assignment.drill_title],
                    None,
                    due_date,
                    assignment.notes.as_deref(),
                )
                .await?;
                assignment_ids.insert(assignment.drill_title.clone(), id);
            }

            for (drill_title, player_name) in &self.completions {
                mark_assignment_complete(
                    &pool,
                    assignment_ids[drill_title],
                    player_ids[player_name],
                )
                .await?;
            }

            Ok(TestDb {
                pool,
                user_ids,
                team_ids,
                team_codes,
                player_ids,
                parent_ids,
                drill_ids,
                assignment_ids,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub user_ids: HashMap<String, i64>,
        pub team_ids: HashMap<String, i64>,
        pub team_codes: HashMap<String, String>,
        pub player_ids: HashMap<String, i64>,
        pub parent_ids: HashMap<String, i64>,
        pub drill_ids: HashMap<String, i64>,
        pub assignment_ids: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn user_id(&self, email: &str) -> i64 {
            self.user_ids[email]
        }

        pub fn team_id(&self, name: &str) -> i64 {
            self.team_ids[name]
        }

        pub fn player_id(&self, name: &str) -> i64 {
            self.player_ids[name]
        }

        pub fn assignment_id(&self, drill_title: &str) -> i64 {
            self.assignment_ids[drill_title]
        }

        pub async fn count_parents_for_user(&self, email: &str) -> i64 {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM parents WHERE user_id = ?")
                .bind(self.user_id(email))
                .fetch_one(&self.pool)
                .await
                .expect("Failed to count parent rows")
        }

        pub async fn count_completions(&self, assignment_id: i64) -> i64 {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM completions WHERE assignment_id = ?",
            )
            .bind(assignment_id)
            .fetch_one(&self.pool)
            .await
            .expect("Failed to count completions")
        }
    }

    /// A standard roster: one coach with the Tigers, one parent linked to a
    /// player, one assignment due next week.
    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .user("coach@example.com")
            .team("Tigers", "10U", "Spring 2026", "coach@example.com")
            .player("Tigers", "Alex", "Rivera", Some(7))
            .player("Tigers", "Sam", "Okafor", Some(12))
            .player("Tigers", "Riley", "Chen", None)
            .player("Tigers", "Jordan", "Blake", Some(3))
            .parent("parent@example.com")
            .link("Alex Rivera", "parent@example.com")
            .drill("Four Corners Throwing", "throwing", "beginner", 15)
            .assignment("Tigers", "Four Corners Throwing", 7)
            .build()
            .await
            .expect("Failed to build standard test db")
    }

    pub async fn setup_test_client(test_db: &TestDb) -> Client {
        let rocket = init_rocket(test_db.pool.clone()).await;
        Client::tracked(rocket)
            .await
            .expect("Failed to build test client")
    }

    /// Logs a user in by minting a login code and redeeming it through the
    /// auth callback, leaving the session cookie on the tracked client.
    pub async fn login_test_user(client: &Client, test_db: &TestDb, email: &str) {
        let user = match find_user_by_email(&test_db.pool, email)
            .await
            .expect("Failed to look up user")
        {
            Some(user) => user,
            None => create_user(&test_db.pool, email)
                .await
                .expect("Failed to create user"),
        };

        let code = generate_login_code();
        create_login_code(&test_db.pool, user.id, &code, None)
            .await
            .expect("Failed to create login code");

        let response = client
            .get(format!("/auth/callback?code={}", code))
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::SeeOther);
    }
}
