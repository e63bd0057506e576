pub mod auth;
pub mod stats;
pub mod utils;

pub use utils::test_db;
