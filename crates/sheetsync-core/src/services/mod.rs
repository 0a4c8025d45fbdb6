//! Services shared by the sheetsync binaries

mod database;

pub use database::DatabaseService;
