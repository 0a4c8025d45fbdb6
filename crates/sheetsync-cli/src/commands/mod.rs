pub mod changes;
pub mod common;
pub mod drain;
pub mod ingest;
pub mod set;
pub mod users;
