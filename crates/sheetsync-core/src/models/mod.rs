//! Data models for sheetsync

mod change_log;
mod user;

pub use change_log::{ChangeLogEntry, ChangeOperation, NewChange, USERS_TABLE};
pub use user::{User, UserPayload, UserSnapshot};
