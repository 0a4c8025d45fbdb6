//! sheetsync-core - Core library for sheetsync
//!
//! This crate contains the models, the libSQL store and change log, the
//! Google Sheets client, and the dispatcher that propagates table changes to
//! the sheet. The API server and the CLI are thin layers over it.

pub mod backoff;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod sheets;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{ChangeLogEntry, User, UserPayload, UserSnapshot};
