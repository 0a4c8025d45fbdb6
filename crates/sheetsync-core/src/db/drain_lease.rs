//! Drain lease
//!
//! A single row per queue records which dispatcher is draining it and until
//! when. Every process that opens the same database file sees the same row,
//! so two drains of one change log cannot overlap. An expired lease may be
//! taken over by any holder.

use crate::error::Result;
use libsql::params::Params;
use libsql::{Connection, Value};

/// Lease guarding the change log drain
pub const CHANGE_LOG_LEASE: &str = "change_log";

/// Trait for lease operations (async)
#[allow(async_fn_in_trait)]
pub trait DrainLeaseRepository {
    /// Take the lease for `holder` until `expires_at` (Unix millis).
    ///
    /// Succeeds when the lease is free, already held by `holder`, or expired
    /// at `now`. Returns `false` when another holder owns it.
    async fn acquire(&self, name: &str, holder: &str, now: i64, expires_at: i64) -> Result<bool>;

    /// Give the lease up. Returns `false` when `holder` did not own it.
    async fn release(&self, name: &str, holder: &str) -> Result<bool>;
}

/// libSQL implementation of `DrainLeaseRepository`
pub struct LibSqlDrainLeaseRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlDrainLeaseRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl DrainLeaseRepository for LibSqlDrainLeaseRepository<'_> {
    async fn acquire(&self, name: &str, holder: &str, now: i64, expires_at: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE drain_lease SET holder = ?1, expires_at = ?2
                 WHERE name = ?3 AND (holder IS NULL OR holder = ?1 OR expires_at < ?4)",
                Params::Positional(vec![
                    Value::Text(holder.to_string()),
                    Value::Integer(expires_at),
                    Value::Text(name.to_string()),
                    Value::Integer(now),
                ]),
            )
            .await?;
        Ok(changed > 0)
    }

    async fn release(&self, name: &str, holder: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE drain_lease SET holder = NULL, expires_at = 0
                 WHERE name = ? AND holder = ?",
                [name, holder],
            )
            .await?;
        Ok(changed > 0)
    }
}
