//! Shared database service wrapper used by the API, the CLI, and the dispatcher.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use libsql::Connection;
use tokio::sync::Mutex;

use crate::db::{
    ChangeLogRepository, Database, DrainLeaseRepository, LibSqlChangeLogRepository,
    LibSqlDrainLeaseRepository, LibSqlUserRepository, UpsertOutcome, UserRepository,
    CHANGE_LOG_LEASE,
};
use crate::models::{
    ChangeLogEntry, ChangeOperation, NewChange, User, UserPayload, UserSnapshot,
};
use crate::util::unix_millis_now;
use crate::Result;

/// Thread-safe service for DB and repository operations.
///
/// The connection lock is held for one logical operation at a time and is
/// never held across a remote call.
#[derive(Clone)]
pub struct DatabaseService {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl DatabaseService {
    /// Open a database service at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!("Opening database at {}", db_path.display());
        let db = Database::open(&db_path).await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory database service (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Filesystem path of the database, if file-backed.
    pub fn path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    /// Upsert an incoming mutation into the local table.
    ///
    /// This path writes the row directly and does not append to the change
    /// log: mutations arriving from the spreadsheet must not be echoed back
    /// to it.
    pub async fn ingest(&self, payload: UserPayload) -> Result<User> {
        let snapshot = UserSnapshot::try_from(payload)?;
        let db = self.db.lock().await;
        let repo = LibSqlUserRepository::new(db.connection());
        let (user, outcome) = repo.upsert(&snapshot).await?;
        tracing::debug!(user_id = user.id, ?outcome, "Ingested user");
        Ok(user)
    }

    /// Write a local edit and enqueue its propagation in one transaction.
    pub async fn save_user(&self, snapshot: &UserSnapshot) -> Result<(User, ChangeLogEntry)> {
        let db = self.db.lock().await;
        let conn = db.connection();

        conn.execute("BEGIN TRANSACTION", ()).await?;
        match Self::save_user_in_transaction(conn, snapshot).await {
            Ok(saved) => {
                if let Err(e) = conn.execute("COMMIT", ()).await {
                    conn.execute("ROLLBACK", ()).await.ok();
                    return Err(e.into());
                }
                tracing::info!(
                    user_id = saved.0.id,
                    log_id = saved.1.log_id,
                    operation = %saved.1.operation,
                    "Saved local edit"
                );
                Ok(saved)
            }
            Err(e) => {
                conn.execute("ROLLBACK", ()).await.ok();
                Err(e)
            }
        }
    }

    async fn save_user_in_transaction(
        conn: &Connection,
        snapshot: &UserSnapshot,
    ) -> Result<(User, ChangeLogEntry)> {
        let (user, outcome) = LibSqlUserRepository::new(conn).upsert(snapshot).await?;
        let operation = match outcome {
            UpsertOutcome::Inserted => ChangeOperation::Insert,
            UpsertOutcome::Updated => ChangeOperation::Update,
        };
        let change = NewChange::for_user(&user.snapshot(), operation)?;
        let entry = LibSqlChangeLogRepository::new(conn).append(&change).await?;
        Ok((user, entry))
    }

    /// Fetch a user by id.
    pub async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let db = self.db.lock().await;
        let repo = LibSqlUserRepository::new(db.connection());
        repo.get(id).await
    }

    /// List all users ordered by id.
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let db = self.db.lock().await;
        let repo = LibSqlUserRepository::new(db.connection());
        repo.list().await
    }

    /// Append a change log entry.
    pub async fn enqueue_change(&self, change: &NewChange) -> Result<ChangeLogEntry> {
        let db = self.db.lock().await;
        let repo = LibSqlChangeLogRepository::new(db.connection());
        repo.append(change).await
    }

    /// Unprocessed change log entries in drain order.
    pub async fn pending_changes(&self) -> Result<Vec<ChangeLogEntry>> {
        let db = self.db.lock().await;
        let repo = LibSqlChangeLogRepository::new(db.connection());
        repo.fetch_pending().await
    }

    /// Recent change log entries, newest first.
    pub async fn recent_changes(&self, limit: usize) -> Result<Vec<ChangeLogEntry>> {
        let db = self.db.lock().await;
        let repo = LibSqlChangeLogRepository::new(db.connection());
        repo.list_recent(limit).await
    }

    /// Mark a batch of entries processed as a single unit.
    ///
    /// Returns how many entries flipped; entries already processed are
    /// skipped.
    pub async fn mark_processed(&self, log_ids: &[i64]) -> Result<usize> {
        if log_ids.is_empty() {
            return Ok(0);
        }

        let db = self.db.lock().await;
        let conn = db.connection();

        conn.execute("BEGIN TRANSACTION", ()).await?;
        let flipped = match Self::mark_in_transaction(conn, log_ids).await {
            Ok(flipped) => flipped,
            Err(e) => {
                conn.execute("ROLLBACK", ()).await.ok();
                return Err(e);
            }
        };

        if let Err(e) = conn.execute("COMMIT", ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }

        Ok(flipped)
    }

    /// Take the change log drain lease for `holder` for `ttl`.
    ///
    /// Returns `false` when another holder has an unexpired lease, in this or
    /// any other process using the same database file.
    pub async fn acquire_drain_lease(&self, holder: &str, ttl: Duration) -> Result<bool> {
        let now = unix_millis_now();
        let ttl = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let db = self.db.lock().await;
        let repo = LibSqlDrainLeaseRepository::new(db.connection());
        repo.acquire(CHANGE_LOG_LEASE, holder, now, now.saturating_add(ttl))
            .await
    }

    /// Mark confirmed entries processed and give up the drain lease in one
    /// transaction.
    pub async fn finish_drain(&self, holder: &str, log_ids: &[i64]) -> Result<usize> {
        let db = self.db.lock().await;
        let conn = db.connection();

        conn.execute("BEGIN TRANSACTION", ()).await?;
        let flipped = match Self::finish_drain_in_transaction(conn, holder, log_ids).await {
            Ok(flipped) => flipped,
            Err(e) => {
                conn.execute("ROLLBACK", ()).await.ok();
                return Err(e);
            }
        };

        if let Err(e) = conn.execute("COMMIT", ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }

        Ok(flipped)
    }

    async fn finish_drain_in_transaction(
        conn: &Connection,
        holder: &str,
        log_ids: &[i64],
    ) -> Result<usize> {
        let flipped = Self::mark_in_transaction(conn, log_ids).await?;
        let released = LibSqlDrainLeaseRepository::new(conn)
            .release(CHANGE_LOG_LEASE, holder)
            .await?;
        if !released {
            tracing::warn!(holder, "Drain lease was no longer held at release");
        }
        Ok(flipped)
    }

    async fn mark_in_transaction(conn: &Connection, log_ids: &[i64]) -> Result<usize> {
        let repo = LibSqlChangeLogRepository::new(conn);
        let mut flipped = 0;
        for log_id in log_ids {
            if repo.mark_processed(*log_id).await? {
                flipped += 1;
            } else {
                tracing::debug!(log_id, "Change already processed");
            }
        }
        Ok(flipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn payload(id: Option<i64>, name: Option<&str>, email: Option<&str>) -> UserPayload {
        UserPayload {
            id,
            name: name.map(str::to_string),
            email: email.map(str::to_string),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ingest_twice_keeps_one_row_without_enqueueing() {
        let service = DatabaseService::open_in_memory().await.unwrap();

        service
            .ingest(payload(Some(3), Some("Bo"), None))
            .await
            .unwrap();
        service
            .ingest(payload(Some(3), Some("Bo"), None))
            .await
            .unwrap();

        let users = service.list_users().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].snapshot(), UserSnapshot {
            id: 3,
            name: Some("Bo".to_string()),
            email: None,
        });
        assert!(service.pending_changes().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ingest_latest_payload_wins() {
        let service = DatabaseService::open_in_memory().await.unwrap();

        service
            .ingest(payload(Some(1), Some("Ann"), Some("ann@x.com")))
            .await
            .unwrap();
        service
            .ingest(payload(Some(1), Some("Annie"), Some("annie@x.com")))
            .await
            .unwrap();

        let user = service.get_user(1).await.unwrap().unwrap();
        assert_eq!(user.name.as_deref(), Some("Annie"));
        assert_eq!(user.email.as_deref(), Some("annie@x.com"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ingest_without_id_is_rejected() {
        let service = DatabaseService::open_in_memory().await.unwrap();

        let err = service
            .ingest(payload(None, Some("Nobody"), None))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::InvalidInput(_)));
        assert!(service.list_users().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn save_user_enqueues_one_pending_change() {
        let service = DatabaseService::open_in_memory().await.unwrap();
        let snapshot = UserSnapshot {
            id: 7,
            name: Some("Ann".to_string()),
            email: Some("ann@x.com".to_string()),
        };

        let (user, entry) = service.save_user(&snapshot).await.unwrap();
        assert_eq!(user.snapshot(), snapshot);
        assert_eq!(entry.operation, "INSERT");
        assert_eq!(entry.row_id, 7);
        assert_eq!(entry.snapshot().unwrap(), snapshot);

        let (_, entry) = service.save_user(&snapshot).await.unwrap();
        assert_eq!(entry.operation, "UPDATE");

        let pending = service.pending_changes().await.unwrap();
        assert_eq!(pending.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mark_processed_batch_skips_already_processed() {
        let service = DatabaseService::open_in_memory().await.unwrap();
        let snapshot = UserSnapshot {
            id: 1,
            name: None,
            email: None,
        };
        let (_, first) = service.save_user(&snapshot).await.unwrap();
        let (_, second) = service.save_user(&snapshot).await.unwrap();

        assert_eq!(service.mark_processed(&[first.log_id]).await.unwrap(), 1);
        assert_eq!(
            service
                .mark_processed(&[first.log_id, second.log_id])
                .await
                .unwrap(),
            1
        );
        assert_eq!(service.mark_processed(&[]).await.unwrap(), 0);
        assert!(service.pending_changes().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn finish_drain_commits_marks_and_frees_lease() {
        let service = DatabaseService::open_in_memory().await.unwrap();
        let snapshot = UserSnapshot {
            id: 1,
            name: None,
            email: None,
        };
        let (_, entry) = service.save_user(&snapshot).await.unwrap();
        let ttl = Duration::from_secs(60);

        assert!(service.acquire_drain_lease("api", ttl).await.unwrap());
        assert!(!service.acquire_drain_lease("cli", ttl).await.unwrap());

        assert_eq!(service.finish_drain("api", &[entry.log_id]).await.unwrap(), 1);
        assert!(service.pending_changes().await.unwrap().is_empty());
        assert!(service.acquire_drain_lease("cli", ttl).await.unwrap());
    }
}
