//! User repository implementation

use crate::error::{Error, Result};
use crate::models::{User, UserSnapshot};
use crate::util::unix_millis_now;
use libsql::params::Params;
use libsql::{Connection, Row, Value};

use super::{optional_text, text_or_null};

/// Whether an upsert created the row or overwrote an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Trait for user storage operations (async)
#[allow(async_fn_in_trait)]
pub trait UserRepository {
    /// Insert the row if absent, otherwise overwrite `name` and `email`
    async fn upsert(&self, snapshot: &UserSnapshot) -> Result<(User, UpsertOutcome)>;

    /// Get a user by id
    async fn get(&self, id: i64) -> Result<Option<User>>;

    /// List all users ordered by id ascending
    async fn list(&self) -> Result<Vec<User>>;
}

/// libSQL implementation of `UserRepository`
pub struct LibSqlUserRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlUserRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a user from a database row
    fn parse_user(row: &Row) -> Result<User> {
        Ok(User {
            id: row.get(0)?,
            name: optional_text(row, 1)?,
            email: optional_text(row, 2)?,
            updated_at: row.get(3)?,
        })
    }
}

impl UserRepository for LibSqlUserRepository<'_> {
    async fn upsert(&self, snapshot: &UserSnapshot) -> Result<(User, UpsertOutcome)> {
        let outcome = if self.get(snapshot.id).await?.is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        };

        self.conn
            .execute(
                "INSERT INTO users (id, name, email, updated_at) VALUES (?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name,
                     email = excluded.email,
                     updated_at = MAX(excluded.updated_at, users.updated_at + 1)",
                Params::Positional(vec![
                    Value::Integer(snapshot.id),
                    text_or_null(snapshot.name.as_deref()),
                    text_or_null(snapshot.email.as_deref()),
                    Value::Integer(unix_millis_now()),
                ]),
            )
            .await?;

        let user = self
            .get(snapshot.id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("user {}", snapshot.id)))?;
        Ok((user, outcome))
    }

    async fn get(&self, id: i64) -> Result<Option<User>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, email, updated_at FROM users WHERE id = ?",
                [id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_user(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<User>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, email, updated_at FROM users ORDER BY id ASC",
                (),
            )
            .await?;

        let mut users = Vec::new();
        while let Some(row) = rows.next().await? {
            users.push(Self::parse_user(&row)?);
        }
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn snapshot(id: i64, name: &str, email: Option<&str>) -> UserSnapshot {
        UserSnapshot {
            id,
            name: Some(name.to_string()),
            email: email.map(str::to_string),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upsert_inserts_then_updates() {
        let db = setup().await;
        let repo = LibSqlUserRepository::new(db.connection());

        let (created, outcome) = repo
            .upsert(&snapshot(1, "Ann", Some("ann@x.com")))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);
        assert_eq!(created.name.as_deref(), Some("Ann"));

        let (updated, outcome) = repo
            .upsert(&snapshot(1, "Annie", None))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(updated.name.as_deref(), Some("Annie"));
        assert_eq!(updated.email, None);
        assert!(updated.updated_at > created.updated_at);

        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_get_missing_returns_none() {
        let db = setup().await;
        let repo = LibSqlUserRepository::new(db.connection());

        assert!(repo.get(42).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_orders_by_id() {
        let db = setup().await;
        let repo = LibSqlUserRepository::new(db.connection());

        repo.upsert(&snapshot(9, "Zed", None)).await.unwrap();
        repo.upsert(&snapshot(2, "Bo", None)).await.unwrap();
        repo.upsert(&snapshot(5, "Cy", None)).await.unwrap();

        let ids: Vec<i64> = repo.list().await.unwrap().iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }
}
